#![warn(missing_debug_implementations, rust_2018_idioms)]

//! Typed CSP-style channels with multi-way select for async Rust.
//!
//! Chansel provides first-in-first-out message channels in three capacity
//! classes (rendezvous, bounded, unbounded), direction-restricted handles
//! sharing one channel state, and a select primitive that races an arbitrary
//! mix of pending reads and writes across independent channels, completing
//! exactly one of them.
//!
//! The crate is executor-agnostic: suspension goes through `std::task::Waker`,
//! so channels work under tokio, smol, or any other conforming runtime.
//!
//! # Capacity classes
//!
//! The capacity is part of the channel type:
//!
//! - [`Channel<T>`] (capacity `0`): a rendezvous channel. A write completes
//!   only by pairing with a live read, and vice versa.
//! - [`Channel<T, N>`] for `N > 0`: a bounded FIFO of at most `N` items.
//! - [`Channel<T, UNBOUNDED>`]: a growable FIFO. Writes never suspend, which
//!   is what lets [`write_now`](Channel::write_now) be synchronous.
//!
//! # Example
//!
//! ```no_run
//! use chansel::{select, ops::read, Channel};
//!
//! # async fn demo() {
//! let a = Channel::<i32>::new();
//! let b = Channel::<String>::new();
//!
//! let result = select((read(&a), read(&b))).await;
//! if let Some(n) = result.get_if_received_from(&a) {
//!     println!("a sent {n}");
//! } else if let Some(s) = result.get_if_received_from(&b) {
//!     println!("b sent {s}");
//! }
//! # }
//! ```

pub mod error;
pub mod ops;
pub mod telemetry;

mod channel;
mod result;
mod select;

// Internal machinery referenced by the public op/select traits. Not part of
// the supported API surface.
#[doc(hidden)]
pub mod internal;

pub use channel::{
  Channel, ChannelHandle, ReadChannel, ReadableChannel, UnboundedChannel, UnboundedReadChannel,
  UnboundedWriteChannel, WritableChannel, WriteChannel,
};
pub use error::BadSelectResultAccess;
pub use result::{AltResult, AltSet, SelectResult};
pub use select::{select, select_ready, ReadySelect, Select, SelectList};

/// Capacity sentinel for channels whose buffer grows without bound.
///
/// Writes to an unbounded channel never suspend; the type system exposes this
/// through [`ops::Write`]'s waitfree flag, which is what allows such writes in
/// [`select_ready`].
pub const UNBOUNDED: usize = usize::MAX;
