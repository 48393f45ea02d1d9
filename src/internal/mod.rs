// src/internal/mod.rs

//! Crate machinery backing the op and select traits.
//!
//! Everything here is `#[doc(hidden)]`: the types appear in the signatures of
//! the (equally hidden) protocol methods on public traits, but none of it is
//! supported API.

pub mod buffer;
pub mod slot;
pub mod wait_ctx;
pub mod waiter;

pub use buffer::Buffer;
pub use slot::Slot;
pub use wait_ctx::{PairClaim, WaitContext};
pub use waiter::{WaiterList, WaiterNode};

// Re-exported so the hidden protocol surface of the public channel traits
// stays publicly reachable.
pub use crate::channel::{ChannelState, ChannelSubmit, SharedState, StateId};
