// src/channel/mod.rs

//! Channel handles: shared-ownership wrappers exposing direction-restricted
//! operations over one reference-counted shared state.
//!
//! [`Channel`] is bidirectional; [`ReadChannel`] and [`WriteChannel`] are the
//! narrowed views, constructible from a `Channel` by reference sharing.
//! Narrowing is one-way: a read-only handle cannot be promoted back.
//!
//! The high-level methods are shallow wrappers over select, which is where
//! the actual protocol lives: `try_read` is `select_ready(read(self), nothing)`
//! and `read().await` is `select(read(self)).await`.

pub(crate) mod core;

use std::sync::Arc;

use crate::ops::{nothing, read, write};
use crate::select::{select, select_ready};
use crate::UNBOUNDED;

pub use self::core::{ChannelState, ChannelSubmit, SharedState, StateId};

/// A bidirectional channel handle.
///
/// `CAP` selects the buffer policy: `0` is a rendezvous channel, a positive
/// value a bounded FIFO, and [`UNBOUNDED`](crate::UNBOUNDED) a buffer that
/// grows without limit. Cloning shares the underlying state; two handles are
/// equal iff they share it.
pub struct Channel<T, const CAP: usize = 0> {
  state: Arc<SharedState<T, CAP>>,
}

/// A read-only view of a [`Channel`].
pub struct ReadChannel<T, const CAP: usize = 0> {
  state: Arc<SharedState<T, CAP>>,
}

/// A write-only view of a [`Channel`].
pub struct WriteChannel<T, const CAP: usize = 0> {
  state: Arc<SharedState<T, CAP>>,
}

/// A channel whose writes never suspend.
pub type UnboundedChannel<T> = Channel<T, { UNBOUNDED }>;
/// Read-only view of an [`UnboundedChannel`].
pub type UnboundedReadChannel<T> = ReadChannel<T, { UNBOUNDED }>;
/// Write-only view of an [`UnboundedChannel`].
pub type UnboundedWriteChannel<T> = WriteChannel<T, { UNBOUNDED }>;

/// Common surface of every channel handle.
///
/// The hidden methods are the protocol hooks the op objects drive; they are
/// not supported API.
pub trait ChannelHandle {
  /// The payload type carried by the channel.
  type Item: Send + 'static;
  #[doc(hidden)]
  type State: ChannelState<Self::Item>;
  /// The channel's capacity class.
  const CAPACITY: usize;
  #[doc(hidden)]
  fn state(&self) -> &Self::State;
  #[doc(hidden)]
  fn state_id(&self) -> StateId;
}

/// Marker for handles that permit reads ([`Channel`], [`ReadChannel`]).
pub trait ReadableChannel: ChannelHandle {}

/// Marker for handles that permit writes ([`Channel`], [`WriteChannel`]).
pub trait WritableChannel: ChannelHandle {}

macro_rules! impl_handle {
  ($handle:ident) => {
    impl<T: Send + 'static, const CAP: usize> ChannelHandle for $handle<T, CAP> {
      type Item = T;
      type State = SharedState<T, CAP>;
      const CAPACITY: usize = CAP;

      fn state(&self) -> &SharedState<T, CAP> {
        &self.state
      }

      fn state_id(&self) -> StateId {
        self.state.id()
      }
    }

    impl<T, const CAP: usize> Clone for $handle<T, CAP> {
      fn clone(&self) -> Self {
        $handle {
          state: Arc::clone(&self.state),
        }
      }
    }

    impl<T, const CAP: usize> std::fmt::Debug for $handle<T, CAP> {
      fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!($handle))
          .field("capacity", &CAP)
          .field("state", &Arc::as_ptr(&self.state))
          .finish()
      }
    }

    impl<T, const CAP: usize> Eq for $handle<T, CAP> {}
  };
}

impl_handle!(Channel);
impl_handle!(ReadChannel);
impl_handle!(WriteChannel);

// Handles are equal iff their shared states coincide, across directions.
macro_rules! impl_handle_eq {
  ($lhs:ident, $rhs:ident) => {
    impl<T, const CAP: usize> PartialEq<$rhs<T, CAP>> for $lhs<T, CAP> {
      fn eq(&self, other: &$rhs<T, CAP>) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
      }
    }
  };
}

impl_handle_eq!(Channel, Channel);
impl_handle_eq!(Channel, ReadChannel);
impl_handle_eq!(Channel, WriteChannel);
impl_handle_eq!(ReadChannel, ReadChannel);
impl_handle_eq!(ReadChannel, Channel);
impl_handle_eq!(ReadChannel, WriteChannel);
impl_handle_eq!(WriteChannel, WriteChannel);
impl_handle_eq!(WriteChannel, Channel);
impl_handle_eq!(WriteChannel, ReadChannel);

impl<T: Send + 'static, const CAP: usize> ReadableChannel for Channel<T, CAP> {}
impl<T: Send + 'static, const CAP: usize> WritableChannel for Channel<T, CAP> {}
impl<T: Send + 'static, const CAP: usize> ReadableChannel for ReadChannel<T, CAP> {}
impl<T: Send + 'static, const CAP: usize> WritableChannel for WriteChannel<T, CAP> {}

// Narrowing conversions. The consuming and borrowing forms both share the
// state; there is deliberately no conversion back to `Channel`.
macro_rules! impl_narrowing {
  ($narrow:ident) => {
    impl<T, const CAP: usize> From<Channel<T, CAP>> for $narrow<T, CAP> {
      fn from(channel: Channel<T, CAP>) -> Self {
        $narrow {
          state: channel.state,
        }
      }
    }

    impl<T, const CAP: usize> From<&Channel<T, CAP>> for $narrow<T, CAP> {
      fn from(channel: &Channel<T, CAP>) -> Self {
        $narrow {
          state: Arc::clone(&channel.state),
        }
      }
    }
  };
}

impl_narrowing!(ReadChannel);
impl_narrowing!(WriteChannel);

impl<T: Send + 'static, const CAP: usize> Channel<T, CAP> {
  /// Creates a fresh channel with its own shared state.
  pub fn new() -> Self {
    Channel {
      state: Arc::new(SharedState::new()),
    }
  }

  /// Receives a value if one is immediately available. Never suspends.
  pub fn try_read(&self) -> Option<T> {
    select_ready((read(self), nothing())).get_received().ok()
  }

  /// Sends `value` if the channel can take it right now. Never suspends; on
  /// failure the value is dropped with the returned `false`.
  pub fn try_write(&self, value: T) -> bool {
    select_ready((write(value, self), nothing())).has_value()
  }

  /// Receives a value, suspending until a peer or the buffer provides one.
  pub async fn read(&self) -> T {
    select((read(self),))
      .await
      .get_received()
      .expect("single-alternative read resolved without a value")
  }

  /// Sends `value`, suspending until a peer or buffer space accepts it.
  pub async fn write(&self, value: T) {
    select((write(value, self),)).await;
  }
}

impl<T: Send + 'static, const CAP: usize> Default for Channel<T, CAP> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Send + 'static> Channel<T, { UNBOUNDED }> {
  /// Sends `value` synchronously. Unbounded writes never wait, so this is
  /// plain function-call cheap and usable outside async contexts.
  pub fn write_now(&self, value: T) {
    select_ready((write(value, self),));
  }
}

impl<T: Send + 'static, const CAP: usize> ReadChannel<T, CAP> {
  /// See [`Channel::try_read`].
  pub fn try_read(&self) -> Option<T> {
    select_ready((read(self), nothing())).get_received().ok()
  }

  /// See [`Channel::read`].
  pub async fn read(&self) -> T {
    select((read(self),))
      .await
      .get_received()
      .expect("single-alternative read resolved without a value")
  }
}

impl<T: Send + 'static, const CAP: usize> WriteChannel<T, CAP> {
  /// See [`Channel::try_write`].
  pub fn try_write(&self, value: T) -> bool {
    select_ready((write(value, self), nothing())).has_value()
  }

  /// See [`Channel::write`].
  pub async fn write(&self, value: T) {
    select((write(value, self),)).await;
  }
}

impl<T: Send + 'static> WriteChannel<T, { UNBOUNDED }> {
  /// See [`Channel::write_now`].
  pub fn write_now(&self, value: T) {
    select_ready((write(value, self),));
  }
}
