// src/ops/read.rs

//! The read operation and its per-operation result.

use core::fmt;

use crate::channel::{ChannelHandle, StateId};
use crate::internal::slot::Slot;
use crate::internal::wait_ctx::WaitContext;
use crate::ops::{ReadList, SelectOp, Submit};

/// Creates an operation that receives one value from whichever channel in
/// `channels` first has one.
///
/// `channels` is a single `&channel` or a tuple of references sharing a
/// payload type; earlier channels take priority when several are ready.
pub fn read<L: ReadList>(channels: L) -> Read<L> {
  Read {
    channels,
    slot: Slot::empty(),
  }
}

/// A pending receive over one or more channels. See [`read`].
#[must_use = "select ops do nothing until passed to select or select_ready"]
pub struct Read<L: ReadList> {
  channels: L,
  slot: Slot<L::Item>,
}

impl<L: ReadList> SelectOp for Read<L> {
  type Result = ReadResult<L::Item>;
  type WaitState = L::WaitNodes;
  const NUM_ALTERNATIVES: usize = L::LEN;
  const ALWAYS_WAITFREE: bool = false;

  fn submit_if_ready(&mut self) -> Option<usize> {
    let Read { channels, slot } = self;
    channels.try_read_any(slot)
  }

  fn submit_with_wait(
    &mut self,
    ctx: &WaitContext,
    base_token: usize,
    wait_state: &mut Self::WaitState,
  ) -> Submit {
    let Read { channels, slot } = self;
    channels.submit_read_any(slot, ctx, base_token, wait_state)
  }

  fn clear_wait(&mut self, winner: Option<usize>, wait_state: &mut Self::WaitState) {
    self.channels.clear_read_any(winner, wait_state);
  }

  fn get_result(&mut self, winner: usize) -> ReadResult<L::Item> {
    ReadResult {
      value: self.slot.read(),
      channel: self.channels.id_at(winner),
    }
  }
}

impl<L: ReadList> fmt::Debug for Read<L> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Read")
      .field("alternatives", &L::LEN)
      .finish_non_exhaustive()
  }
}

/// The value received by a winning [`Read`], tagged with the identity of the
/// channel that delivered it.
pub struct ReadResult<T> {
  value: T,
  channel: StateId,
}

impl<T> ReadResult<T> {
  /// Borrows the received value.
  pub fn get(&self) -> &T {
    &self.value
  }

  /// Consumes the result, returning the received value.
  pub fn into_inner(self) -> T {
    self.value
  }

  /// True iff the value was received from `channel`.
  pub fn matches<C: ChannelHandle>(&self, channel: &C) -> bool {
    self.channel == channel.state_id()
  }

  pub(crate) fn channel_id(&self) -> StateId {
    self.channel
  }
}

impl<T> fmt::Debug for ReadResult<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ReadResult")
      .field("channel", &self.channel)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::channel::Channel;
  use crate::internal::wait_ctx::WaitContext;

  #[test]
  fn submit_if_ready_prefers_earlier_channels() {
    let a = Channel::<i32, 1>::new();
    let b = Channel::<i32, 1>::new();
    assert!(a.try_write(1));
    assert!(b.try_write(2));

    let mut op = read((&a, &b));
    assert_eq!(op.submit_if_ready(), Some(0));
    let result = op.get_result(0);
    assert!(result.matches(&a));
    assert_eq!(result.into_inner(), 1);
  }

  #[test]
  fn clear_wait_is_idempotent() {
    let a = Channel::<i32>::new();
    let b = Channel::<i32>::new();
    let ctx = WaitContext::new();

    let mut op = read((&a, &b));
    let mut wait_state = Default::default();
    assert_eq!(op.submit_with_wait(&ctx, 0, &mut wait_state), Submit::Waiting);
    assert_eq!(a.state().reader_count(), 1);
    assert_eq!(b.state().reader_count(), 1);

    op.clear_wait(None, &mut wait_state);
    assert_eq!(a.state().reader_count(), 0);
    assert_eq!(b.state().reader_count(), 0);

    // Clearing twice is equivalent to clearing once.
    op.clear_wait(None, &mut wait_state);
    assert_eq!(a.state().reader_count(), 0);
    assert_eq!(b.state().reader_count(), 0);
  }
}
