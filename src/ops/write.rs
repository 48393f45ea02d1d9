// src/ops/write.rs

//! The write operation and its per-operation result.

use core::fmt;
use core::marker::PhantomData;

use crate::channel::{ChannelHandle, StateId};
use crate::internal::slot::Slot;
use crate::internal::wait_ctx::WaitContext;
use crate::ops::{SelectOp, Submit, WriteList};

/// Creates an operation that sends `value` into whichever channel in
/// `channels` first accepts it.
///
/// `channels` is a single `&channel` or a tuple of references sharing a
/// payload type. At most one of the targets may be unbounded, and only in
/// last position, where it acts as an unconditional fallback.
pub fn write<L: WriteList>(value: L::Item, channels: L) -> Write<L> {
  // Forces the compile-time check on unbounded placement.
  let () = L::VALID_UNBOUNDED_PLACEMENT;
  Write {
    channels,
    slot: Slot::with(value),
  }
}

/// A pending send over one or more channels. See [`write`].
#[must_use = "select ops do nothing until passed to select or select_ready"]
pub struct Write<L: WriteList> {
  channels: L,
  slot: Slot<L::Item>,
}

impl<L: WriteList> SelectOp for Write<L> {
  type Result = WriteResult<L::Item>;
  type WaitState = L::WaitNodes;
  const NUM_ALTERNATIVES: usize = L::LEN;
  const ALWAYS_WAITFREE: bool = L::LAST_WRITE_NEVER_WAITS;

  fn submit_if_ready(&mut self) -> Option<usize> {
    let Write { channels, slot } = self;
    channels.try_write_any(slot)
  }

  fn submit_with_wait(
    &mut self,
    ctx: &WaitContext,
    base_token: usize,
    wait_state: &mut Self::WaitState,
  ) -> Submit {
    let Write { channels, slot } = self;
    channels.submit_write_any(slot, ctx, base_token, wait_state)
  }

  fn clear_wait(&mut self, winner: Option<usize>, wait_state: &mut Self::WaitState) {
    self.channels.clear_write_any(winner, wait_state);
  }

  fn get_result(&mut self, winner: usize) -> WriteResult<L::Item> {
    debug_assert!(!self.slot.is_full(), "write completed with the value still in place");
    WriteResult {
      channel: self.channels.id_at(winner),
      _payload: PhantomData,
    }
  }
}

impl<L: WriteList> fmt::Debug for Write<L> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Write")
      .field("alternatives", &L::LEN)
      .finish_non_exhaustive()
  }
}

/// Confirmation that a [`Write`] delivered its value, tagged with the
/// identity of the accepting channel.
pub struct WriteResult<T> {
  channel: StateId,
  _payload: PhantomData<fn() -> T>,
}

impl<T> WriteResult<T> {
  /// True iff the value was sent to `channel`.
  pub fn matches<C: ChannelHandle>(&self, channel: &C) -> bool {
    self.channel == channel.state_id()
  }

  pub(crate) fn channel_id(&self) -> StateId {
    self.channel
  }
}

impl<T> fmt::Debug for WriteResult<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WriteResult")
      .field("channel", &self.channel)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::channel::Channel;
  use crate::UNBOUNDED;

  fn waitfree_of<O: SelectOp>(_op: &O) -> bool {
    O::ALWAYS_WAITFREE
  }

  #[test]
  fn waitfree_only_with_unbounded_tail() {
    let bounded = Channel::<u8, 2>::new();
    let unbounded = Channel::<u8, { UNBOUNDED }>::new();

    let bounded_only = write(1, &bounded);
    assert!(!waitfree_of(&bounded_only));

    let with_fallback = write(2, (&bounded, &unbounded));
    assert!(waitfree_of(&with_fallback));
  }

  #[test]
  fn buffered_write_lands_in_order() {
    let ch = Channel::<i32, 2>::new();
    let mut op = write(5, &ch);
    assert_eq!(op.submit_if_ready(), Some(0));
    assert!(op.get_result(0).matches(&ch));
    assert_eq!(ch.try_read(), Some(5));
  }
}
