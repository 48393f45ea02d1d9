// src/ops/mod.rs

//! Operation objects: value types describing one pending channel interaction,
//! ready to be raced inside a select.
//!
//! An op references one or more channels of the same payload type (its
//! *sub-alternatives*, tried in declaration order) and carries any payload in
//! a private slot. Ops implement the uniform [`SelectOp`] interface the select
//! driver runs: non-blocking submission, waiter installation, cancellation,
//! and result extraction.
//!
//! Factories: [`read`], [`write`], [`nothing`].

mod nothing;
mod read;
mod write;

pub use nothing::{nothing, NoResult, Nothing};
pub use read::{read, Read, ReadResult};
pub use write::{write, Write, WriteResult};

use crate::channel::{ChannelHandle, ChannelState, ChannelSubmit, ReadableChannel, StateId, WritableChannel};
use crate::internal::slot::Slot;
use crate::internal::wait_ctx::WaitContext;
use crate::internal::waiter::WaiterNode;
use crate::result::AltResult;
use crate::UNBOUNDED;

/// Outcome of submitting an operation (or a whole selection) with intent to
/// wait.
#[doc(hidden)]
#[derive(Debug, PartialEq, Eq)]
pub enum Submit {
  /// Sub-alternative `0..N` completed; the wait context is reserved.
  Ready(usize),
  /// The select was resolved concurrently through an alternative submitted
  /// earlier; stop submitting.
  Resolved,
  /// Waiters are installed on every sub-channel reached so far.
  Waiting,
}

/// The select-op interface.
///
/// The hidden methods are driven by [`select`](crate::select) and
/// [`select_ready`](crate::select_ready); user code only constructs ops and
/// consumes their results.
pub trait SelectOp {
  /// The per-operation result this op produces when it wins.
  type Result: AltResult;
  #[doc(hidden)]
  type WaitState: Default;
  /// Number of sub-alternatives (channels) this op races.
  const NUM_ALTERNATIVES: usize;
  /// True iff every sub-alternative completes without suspension.
  const ALWAYS_WAITFREE: bool;

  #[doc(hidden)]
  fn submit_if_ready(&mut self) -> Option<usize>;
  #[doc(hidden)]
  fn submit_with_wait(
    &mut self,
    ctx: &WaitContext,
    base_token: usize,
    wait_state: &mut Self::WaitState,
  ) -> Submit;
  #[doc(hidden)]
  fn clear_wait(&mut self, winner: Option<usize>, wait_state: &mut Self::WaitState);
  #[doc(hidden)]
  fn get_result(&mut self, winner: usize) -> Self::Result;
}

/// One or more readable channels sharing a payload type, tried in order by a
/// [`Read`] op. Implemented for `&C` and for tuples of up to four references.
pub trait ReadList {
  /// The payload type shared by every channel in the list.
  type Item: Send + 'static;
  #[doc(hidden)]
  type WaitNodes: Default;
  /// Number of channels in the list.
  const LEN: usize;

  #[doc(hidden)]
  fn try_read_any(&self, slot: &mut Slot<Self::Item>) -> Option<usize>;
  #[doc(hidden)]
  fn submit_read_any(
    &self,
    slot: &mut Slot<Self::Item>,
    ctx: &WaitContext,
    base_token: usize,
    nodes: &mut Self::WaitNodes,
  ) -> Submit;
  #[doc(hidden)]
  fn clear_read_any(&self, winner: Option<usize>, nodes: &mut Self::WaitNodes);
  #[doc(hidden)]
  fn id_at(&self, index: usize) -> StateId;
}

/// One or more writable channels sharing a payload type, tried in order by a
/// [`Write`] op. At most one may be unbounded, and only in last position; an
/// unbounded target completes unconditionally, so anything after it would be
/// dead.
pub trait WriteList {
  /// The payload type shared by every channel in the list.
  type Item: Send + 'static;
  #[doc(hidden)]
  type WaitNodes: Default;
  /// Number of channels in the list.
  const LEN: usize;
  /// True iff writes to the final channel never wait.
  const LAST_WRITE_NEVER_WAITS: bool;
  #[doc(hidden)]
  const VALID_UNBOUNDED_PLACEMENT: ();

  #[doc(hidden)]
  fn try_write_any(&self, slot: &mut Slot<Self::Item>) -> Option<usize>;
  #[doc(hidden)]
  fn submit_write_any(
    &self,
    slot: &mut Slot<Self::Item>,
    ctx: &WaitContext,
    base_token: usize,
    nodes: &mut Self::WaitNodes,
  ) -> Submit;
  #[doc(hidden)]
  fn clear_write_any(&self, winner: Option<usize>, nodes: &mut Self::WaitNodes);
  #[doc(hidden)]
  fn id_at(&self, index: usize) -> StateId;
}

fn channel_submit_to_op(submit: ChannelSubmit, index: usize) -> Option<Submit> {
  match submit {
    ChannelSubmit::Completed => Some(Submit::Ready(index)),
    ChannelSubmit::Resolved => Some(Submit::Resolved),
    ChannelSubmit::Waiting => None,
  }
}

impl<'a, C: ReadableChannel> ReadList for &'a C {
  type Item = C::Item;
  type WaitNodes = Option<WaiterNode<C::Item>>;
  const LEN: usize = 1;

  fn try_read_any(&self, slot: &mut Slot<C::Item>) -> Option<usize> {
    self.state().try_read_into(slot).then_some(0)
  }

  fn submit_read_any(
    &self,
    slot: &mut Slot<C::Item>,
    ctx: &WaitContext,
    base_token: usize,
    nodes: &mut Self::WaitNodes,
  ) -> Submit {
    channel_submit_to_op(self.state().submit_read(slot, ctx, base_token, nodes), 0)
      .unwrap_or(Submit::Waiting)
  }

  fn clear_read_any(&self, winner: Option<usize>, nodes: &mut Self::WaitNodes) {
    clear_one(winner, 0, nodes, |node| self.state().cancel_read(node));
  }

  fn id_at(&self, index: usize) -> StateId {
    debug_assert_eq!(index, 0);
    self.state_id()
  }
}

impl<'a, C: WritableChannel> WriteList for &'a C {
  type Item = C::Item;
  type WaitNodes = Option<WaiterNode<C::Item>>;
  const LEN: usize = 1;
  const LAST_WRITE_NEVER_WAITS: bool = C::CAPACITY == UNBOUNDED;
  const VALID_UNBOUNDED_PLACEMENT: () = ();

  fn try_write_any(&self, slot: &mut Slot<C::Item>) -> Option<usize> {
    self.state().try_write_from(slot).then_some(0)
  }

  fn submit_write_any(
    &self,
    slot: &mut Slot<C::Item>,
    ctx: &WaitContext,
    base_token: usize,
    nodes: &mut Self::WaitNodes,
  ) -> Submit {
    channel_submit_to_op(self.state().submit_write(slot, ctx, base_token, nodes), 0)
      .unwrap_or(Submit::Waiting)
  }

  fn clear_write_any(&self, winner: Option<usize>, nodes: &mut Self::WaitNodes) {
    clear_one(winner, 0, nodes, |node| self.state().cancel_write(node));
  }

  fn id_at(&self, index: usize) -> StateId {
    debug_assert_eq!(index, 0);
    self.state_id()
  }
}

/// Detaches the waiter recorded for one sub-alternative, unless that
/// sub-alternative won (its node was already detached by the notifying peer).
/// Second and later calls find the storage empty and do nothing.
fn clear_one<T>(
  winner: Option<usize>,
  index: usize,
  node_slot: &mut Option<WaiterNode<T>>,
  cancel: impl FnOnce(&mut WaiterNode<T>),
) {
  if let Some(mut node) = node_slot.take() {
    if winner != Some(index) {
      cancel(&mut node);
    }
  }
}

macro_rules! impl_channel_lists {
  ($(($($idx:tt $chan:ident),+) => $len:expr;)+) => {$(
    impl<'a, Head: ReadableChannel, $($chan,)+> ReadList for (&'a Head, $(&'a $chan,)+)
    where
      $($chan: ReadableChannel + ChannelHandle<Item = Head::Item>,)+
    {
      type Item = Head::Item;
      type WaitNodes = (Option<WaiterNode<Head::Item>>, $(Option<WaiterNode<$chan::Item>>,)+);
      const LEN: usize = $len;

      fn try_read_any(&self, slot: &mut Slot<Head::Item>) -> Option<usize> {
        if self.0.state().try_read_into(slot) {
          return Some(0);
        }
        $(
          if self.$idx.state().try_read_into(slot) {
            return Some($idx);
          }
        )+
        None
      }

      fn submit_read_any(
        &self,
        slot: &mut Slot<Head::Item>,
        ctx: &WaitContext,
        base_token: usize,
        nodes: &mut Self::WaitNodes,
      ) -> Submit {
        if let Some(done) =
          channel_submit_to_op(self.0.state().submit_read(slot, ctx, base_token, &mut nodes.0), 0)
        {
          return done;
        }
        $(
          if let Some(done) = channel_submit_to_op(
            self.$idx.state().submit_read(slot, ctx, base_token + $idx, &mut nodes.$idx),
            $idx,
          ) {
            return done;
          }
        )+
        Submit::Waiting
      }

      fn clear_read_any(&self, winner: Option<usize>, nodes: &mut Self::WaitNodes) {
        clear_one(winner, 0, &mut nodes.0, |node| self.0.state().cancel_read(node));
        $(
          clear_one(winner, $idx, &mut nodes.$idx, |node| self.$idx.state().cancel_read(node));
        )+
      }

      fn id_at(&self, index: usize) -> StateId {
        if index == 0 {
          return self.0.state_id();
        }
        $(
          if index == $idx {
            return self.$idx.state_id();
          }
        )+
        unreachable!("sub-alternative index out of range")
      }
    }

    impl<'a, Head: WritableChannel, $($chan,)+> WriteList for (&'a Head, $(&'a $chan,)+)
    where
      $($chan: WritableChannel + ChannelHandle<Item = Head::Item>,)+
    {
      type Item = Head::Item;
      type WaitNodes = (Option<WaiterNode<Head::Item>>, $(Option<WaiterNode<$chan::Item>>,)+);
      const LEN: usize = $len;
      const LAST_WRITE_NEVER_WAITS: bool = {
        let never_waits = [Head::CAPACITY == UNBOUNDED, $($chan::CAPACITY == UNBOUNDED,)+];
        never_waits[never_waits.len() - 1]
      };
      const VALID_UNBOUNDED_PLACEMENT: () = {
        let never_waits = [Head::CAPACITY == UNBOUNDED, $($chan::CAPACITY == UNBOUNDED,)+];
        let mut i = 0;
        while i + 1 < never_waits.len() {
          assert!(
            !never_waits[i],
            "only the last target channel of a write may be unbounded"
          );
          i += 1;
        }
      };

      fn try_write_any(&self, slot: &mut Slot<Head::Item>) -> Option<usize> {
        if self.0.state().try_write_from(slot) {
          return Some(0);
        }
        $(
          if self.$idx.state().try_write_from(slot) {
            return Some($idx);
          }
        )+
        None
      }

      fn submit_write_any(
        &self,
        slot: &mut Slot<Head::Item>,
        ctx: &WaitContext,
        base_token: usize,
        nodes: &mut Self::WaitNodes,
      ) -> Submit {
        if let Some(done) =
          channel_submit_to_op(self.0.state().submit_write(slot, ctx, base_token, &mut nodes.0), 0)
        {
          return done;
        }
        $(
          if let Some(done) = channel_submit_to_op(
            self.$idx.state().submit_write(slot, ctx, base_token + $idx, &mut nodes.$idx),
            $idx,
          ) {
            return done;
          }
        )+
        Submit::Waiting
      }

      fn clear_write_any(&self, winner: Option<usize>, nodes: &mut Self::WaitNodes) {
        clear_one(winner, 0, &mut nodes.0, |node| self.0.state().cancel_write(node));
        $(
          clear_one(winner, $idx, &mut nodes.$idx, |node| self.$idx.state().cancel_write(node));
        )+
      }

      fn id_at(&self, index: usize) -> StateId {
        if index == 0 {
          return self.0.state_id();
        }
        $(
          if index == $idx {
            return self.$idx.state_id();
          }
        )+
        unreachable!("sub-alternative index out of range")
      }
    }
  )+};
}

impl_channel_lists! {
  (1 C1) => 2;
  (1 C1, 2 C2) => 3;
  (1 C1, 2 C2, 3 C3) => 4;
}
