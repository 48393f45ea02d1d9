// src/channel/core.rs

//! The shared, mutex-protected state of a channel and the primitives of the
//! rendezvous/claim protocol.
//!
//! ### Design
//!
//! 1. **Central mutex**: one `parking_lot::Mutex` guards the buffer and both
//!    waiter lists; every state transition happens under it. No lock is ever
//!    held across a suspension point.
//! 2. **Claim before touch**: completing an operation on behalf of a parked
//!    peer requires winning the claim race on that peer's wait context (and on
//!    the caller's own context, when the caller is itself a suspended select).
//!    A waiter whose context is already reserved is a husk: it is discarded on
//!    sight and its owner detaches it again, idempotently, in `clear_wait`.
//! 3. **Notify under the lock**: a winning peer removes the waiter, moves the
//!    value, and fulfils the waiter's promise all inside the channel's
//!    critical section. A cancelling owner must take the same mutex to detach,
//!    so it cannot free its frame while a waker still holds pointers into it.

use core::ptr;
use core::ptr::NonNull;

use parking_lot::Mutex;

use crate::internal::slot::{transfer, Slot};
use crate::internal::buffer::Buffer;
use crate::internal::wait_ctx::{claim_pair, PairClaim, WaitContext};
use crate::internal::waiter::{WaiterList, WaiterNode};
use crate::telemetry;
use crate::UNBOUNDED;

const LOC_CORE: &str = "channel.core";

/// Identity of a channel's shared state, used to relate select results back
/// to the handle they came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(usize);

/// Outcome of submitting one sub-alternative against one channel.
#[derive(Debug, PartialEq, Eq)]
pub enum ChannelSubmit {
  /// The operation completed; the caller's context is now reserved.
  Completed,
  /// The caller's context was already reserved by a concurrent completion;
  /// nothing was changed and no further submission is needed.
  Resolved,
  /// A waiter was installed; the channel will notify it later.
  Waiting,
}

/// Protocol surface the operation objects drive. Implemented once, for
/// [`SharedState`]; the trait exists so ops can be generic over channels of
/// any capacity class.
pub trait ChannelState<T> {
  #[doc(hidden)]
  fn try_read_into(&self, slot: &mut Slot<T>) -> bool;
  #[doc(hidden)]
  fn try_write_from(&self, slot: &mut Slot<T>) -> bool;
  #[doc(hidden)]
  fn submit_read(
    &self,
    slot: &mut Slot<T>,
    ctx: &WaitContext,
    token: usize,
    node: &mut Option<WaiterNode<T>>,
  ) -> ChannelSubmit;
  #[doc(hidden)]
  fn submit_write(
    &self,
    slot: &mut Slot<T>,
    ctx: &WaitContext,
    token: usize,
    node: &mut Option<WaiterNode<T>>,
  ) -> ChannelSubmit;
  #[doc(hidden)]
  fn cancel_read(&self, node: &mut WaiterNode<T>);
  #[doc(hidden)]
  fn cancel_write(&self, node: &mut WaiterNode<T>);
}

pub struct SharedState<T, const CAP: usize> {
  inner: Mutex<StateInner<T, CAP>>,
}

struct StateInner<T, const CAP: usize> {
  buffer: Buffer<T, CAP>,
  readers: WaiterList<T>,
  /// Stays empty when `CAP == UNBOUNDED`: an unbounded buffer is never full,
  /// so writers have nothing to wait for.
  writers: WaiterList<T>,
}

// Safety: all interior state is reached through the mutex; waiter nodes are
// only touched under it.
unsafe impl<T: Send, const CAP: usize> Send for SharedState<T, CAP> {}
unsafe impl<T: Send, const CAP: usize> Sync for SharedState<T, CAP> {}

impl<T, const CAP: usize> SharedState<T, CAP> {
  pub(crate) fn new() -> Self {
    SharedState {
      inner: Mutex::new(StateInner {
        buffer: Buffer::new(),
        readers: WaiterList::new(),
        writers: WaiterList::new(),
      }),
    }
  }

  pub(crate) fn id(&self) -> StateId {
    StateId(self as *const Self as *const () as usize)
  }

  #[cfg(test)]
  pub(crate) fn reader_count(&self) -> usize {
    self.inner.lock().readers.len()
  }

  #[cfg(test)]
  pub(crate) fn writer_count(&self) -> usize {
    self.inner.lock().writers.len()
  }

  #[cfg(test)]
  pub(crate) fn buffered(&self) -> usize {
    self.inner.lock().buffer.len()
  }
}

impl<T, const CAP: usize> std::fmt::Debug for SharedState<T, CAP> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SharedState").field("capacity", &CAP).finish()
  }
}

impl<T: Send + 'static, const CAP: usize> ChannelState<T> for SharedState<T, CAP> {
  fn try_read_into(&self, slot: &mut Slot<T>) -> bool {
    let mut inner = self.inner.lock();
    let StateInner {
      buffer, writers, ..
    } = &mut *inner;

    if CAP != 0 && !buffer.is_empty() {
      buffer.dequeue_into(slot);
      if CAP != UNBOUNDED {
        refill_from_writer(buffer, writers);
      }
      true
    } else if CAP == 0 {
      match dequeue_first_available(writers) {
        Some(mut writer) => unsafe {
          let writer = writer.as_mut();
          transfer(writer.slot_mut(), slot);
          writer.notify();
          telemetry::increment_counter(LOC_CORE, "rendezvous_read");
          true
        },
        None => false,
      }
    } else {
      false
    }
  }

  fn try_write_from(&self, slot: &mut Slot<T>) -> bool {
    let mut inner = self.inner.lock();
    let StateInner {
      buffer, readers, ..
    } = &mut *inner;

    if let Some(mut reader) = dequeue_first_available(readers) {
      unsafe {
        let reader = reader.as_mut();
        transfer(slot, reader.slot_mut());
        reader.notify();
      }
      telemetry::increment_counter(LOC_CORE, "rendezvous_write");
      true
    } else if CAP != 0 && !buffer.is_full() {
      buffer.enqueue_from(slot);
      true
    } else {
      false
    }
  }

  fn submit_read(
    &self,
    slot: &mut Slot<T>,
    ctx: &WaitContext,
    token: usize,
    node: &mut Option<WaiterNode<T>>,
  ) -> ChannelSubmit {
    let mut inner = self.inner.lock();
    let StateInner {
      buffer,
      readers,
      writers,
    } = &mut *inner;

    if CAP != 0 && !buffer.is_empty() {
      if !ctx.claim() {
        // A different alternative of this select already won.
        return ChannelSubmit::Resolved;
      }
      buffer.dequeue_into(slot);
      if CAP != UNBOUNDED {
        refill_from_writer(buffer, writers);
      }
      ChannelSubmit::Completed
    } else if CAP == 0 {
      match dequeue_first_available_for(writers, ctx) {
        PairedDequeue::Found(mut writer) => unsafe {
          let writer = writer.as_mut();
          transfer(writer.slot_mut(), slot);
          writer.notify();
          telemetry::increment_counter(LOC_CORE, "rendezvous_read");
          ChannelSubmit::Completed
        },
        PairedDequeue::SelfResolved => ChannelSubmit::Resolved,
        PairedDequeue::Empty => {
          install(readers, node, ctx, slot, token);
          ChannelSubmit::Waiting
        }
      }
    } else {
      // Buffered (possibly unbounded) and currently empty.
      install(readers, node, ctx, slot, token);
      ChannelSubmit::Waiting
    }
  }

  fn submit_write(
    &self,
    slot: &mut Slot<T>,
    ctx: &WaitContext,
    token: usize,
    node: &mut Option<WaiterNode<T>>,
  ) -> ChannelSubmit {
    let mut inner = self.inner.lock();
    let StateInner {
      buffer,
      readers,
      writers,
    } = &mut *inner;

    match dequeue_first_available_for(readers, ctx) {
      PairedDequeue::Found(mut reader) => unsafe {
        let reader = reader.as_mut();
        transfer(slot, reader.slot_mut());
        reader.notify();
        telemetry::increment_counter(LOC_CORE, "rendezvous_write");
        ChannelSubmit::Completed
      },
      PairedDequeue::SelfResolved => ChannelSubmit::Resolved,
      PairedDequeue::Empty => {
        if CAP != 0 && !buffer.is_full() {
          if !ctx.claim() {
            return ChannelSubmit::Resolved;
          }
          buffer.enqueue_from(slot);
          ChannelSubmit::Completed
        } else {
          // Unreachable for unbounded buffers, which are never full.
          debug_assert!(CAP != UNBOUNDED);
          install(writers, node, ctx, slot, token);
          ChannelSubmit::Waiting
        }
      }
    }
  }

  fn cancel_read(&self, node: &mut WaiterNode<T>) {
    let mut inner = self.inner.lock();
    // Safety: exclusive access via the lock; `remove` tolerates nodes a peer
    // already detached.
    unsafe { inner.readers.remove(NonNull::from(node)) };
  }

  fn cancel_write(&self, node: &mut WaiterNode<T>) {
    let mut inner = self.inner.lock();
    unsafe { inner.writers.remove(NonNull::from(node)) };
  }
}

/// Links a fresh waiter node onto `list`, recording it in the select's wait
/// state so `clear_wait` can find it again.
fn install<T>(
  list: &mut WaiterList<T>,
  node_slot: &mut Option<WaiterNode<T>>,
  ctx: &WaitContext,
  slot: &mut Slot<T>,
  token: usize,
) {
  debug_assert!(node_slot.is_none(), "sub-alternative submitted twice");
  let node = node_slot.insert(WaiterNode::new(ctx, slot, token));
  // Safety: the node lives in the pinned select frame, which stays put until
  // clear_wait has detached it.
  unsafe { list.push_back(NonNull::from(node)) };
}

/// Pops waiters off the front of `list` until one's context can be claimed.
///
/// Waiters that lost their claim race elsewhere are discarded, not re-linked;
/// their owning select detaches the dead node again in `clear_wait`.
fn dequeue_first_available<T>(list: &mut WaiterList<T>) -> Option<NonNull<WaiterNode<T>>> {
  while let Some(node) = list.front() {
    // Safety: exclusive access via the channel lock; the node is linked, so
    // its frame is alive.
    unsafe {
      list.remove(node);
      if node.as_ref().ctx().claim() {
        return Some(node);
      }
    }
    telemetry::increment_counter(LOC_CORE, "stale_waiter_skipped");
  }
  None
}

enum PairedDequeue<T> {
  Found(NonNull<WaiterNode<T>>),
  /// The caller's own context is no longer claimable; its select already
  /// resolved through another channel.
  SelfResolved,
  Empty,
}

/// Like [`dequeue_first_available`], but claims each candidate's context
/// together with the submitting select's own context, atomically.
///
/// Waiters belonging to `own` itself are skipped over but left linked: a
/// select never pairs with its own pending alternatives.
fn dequeue_first_available_for<T>(
  list: &mut WaiterList<T>,
  own: &WaitContext,
) -> PairedDequeue<T> {
  let mut cursor = list.front();
  while let Some(node) = cursor {
    // Safety: node is linked and the channel lock is held.
    let peer = unsafe { node.as_ref().ctx() };
    if ptr::eq(peer, own) {
      cursor = unsafe { list.next_of(node) };
      continue;
    }
    match claim_pair(own, peer) {
      PairClaim::Claimed => {
        unsafe { list.remove(node) };
        return PairedDequeue::Found(node);
      }
      PairClaim::PeerUnavailable => {
        telemetry::increment_counter(LOC_CORE, "stale_waiter_skipped");
        let next = unsafe { list.next_of(node) };
        unsafe { list.remove(node) };
        cursor = next;
      }
      PairClaim::SelfUnavailable => return PairedDequeue::SelfResolved,
    }
  }
  PairedDequeue::Empty
}

/// After dequeuing from a full bounded buffer, moves the oldest parked
/// writer's value into the freed cell and wakes that writer.
fn refill_from_writer<T, const CAP: usize>(
  buffer: &mut Buffer<T, CAP>,
  writers: &mut WaiterList<T>,
) {
  if let Some(mut writer) = dequeue_first_available(writers) {
    // Safety: we won the claim on this writer's context under the lock.
    unsafe {
      let writer = writer.as_mut();
      buffer.enqueue_from(writer.slot_mut());
      writer.notify();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use futures_util::task::noop_waker;

  #[test]
  fn try_ops_on_an_idle_rendezvous_channel_fail() {
    let state = SharedState::<i32, 0>::new();
    let mut slot = Slot::empty();
    assert!(!state.try_read_into(&mut slot));
    slot.write(1);
    assert!(!state.try_write_from(&mut slot));
    // The value stays with the caller on failure.
    assert_eq!(slot.read(), 1);
  }

  #[test]
  fn bounded_try_ops_fill_and_drain_in_order() {
    let state = SharedState::<i32, 2>::new();
    let mut slot = Slot::empty();

    for i in 0..2 {
      slot.write(i);
      assert!(state.try_write_from(&mut slot));
    }
    slot.write(99);
    assert!(!state.try_write_from(&mut slot));
    assert_eq!(slot.read(), 99);
    assert_eq!(state.buffered(), 2);

    for i in 0..2 {
      assert!(state.try_read_into(&mut slot));
      assert_eq!(slot.read(), i);
    }
    assert!(!state.try_read_into(&mut slot));
  }

  #[test]
  fn submit_read_installs_a_waiter_when_idle() {
    let state = SharedState::<i32, 0>::new();
    let ctx = WaitContext::new();
    let mut slot = Slot::empty();
    let mut node = None;

    assert_eq!(
      state.submit_read(&mut slot, &ctx, 0, &mut node),
      ChannelSubmit::Waiting
    );
    assert_eq!(state.reader_count(), 1);

    state.cancel_read(node.as_mut().expect("waiter was installed"));
    assert_eq!(state.reader_count(), 0);
  }

  #[test]
  fn submit_read_refuses_when_context_already_reserved() {
    let state = SharedState::<i32, 1>::new();
    let mut slot = Slot::empty();
    slot.write(5);
    assert!(state.try_write_from(&mut slot));

    let ctx = WaitContext::new();
    assert!(ctx.claim());
    let mut node = None;
    assert_eq!(
      state.submit_read(&mut slot, &ctx, 0, &mut node),
      ChannelSubmit::Resolved
    );
    // The buffered value must not have been consumed.
    assert_eq!(state.buffered(), 1);
    assert!(node.is_none());
  }

  #[test]
  fn select_never_pairs_with_its_own_waiters() {
    let state = SharedState::<i32, 0>::new();
    let ctx = WaitContext::new();

    // A select parks its read sub-alternative first, as the driver would.
    let mut read_slot = Slot::empty();
    let mut read_node = None;
    assert_eq!(
      state.submit_read(&mut read_slot, &ctx, 0, &mut read_node),
      ChannelSubmit::Waiting
    );

    // The same select's write on the same channel must skip its own parked
    // reader and park as a writer instead of satisfying itself.
    let mut write_slot = Slot::empty();
    write_slot.write(8);
    let mut write_node = None;
    assert_eq!(
      state.submit_write(&mut write_slot, &ctx, 1, &mut write_node),
      ChannelSubmit::Waiting
    );

    assert_eq!(state.reader_count(), 1);
    assert_eq!(state.writer_count(), 1);
    // No transfer happened: the value stayed with the writer.
    assert!(!read_slot.is_full());
    assert!(write_slot.is_full());
    // Nothing completed, so the context is still claimable.
    assert!(ctx.claim());

    state.cancel_read(read_node.as_mut().expect("reader was installed"));
    state.cancel_write(write_node.as_mut().expect("writer was installed"));
    assert_eq!(state.reader_count(), 0);
    assert_eq!(state.writer_count(), 0);
  }

  #[test]
  fn own_waiter_is_skipped_over_not_discarded() {
    let state = SharedState::<i32, 0>::new();

    // One select parks a reader...
    let own = WaitContext::new();
    let mut own_slot = Slot::empty();
    let mut own_read = None;
    assert_eq!(
      state.submit_read(&mut own_slot, &own, 0, &mut own_read),
      ChannelSubmit::Waiting
    );

    // ...and an unrelated select parks a reader behind it.
    let other = WaitContext::new();
    let mut other_slot = Slot::empty();
    let mut other_read = None;
    assert_eq!(
      state.submit_read(&mut other_slot, &other, 0, &mut other_read),
      ChannelSubmit::Waiting
    );

    // A write from the first select walks past its own reader at the head
    // of the list and pairs with the unrelated one.
    let mut write_slot = Slot::empty();
    write_slot.write(4);
    let mut write_node = None;
    assert_eq!(
      state.submit_write(&mut write_slot, &own, 1, &mut write_node),
      ChannelSubmit::Completed
    );

    assert_eq!(other_slot.read(), 4);
    assert_eq!(other.poll_token(&noop_waker()), Some(0));
    // The skipped node stayed linked; only the served reader left the list.
    assert_eq!(state.reader_count(), 1);
    // Both contexts of the completed pairing are reserved now.
    assert!(!own.claim());
    assert!(!other.claim());

    state.cancel_read(own_read.as_mut().expect("reader was installed"));
    assert_eq!(state.reader_count(), 0);
  }

  #[test]
  fn stale_waiters_are_discarded_not_served() {
    let state = SharedState::<i32, 0>::new();
    let dead_ctx = WaitContext::new();
    let mut dead_slot = Slot::empty();
    let mut dead_node = None;

    assert_eq!(
      state.submit_read(&mut dead_slot, &dead_ctx, 0, &mut dead_node),
      ChannelSubmit::Waiting
    );
    // Reserve the parked reader's context, as a concurrent select would.
    assert!(dead_ctx.claim());

    let mut slot = Slot::empty();
    slot.write(11);
    assert!(!state.try_write_from(&mut slot));
    assert_eq!(slot.read(), 11);
    // The dead node was discarded during the walk.
    assert_eq!(state.reader_count(), 0);

    // The owner's detach is still a safe no-op afterwards.
    state.cancel_read(dead_node.as_mut().expect("waiter was installed"));
  }
}
