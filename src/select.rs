// src/select.rs

//! The select driver: races a tuple of operations, completes exactly one.
//!
//! ### How a waiting select runs
//!
//! The returned [`Select`] future owns the operations, one [`WaitContext`]
//! and the per-op wait states. Its first poll submits every operation in
//! declaration order:
//!
//! - An operation that can complete immediately first claims the wait
//!   context (so no concurrent peer can also complete this select), performs
//!   its transfer, and short-circuits submission.
//! - Otherwise it installs one waiter per sub-channel and submission
//!   continues.
//! - If a submission finds the wait context already reserved, a peer raced us
//!   through an alternative submitted moments ago; submission stops and the
//!   promise is left to that peer.
//!
//! The poll then reads the context's promise; the token stored there (by us
//! or by a peer) names the winning sub-alternative. Completion detaches every
//! loser waiter before the result is assembled, so no node of this
//! invocation outlives it in any channel's list. Dropping the future
//! mid-wait performs the same detachment from `Drop`.
//!
//! Declaration order is the priority order everywhere: among simultaneously
//! ready alternatives, the first one declared wins.

use core::fmt;
use core::future::Future;
use core::marker::PhantomPinned;
use core::pin::Pin;
use core::task::{Context, Poll};

use crate::internal::wait_ctx::WaitContext;
use crate::ops::{SelectOp, Submit};
use crate::result::{AltSet, SelectResult};
use crate::telemetry;

const LOC_SELECT: &str = "select.driver";

/// A tuple of [`SelectOp`]s that can be raced together. Implemented for
/// tuples of one to six operations.
pub trait SelectList {
  /// The alternative storage of the produced [`SelectResult`].
  type Alts: AltSet;
  #[doc(hidden)]
  type WaitStates: Default;
  /// Total number of sub-alternatives across all operations.
  const NUM_ALTERNATIVES: usize;

  #[doc(hidden)]
  fn submit_if_ready_all(&mut self) -> Option<usize>;
  #[doc(hidden)]
  fn submit_with_wait_all(&mut self, ctx: &WaitContext, ws: &mut Self::WaitStates) -> Submit;
  #[doc(hidden)]
  fn clear_wait_all(&mut self, winner: Option<usize>, ws: &mut Self::WaitStates);
  #[doc(hidden)]
  fn collect_result(&mut self, winner: usize) -> Self::Alts;
}

/// A [`SelectList`] whose final operation is waitfree, making the whole
/// selection completable without suspension.
pub trait ReadySelect: SelectList {
  #[doc(hidden)]
  const WAITFREE_TAIL: ();
}

macro_rules! impl_select_list {
  ($(($($field:tt $op:ident),+) last $last:ident;)+) => {$(
    impl<$($op: SelectOp,)+> SelectList for ($($op,)+) {
      type Alts = ($(Option<$op::Result>,)+);
      type WaitStates = ($($op::WaitState,)+);
      const NUM_ALTERNATIVES: usize = 0 $(+ $op::NUM_ALTERNATIVES)+;

      fn submit_if_ready_all(&mut self) -> Option<usize> {
        let mut base = 0;
        $(
          if let Some(sub) = self.$field.submit_if_ready() {
            return Some(base + sub);
          }
          #[allow(unused_assignments)]
          {
            base += $op::NUM_ALTERNATIVES;
          }
        )+
        None
      }

      fn submit_with_wait_all(&mut self, ctx: &WaitContext, ws: &mut Self::WaitStates) -> Submit {
        let mut base = 0;
        $(
          match self.$field.submit_with_wait(ctx, base, &mut ws.$field) {
            Submit::Ready(sub) => return Submit::Ready(base + sub),
            Submit::Resolved => return Submit::Resolved,
            Submit::Waiting => {}
          }
          #[allow(unused_assignments)]
          {
            base += $op::NUM_ALTERNATIVES;
          }
        )+
        Submit::Waiting
      }

      fn clear_wait_all(&mut self, winner: Option<usize>, ws: &mut Self::WaitStates) {
        let mut base = 0;
        $(
          {
            let local = winner.and_then(|token| {
              (token >= base && token < base + $op::NUM_ALTERNATIVES).then(|| token - base)
            });
            self.$field.clear_wait(local, &mut ws.$field);
          }
          #[allow(unused_assignments)]
          {
            base += $op::NUM_ALTERNATIVES;
          }
        )+
      }

      fn collect_result(&mut self, winner: usize) -> Self::Alts {
        let mut base = 0;
        (
          $(
            {
              let alt = if winner >= base && winner < base + $op::NUM_ALTERNATIVES {
                Some(self.$field.get_result(winner - base))
              } else {
                None
              };
              #[allow(unused_assignments)]
              {
                base += $op::NUM_ALTERNATIVES;
              }
              alt
            },
          )+
        )
      }
    }

    impl<$($op: SelectOp,)+> ReadySelect for ($($op,)+) {
      const WAITFREE_TAIL: () = assert!(
        $last::ALWAYS_WAITFREE,
        "select_ready requires its final alternative to be waitfree"
      );
    }
  )+};
}

impl_select_list! {
  (0 O0) last O0;
  (0 O0, 1 O1) last O1;
  (0 O0, 1 O1, 2 O2) last O2;
  (0 O0, 1 O1, 2 O2, 3 O3) last O3;
  (0 O0, 1 O1, 2 O2, 3 O3, 4 O4) last O4;
  (0 O0, 1 O1, 2 O2, 3 O3, 4 O4, 5 O5) last O5;
}

/// Races `ops`, suspending until exactly one alternative completes.
///
/// All losing alternatives are cancelled before the result is returned, and
/// likewise if the returned future is dropped before completion.
pub fn select<L: SelectList>(ops: L) -> Select<L> {
  Select {
    ops,
    ctx: WaitContext::new(),
    wait: L::WaitStates::default(),
    phase: Phase::Submit,
    _pin: PhantomPinned,
  }
}

/// Completes one of `ops` right now, without ever suspending.
///
/// Operations are attempted in declaration order and the first ready one
/// wins. The final operation must be waitfree ([`nothing`](crate::ops::nothing),
/// or a write whose last target is unbounded), which guarantees completion;
/// this is enforced at compile time.
pub fn select_ready<L: ReadySelect>(mut ops: L) -> SelectResult<L::Alts> {
  let () = L::WAITFREE_TAIL;
  telemetry::increment_counter(LOC_SELECT, "select_ready");
  let token = ops
    .submit_if_ready_all()
    .expect("the final waitfree alternative cannot fail to complete");
  let alts = ops.collect_result(token);
  SelectResult::new(alts, token)
}

enum Phase {
  /// Not yet submitted; first poll pending.
  Submit,
  /// Submitted; the wait context's promise resolves with the winner.
  Waiting,
  /// Result produced; polling again is a bug.
  Done,
}

/// Future returned by [`select`].
#[must_use = "futures do nothing unless you .await or poll them"]
pub struct Select<L: SelectList> {
  ops: L,
  ctx: WaitContext,
  wait: L::WaitStates,
  phase: Phase,
  _pin: PhantomPinned,
}

impl<L: SelectList> Future for Select<L> {
  type Output = SelectResult<L::Alts>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    // Safety: we never move out of `this`. Waiter nodes installed in `wait`
    // point into this frame; Pin guarantees the frame stays put until drop,
    // and drop detaches them first.
    let this = unsafe { self.get_unchecked_mut() };

    if let Phase::Submit = this.phase {
      this.phase = Phase::Waiting;
      match this.ops.submit_with_wait_all(&this.ctx, &mut this.wait) {
        Submit::Ready(token) => {
          telemetry::increment_counter(LOC_SELECT, "ready_at_submit");
          this.ctx.fulfil(token);
        }
        Submit::Resolved => telemetry::increment_counter(LOC_SELECT, "resolved_by_peer"),
        Submit::Waiting => telemetry::increment_counter(LOC_SELECT, "parked"),
      }
    }

    match this.phase {
      Phase::Waiting => match this.ctx.poll_token(cx.waker()) {
        Some(token) => {
          this.ops.clear_wait_all(Some(token), &mut this.wait);
          let alts = this.ops.collect_result(token);
          this.phase = Phase::Done;
          Poll::Ready(SelectResult::new(alts, token))
        }
        None => Poll::Pending,
      },
      Phase::Done => panic!("Select polled after completion"),
      Phase::Submit => unreachable!(),
    }
  }
}

impl<L: SelectList> Drop for Select<L> {
  fn drop(&mut self) {
    if let Phase::Waiting = self.phase {
      // Cancellation: detach every waiter this invocation installed before
      // the frame (contexts, slots, nodes) goes away. Taking each channel's
      // mutex here also fences against a peer mid-notification.
      self.ops.clear_wait_all(None, &mut self.wait);
    }
  }
}

impl<L: SelectList> fmt::Debug for Select<L> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Select")
      .field("alternatives", &L::NUM_ALTERNATIVES)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::channel::{Channel, ChannelHandle};
  use crate::ops::{nothing, read, write, NoResult, ReadResult};
  use futures_util::task::noop_waker;
  use std::task::Context;

  fn poll_once<F: Future>(future: Pin<&mut F>) -> Poll<F::Output> {
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    future.poll(&mut cx)
  }

  #[test]
  fn nothing_alone_completes_immediately() {
    let result = select_ready((nothing(),));
    assert!(!result.has_value());
    assert!(result.is::<NoResult>());
    assert_eq!(result.alternative(), 0);
  }

  #[test]
  fn ready_selection_prefers_declaration_order() {
    let a = Channel::<i32, 1>::new();
    let b = Channel::<i32, 1>::new();
    assert!(a.try_write(1));
    assert!(b.try_write(2));

    let result = select_ready((read(&a), read(&b), nothing()));
    assert!(result.received_from(&a));
    assert_eq!(result.alternative(), 0);

    let result = select_ready((read(&b), read(&a), nothing()));
    assert!(result.received_from(&b));
    assert_eq!(result.alternative(), 0);
  }

  #[test]
  fn waiting_select_installs_and_clears_waiters() {
    let a = Channel::<i32>::new();
    let b = Channel::<i32>::new();

    {
      let mut fut = Box::pin(select((read(&a), read(&b))));
      assert!(poll_once(fut.as_mut()).is_pending());
      // One waiter node per sub-channel, linked exactly once.
      assert_eq!(a.state().reader_count(), 1);
      assert_eq!(b.state().reader_count(), 1);
    }
    // Dropping the pending select detaches everything it installed.
    assert_eq!(a.state().reader_count(), 0);
    assert_eq!(b.state().reader_count(), 0);
  }

  #[test]
  fn immediate_winner_cancels_the_losers() {
    let a = Channel::<i32>::new();
    let b = Channel::<i32, 1>::new();
    assert!(b.try_write(9));

    // Op 0 has to park on `a` before op 1 finds `b` ready.
    let mut fut = Box::pin(select((read(&a), read(&b))));
    match poll_once(fut.as_mut()) {
      Poll::Ready(result) => {
        assert!(result.received_from(&b));
        assert_eq!(result.alternative(), 1);
        assert_eq!(result.get_received::<i32>(), Ok(9));
      }
      Poll::Pending => panic!("select had a ready alternative"),
    }
    assert_eq!(a.state().reader_count(), 0);
  }

  #[test]
  fn select_on_one_channel_does_not_pair_with_itself() {
    let ch = Channel::<i32>::new();

    let mut fut = Box::pin(select((read(&ch), write(5, &ch))));
    assert!(poll_once(fut.as_mut()).is_pending());
    // Both sub-alternatives are parked; neither satisfied the other.
    assert_eq!(ch.state().reader_count(), 1);
    assert_eq!(ch.state().writer_count(), 1);

    // An outside reader pairs with the parked write and resolves the select.
    assert_eq!(ch.try_read(), Some(5));
    match poll_once(fut.as_mut()) {
      Poll::Ready(result) => {
        assert!(result.sent::<i32>());
        assert!(result.sent_to(&ch));
        assert_eq!(result.alternative(), 1);
      }
      Poll::Pending => panic!("outside reader resolved the select"),
    }
    assert_eq!(ch.state().reader_count(), 0);
    assert_eq!(ch.state().writer_count(), 0);
  }

  #[test]
  fn token_space_spans_multi_channel_ops() {
    let a = Channel::<i32>::new();
    let b = Channel::<i32, 1>::new();
    let c = Channel::<i32, 1>::new();
    assert!(c.try_write(3));

    // Alternatives: read(a) is 0, read(b) is 1, read(c) is 2.
    let result = select_ready((read((&a, &b, &c)), nothing()));
    assert_eq!(result.alternative(), 2);
    assert!(result.matches(&c));
    assert_eq!(result.get_received::<i32>(), Ok(3));
  }

  #[test]
  fn mixed_read_write_selection() {
    let a = Channel::<i32>::new();
    let b = Channel::<String, 1>::new();

    let result = select_ready((read(&a), write("out".to_string(), &b), nothing()));
    assert!(result.sent::<String>());
    assert!(result.sent_to(&b));
    assert_eq!(result.alternative(), 1);
    assert_eq!(b.try_read().as_deref(), Some("out"));
  }

  #[test]
  fn select_with_nothing_resolves_without_suspending() {
    let a = Channel::<i32>::new();
    let mut fut = Box::pin(select((read(&a), nothing())));
    match poll_once(fut.as_mut()) {
      Poll::Ready(result) => {
        assert!(!result.has_value());
        assert_eq!(result.alternative(), 1);
      }
      Poll::Pending => panic!("nothing keeps a select from suspending"),
    }
    assert_eq!(a.state().reader_count(), 0);
  }

  #[test]
  fn completed_select_leaves_the_value_retrievable_once() {
    let a = Channel::<i32, 1>::new();
    assert!(a.try_write(5));

    let mut fut = Box::pin(select((read(&a),)));
    let result = match poll_once(fut.as_mut()) {
      Poll::Ready(result) => result,
      Poll::Pending => panic!("buffered read is immediately ready"),
    };
    let alt = result.get::<ReadResult<i32>>().expect("read won");
    assert_eq!(alt.into_inner(), 5);
  }
}
