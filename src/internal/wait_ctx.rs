// src/internal/wait_ctx.rs

//! Per-select arbitration: a one-shot token promise plus an availability flag
//! behind one mutex.
//!
//! A select invocation owns exactly one [`WaitContext`]. Every waiter node it
//! installs points at it. Whichever party (the select's own submission pass,
//! or a concurrent peer) flips `avail` from `true` to `false` under the mutex
//! owns the right to fulfil the promise, exactly once, with the winning
//! alternative's token. Everyone else must walk away.
//!
//! State machine: OPEN (`avail == true`) --claim--> RESERVED --fulfil-->
//! FULFILLED. RESERVED never reopens.

use core::fmt;
use core::mem;
use std::task::Waker;

use parking_lot::Mutex;

pub struct WaitContext {
  inner: Mutex<WaitCtxInner>,
}

struct WaitCtxInner {
  avail: bool,
  promise: Promise,
}

enum Promise {
  /// No poll has registered a waker yet.
  Idle,
  /// The select task is parked; wake this when the token arrives.
  Waiting(Waker),
  /// Fulfilled with the winning token.
  Ready(usize),
}

impl WaitContext {
  pub(crate) fn new() -> Self {
    WaitContext {
      inner: Mutex::new(WaitCtxInner {
        avail: true,
        promise: Promise::Idle,
      }),
    }
  }

  /// Attempts OPEN -> RESERVED for this context alone.
  pub(crate) fn claim(&self) -> bool {
    let mut inner = self.inner.lock();
    if inner.avail {
      inner.avail = false;
      true
    } else {
      false
    }
  }

  /// Delivers the winning token. The context must already be RESERVED.
  ///
  /// Callers hold the channel mutex of the list the winning waiter was taken
  /// from (or are the select's own submission pass), which is what keeps the
  /// context alive for the duration of this call.
  pub(crate) fn fulfil(&self, token: usize) {
    let waker = {
      let mut inner = self.inner.lock();
      debug_assert!(!inner.avail, "fulfilling an unreserved wait context");
      match mem::replace(&mut inner.promise, Promise::Ready(token)) {
        Promise::Waiting(waker) => Some(waker),
        Promise::Idle => None,
        Promise::Ready(_) => panic!("wait context fulfilled twice"),
      }
    };
    if let Some(waker) = waker {
      waker.wake();
    }
  }

  /// Returns the token if the promise has resolved, otherwise (re)registers
  /// the task's waker.
  pub(crate) fn poll_token(&self, waker: &Waker) -> Option<usize> {
    let mut inner = self.inner.lock();
    match &mut inner.promise {
      Promise::Ready(token) => Some(*token),
      Promise::Waiting(stored) => {
        stored.clone_from(waker);
        None
      }
      Promise::Idle => {
        inner.promise = Promise::Waiting(waker.clone());
        None
      }
    }
  }
}

impl fmt::Debug for WaitContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let inner = self.inner.lock();
    f.debug_struct("WaitContext")
      .field("avail", &inner.avail)
      .field(
        "promise",
        match inner.promise {
          Promise::Idle => &"idle",
          Promise::Waiting(_) => &"waiting",
          Promise::Ready(_) => &"ready",
        },
      )
      .finish()
  }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PairClaim {
  /// Both contexts moved OPEN -> RESERVED.
  Claimed,
  /// The peer was already reserved; `own` is untouched.
  PeerUnavailable,
  /// `own` was already reserved elsewhere; the select is resolved.
  SelfUnavailable,
}

/// Reserves `own` and `peer` together, or neither.
///
/// Both mutexes are taken in address order so that concurrent pair claims over
/// the same contexts cannot deadlock.
pub(crate) fn claim_pair(own: &WaitContext, peer: &WaitContext) -> PairClaim {
  debug_assert!(
    !core::ptr::eq(own, peer),
    "a select cannot rendezvous with itself"
  );

  let own_first = (own as *const WaitContext) < (peer as *const WaitContext);
  let (mut first, mut second) = if own_first {
    (own.inner.lock(), peer.inner.lock())
  } else {
    (peer.inner.lock(), own.inner.lock())
  };
  let (own_guard, peer_guard) = if own_first {
    (&mut first, &mut second)
  } else {
    (&mut second, &mut first)
  };

  if !own_guard.avail {
    return PairClaim::SelfUnavailable;
  }
  if !peer_guard.avail {
    return PairClaim::PeerUnavailable;
  }
  own_guard.avail = false;
  peer_guard.avail = false;
  PairClaim::Claimed
}

#[cfg(test)]
mod tests {
  use super::*;
  use futures_util::task::noop_waker;

  #[test]
  fn claim_is_exclusive() {
    let ctx = WaitContext::new();
    assert!(ctx.claim());
    assert!(!ctx.claim());
  }

  #[test]
  fn fulfil_resolves_poll() {
    let ctx = WaitContext::new();
    let waker = noop_waker();
    assert_eq!(ctx.poll_token(&waker), None);

    assert!(ctx.claim());
    ctx.fulfil(3);
    assert_eq!(ctx.poll_token(&waker), Some(3));
    // The token stays readable across repeated polls.
    assert_eq!(ctx.poll_token(&waker), Some(3));
  }

  #[test]
  fn fulfil_before_first_poll_is_observed() {
    let ctx = WaitContext::new();
    assert!(ctx.claim());
    ctx.fulfil(9);
    assert_eq!(ctx.poll_token(&noop_waker()), Some(9));
  }

  #[test]
  fn pair_claim_is_all_or_nothing() {
    let a = WaitContext::new();
    let b = WaitContext::new();
    assert_eq!(claim_pair(&a, &b), PairClaim::Claimed);
    assert!(!a.claim());
    assert!(!b.claim());
  }

  #[test]
  fn pair_claim_reports_which_side_failed() {
    let own = WaitContext::new();
    let peer = WaitContext::new();
    assert!(peer.claim());
    assert_eq!(claim_pair(&own, &peer), PairClaim::PeerUnavailable);
    // A failed pair claim must leave `own` claimable.
    assert!(own.claim());

    let own = WaitContext::new();
    let peer = WaitContext::new();
    assert!(own.claim());
    assert_eq!(claim_pair(&own, &peer), PairClaim::SelfUnavailable);
    assert!(peer.claim());
  }
}
