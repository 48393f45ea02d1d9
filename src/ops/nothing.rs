// src/ops/nothing.rs

//! The always-ready no-op alternative.
//!
//! Appending `nothing()` to a selection turns it into a try-select: the no-op
//! is unconditionally ready, so the selection can never suspend, and a result
//! of [`NoResult`] means no real alternative was ready.

use crate::internal::wait_ctx::WaitContext;
use crate::ops::{SelectOp, Submit};

/// Creates the always-ready no-op alternative.
pub fn nothing() -> Nothing {
  Nothing
}

/// The no-op alternative. See [`nothing`].
#[derive(Debug)]
#[must_use = "select ops do nothing until passed to select or select_ready"]
pub struct Nothing;

/// Marker result produced when the [`Nothing`] alternative wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoResult;

impl SelectOp for Nothing {
  type Result = NoResult;
  type WaitState = ();
  const NUM_ALTERNATIVES: usize = 1;
  const ALWAYS_WAITFREE: bool = true;

  fn submit_if_ready(&mut self) -> Option<usize> {
    Some(0)
  }

  fn submit_with_wait(
    &mut self,
    ctx: &WaitContext,
    _base_token: usize,
    _wait_state: &mut (),
  ) -> Submit {
    if ctx.claim() {
      Submit::Ready(0)
    } else {
      Submit::Resolved
    }
  }

  fn clear_wait(&mut self, _winner: Option<usize>, _wait_state: &mut ()) {}

  fn get_result(&mut self, winner: usize) -> NoResult {
    debug_assert_eq!(winner, 0);
    NoResult
  }
}
