// src/error.rs

use core::fmt;

/// Error returned when a [`SelectResult`](crate::SelectResult) accessor is
/// asked for an alternative other than the one that actually completed.
///
/// Mirrors the "no value available" side of `get`-style accessors; the
/// non-erroring `get_if*` variants return `None` instead.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct BadSelectResultAccess;

impl std::error::Error for BadSelectResultAccess {}
impl fmt::Display for BadSelectResultAccess {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "bad select result access")
  }
}
