// src/result.rs

//! The tagged result of a select: which alternative won, and what it
//! produced.
//!
//! A [`SelectResult`] stores one `Option<R>` per declared operation, exactly
//! one of which is `Some`, plus the winning alternative's global index.
//! Accessors are type-directed: `get::<ReadResult<i32>>()` succeeds iff the
//! winning alternative has that type, mirroring the channel-op identity
//! queries `received_from`/`sent_to`.
//!
//! The per-type queries are resolved at runtime through `core::any`; asking
//! for an alternative the winner doesn't have yields
//! [`BadSelectResultAccess`] (or `None` from the `get_if*` family), never a
//! panic.

use core::any::Any;
use core::fmt;

use crate::channel::{ChannelHandle, StateId};
use crate::error::BadSelectResultAccess;
use crate::ops::{NoResult, ReadResult, WriteResult};

/// A per-operation result able to answer the channel-identity query.
///
/// Implemented by [`ReadResult`], [`WriteResult`] and [`NoResult`]; not meant
/// for implementation outside the crate.
pub trait AltResult: Any + Send {
  #[doc(hidden)]
  fn matches_state(&self, id: StateId) -> bool;
  #[doc(hidden)]
  fn as_any(&self) -> &dyn Any;
}

impl<T: Send + 'static> AltResult for ReadResult<T> {
  fn matches_state(&self, id: StateId) -> bool {
    self.channel_id() == id
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}

impl<T: Send + 'static> AltResult for WriteResult<T> {
  fn matches_state(&self, id: StateId) -> bool {
    self.channel_id() == id
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}

impl AltResult for NoResult {
  fn matches_state(&self, _id: StateId) -> bool {
    false
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}

/// Storage for the per-operation alternatives of one select invocation.
///
/// Implemented for tuples `(Option<R0>, ..., Option<Rn>)` with exactly one
/// `Some`. Not meant for implementation outside the crate.
pub trait AltSet {
  #[doc(hidden)]
  fn active(&self) -> &dyn AltResult;
  #[doc(hidden)]
  fn take_alt<R: AltResult>(self) -> Option<R>;
}

fn take_from<S: 'static, R: 'static>(slot: &mut Option<S>) -> Option<R> {
  (slot as &mut dyn Any)
    .downcast_mut::<Option<R>>()
    .and_then(Option::take)
}

macro_rules! impl_alt_set {
  ($(($($field:tt $alt:ident),+);)+) => {$(
    impl<$($alt: AltResult,)+> AltSet for ($(Option<$alt>,)+) {
      fn active(&self) -> &dyn AltResult {
        $(
          if let Some(alt) = &self.$field {
            return alt;
          }
        )+
        unreachable!("select result holds no completed alternative")
      }

      fn take_alt<R: AltResult>(mut self) -> Option<R> {
        $(
          if self.$field.is_some() {
            return take_from(&mut self.$field);
          }
        )+
        None
      }
    }
  )+};
}

impl_alt_set! {
  (0 R0);
  (0 R0, 1 R1);
  (0 R0, 1 R1, 2 R2);
  (0 R0, 1 R1, 2 R2, 3 R3);
  (0 R0, 1 R1, 2 R2, 3 R3, 4 R4);
  (0 R0, 1 R1, 2 R2, 3 R3, 4 R4, 5 R5);
}

/// The outcome of a select: exactly one completed alternative.
pub struct SelectResult<A: AltSet> {
  alts: A,
  alternative: usize,
}

impl<A: AltSet> SelectResult<A> {
  pub(crate) fn new(alts: A, alternative: usize) -> Self {
    SelectResult { alts, alternative }
  }

  /// The global index of the winning alternative, counting every
  /// sub-alternative of every operation in declaration order.
  pub fn alternative(&self) -> usize {
    self.alternative
  }

  /// True iff the winning alternative's result has type `R`.
  pub fn is<R: AltResult>(&self) -> bool {
    self.alts.active().as_any().is::<R>()
  }

  /// True iff the selection completed a read of payload type `T`.
  pub fn received<T: Send + 'static>(&self) -> bool {
    self.is::<ReadResult<T>>()
  }

  /// True iff the selection completed a write of payload type `T`.
  pub fn sent<T: Send + 'static>(&self) -> bool {
    self.is::<WriteResult<T>>()
  }

  /// True unless the [`nothing`](crate::ops::nothing) alternative won.
  pub fn has_value(&self) -> bool {
    !self.is::<NoResult>()
  }

  /// True iff the winning alternative operated on `channel`.
  pub fn matches<C: ChannelHandle>(&self, channel: &C) -> bool {
    self.alts.active().matches_state(channel.state_id())
  }

  /// True iff the selection received its value from `channel`.
  pub fn received_from<C: ChannelHandle>(&self, channel: &C) -> bool {
    self
      .get_if::<ReadResult<C::Item>>()
      .is_some_and(|r| r.matches(channel))
  }

  /// True iff the selection sent its value to `channel`.
  pub fn sent_to<C: ChannelHandle>(&self, channel: &C) -> bool {
    self
      .get_if::<WriteResult<C::Item>>()
      .is_some_and(|r| r.matches(channel))
  }

  /// Consumes the result, extracting the winning alternative as type `R`.
  pub fn get<R: AltResult>(self) -> Result<R, BadSelectResultAccess> {
    self.alts.take_alt().ok_or(BadSelectResultAccess)
  }

  /// Consumes the result, extracting the received value of type `T`.
  pub fn get_received<T: Send + 'static>(self) -> Result<T, BadSelectResultAccess> {
    self.get::<ReadResult<T>>().map(ReadResult::into_inner)
  }

  /// Borrows the winning alternative as type `R`, if it has that type.
  pub fn get_if<R: AltResult>(&self) -> Option<&R> {
    self.alts.active().as_any().downcast_ref::<R>()
  }

  /// Borrows the received value of type `T`, if the winner was a read.
  pub fn get_if_received<T: Send + 'static>(&self) -> Option<&T> {
    self.get_if::<ReadResult<T>>().map(ReadResult::get)
  }

  /// Borrows the received value, if it came from `channel` specifically.
  pub fn get_if_received_from<C: ChannelHandle>(&self, channel: &C) -> Option<&C::Item> {
    self
      .get_if::<ReadResult<C::Item>>()
      .filter(|r| r.matches(channel))
      .map(ReadResult::get)
  }
}

impl<A: AltSet> fmt::Debug for SelectResult<A> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SelectResult")
      .field("alternative", &self.alternative)
      .finish_non_exhaustive()
  }
}
