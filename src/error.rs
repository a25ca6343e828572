//! Failure outcomes of a retrieval.

use std::sync::Arc;

/// Why a retrieval failed.
///
/// Both variants are ordinary factory-failure outcomes: whether they are
/// cached and replayed or retried on the next retrieval is decided by the
/// cell's [`CapturePolicy`](crate::CapturePolicy), not by the variant.
///
/// The factory's error is held behind an [`Arc`] so that a captured failure
/// can be re-raised to every later caller as the *identical* failure object,
/// without requiring `E: Clone`.
#[derive(Debug, thiserror::Error)]
pub enum Error<E> {
   /// The factory ran and returned an error.
   #[error("factory failed: {0}")]
   Factory(Arc<E>),
   /// The factory, directly or through nested calls on the same logical call
   /// chain, retrieved from the cell it was resolving. Raised before the
   /// factory is invoked (and before any gate is acquired), so a
   /// self-recursive factory fails instead of deadlocking.
   #[error("reentrant retrieval from a lazy cell that is still resolving")]
   Reentrant,
}

impl<E> Error<E> {
   /// Returns the factory error, if this is a factory failure.
   pub fn factory_error(&self) -> Option<&E> {
      match self {
         Self::Factory(e) => Some(e),
         Self::Reentrant => None,
      }
   }

   /// True for a reentrancy violation.
   pub const fn is_reentrant(&self) -> bool {
      matches!(self, Self::Reentrant)
   }
}

// Manual impl: replaying a failure must not require `E: Clone`, only a new
// handle on the same `Arc`.
impl<E> Clone for Error<E> {
   fn clone(&self) -> Self {
      match self {
         Self::Factory(e) => Self::Factory(Arc::clone(e)),
         Self::Reentrant => Self::Reentrant,
      }
   }
}

impl<E: PartialEq> PartialEq for Error<E> {
   fn eq(&self, other: &Self) -> bool {
      match (self, other) {
         (Self::Factory(a), Self::Factory(b)) => a == b,
         (Self::Reentrant, Self::Reentrant) => true,
         _ => false,
      }
   }
}

impl<E: Eq> Eq for Error<E> {}
