//! The publication slot.
//!
//! Cell state is an explicit tagged union held behind an [`ArcSwap`]: one
//! atomic load determines whether the cell is empty, holds a value, or holds
//! a captured failure. The `Empty` case owns the factory, so swapping in a
//! terminal state drops the factory reference at the exact moment an outcome
//! is durably published — never before, which is what keeps retries possible
//! while the cell is unresolved.
//!
//! Publication is always an atomic release store of the whole state, so any
//! reader that observes a non-empty state also observes its fully-formed
//! payload. Two publication primitives cover the two unserialized modes:
//!
//! - [`Slot::overwrite`] is a plain swap; concurrent publishers race and the
//!   last write wins, earlier published outcomes are dropped once their
//!   readers are done with them.
//! - [`Slot::publish_first`] is a compare-and-swap against the state the
//!   publisher started from; only the first publisher wins and every later
//!   one is handed the winner's outcome instead.

use core::future::Future;
use core::pin::Pin;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::error::Error;

/// A single factory invocation, boxed so the cell can own factories of any
/// shape.
pub(crate) type FactoryFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send>>;

/// The factory operation. Callable any number of times: once per concurrent
/// run in the unserialized modes, once per retry after an uncaptured failure.
pub(crate) type Factory<T, E> = Box<dyn Fn() -> FactoryFuture<T, E> + Send + Sync>;

/// The cell's state. Exactly one case at any instant.
pub(crate) enum State<T, E> {
   /// No outcome yet; the factory is retained for (re)tries.
   Empty(Factory<T, E>),
   /// A produced value.
   Value(T),
   /// A captured failure, replayed on every later retrieval.
   Failed(Error<E>),
}

/// Atomic holder of the current [`State`].
pub(crate) struct Slot<T, E> {
   state: ArcSwap<State<T, E>>,
}

impl<T, E> Slot<T, E> {
   #[inline]
   pub(crate) fn new(factory: Factory<T, E>) -> Self {
      Self {
         state: ArcSwap::from_pointee(State::Empty(factory)),
      }
   }

   #[inline]
   pub(crate) fn with_value(value: T) -> Self {
      Self {
         state: ArcSwap::from_pointee(State::Value(value)),
      }
   }

   /// Snapshots the current state, keeping it alive independently of any
   /// concurrent publication.
   #[inline]
   pub(crate) fn snapshot(&self) -> Arc<State<T, E>> {
      self.state.load_full()
   }

   /// True only once a value (not a captured failure) is published.
   #[inline]
   pub(crate) fn is_value(&self) -> bool {
      matches!(&**self.state.load(), State::Value(_))
   }

   /// Publishes `next` unconditionally. Last write wins; the replaced state
   /// (and with it, the factory or an earlier outcome) is dropped once its
   /// readers are done.
   #[inline]
   pub(crate) fn overwrite(&self, next: State<T, E>) {
      self.state.store(Arc::new(next));
   }

   /// Publishes `next` only if the state is still `seen`. On a lost race the
   /// winner's state is returned instead.
   #[inline]
   pub(crate) fn publish_first(
      &self,
      seen: &Arc<State<T, E>>,
      next: State<T, E>,
   ) -> Result<(), Arc<State<T, E>>> {
      let prev = self.state.compare_and_swap(seen, Arc::new(next));
      if Arc::ptr_eq(&*prev, seen) {
         Ok(())
      } else {
         Err(Arc::clone(&*prev))
      }
   }
}

impl<T: Clone, E> Slot<T, E> {
   /// The published outcome, if any. One atomic load; never suspends.
   #[inline]
   pub(crate) fn outcome(&self) -> Option<Result<T, Error<E>>> {
      match &**self.state.load() {
         State::Empty(_) => None,
         State::Value(value) => Some(Ok(value.clone())),
         State::Failed(error) => Some(Err(error.clone())),
      }
   }
}

impl<T, E> State<T, E> {
   /// The outcome this state represents, if terminal.
   pub(crate) fn outcome(&self) -> Option<Result<T, Error<E>>>
   where
      T: Clone,
   {
      match self {
         Self::Empty(_) => None,
         Self::Value(value) => Some(Ok(value.clone())),
         Self::Failed(error) => Some(Err(error.clone())),
      }
   }
}
