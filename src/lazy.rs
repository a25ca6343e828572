//! The asynchronous lazy cell.
//!
//! [`Lazy<T, E>`] wraps a factory operation and defers running it until the
//! first retrieval. The outcome is cached: a produced value is returned to
//! every later caller, and a failure is either replayed or retried depending
//! on the cell's capture policy. The safety mode picks how concurrent first
//! retrievals are arbitrated; see [`SafetyMode`] for the three policies.
//!
//! The resolved fast path is a single atomic load with no suspension. The
//! slow paths differ per mode: the unserialized modes run the factory
//! immediately and arbitrate at publication time, while the serialized mode
//! admits one execution at a time through the [`gate`](crate::gate) and
//! parks everyone else.

use core::fmt;
use core::future::Future;
use std::sync::Arc;

use crate::chain;
use crate::error::Error;
use crate::gate::Gate;
use crate::mode::{CapturePolicy, FactoryOrigin, SafetyMode};
use crate::slot::{Factory, Slot, State};

/// An asynchronous lazy-initialization cell.
///
/// The cell defers producing a `T` until first requested, caches the outcome,
/// and arbitrates concurrent first retrievals according to its [`SafetyMode`].
/// A failed factory run is cached and replayed, or forgotten and retried,
/// according to its [`CapturePolicy`].
///
/// Cells are cheap to construct; the factory does not run until [`get`] is
/// first awaited. Once a value is published the cell never goes back to
/// unresolved.
///
/// [`get`]: Lazy::get
pub struct Lazy<T, E> {
   slot: Slot<T, E>,
   gate: Gate,
   mode: SafetyMode,
   capture: bool,
   id: u64,
}

impl<T, E> Lazy<T, E>
where
   T: Clone + Send + Sync + 'static,
   E: Send + Sync + 'static,
{
   /// Creates a cell around `factory` with the capture policy derived from
   /// `mode` (see [`CapturePolicy::resolve`]).
   #[must_use]
   pub fn new<F, Fut>(mode: SafetyMode, factory: F) -> Self
   where
      F: Fn() -> Fut + Send + Sync + 'static,
      Fut: Future<Output = Result<T, E>> + Send + 'static,
   {
      Self::with_policy(mode, CapturePolicy::Derived, factory)
   }

   /// Creates a cell around `factory` with an explicit capture policy.
   ///
   /// [`CapturePolicy::Always`] and [`CapturePolicy::Never`] override the
   /// derived behavior unconditionally.
   #[must_use]
   pub fn with_policy<F, Fut>(mode: SafetyMode, policy: CapturePolicy, factory: F) -> Self
   where
      F: Fn() -> Fut + Send + Sync + 'static,
      Fut: Future<Output = Result<T, E>> + Send + 'static,
   {
      let factory: Factory<T, E> = Box::new(move || Box::pin(factory()));
      Self::assemble(mode, policy, FactoryOrigin::Supplied, factory)
   }

   /// Creates a cell whose factory is `T::default()`.
   ///
   /// The synthesized factory carries [`FactoryOrigin::Default`], which the
   /// derived capture policy treats differently from a supplied factory.
   #[must_use]
   pub fn with_default(mode: SafetyMode) -> Self
   where
      T: Default,
   {
      Self::with_default_policy(mode, CapturePolicy::Derived)
   }

   /// Creates a default-construction cell with an explicit capture policy.
   #[must_use]
   pub fn with_default_policy(mode: SafetyMode, policy: CapturePolicy) -> Self
   where
      T: Default,
   {
      let factory: Factory<T, E> = Box::new(|| Box::pin(core::future::ready(Ok(T::default()))));
      Self::assemble(mode, policy, FactoryOrigin::Default, factory)
   }

   /// Creates a cell that is already resolved to `value`. No factory is ever
   /// run.
   #[must_use]
   pub fn resolved(value: T) -> Self {
      Self {
         slot: Slot::with_value(value),
         gate: Gate::sealed(),
         mode: SafetyMode::Serialized,
         capture: true,
         id: chain::issue_cell_id(),
      }
   }

   fn assemble(
      mode: SafetyMode,
      policy: CapturePolicy,
      origin: FactoryOrigin,
      factory: Factory<T, E>,
   ) -> Self {
      Self {
         slot: Slot::new(factory),
         gate: Gate::new(),
         mode,
         capture: policy.resolve(mode, origin),
         id: chain::issue_cell_id(),
      }
   }

   /// The safety mode the cell was constructed with.
   #[inline]
   pub const fn mode(&self) -> SafetyMode {
      self.mode
   }

   /// Whether a failed factory run is cached and replayed.
   #[inline]
   pub const fn captures_failures(&self) -> bool {
      self.capture
   }

   /// True only once a value (not a captured failure) is durably published.
   ///
   /// This method never suspends.
   #[inline]
   pub fn is_resolved(&self) -> bool {
      self.slot.is_value()
   }

   /// Snapshot of the cached value, if one is published.
   ///
   /// Returns `None` while the cell is unresolved or holds a captured
   /// failure. This method never suspends.
   #[inline]
   pub fn peek(&self) -> Option<T> {
      match self.slot.outcome() {
         Some(Ok(value)) => Some(value),
         _ => None,
      }
   }

   /// Retrieves the value, running the factory under the cell's safety mode
   /// if the cell is unresolved.
   ///
   /// - Already resolved to a value: returns it. One atomic load, no
   ///   suspension.
   /// - Resolved to a captured failure: re-raises the same failure without
   ///   running the factory.
   /// - Unresolved: runs the factory and publishes the outcome per the mode;
   ///   see [`SafetyMode`] for how concurrent callers are arbitrated and
   ///   [`CapturePolicy`] for what happens to failures.
   pub async fn get(&self) -> Result<T, Error<E>> {
      if let Some(outcome) = self.slot.outcome() {
         return outcome;
      }
      match self.mode {
         SafetyMode::Unsynchronized => self.resolve_unsynchronized().await,
         SafetyMode::RaceToPublish => self.resolve_racing().await,
         SafetyMode::Serialized => self.resolve_serialized().await,
      }
   }

   /// Synchronously drives [`get`](Lazy::get) to completion, blocking the
   /// calling thread.
   ///
   /// Intended for the rare spots that cannot suspend, such as forcing
   /// resolution before serializing an enclosing object graph. Inside a
   /// runtime this parks the current worker via
   /// [`block_in_place`](tokio::task::block_in_place) (multi-thread runtime
   /// required); outside a runtime it drives a throwaway single-thread
   /// runtime without I/O or time drivers.
   ///
   /// This can deadlock if the resolution itself needs the calling context to
   /// make progress; callers accept that risk.
   #[cfg(feature = "rt-multi-thread")]
   pub fn resolve_blocking(&self) -> Result<T, Error<E>> {
      match tokio::runtime::Handle::try_current() {
         Ok(handle) => tokio::task::block_in_place(|| handle.block_on(self.get())),
         Err(_) => tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("building a throwaway runtime to drive resolution")
            .block_on(self.get()),
      }
   }

   // --- Mode-specific resolution paths ---

   /// Cold path for `Unsynchronized`. No mutual exclusion: every concurrent
   /// caller runs the factory and the last successful publication wins.
   #[cold]
   async fn resolve_unsynchronized(&self) -> Result<T, Error<E>> {
      let outcome = if chain::is_marked(self.id) {
         Err(Error::Reentrant)
      } else {
         let seen = self.slot.snapshot();
         let run = match &*seen {
            State::Empty(factory) => factory(),
            State::Value(value) => return Ok(value.clone()),
            State::Failed(error) => return Err(error.clone()),
         };
         drop(seen);
         chain::with_mark(self.id, run)
            .await
            .map_err(|e| Error::Factory(Arc::new(e)))
      };

      match &outcome {
         Ok(value) => self.slot.overwrite(State::Value(value.clone())),
         Err(error) if self.capture => self.slot.overwrite(State::Failed(error.clone())),
         Err(_) => {}
      }
      outcome
   }

   /// Cold path for `RaceToPublish`. Every concurrent caller runs the
   /// factory; publication is a compare-and-swap and losers take the
   /// winner's outcome. Reentrancy is deliberately not blocked, so no chain
   /// marker is set.
   #[cold]
   async fn resolve_racing(&self) -> Result<T, Error<E>> {
      let seen = self.slot.snapshot();
      let run = match &*seen {
         State::Empty(factory) => factory(),
         State::Value(value) => return Ok(value.clone()),
         State::Failed(error) => return Err(error.clone()),
      };
      let outcome = run.await.map_err(|e| Error::Factory(Arc::new(e)));

      let publish = match &outcome {
         Ok(value) => Some(State::Value(value.clone())),
         Err(error) if self.capture => Some(State::Failed(error.clone())),
         Err(_) => None,
      };
      match publish {
         Some(next) => match self.slot.publish_first(&seen, next) {
            Ok(()) => outcome,
            // Lost the race: this completion is discarded in favor of
            // whatever the winner published.
            Err(winner) => winner.outcome().unwrap_or(outcome),
         },
         // An uncaptured failure: propagate it, unless a winner already
         // published an outcome for everyone.
         None => self.slot.outcome().unwrap_or(outcome),
      }
   }

   /// Cold path for `Serialized`. The gate admits one factory execution at a
   /// time; waiters suspend and then observe the published outcome, or take
   /// their own turn if the holder failed without capturing.
   #[cold]
   async fn resolve_serialized(&self) -> Result<T, Error<E>> {
      if chain::is_marked(self.id) {
         // Our own chain holds the gate; acquiring it again would deadlock.
         let error = Error::Reentrant;
         if self.capture {
            self.slot.overwrite(State::Failed(error.clone()));
         }
         return Err(error);
      }

      let Some(pass) = self.gate.enter_async().await else {
         // Sealed while we waited: the winner's outcome is in the slot.
         return match self.slot.outcome() {
            Some(outcome) => outcome,
            // Sealing is ordered after publication.
            None => unreachable!("sealed gate without a published outcome"),
         };
      };

      let seen = self.slot.snapshot();
      let run = match &*seen {
         State::Empty(factory) => factory(),
         // Published but not sealed: a reentrant capture on a previous
         // holder's chain, or an unwind between publish and seal. Adopt the
         // outcome and seal on its behalf.
         State::Value(value) => {
            let value = value.clone();
            pass.seal();
            return Ok(value);
         }
         State::Failed(error) => {
            let error = error.clone();
            pass.seal();
            return Err(error);
         }
      };
      drop(seen);

      let outcome = chain::with_mark(self.id, run)
         .await
         .map_err(|e| Error::Factory(Arc::new(e)));

      match &outcome {
         Ok(value) => {
            self.slot.overwrite(State::Value(value.clone()));
            pass.seal();
         }
         Err(error) if self.capture => {
            self.slot.overwrite(State::Failed(error.clone()));
            pass.seal();
         }
         // Uncaptured failure: dropping the pass reopens the gate and the
         // next waiter retries from scratch.
         Err(_) => drop(pass),
      }
      outcome
   }
}

// --- Trait Implementations ---

impl<T, E> Default for Lazy<T, E>
where
   T: Clone + Default + Send + Sync + 'static,
   E: Send + Sync + 'static,
{
   /// A default-construction cell in the most conservative mode.
   #[inline]
   fn default() -> Self {
      Self::with_default(SafetyMode::default())
   }
}

impl<T, E> From<T> for Lazy<T, E>
where
   T: Clone + Send + Sync + 'static,
   E: Send + Sync + 'static,
{
   /// A cell already resolved to `value`.
   #[inline]
   fn from(value: T) -> Self {
      Self::resolved(value)
   }
}

impl<T: fmt::Display, E> fmt::Display for Lazy<T, E> {
   /// The cached value's display form, or `<unresolved>` while the cell is
   /// empty or holds a captured failure.
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match &*self.slot.snapshot() {
         State::Value(value) => fmt::Display::fmt(value, f),
         _ => f.write_str("<unresolved>"),
      }
   }
}

impl<T: fmt::Debug, E> fmt::Debug for Lazy<T, E> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let mut d = f.debug_struct("Lazy");
      d.field("mode", &self.mode);
      match &*self.slot.snapshot() {
         State::Empty(_) => d.field("state", &format_args!("<unresolved>")),
         State::Value(value) => d.field("state", value),
         State::Failed(_) => d.field("state", &format_args!("<failed>")),
      };
      d.finish()
   }
}
