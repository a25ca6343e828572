//! Safety modes and failure-capture policies.
//!
//! A [`Lazy`](crate::Lazy) cell is parameterized at construction by two
//! policies that never change afterwards:
//!
//! - [`SafetyMode`] decides how much mutual exclusion the cell applies while
//!   the factory runs: none at all, optimistic racing with an atomic publish,
//!   or full serialization behind an async-aware gate.
//! - [`CapturePolicy`] decides what happens to a failed factory run: cache the
//!   failure and replay it on every later retrieval, or forget it and retry
//!   the factory on the next retrieval.
//!
//! When the capture policy is left as [`CapturePolicy::Derived`], the
//! effective behavior is computed from the mode and from whether the factory
//! was synthesized from `T::default()` or supplied by the caller
//! ([`FactoryOrigin`]). The derivation table lives in
//! [`CapturePolicy::resolve`].

use core::fmt;
use core::str::FromStr;

/// Raised when a raw mode representation does not name one of the three
/// defined safety modes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized safety mode: {0}")]
pub struct UnknownMode(pub String);

/// Concurrency policy applied while the factory runs.
///
/// Each mode trades an isolation guarantee for nondeterminism or throughput;
/// the mode is fixed when the cell is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SafetyMode {
   /// No mutual exclusion at all. Concurrent retrievals each run the factory
   /// and the last successful completion to publish wins; earlier published
   /// values are lost. Reentrant access from the factory's own call chain is
   /// detected and fails.
   Unsynchronized,
   /// Concurrent retrievals each run the factory, but publication is a
   /// compare-and-swap: the first completion to publish wins and every later
   /// completion is discarded in favor of the winner's outcome. Reentrancy is
   /// not blocked.
   RaceToPublish,
   /// An async-aware gate admits one factory execution at a time. Waiters
   /// suspend until the holder publishes or fails, then observe the published
   /// outcome (or retry, if the failure was not captured). Reentrant access
   /// from the factory's own call chain is detected and fails instead of
   /// deadlocking on the gate.
   Serialized,
}

impl SafetyMode {
   const ALL: [Self; 3] = [Self::Unsynchronized, Self::RaceToPublish, Self::Serialized];

   /// Canonical lowercase name, as accepted by [`FromStr`].
   pub const fn name(self) -> &'static str {
      match self {
         Self::Unsynchronized => "unsynchronized",
         Self::RaceToPublish => "race-to-publish",
         Self::Serialized => "serialized",
      }
   }
}

impl Default for SafetyMode {
   /// The most conservative mode.
   #[inline]
   fn default() -> Self {
      Self::Serialized
   }
}

impl fmt::Display for SafetyMode {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.pad(self.name())
   }
}

impl TryFrom<u8> for SafetyMode {
   type Error = UnknownMode;

   /// Converts a raw discriminant (`0`, `1`, `2`) into a mode, failing fast
   /// on anything else.
   fn try_from(value: u8) -> Result<Self, UnknownMode> {
      Self::ALL
         .get(value as usize)
         .copied()
         .ok_or_else(|| UnknownMode(value.to_string()))
   }
}

impl FromStr for SafetyMode {
   type Err = UnknownMode;

   fn from_str(s: &str) -> Result<Self, UnknownMode> {
      Self::ALL
         .iter()
         .find(|mode| mode.name() == s)
         .copied()
         .ok_or_else(|| UnknownMode(s.to_string()))
   }
}

/// Where the cell's factory came from.
///
/// Set explicitly at construction; the derived capture policy differs between
/// the two origins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactoryOrigin {
   /// Synthesized from `T::default()` by one of the `with_default`
   /// constructors.
   Default,
   /// Supplied by the caller.
   Supplied,
}

/// Whether a failed factory run is cached and replayed, or retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CapturePolicy {
   /// Derive the behavior from the safety mode and the factory origin; see
   /// [`CapturePolicy::resolve`].
   #[default]
   Derived,
   /// Always cache a failure. Every later retrieval replays the same failure
   /// without running the factory again.
   Always,
   /// Never cache a failure. It propagates to the current caller only, and
   /// the next retrieval runs the factory from scratch.
   Never,
}

impl CapturePolicy {
   /// Resolves the policy to the effective capture flag for a cell.
   ///
   /// `Always` and `Never` win unconditionally. `Derived` computes:
   ///
   /// | Mode | Default factory | Supplied factory |
   /// |---|---|---|
   /// | `Unsynchronized` | off | on |
   /// | `RaceToPublish` | off | off |
   /// | `Serialized` | off | on |
   #[must_use]
   pub const fn resolve(self, mode: SafetyMode, origin: FactoryOrigin) -> bool {
      match self {
         Self::Always => true,
         Self::Never => false,
         Self::Derived => match mode {
            SafetyMode::RaceToPublish => false,
            SafetyMode::Unsynchronized | SafetyMode::Serialized => {
               matches!(origin, FactoryOrigin::Supplied)
            }
         },
      }
   }
}
