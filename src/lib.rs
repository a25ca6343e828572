//! An asynchronous lazy-initialization cell with selectable safety modes.
//!
//! This crate provides [`Lazy<T, E>`]: a container that defers producing a
//! value until first requested, caches the outcome, and lets the constructor
//! pick how much concurrency safety the first retrieval gets:
//!
//! - [`SafetyMode::Unsynchronized`]: no mutual exclusion; concurrent callers
//!   each run the factory and the last successful publication wins.
//! - [`SafetyMode::RaceToPublish`]: concurrent callers race, publication is a
//!   compare-and-swap, and everyone converges on the winner's outcome.
//! - [`SafetyMode::Serialized`]: an async-aware gate admits one factory
//!   execution at a time; waiters suspend and observe the winner's outcome.
//!
//! Orthogonally, a [`CapturePolicy`] decides whether a failed factory run is
//! cached and replayed to every later caller, or forgotten so the next
//! retrieval retries. Left unset, the policy is derived from the mode and
//! from whether the factory was supplied or synthesized from `T::default()`.
//!
//! Reentrant retrievals (a factory that, directly or through nested calls on
//! the same logical call chain, retrieves from its own cell) are detected in
//! the two blocking-prone modes and fail with [`Error::Reentrant`] instead of
//! deadlocking.
//!
//! # Features
//!
//! - **Non-suspending fast path**: reading a resolved cell is one atomic load.
//! - **Atomic publication**: outcomes are published by swapping a tagged
//!   state, so readers never observe a half-formed result.
//! - **Failure replay**: a captured failure is re-raised to every later
//!   caller as the identical failure object.
//! - **Efficient waiting**: the serialized gate yields to the scheduler and
//!   falls back to futex-based parking.
//!
//! # Examples
//!
//! ## Lazily loading shared state
//!
//! ```rust
//! use poly_lazy::{Lazy, SafetyMode};
//!
//! # #[tokio::main(flavor = "multi_thread", worker_threads = 2)]
//! # async fn main() {
//! let config: Lazy<String, std::io::Error> =
//!    Lazy::new(SafetyMode::Serialized, || async { Ok("production".to_string()) });
//!
//! assert!(!config.is_resolved());
//! assert_eq!(config.get().await.unwrap(), "production");
//!
//! // Later retrievals return the cached value without re-running the factory.
//! assert!(config.is_resolved());
//! assert_eq!(config.peek(), Some("production".to_string()));
//! # }
//! ```
//!
//! ## Caching a failure
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! use poly_lazy::{CapturePolicy, Error, Lazy, SafetyMode};
//!
//! # #[tokio::main(flavor = "multi_thread", worker_threads = 2)]
//! # async fn main() {
//! static RUNS: AtomicUsize = AtomicUsize::new(0);
//!
//! let cell: Lazy<u32, String> =
//!    Lazy::with_policy(SafetyMode::Serialized, CapturePolicy::Always, || async {
//!       RUNS.fetch_add(1, Ordering::SeqCst);
//!       Err("backend offline".to_string())
//!    });
//!
//! assert!(matches!(cell.get().await, Err(Error::Factory(_))));
//! assert!(matches!(cell.get().await, Err(Error::Factory(_))));
//! assert_eq!(RUNS.load(Ordering::SeqCst), 1); // Replayed, not retried.
//! # }
//! ```

/// Logical-call-chain reentrancy markers.
mod chain;

/// Failure outcomes of a retrieval.
mod error;

/// The serialized-mode admission gate.
mod gate;

/// The lazy cell itself.
mod lazy;

/// Safety modes and capture policies.
mod mode;

/// Atomic publication slot.
mod slot;

pub use error::Error;
pub use lazy::Lazy;
pub use mode::{CapturePolicy, FactoryOrigin, SafetyMode, UnknownMode};
