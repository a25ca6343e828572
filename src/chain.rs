//! Logical-call-chain reentrancy markers.
//!
//! While a cell's factory runs, the cell's id is pushed onto a task-local
//! chain. The tokio task-local propagates across every suspension point of
//! the scoped future, so the marker follows the *logical call chain* of the
//! factory — through nested `.await`s and nested cells — while remaining
//! invisible to unrelated tasks running the same factory concurrently.
//! Spawned tasks start a fresh chain; they are independent call chains by
//! definition.

use core::future::Future;
use core::sync::atomic::{AtomicU64, Ordering};

tokio::task_local! {
   /// Ids of the cells whose factories are running on this call chain.
   static ACTIVE_CHAIN: Vec<u64>;
}

/// Issues a process-unique cell id.
pub(crate) fn issue_cell_id() -> u64 {
   static NEXT: AtomicU64 = AtomicU64::new(1);
   NEXT.fetch_add(1, Ordering::Relaxed)
}

/// True if the current call chain is already resolving the cell `id`.
pub(crate) fn is_marked(id: u64) -> bool {
   ACTIVE_CHAIN
      .try_with(|chain| chain.contains(&id))
      .unwrap_or(false)
}

/// Runs `fut` with `id` marked on the current call chain.
///
/// The chain observed at entry (possibly empty, possibly already carrying the
/// ids of outer cells) is extended rather than replaced, so indirect
/// reentrancy through a stack of nested cells is still detected.
pub(crate) async fn with_mark<F: Future>(id: u64, fut: F) -> F::Output {
   let mut chain = ACTIVE_CHAIN.try_with(Vec::clone).unwrap_or_default();
   chain.push(id);
   ACTIVE_CHAIN.scope(chain, fut).await
}
