use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use poly_lazy::{CapturePolicy, FactoryOrigin, Lazy, SafetyMode};
use tokio::time::{sleep, Duration};

/// A cell whose factory is slow on its first start (100ms, `true`) and fast
/// on its second (50ms, `false`). Started slow-then-fast, the three modes
/// disagree on what each caller observes.
fn slow_fast_cell(mode: SafetyMode) -> (Arc<Lazy<bool, String>>, Arc<AtomicUsize>) {
   let starts = Arc::new(AtomicUsize::new(0));
   let cell = {
      let starts = Arc::clone(&starts);
      Arc::new(Lazy::new(mode, move || {
         let starts = Arc::clone(&starts);
         async move {
            if starts.fetch_add(1, Ordering::SeqCst) == 0 {
               sleep(Duration::from_millis(100)).await;
               Ok(true)
            } else {
               sleep(Duration::from_millis(50)).await;
               Ok(false)
            }
         }
      }))
   };
   (cell, starts)
}

/// Starts the slow retrieval, waits for its factory to be in flight, starts
/// the fast retrieval, and returns both results, the number of factory
/// starts and the cell.
async fn run_slow_fast(mode: SafetyMode) -> (bool, bool, usize, Arc<Lazy<bool, String>>) {
   let (cell, starts) = slow_fast_cell(mode);

   let slow = {
      let cell = Arc::clone(&cell);
      tokio::spawn(async move { cell.get().await.unwrap() })
   };
   while starts.load(Ordering::SeqCst) == 0 {
      sleep(Duration::from_millis(1)).await;
   }

   let fast = {
      let cell = Arc::clone(&cell);
      tokio::spawn(async move { cell.get().await.unwrap() })
   };

   let slow_result = slow.await.unwrap();
   let fast_result = fast.await.unwrap();
   (slow_result, fast_result, starts.load(Ordering::SeqCst), cell)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_fast_unsynchronized() {
   // Both callers run the factory independently and each observes its own
   // result; the slow completion lands last and stays published.
   let (slow, fast, starts, cell) = run_slow_fast(SafetyMode::Unsynchronized).await;
   assert!(slow);
   assert!(!fast);
   assert_eq!(starts, 2);
   assert_eq!(cell.peek(), Some(true));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_fast_race_to_publish() {
   // Both callers run the factory, the fast completion wins the publish race
   // and the slow caller's own result is discarded in favor of the winner's.
   let (slow, fast, starts, cell) = run_slow_fast(SafetyMode::RaceToPublish).await;
   assert!(!slow);
   assert!(!fast);
   assert_eq!(starts, 2);
   assert_eq!(cell.peek(), Some(false));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_fast_serialized() {
   // The slow caller holds the gate; the fast caller waits and observes the
   // slow caller's published result. The factory runs once.
   let (slow, fast, starts, cell) = run_slow_fast(SafetyMode::Serialized).await;
   assert!(slow);
   assert!(fast);
   assert_eq!(starts, 1);
   assert_eq!(cell.peek(), Some(true));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_race_to_publish_converges_across_tasks() {
   let runs = Arc::new(AtomicUsize::new(0));
   let cell: Arc<Lazy<usize, String>> = {
      let runs = Arc::clone(&runs);
      Arc::new(Lazy::new(SafetyMode::RaceToPublish, move || {
         let runs = Arc::clone(&runs);
         async move {
            let turn = runs.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_millis(5)).await;
            Ok(turn)
         }
      }))
   };

   let tasks: Vec<_> = (0..8)
      .map(|_| {
         let cell = Arc::clone(&cell);
         tokio::spawn(async move { cell.get().await.unwrap() })
      })
      .collect();

   let mut results = Vec::new();
   for task in tasks {
      results.push(task.await.unwrap());
   }
   // Several factory runs may happen, but every caller converges on the
   // single published value.
   let winner = cell.peek().expect("cell resolved");
   assert!(results.iter().all(|&v| v == winner));
   assert!(runs.load(Ordering::SeqCst) >= 1);
}

#[test]
fn test_derived_capture_table() {
   // Mode x origin, policy unset.
   let derived = [
      (SafetyMode::Unsynchronized, FactoryOrigin::Default, false),
      (SafetyMode::Unsynchronized, FactoryOrigin::Supplied, true),
      (SafetyMode::RaceToPublish, FactoryOrigin::Default, false),
      (SafetyMode::RaceToPublish, FactoryOrigin::Supplied, false),
      (SafetyMode::Serialized, FactoryOrigin::Default, false),
      (SafetyMode::Serialized, FactoryOrigin::Supplied, true),
   ];
   for (mode, origin, expected) in derived {
      assert_eq!(
         CapturePolicy::Derived.resolve(mode, origin),
         expected,
         "derived policy for {mode} / {origin:?}"
      );
      // Explicit policies override the table unconditionally.
      assert!(CapturePolicy::Always.resolve(mode, origin));
      assert!(!CapturePolicy::Never.resolve(mode, origin));
   }
}

#[test]
fn test_cells_report_effective_policy() {
   let supplied: Lazy<u32, String> = Lazy::new(SafetyMode::Unsynchronized, || async { Ok(1) });
   assert!(supplied.captures_failures());

   let synthesized: Lazy<u32, String> = Lazy::with_default(SafetyMode::Unsynchronized);
   assert!(!synthesized.captures_failures());

   let racing: Lazy<u32, String> = Lazy::new(SafetyMode::RaceToPublish, || async { Ok(1) });
   assert!(!racing.captures_failures());

   let serialized: Lazy<u32, String> = Lazy::new(SafetyMode::Serialized, || async { Ok(1) });
   assert!(serialized.captures_failures());

   let forced: Lazy<u32, String> =
      Lazy::with_policy(SafetyMode::RaceToPublish, CapturePolicy::Always, || async { Ok(1) });
   assert!(forced.captures_failures());

   let forced_default: Lazy<u32, String> =
      Lazy::with_default_policy(SafetyMode::Serialized, CapturePolicy::Always);
   assert!(forced_default.captures_failures());

   let never: Lazy<u32, String> =
      Lazy::with_policy(SafetyMode::Serialized, CapturePolicy::Never, || async { Ok(1) });
   assert!(!never.captures_failures());
}

#[test]
fn test_mode_names_round_trip() {
   for mode in [
      SafetyMode::Unsynchronized,
      SafetyMode::RaceToPublish,
      SafetyMode::Serialized,
   ] {
      assert_eq!(mode.name().parse(), Ok(mode));
   }
   assert_eq!(SafetyMode::default(), SafetyMode::Serialized);
}
