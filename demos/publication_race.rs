use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use poly_lazy::{Lazy, SafetyMode};
use tokio::time::{sleep, Duration};

/// Two concurrent retrievals: the first factory start is slow (100ms, true),
/// the second is fast (50ms, false). Each mode arbitrates differently.
async fn demo(mode: SafetyMode) {
   let starts = Arc::new(AtomicUsize::new(0));
   let cell: Arc<Lazy<bool, String>> = {
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

   println!(
      "{mode:>16}: slow saw {}, fast saw {}, factory ran {} time(s)",
      slow.await.unwrap(),
      fast.await.unwrap(),
      starts.load(Ordering::SeqCst)
   );
}

#[tokio::main]
async fn main() {
   demo(SafetyMode::Unsynchronized).await;
   demo(SafetyMode::RaceToPublish).await;
   demo(SafetyMode::Serialized).await;
}
