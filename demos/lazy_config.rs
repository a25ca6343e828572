use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use poly_lazy::{Lazy, SafetyMode};
use tokio::time::{sleep, Duration};

static RUNS: AtomicUsize = AtomicUsize::new(0);

#[tokio::main]
async fn main() {
   let config: Arc<Lazy<String, String>> =
      Arc::new(Lazy::new(SafetyMode::Serialized, || async {
         // This factory runs only once, no matter how many tasks retrieve.
         RUNS.fetch_add(1, Ordering::Relaxed);
         println!("Loading configuration...");
         sleep(Duration::from_millis(50)).await;
         Ok("production".to_string())
      }));

   let tasks: Vec<_> = (0..5)
      .map(|_| {
         let config = Arc::clone(&config);
         tokio::spawn(async move {
            println!("Task sees: {}", config.get().await.unwrap());
         })
      })
      .collect();

   for t in tasks {
      t.await.unwrap();
   }

   assert_eq!(RUNS.load(Ordering::Relaxed), 1); // Factory ran only once
   println!("Final config: {config}");
}
