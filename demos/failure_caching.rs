use std::sync::atomic::{AtomicUsize, Ordering};

use poly_lazy::{CapturePolicy, Lazy, SafetyMode};

#[tokio::main]
async fn main() {
   // Without capture, each failing retrieval retries the factory.
   let attempts = AtomicUsize::new(0);
   let flaky: Lazy<String, String> =
      Lazy::with_policy(SafetyMode::Serialized, CapturePolicy::Never, move || {
         let attempt = attempts.fetch_add(1, Ordering::Relaxed);
         async move {
            if attempt == 0 {
               Err("first attempt failed".to_string())
            } else {
               Ok("recovered on retry".to_string())
            }
         }
      });

   match flaky.get().await {
      Ok(_) => panic!("first attempt should fail"),
      Err(e) => println!("Caught transient error: {e}"),
   }
   println!("Retry: {}", flaky.get().await.unwrap());

   // With capture, the first failure is cached and replayed forever.
   let runs = AtomicUsize::new(0);
   let poisoned: Lazy<String, String> =
      Lazy::with_policy(SafetyMode::Serialized, CapturePolicy::Always, move || {
         runs.fetch_add(1, Ordering::Relaxed);
         async { Err("backend offline".to_string()) }
      });

   for _ in 0..3 {
      println!("Replayed: {}", poisoned.get().await.unwrap_err());
   }
   assert!(!poisoned.is_resolved()); // A cached failure is not a value
}
