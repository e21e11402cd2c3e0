use std::sync::{Arc, LazyLock};

use tokio::sync::Semaphore;

// ensure only a limited set of ytdlp processes at a time. metadata calls
// hold a slot for the duration of the call, producers for the lifetime of
// their process.
pub static YTDLP_SLOTS: LazyLock<Arc<Semaphore>> = LazyLock::new(|| {
  let concurrency = std::env::var("YTDLP_CONCURRENCY")
    .ok()
    .and_then(|s| s.parse::<usize>().ok())
    .unwrap_or(4);
  Arc::new(Semaphore::new(concurrency))
});
