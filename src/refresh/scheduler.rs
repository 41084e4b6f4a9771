// src/refresh/scheduler.rs
//! Periodic trigger for `refresh_if_due`.

use async_trait::async_trait;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Something the scheduler can poke on every tick.
#[async_trait]
pub trait ScheduledRefresh: Send + Sync + 'static {
    /// Refreshes whatever is close to its deadline. Returns the number of
    /// domains that were refreshed.
    async fn refresh_if_due(&self) -> usize;
}

/// Spawns a task that calls `target.refresh_if_due()` every `every`.
/// The first tick fires immediately so a cold process warms its cache.
pub fn spawn_refresh_scheduler<T: ScheduledRefresh>(target: Arc<T>, every: Duration) -> JoinHandle<()> {
    info!("⏰ Starting refresh scheduler (every {:?})", every);
    tokio::spawn(async move {
        let mut ticker = interval(every.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let target = target.clone();
            // A panicking refresh must not stop the schedule
            match tokio::spawn(async move { target.refresh_if_due().await }).await {
                Ok(0) => {}
                Ok(refreshed) => info!("Scheduled refresh updated {} domain(s)", refreshed),
                Err(e) => error!("Scheduled refresh task failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTarget {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ScheduledRefresh for CountingTarget {
        async fn refresh_if_due(&self) -> usize {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 1 {
                panic!("second tick fails");
            }
            0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_ticks_and_survives_panics() {
        let target = Arc::new(CountingTarget {
            calls: AtomicUsize::new(0),
        });
        let handle = spawn_refresh_scheduler(target.clone(), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(60 * 3 + 1)).await;
        assert!(target.calls.load(Ordering::SeqCst) >= 4);
        handle.abort();
    }
}
