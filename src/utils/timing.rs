//! Timing helper for logging how long refresh work takes.

use log::{debug, info};
use std::time::Duration;
use tokio::time::Instant;

/// A timer for measuring operation durations
#[derive(Debug)]
pub struct Timer {
    start_time: Instant,
    operation_name: String,
}

impl Timer {
    pub fn start(operation_name: &str) -> Self {
        debug!("⏱️ Starting timer for: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name: operation_name.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Logs and returns the total duration.
    pub fn finish(self) -> Duration {
        let total = self.start_time.elapsed();
        info!("🕐 {} completed in {}ms", self.operation_name, total.as_millis());
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timer_measures_paused_clock() {
        let timer = Timer::start("test");
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(timer.elapsed(), Duration::from_millis(1500));
        assert_eq!(timer.finish(), Duration::from_millis(1500));
    }
}
