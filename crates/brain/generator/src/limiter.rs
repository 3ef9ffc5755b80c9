use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Sliding-window rate limiter. Saturated callers wait cooperatively until a
/// slot frees; requests are never dropped.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    capacity: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            window,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Sixty requests per minute, the shipped default.
    pub fn per_minute(capacity: usize) -> Self {
        Self::new(capacity, Duration::from_secs(60))
    }

    /// Acquire a slot, sleeping as long as the window is saturated.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut timestamps = self.timestamps.lock().await;
                let now = Instant::now();
                while let Some(front) = timestamps.front() {
                    if now.duration_since(*front) >= self.window {
                        timestamps.pop_front();
                    } else {
                        break;
                    }
                }
                if timestamps.len() < self.capacity {
                    timestamps.push_back(now);
                    return;
                }
                // Oldest entry decides when the next slot opens.
                match timestamps.front() {
                    Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };
            debug!(wait_ms = wait.as_millis() as u64, "rate limiter saturated");
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    /// Slots currently consumed within the window.
    pub async fn in_flight(&self) -> usize {
        let mut timestamps = self.timestamps.lock().await;
        let now = Instant::now();
        while let Some(front) = timestamps.front() {
            if now.duration_since(*front) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
        timestamps.len()
    }
}
