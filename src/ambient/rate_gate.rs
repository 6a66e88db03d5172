use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{sync::Mutex, time::Instant};
use tracing::debug;

/// Time source for [`RateGate`].
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// The tokio timer. Honors `tokio::time::pause` in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Enforces a minimum spacing between the starts of consecutive outbound
/// calls.
///
/// One gate is shared by every operation of a client. The lock is held while
/// waiting, so callers queue up and are released one interval apart.
pub struct RateGate {
    min_interval: Duration,
    clock: Arc<dyn Clock>,
    last_call: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self::with_clock(min_interval, Arc::new(TokioClock))
    }

    pub fn with_clock(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_interval,
            clock,
            last_call: Mutex::new(None),
        }
    }

    /// Waits until a call may start, then records that start.
    ///
    /// Returns how long the caller was held back.
    pub async fn acquire(&self) -> Duration {
        let mut last_call = self.last_call.lock().await;

        let waited = match *last_call {
            Some(prev) => {
                let elapsed = self.clock.now().saturating_duration_since(prev);
                self.min_interval.saturating_sub(elapsed)
            }
            None => Duration::ZERO,
        };

        if !waited.is_zero() {
            debug!(wait_ms = waited.as_millis() as u64, "Rate limiting: delaying outbound call");
            self.clock.sleep(waited).await;
        }

        *last_call = Some(self.clock.now());
        waited
    }
}

impl std::fmt::Debug for RateGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGate")
            .field("min_interval", &self.min_interval)
            .finish_non_exhaustive()
    }
}
