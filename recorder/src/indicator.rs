use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::capture::IterationOutcome;

/// User-visible feedback after each store attempt (on the device, an LED).
pub trait Indicator: Send + Sync {
    fn signal(&self, outcome: &IterationOutcome) -> impl Future<Output = ()> + Send;
}

/// Logs the flash and holds it for `flash`, like a blocking LED blink.
/// The hold throttles the capture loop by the same amount.
pub struct LogIndicator {
    flash: Duration,
}

impl LogIndicator {
    pub fn new(flash: Duration) -> Self {
        Self { flash }
    }
}

impl Indicator for LogIndicator {
    async fn signal(&self, outcome: &IterationOutcome) {
        let path = outcome.path().map(|p| p.display().to_string());
        match outcome {
            IterationOutcome::Stored { index, stats, .. } => debug!(
                index,
                path,
                bytes = stats.bytes_written,
                flash_ms = self.flash.as_millis() as u64,
                "indicator flash, stored"
            ),
            IterationOutcome::StoreFailed { index, .. } => debug!(
                index,
                path,
                flash_ms = self.flash.as_millis() as u64,
                "indicator flash, store failed"
            ),
            IterationOutcome::AcquireFailed | IterationOutcome::SequenceExhausted => {
                debug!(flash_ms = self.flash.as_millis() as u64, "indicator flash, no frame")
            }
        }
        if !self.flash.is_zero() {
            tokio::time::sleep(self.flash).await;
        }
    }
}
