use std::path::{Path, PathBuf};
use std::time::Duration;

use sdcam_common::naming::ImageNaming;
use sdcam_sensor::{acquire_guard, FrameSource};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::indicator::Indicator;
use crate::store::{StoreStats, StoreWriter};

/// Index of the next image to be written.
///
/// Seeded once at boot from the storage scan and owned by `main`; only the
/// capture loop advances it, by exactly one per store attempt. Once the last
/// index has been used the counter is exhausted and stays that way.
#[derive(Debug)]
pub struct SequenceCounter {
    next: Option<u32>,
}

impl SequenceCounter {
    pub fn new(next: Option<u32>) -> Self {
        Self { next }
    }

    #[cfg(test)]
    pub fn starting_at(next: u32) -> Self {
        Self::new(Some(next))
    }

    /// `None` once every index has been handed out.
    pub fn peek(&self) -> Option<u32> {
        self.next
    }

    fn advance(&mut self) {
        self.next = self.next.and_then(|n| n.checked_add(1));
    }
}

#[derive(Debug)]
pub enum IterationOutcome {
    Stored {
        index: u32,
        path: PathBuf,
        stats: StoreStats,
    },
    StoreFailed {
        index: u32,
        path: PathBuf,
    },
    AcquireFailed,
    /// No unused index is left; nothing was acquired or written.
    SequenceExhausted,
}

impl IterationOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Stored { path, .. } | Self::StoreFailed { path, .. } => Some(path),
            Self::AcquireFailed | Self::SequenceExhausted => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStats {
    pub stored: u64,
    pub store_failures: u64,
    pub acquire_failures: u64,
}

/// Acquire → store → release, forever.
///
/// Frames are handled strictly one at a time, so capture rate is bounded by
/// storage throughput.
pub struct CaptureLoop<S, I> {
    sensor: S,
    writer: StoreWriter,
    indicator: I,
    root: PathBuf,
    naming: ImageNaming,
    min_interval: Duration,
    stats: CaptureStats,
}

impl<S: FrameSource, I: Indicator> CaptureLoop<S, I> {
    pub fn new(
        sensor: S,
        writer: StoreWriter,
        indicator: I,
        root: PathBuf,
        naming: ImageNaming,
    ) -> Self {
        Self {
            sensor,
            writer,
            indicator,
            root,
            naming,
            min_interval: Duration::ZERO,
            stats: CaptureStats::default(),
        }
    }

    /// Space iterations at least `interval` apart. Zero disables pacing.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Destination for the image with sequence number `index`.
    pub fn image_path(&self, index: u32) -> PathBuf {
        self.root.join(self.naming.file_name(index))
    }

    /// One iteration. Never fails: errors are logged and reported in the outcome.
    pub async fn run_once(&mut self, counter: &mut SequenceCounter) -> IterationOutcome {
        let Some(index) = counter.peek() else {
            error!(
                root = self.root.display().to_string(),
                "image index space exhausted, refusing to overwrite"
            );
            return IterationOutcome::SequenceExhausted;
        };

        let frame = match acquire_guard(&self.sensor).await {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, sensor = self.sensor.name(), "camera capture failed");
                self.stats.acquire_failures += 1;
                return IterationOutcome::AcquireFailed;
            }
        };

        let path = self.image_path(index);
        trace!(leading = ?frame.leading_bytes(8), "frame buffer");
        debug!(
            path = path.display().to_string(),
            width = frame.width,
            height = frame.height,
            bytes = frame.len(),
            captured_at = frame.captured_at().map(|t| t.to_rfc3339()),
            "writing image"
        );

        let result = self.writer.write_image(&path, &frame).await;
        let frame_len = frame.len();
        // Hand the buffer back to the sensor before anything else can fail or wait.
        drop(frame);
        counter.advance();

        let outcome = match result {
            Ok(stats) => {
                info!(
                    path = path.display().to_string(),
                    bytes = stats.bytes_written,
                    writes = stats.writes,
                    ms = stats.elapsed.as_millis() as u64,
                    "image stored"
                );
                self.stats.stored += 1;
                IterationOutcome::Stored { index, path, stats }
            }
            Err(e) => {
                error!(error = %e, bytes = frame_len, "failed to store image, dropping frame");
                self.stats.store_failures += 1;
                IterationOutcome::StoreFailed { index, path }
            }
        };

        self.indicator.signal(&outcome).await;

        let attempts = self.stats.stored + self.stats.store_failures;
        if attempts > 0 && attempts % 100 == 0 {
            info!(
                stored = self.stats.stored,
                store_failures = self.stats.store_failures,
                acquire_failures = self.stats.acquire_failures,
                next_index = counter.peek(),
                "capture stats"
            );
        }

        outcome
    }

    /// Run iterations until the process exits or the index space runs out.
    pub async fn run(&mut self, counter: &mut SequenceCounter) {
        info!(
            sensor = self.sensor.name(),
            root = self.root.display().to_string(),
            write_chunk_bytes = self.writer.chunk_bytes(),
            next_index = counter.peek(),
            min_interval_ms = self.min_interval.as_millis() as u64,
            "entering capture loop"
        );

        let mut ticker = (!self.min_interval.is_zero()).then(|| {
            let mut ticker = tokio::time::interval(self.min_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            if let Some(ticker) = ticker.as_mut() {
                ticker.tick().await;
            }
            if let IterationOutcome::SequenceExhausted = self.run_once(counter).await {
                error!(stored = self.stats.stored, "capture loop stopped");
                return;
            }
            // Cooperative point between iterations.
            tokio::task::yield_now().await;
        }
    }
}
