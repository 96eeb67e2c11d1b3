use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use sdcam_common::config::SensorConfig;
use sdcam_common::frame::FrameBuffer;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::{FrameSource, SensorError};

/// Stand-in for the camera driver: a fixed pool of pre-allocated frame
/// buffers that are lent out one at a time and filled with a moving
/// diagonal gradient.
///
/// Like the real driver, it never allocates after construction. When every
/// buffer is lent out, `acquire` waits for a `release` until the timeout
/// elapses.
pub struct PatternSensor {
    width: u32,
    height: u32,
    capacity: usize,
    timeout: Duration,
    pool: Mutex<Vec<Vec<u8>>>,
    free: Semaphore,
    frames: AtomicU64,
}

impl PatternSensor {
    pub fn new(width: u32, height: u32, frame_buffers: usize, timeout: Duration) -> Self {
        let len = width as usize * height as usize;
        let pool = (0..frame_buffers).map(|_| vec![0u8; len]).collect();
        Self {
            width,
            height,
            capacity: frame_buffers,
            timeout,
            pool: Mutex::new(pool),
            free: Semaphore::new(frame_buffers),
            frames: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &SensorConfig) -> Self {
        Self::new(
            config.width,
            config.height,
            config.frame_buffers,
            config.acquire_timeout(),
        )
    }

    /// Buffers currently held by the sensor (not lent out).
    pub fn available(&self) -> usize {
        self.free.available_permits()
    }

    /// Frames produced so far.
    pub fn frames_produced(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    fn fill(&self, buf: &mut [u8], frame_no: u64) {
        let width = self.width as usize;
        let shift = frame_no as usize;
        for (y, row) in buf.chunks_mut(width).enumerate() {
            for (x, px) in row.iter_mut().enumerate() {
                *px = (x + y + shift) as u8;
            }
        }
    }
}

impl FrameSource for PatternSensor {
    async fn acquire(&self) -> Result<FrameBuffer, SensorError> {
        let permit = tokio::time::timeout(self.timeout, self.free.acquire())
            .await
            .map_err(|_| SensorError::Timeout(self.timeout))?
            .map_err(|_| SensorError::Timeout(self.timeout))?;
        // The buffer now travels with the frame; `release` restores the permit.
        permit.forget();

        let mut buf = match self.pool.lock() {
            Ok(mut pool) => pool.pop(),
            Err(poisoned) => poisoned.into_inner().pop(),
        }
        .unwrap_or_else(|| vec![0u8; self.width as usize * self.height as usize]);

        let frame_no = self.frames.fetch_add(1, Ordering::Relaxed);
        self.fill(&mut buf, frame_no);
        debug!(frame_no, free = self.available(), "pattern frame acquired");

        Ok(FrameBuffer::new(
            buf,
            self.width,
            self.height,
            Utc::now().timestamp_millis(),
        ))
    }

    fn release(&self, frame: FrameBuffer) {
        let mut pool = match self.pool.lock() {
            Ok(pool) => pool,
            Err(poisoned) => poisoned.into_inner(),
        };
        if pool.len() >= self.capacity {
            warn!(capacity = self.capacity, "frame released twice or foreign frame, dropping");
            return;
        }
        pool.push(frame.into_data());
        drop(pool);
        self.free.add_permits(1);
    }

    fn name(&self) -> &str {
        "pattern"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire_guard;

    #[tokio::test]
    async fn frames_have_configured_shape() {
        let sensor = PatternSensor::new(8, 4, 1, Duration::from_millis(50));
        let guard = acquire_guard(&sensor).await.unwrap();
        assert_eq!(guard.width, 8);
        assert_eq!(guard.height, 4);
        assert_eq!(guard.len(), 32);
        assert_eq!(guard.pixels()[0], 0);
        assert_eq!(guard.pixels()[8 + 1], 2);
    }

    #[tokio::test]
    async fn pattern_moves_between_frames() {
        let sensor = PatternSensor::new(4, 4, 1, Duration::from_millis(50));
        let first = acquire_guard(&sensor).await.unwrap().pixels()[0];
        let second = acquire_guard(&sensor).await.unwrap().pixels()[0];
        assert_ne!(first, second);
        assert_eq!(sensor.frames_produced(), 2);
    }

    #[tokio::test]
    async fn exhausted_pool_times_out() {
        let sensor = PatternSensor::new(2, 2, 1, Duration::from_millis(20));
        let _held = acquire_guard(&sensor).await.unwrap();
        assert_eq!(sensor.available(), 0);
        let err = sensor.acquire().await.unwrap_err();
        assert!(matches!(err, SensorError::Timeout(_)));
    }

    #[tokio::test]
    async fn release_refills_pool() {
        let sensor = PatternSensor::new(2, 2, 2, Duration::from_millis(20));
        {
            let _a = acquire_guard(&sensor).await.unwrap();
            let _b = acquire_guard(&sensor).await.unwrap();
            assert_eq!(sensor.available(), 0);
        }
        assert_eq!(sensor.available(), 2);
    }

    #[tokio::test]
    async fn foreign_release_is_ignored() {
        let sensor = PatternSensor::new(2, 2, 1, Duration::from_millis(20));
        sensor.release(FrameBuffer::new(vec![0; 4], 2, 2, 0));
        assert_eq!(sensor.available(), 1);
    }
}
