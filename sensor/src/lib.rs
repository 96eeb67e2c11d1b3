//! Frame sources for the capture loop.
//!
//! A sensor lends out [`FrameBuffer`]s that it owns. Callers go through
//! [`acquire_guard`], which wraps the frame in a [`FrameGuard`] that hands
//! the buffer back on drop, so no exit path can forget to release it.

pub mod http;
pub mod pattern;

use std::future::Future;
use std::ops::Deref;
use std::time::Duration;

use sdcam_common::frame::{FrameBuffer, FrameError};

pub use http::HttpSnapshotSensor;
pub use pattern::PatternSensor;

pub trait FrameSource: Send + Sync {
    /// Wait for the next frame. Bounded by the source's own timeout.
    fn acquire(&self) -> impl Future<Output = Result<FrameBuffer, SensorError>> + Send;

    /// Take back a frame previously returned by [`FrameSource::acquire`].
    fn release(&self, frame: FrameBuffer);

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// Borrow of a sensor-owned frame. Releases the frame exactly once, when dropped.
pub struct FrameGuard<'a, S: FrameSource> {
    source: &'a S,
    frame: Option<FrameBuffer>,
}

impl<S: FrameSource> Deref for FrameGuard<'_, S> {
    type Target = FrameBuffer;

    fn deref(&self) -> &FrameBuffer {
        // Only `Drop` takes the frame out.
        self.frame.as_ref().expect("frame guard used after release")
    }
}

impl<S: FrameSource> Drop for FrameGuard<'_, S> {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.source.release(frame);
        }
    }
}

/// Acquire one frame from `source`, scoped to the returned guard.
pub async fn acquire_guard<S: FrameSource>(
    source: &S,
) -> Result<FrameGuard<'_, S>, SensorError> {
    let frame = source.acquire().await?;
    Ok(FrameGuard {
        source,
        frame: Some(frame),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("no frame became available within {0:?}")]
    Timeout(Duration),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("failed to decode snapshot: {0}")]
    Decode(String),
    #[error(transparent)]
    Frame(#[from] FrameError),
}
