use std::io::Cursor;
use std::time::Duration;

use chrono::Utc;
use image::ImageReader;
use sdcam_common::frame::FrameBuffer;
use tracing::debug;

use crate::{FrameSource, SensorError};

/// Pulls single snapshots from a network camera (e.g. an ESP32-CAM
/// `/capture` endpoint) and converts them to 8-bit grayscale.
///
/// Each frame is a fresh decode, so `release` simply drops the buffer.
pub struct HttpSnapshotSensor {
    client: reqwest::Client,
    url: String,
}

impl HttpSnapshotSensor {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, SensorError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl FrameSource for HttpSnapshotSensor {
    async fn acquire(&self) -> Result<FrameBuffer, SensorError> {
        let resp = self.client.get(&self.url).send().await?;
        if !resp.status().is_success() {
            return Err(SensorError::Status(resp.status().as_u16()));
        }
        let encoded = resp.bytes().await?;
        let captured_at_ms = Utc::now().timestamp_millis();
        debug!(url = self.url, bytes = encoded.len(), "snapshot fetched");

        // Decoding a full-resolution JPEG is CPU-bound.
        let (pixels, width, height) = tokio::task::spawn_blocking(move || to_luma(&encoded))
            .await
            .map_err(|e| SensorError::Decode(e.to_string()))??;

        Ok(FrameBuffer::new_gray(pixels, width, height, captured_at_ms)?)
    }

    fn release(&self, frame: FrameBuffer) {
        drop(frame);
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn to_luma(encoded: &[u8]) -> Result<(Vec<u8>, u32, u32), SensorError> {
    let img = ImageReader::new(Cursor::new(encoded))
        .with_guessed_format()
        .map_err(|e| SensorError::Decode(e.to_string()))?
        .decode()
        .map_err(|e| SensorError::Decode(e.to_string()))?;
    let gray = img.to_luma8();
    let (width, height) = gray.dimensions();
    Ok((gray.into_raw(), width, height))
}
