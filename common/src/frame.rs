use chrono::{DateTime, Utc};

/// One captured image: raw 8-bit intensity bytes plus dimensions.
///
/// A `FrameBuffer` belongs to the sensor that produced it. The capture
/// loop only ever sees it through a guard that hands it back to the
/// sensor when the store attempt is over.
#[derive(Debug)]
pub struct FrameBuffer {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at_ms: i64,
}

impl FrameBuffer {
    /// Wrap driver bytes as-is. The byte length is not checked against the
    /// dimensions; the store writer persists exactly `data.len()` bytes.
    pub fn new(data: Vec<u8>, width: u32, height: u32, captured_at_ms: i64) -> Self {
        Self {
            data,
            width,
            height,
            captured_at_ms,
        }
    }

    /// Wrap a grayscale image, checking that it holds exactly `width * height` bytes.
    pub fn new_gray(
        data: Vec<u8>,
        width: u32,
        height: u32,
        captured_at_ms: i64,
    ) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(FrameError::SizeMismatch {
                got: data.len(),
                expected,
                width,
                height,
            });
        }
        Ok(Self::new(data, width, height, captured_at_ms))
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Give the backing allocation back, e.g. to a sensor's buffer pool.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Capture time, if the timestamp is in chrono's representable range.
    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.captured_at_ms)
    }

    /// First `n` bytes (or fewer), for diagnostics.
    pub fn leading_bytes(&self, n: usize) -> &[u8] {
        &self.data[..self.data.len().min(n)]
    }
}

/// Longest header `pgm_header` can produce (both dimensions at `u32::MAX`).
pub const PGM_HEADER_MAX_LEN: usize = 29;

/// `"P5 <width> <height> 255 "`: binary graymap, 8-bit max value, a single
/// space before the raster.
pub fn pgm_header(width: u32, height: u32) -> String {
    format!("P5 {width} {height} 255 ")
}

/// Append the PGM header to `out` without allocating a temporary string.
pub fn write_pgm_header(out: &mut Vec<u8>, width: u32, height: u32) {
    use std::io::Write;
    // Writing into a Vec cannot fail.
    let _ = write!(out, "P5 {width} {height} 255 ");
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame holds {got} bytes, expected {expected} for {width}x{height}")]
    SizeMismatch {
        got: usize,
        expected: usize,
        width: u32,
        height: u32,
    },
}
