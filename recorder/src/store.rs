use std::path::Path;
use std::time::{Duration, Instant};

use sdcam_common::frame::{write_pgm_header, FrameBuffer, PGM_HEADER_MAX_LEN};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Streams frames to storage as PGM files through a fixed-size arena.
///
/// The arena is allocated once, at `chunk_bytes`, and reused for every
/// frame: the file is written as a sequence of writes of at most
/// `chunk_bytes`, the first of which carries the header followed by as many
/// pixel bytes as fit. A frame is never staged in memory as a whole file.
pub struct StoreWriter {
    arena: Vec<u8>,
    chunk_bytes: usize,
}

/// What one successful `write_image` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub bytes_written: u64,
    pub writes: u32,
    pub elapsed: Duration,
}

impl StoreWriter {
    pub fn new(chunk_bytes: usize) -> Result<Self, StoreError> {
        // The header must fit in the first chunk with room for pixel data.
        if chunk_bytes <= PGM_HEADER_MAX_LEN {
            return Err(StoreError::ArenaTooSmall {
                chunk_bytes,
                min: PGM_HEADER_MAX_LEN + 1,
            });
        }
        Ok(Self {
            arena: Vec::with_capacity(chunk_bytes),
            chunk_bytes,
        })
    }

    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    /// Create (or truncate) `path` and write `frame` into it.
    ///
    /// If the file cannot be created nothing is written. A failure part way
    /// through leaves a truncated file behind; there is no rollback.
    pub async fn write_image(
        &mut self,
        path: &Path,
        frame: &FrameBuffer,
    ) -> Result<StoreStats, StoreError> {
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| StoreError::Open(path.display().to_string(), e))?;
        debug!(path = path.display().to_string(), "opened image for writing");

        let stats = self
            .write_frame(&mut file, frame)
            .await
            .map_err(|e| StoreError::Write(path.display().to_string(), e))?;
        Ok(stats)
    }

    /// Write header + pixels of `frame` to `sink` in arena-sized chunks, then flush.
    pub async fn write_frame<W>(
        &mut self,
        sink: &mut W,
        frame: &FrameBuffer,
    ) -> std::io::Result<StoreStats>
    where
        W: AsyncWrite + Unpin,
    {
        let started = Instant::now();
        let pixels = frame.pixels();

        self.arena.clear();
        write_pgm_header(&mut self.arena, frame.width, frame.height);
        let header_len = self.arena.len();

        let total = header_len + pixels.len();
        let mut copied = 0;
        let mut writes = 0;
        for (i, len) in chunk_lengths(total, self.chunk_bytes).enumerate() {
            let take = if i == 0 { len - header_len } else { len };
            if i > 0 {
                self.arena.clear();
            }
            self.arena.extend_from_slice(&pixels[copied..copied + take]);
            copied += take;
            sink.write_all(&self.arena).await?;
            writes += 1;
        }
        self.arena.clear();
        sink.flush().await?;

        Ok(StoreStats {
            bytes_written: total as u64,
            writes,
            elapsed: started.elapsed(),
        })
    }
}

/// Split `total` bytes into consecutive chunks of `chunk` bytes; only the
/// last one may be shorter.
pub fn chunk_lengths(total: usize, chunk: usize) -> impl Iterator<Item = usize> {
    (0..total.div_ceil(chunk)).map(move |i| chunk.min(total - i * chunk))
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("write chunk of {chunk_bytes} bytes is too small, need at least {min}")]
    ArenaTooSmall { chunk_bytes: usize, min: usize },
    #[error("failed to open {0} for writing: {1}")]
    Open(String, std::io::Error),
    #[error("failed while writing {0}: {1}")]
    Write(String, std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Records the size of every write it receives; optionally fails after N writes.
    #[derive(Default)]
    struct RecordingSink {
        data: Vec<u8>,
        writes: Vec<usize>,
        fail_after: Option<usize>,
    }

    impl AsyncWrite for RecordingSink {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.fail_after == Some(self.writes.len()) {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "medium removed")));
            }
            self.writes.push(buf.len());
            self.data.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn pixels(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    #[test]
    fn chunk_lengths_cover_total() {
        assert_eq!(chunk_lengths(100001, 65536).collect::<Vec<_>>(), vec![65536, 34465]);
        assert_eq!(chunk_lengths(65536, 65536).collect::<Vec<_>>(), vec![65536]);
        assert_eq!(chunk_lengths(10, 4).collect::<Vec<_>>(), vec![4, 4, 2]);
        assert_eq!(chunk_lengths(0, 4).count(), 0);
    }

    #[test]
    fn arena_must_fit_header() {
        assert!(matches!(
            StoreWriter::new(PGM_HEADER_MAX_LEN),
            Err(StoreError::ArenaTooSmall { .. })
        ));
        assert!(StoreWriter::new(PGM_HEADER_MAX_LEN + 1).is_ok());
    }

    #[tokio::test]
    async fn non_multiple_frame_is_written_completely() {
        // "P5 1 1 255 " is 11 bytes; header + pixels = 100001.
        let frame = FrameBuffer::new(pixels(100001 - 11), 1, 1, 0);
        let mut writer = StoreWriter::new(65536).unwrap();
        let mut sink = RecordingSink::default();

        let stats = writer.write_frame(&mut sink, &frame).await.unwrap();

        assert_eq!(sink.writes, vec![65536, 34465]);
        assert_eq!(stats.writes, 2);
        assert_eq!(stats.bytes_written, 100001);
        assert_eq!(&sink.data[..11], b"P5 1 1 255 ");
        assert_eq!(&sink.data[11..], frame.pixels());
    }

    #[tokio::test]
    async fn output_is_independent_of_chunk_size() {
        let frame = FrameBuffer::new_gray(pixels(37 * 23), 37, 23, 0).unwrap();
        let mut expected = b"P5 37 23 255 ".to_vec();
        expected.extend_from_slice(frame.pixels());

        for chunk in [30, 31, 64, 100, 851, 4096] {
            let mut writer = StoreWriter::new(chunk).unwrap();
            let mut sink = RecordingSink::default();
            writer.write_frame(&mut sink, &frame).await.unwrap();
            assert_eq!(sink.data, expected, "chunk size {chunk}");
            assert!(sink.writes.iter().all(|&w| w <= chunk));
        }
    }

    #[tokio::test]
    async fn header_shares_the_first_chunk() {
        // 100001 pixel bytes plus the 11-byte header "P5 1 1 255 ".
        let frame = FrameBuffer::new(pixels(100001), 1, 1, 0);
        let mut writer = StoreWriter::new(65536).unwrap();
        let mut sink = RecordingSink::default();

        let stats = writer.write_frame(&mut sink, &frame).await.unwrap();

        assert_eq!(sink.writes, vec![65536, 34476]);
        assert_eq!(stats.bytes_written, 100012);
        assert_eq!(&sink.data[11..], frame.pixels());
    }

    #[tokio::test]
    async fn arena_is_reused_across_frames() {
        let mut writer = StoreWriter::new(64).unwrap();
        let capacity = writer.arena.capacity();
        for len in [10, 500, 3] {
            let frame = FrameBuffer::new(pixels(len), len as u32, 1, 0);
            writer.write_frame(&mut RecordingSink::default(), &frame).await.unwrap();
        }
        assert_eq!(writer.arena.capacity(), capacity);
    }

    #[tokio::test]
    async fn empty_frame_writes_header_only() {
        let frame = FrameBuffer::new(Vec::new(), 0, 0, 0);
        let mut writer = StoreWriter::new(64).unwrap();
        let mut sink = RecordingSink::default();
        writer.write_frame(&mut sink, &frame).await.unwrap();
        assert_eq!(sink.data, b"P5 0 0 255 ");
    }

    #[tokio::test]
    async fn mid_copy_failure_is_reported() {
        let frame = FrameBuffer::new(pixels(1000), 1000, 1, 0);
        let mut writer = StoreWriter::new(100).unwrap();
        let mut sink = RecordingSink {
            fail_after: Some(3),
            ..Default::default()
        };
        let err = writer.write_frame(&mut sink, &frame).await.unwrap_err();
        assert_eq!(err.to_string(), "medium removed");
        assert_eq!(sink.writes.len(), 3);
    }

    #[tokio::test]
    async fn writes_pgm_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img_0001.pgm");
        let frame = FrameBuffer::new_gray(pixels(320 * 240), 320, 240, 0).unwrap();
        let mut writer = StoreWriter::new(4096).unwrap();

        let stats = writer.write_image(&path, &frame).await.unwrap();

        let stored = std::fs::read(&path).unwrap();
        assert_eq!(stored.len() as u64, stats.bytes_written);
        assert!(stored.starts_with(b"P5 320 240 255 "));
        assert_eq!(&stored[15..], frame.pixels());
    }

    #[tokio::test]
    async fn overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img_0001.pgm");
        std::fs::write(&path, vec![0xAA; 10_000]).unwrap();
        let frame = FrameBuffer::new_gray(vec![1, 2, 3, 4], 2, 2, 0).unwrap();

        StoreWriter::new(64).unwrap().write_image(&path, &frame).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"P5 2 2 255 \x01\x02\x03\x04");
    }

    #[tokio::test]
    async fn open_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("img_0001.pgm");
        let frame = FrameBuffer::new_gray(vec![0; 4], 2, 2, 0).unwrap();

        let err = StoreWriter::new(64).unwrap().write_image(&path, &frame).await.unwrap_err();

        assert!(matches!(err, StoreError::Open(..)));
        assert!(!path.exists());
    }

    /// GET `path` over plain HTTP/1.1 and return the chunk payloads,
    /// terminator included.
    async fn fetch_chunks(addr: std::net::SocketAddr, path: &str) -> Vec<Vec<u8>> {
        use tokio::io::AsyncReadExt;

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: camera\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();

        let head_end = raw.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
        let head = String::from_utf8_lossy(&raw[..head_end]).to_ascii_lowercase();
        assert!(head.starts_with("http/1.1 200"), "{head}");
        assert!(head.contains("transfer-encoding: chunked"), "{head}");

        let mut rest = &raw[head_end + 4..];
        let mut chunks = Vec::new();
        loop {
            let line_end = rest.windows(2).position(|w| w == b"\r\n").unwrap();
            let size_line = std::str::from_utf8(&rest[..line_end]).unwrap();
            let size = usize::from_str_radix(size_line.trim(), 16).unwrap();
            rest = &rest[line_end + 2..];
            chunks.push(rest[..size].to_vec());
            if size == 0 {
                return chunks;
            }
            rest = &rest[size + 2..];
        }
    }

    #[tokio::test]
    async fn stored_frames_round_trip_over_http() {
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let frame = FrameBuffer::new_gray(pixels(300 * 200), 300, 200, 0).unwrap();
        let mut expected = b"P5 300 200 255 ".to_vec();
        expected.extend_from_slice(frame.pixels());

        let write_chunks = [30, 4096, 65536];
        for chunk in write_chunks {
            let path = dir.path().join(format!("img_{chunk:04}.pgm"));
            StoreWriter::new(chunk).unwrap().write_image(&path, &frame).await.unwrap();
        }

        for read_chunk in [7, 1000, 32768] {
            let listener = sdcam_api::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let state = Arc::new(sdcam_api::AppState::new(dir.path(), read_chunk));
            tokio::spawn(sdcam_api::serve(listener, state));

            for chunk in write_chunks {
                let chunks = fetch_chunks(addr, &format!("/img_{chunk:04}.pgm")).await;
                assert_eq!(chunks.last().map(Vec::len), Some(0));
                assert!(chunks.iter().all(|c| c.len() <= read_chunk));
                assert_eq!(
                    chunks.concat(),
                    expected,
                    "write chunk {chunk}, read chunk {read_chunk}"
                );
            }
        }
    }
}
