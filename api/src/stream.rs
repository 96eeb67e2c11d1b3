use axum::body::Body;
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, Stream};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Read `file` as a stream of chunks of at most `chunk_bytes`.
///
/// One `BytesMut` arena is carried through the stream; each chunk is split
/// off it and its capacity is reclaimed once hyper has written the chunk out.
pub fn file_chunks(
    file: File,
    chunk_bytes: usize,
) -> impl Stream<Item = std::io::Result<Bytes>> + Send {
    let arena = BytesMut::with_capacity(chunk_bytes);
    stream::try_unfold((file, arena), move |(mut file, mut arena)| async move {
        arena.reserve(chunk_bytes);
        let n = (&mut file)
            .take(chunk_bytes as u64)
            .read_buf(&mut arena)
            .await?;
        if n == 0 {
            return Ok::<_, std::io::Error>(None);
        }
        let chunk = arena.split().freeze();
        Ok(Some((chunk, (file, arena))))
    })
}

/// Response body for `file`. Length is unknown up front, so HTTP/1.1 clients
/// receive it with chunked transfer encoding.
pub fn file_body(file: File, chunk_bytes: usize) -> Body {
    Body::from_stream(file_chunks(file, chunk_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;

    #[tokio::test]
    async fn chunks_are_bounded_and_complete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img_0001.pgm");
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 253) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let file = File::open(&path).await.unwrap();
        let chunks: Vec<_> = file_chunks(file, 4096).try_collect().await.unwrap();

        assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= 4096));
        assert_eq!(chunks.concat(), data);
    }

    #[tokio::test]
    async fn empty_file_yields_no_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pgm");
        std::fs::write(&path, b"").unwrap();

        let file = File::open(&path).await.unwrap();
        let chunks: Vec<_> = file_chunks(file, 64).try_collect().await.unwrap();

        assert!(chunks.is_empty());
    }
}
