//! Length-prefixed frames over a byte stream.
//!
//! Each frame is a 4-byte unsigned length in host byte order followed by
//! that many payload bytes. This is the native-messaging wire format used by
//! browsers talking to a host process over stdin/stdout.

use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use super::error::{ProtocolError, ProtocolResult};
use super::message::Response;

/// Largest payload accepted in either direction.
pub const MAX_FRAME_LEN: usize = 65_535;

/// Size of the length prefix.
pub const PREFIX_LEN: usize = 4;

/// Reads frames from an input stream.
///
/// Prefixes announcing an empty or oversized payload are skipped: some
/// transports emit stray keep-alive bytes and the next prefix is read instead.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    skipped: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, skipped: 0 }
    }

    /// Wait for the next complete frame.
    ///
    /// Returns `Ok(None)` once the stream is closed, including when it ends
    /// in the middle of a frame.
    pub async fn read_frame(&mut self) -> ProtocolResult<Option<Vec<u8>>> {
        loop {
            let mut prefix = [0u8; PREFIX_LEN];
            if !read_or_eof(&mut self.inner, &mut prefix).await? {
                return Ok(None);
            }

            let len = u32::from_ne_bytes(prefix) as usize;
            if len == 0 || len > MAX_FRAME_LEN {
                self.skipped += 1;
                crate::debug_event!("frame", "skipped spurious prefix", "{len}");
                continue;
            }

            let mut payload = vec![0u8; len];
            if !read_or_eof(&mut self.inner, &mut payload).await? {
                return Ok(None);
            }
            return Ok(Some(payload));
        }
    }

    /// Number of spurious length prefixes skipped so far.
    pub fn skipped_prefixes(&self) -> u64 {
        self.skipped
    }
}

/// Fill `buf` completely, returning false if the stream ends first.
async fn read_or_eof<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> ProtocolResult<bool> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Writes frames to an output stream shared by many tasks.
///
/// The prefix and payload of one frame are written under a single lock so
/// concurrent writers never interleave bytes.
pub struct FrameWriter {
    inner: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl FrameWriter {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Mutex::new(Box::new(writer)),
        }
    }

    /// Write one frame and flush it.
    pub async fn write_frame(&self, payload: &[u8]) -> ProtocolResult<()> {
        if payload.is_empty() || payload.len() > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameSize {
                len: payload.len(),
                max: MAX_FRAME_LEN,
            });
        }
        let prefix = (payload.len() as u32).to_ne_bytes();

        let mut writer = self.inner.lock().await;
        writer.write_all(&prefix).await?;
        writer.write_all(payload).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Encode and write one outbound message.
    pub async fn send(&self, response: &Response) -> ProtocolResult<()> {
        let payload = response.encode()?;
        crate::debug_event!("frame", "response", "{}", String::from_utf8_lossy(&payload));
        self.write_frame(&payload).await
    }
}

impl std::fmt::Debug for FrameWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWriter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn prefixed(payload: &[u8]) -> Vec<u8> {
        let mut bytes = (payload.len() as u32).to_ne_bytes().to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    #[tokio::test]
    async fn test_read_single_frame() {
        let bytes = prefixed(br#"{"msgId":"version"}"#);
        let mut reader = FrameReader::new(bytes.as_slice());

        let frame = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(frame, br#"{"msgId":"version"}"#);
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_spurious_prefixes_are_skipped() {
        let mut bytes = 0u32.to_ne_bytes().to_vec();
        bytes.extend_from_slice(&70_000u32.to_ne_bytes());
        bytes.extend_from_slice(&prefixed(b"{}"));
        let mut reader = FrameReader::new(bytes.as_slice());

        let frame = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(frame, b"{}");
        assert_eq!(reader.skipped_prefixes(), 2);
    }

    #[tokio::test]
    async fn test_only_spurious_prefixes_yield_nothing() {
        let mut bytes = 0u32.to_ne_bytes().to_vec();
        bytes.extend_from_slice(&(MAX_FRAME_LEN as u32 + 1).to_ne_bytes());
        let mut reader = FrameReader::new(bytes.as_slice());

        assert!(reader.read_frame().await.unwrap().is_none());
        assert_eq!(reader.skipped_prefixes(), 2);
    }

    #[tokio::test]
    async fn test_truncated_stream_is_closed() {
        // Prefix promises 10 bytes, only 3 arrive
        let mut bytes = 10u32.to_ne_bytes().to_vec();
        bytes.extend_from_slice(b"abc");
        let mut reader = FrameReader::new(bytes.as_slice());
        assert!(reader.read_frame().await.unwrap().is_none());

        // Partial prefix
        let mut reader = FrameReader::new(&[1u8, 0][..]);
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_max_length_frame_is_accepted() {
        let payload = vec![b'x'; MAX_FRAME_LEN];
        let bytes = prefixed(&payload);
        let mut reader = FrameReader::new(bytes.as_slice());

        assert_eq!(reader.read_frame().await.unwrap().unwrap().len(), MAX_FRAME_LEN);
    }

    #[tokio::test]
    async fn test_writer_round_trip() {
        let (ours, theirs) = tokio::io::duplex(1024);
        let writer = FrameWriter::new(ours);
        let mut reader = FrameReader::new(theirs);

        writer.write_frame(b"hello").await.unwrap();
        writer.write_frame(b"world").await.unwrap();

        assert_eq!(reader.read_frame().await.unwrap().unwrap(), b"hello");
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), b"world");
    }

    #[tokio::test]
    async fn test_writer_rejects_bad_sizes() {
        let (ours, _theirs) = tokio::io::duplex(16);
        let writer = FrameWriter::new(ours);

        assert!(matches!(
            writer.write_frame(b"").await,
            Err(ProtocolError::FrameSize { len: 0, .. })
        ));
        let oversized = vec![0u8; MAX_FRAME_LEN + 1];
        assert!(matches!(
            writer.write_frame(&oversized).await,
            Err(ProtocolError::FrameSize { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_interleave() {
        let (ours, theirs) = tokio::io::duplex(256);
        let writer = Arc::new(FrameWriter::new(ours));
        let mut reader = FrameReader::new(theirs);

        let mut tasks = Vec::new();
        for i in 0..8u8 {
            let writer = Arc::clone(&writer);
            tasks.push(tokio::spawn(async move {
                let payload = vec![b'a' + i; 200];
                for _ in 0..10 {
                    writer.write_frame(&payload).await.unwrap();
                }
            }));
        }

        for _ in 0..80 {
            let frame = reader.read_frame().await.unwrap().unwrap();
            assert_eq!(frame.len(), 200);
            assert!(frame.iter().all(|b| *b == frame[0]));
        }

        for task in tasks {
            task.await.unwrap();
        }
    }
}
