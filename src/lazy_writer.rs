//! A write destination that only allocates once something is written.

use std::io::{self, BufWriter, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LazyWriterError {
    #[error("not initialized")]
    NotInitialized,

    #[error("last write error: {0}")]
    LastWrite(#[source] io::Error),

    #[error("failed to flush internal writer: {0}")]
    Flush(#[source] io::Error),
}

/// Buffers everything written to it into a `W`, created on the first write.
///
/// A failed write is remembered: [`LazyWriter::bytes`] refuses to hand out
/// content once any write has failed, so callers never see partial output.
pub struct LazyWriter<W: Write = Vec<u8>> {
    writer: Option<BufWriter<W>>,
    total_bytes: usize,
    last_error: Option<io::Error>,
}

impl<W: Write> Default for LazyWriter<W> {
    fn default() -> Self {
        LazyWriter {
            writer: None,
            total_bytes: 0,
            last_error: None,
        }
    }
}

impl LazyWriter<Vec<u8>> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<W: Write> LazyWriter<W> {
    pub fn is_initialized(&self) -> bool {
        self.writer.is_some()
    }

    /// Bytes accepted so far, including those still held in the buffer.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }
}

impl<W: Write + AsRef<[u8]>> LazyWriter<W> {
    /// Flushes and returns everything written so far.
    pub fn bytes(&mut self) -> Result<&[u8], LazyWriterError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(LazyWriterError::NotInitialized);
        };
        if let Some(err) = &self.last_error {
            return Err(LazyWriterError::LastWrite(io::Error::new(
                err.kind(),
                err.to_string(),
            )));
        }
        writer.flush().map_err(LazyWriterError::Flush)?;
        Ok(writer.get_ref().as_ref())
    }
}

impl<W: Write + Default> Write for LazyWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let writer = self
            .writer
            .get_or_insert_with(|| BufWriter::new(W::default()));
        match writer.write(buf) {
            Ok(n) => {
                self.total_bytes += n;
                Ok(n)
            }
            Err(err) => {
                let reported = io::Error::new(err.kind(), err.to_string());
                self.last_error = Some(err);
                Err(reported)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Refuses every write with `BrokenPipe`.
    #[derive(Default)]
    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink is gone"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl AsRef<[u8]> for BrokenSink {
        fn as_ref(&self) -> &[u8] {
            &[]
        }
    }

    #[test]
    fn test_bytes_without_write_is_not_initialized() {
        let mut writer = LazyWriter::new();
        assert!(!writer.is_initialized());
        assert!(matches!(
            writer.bytes(),
            Err(LazyWriterError::NotInitialized)
        ));
        assert_eq!(writer.bytes().unwrap_err().to_string(), "not initialized");
    }

    #[test]
    fn test_flush_on_untouched_writer_does_not_initialize() {
        let mut writer = LazyWriter::new();
        writer.flush().unwrap();
        assert!(!writer.is_initialized());
    }

    #[test]
    fn test_bytes_returns_everything_written() {
        let mut writer = LazyWriter::new();
        writer.write_all(b"a.mp3\n").unwrap();
        writer.write_all(b"b.mp3\n").unwrap();

        assert!(writer.is_initialized());
        assert_eq!(writer.total_bytes(), 12);
        assert_eq!(writer.bytes().unwrap(), b"a.mp3\nb.mp3\n");
    }

    #[test]
    fn test_large_writes_pass_through() {
        let payload = vec![0x5au8; 64 * 1024];
        let mut writer = LazyWriter::new();
        io::copy(&mut payload.as_slice(), &mut writer).unwrap();

        assert_eq!(writer.total_bytes(), payload.len());
        assert_eq!(writer.bytes().unwrap(), payload.as_slice());
    }

    #[test]
    fn test_buffered_write_fails_on_flush() {
        let mut writer: LazyWriter<BrokenSink> = LazyWriter::default();
        // Fits in the buffer, the sink is not touched yet.
        writer.write_all(b"hello").unwrap();

        let err = writer.bytes().unwrap_err();
        assert!(matches!(err, LazyWriterError::Flush(_)));
        assert!(err.to_string().starts_with("failed to flush internal writer"));
    }

    #[test]
    fn test_failed_write_is_remembered() {
        let mut writer: LazyWriter<BrokenSink> = LazyWriter::default();
        // Larger than the buffer, goes straight to the sink.
        let payload = vec![0u8; 16 * 1024];
        let err = writer.write(&payload).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(writer.total_bytes(), 0);

        match writer.bytes() {
            Err(LazyWriterError::LastWrite(source)) => {
                assert_eq!(source.kind(), io::ErrorKind::BrokenPipe)
            }
            other => panic!("expected last write error, got {:?}", other.map(|b| b.len())),
        }
    }
}
