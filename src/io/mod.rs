//! Byte sources that feed pack buffers into the core.

mod http;
mod local;

pub use http::{HttpOptions, HttpRangeReader};
pub use local::LocalFileReader;

use anyhow::{Result, bail};
use async_trait::async_trait;

/// Largest single read issued by [`ReadAt::read_all`].
pub const READ_CHUNK: usize = 8 * 1024 * 1024;

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Load the whole source into memory.
    async fn read_all(&self) -> Result<Vec<u8>> {
        read_chunked(self).await
    }
}

/// Fill a buffer of `reader.size()` bytes with positional reads of at most
/// [`READ_CHUNK`] bytes each.
pub async fn read_chunked<R: ReadAt + ?Sized>(reader: &R) -> Result<Vec<u8>> {
    let size = usize::try_from(reader.size())?;
    let mut buf = vec![0u8; size];
    let mut filled = 0;

    while filled < size {
        let end = (filled + READ_CHUNK).min(size);
        let n = reader.read_at(filled as u64, &mut buf[filled..end]).await?;
        if n == 0 {
            bail!("Source ended at {} of {} bytes", filled, size);
        }
        filled += n;
    }

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serves at most `step` bytes per call to exercise the fill loop.
    struct Trickle {
        data: Vec<u8>,
        step: usize,
    }

    #[async_trait]
    impl ReadAt for Trickle {
        async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
            let start = offset as usize;
            let n = buf.len().min(self.step).min(self.data.len() - start);
            buf[..n].copy_from_slice(&self.data[start..start + n]);
            Ok(n)
        }

        fn size(&self) -> u64 {
            self.data.len() as u64
        }
    }

    struct Lying;

    #[async_trait]
    impl ReadAt for Lying {
        async fn read_at(&self, _offset: u64, _buf: &mut [u8]) -> Result<usize> {
            Ok(0)
        }

        fn size(&self) -> u64 {
            4
        }
    }

    #[tokio::test]
    async fn read_all_collects_short_reads() {
        let source = Trickle {
            data: (0..=255).collect(),
            step: 7,
        };
        let data = source.read_all().await.unwrap();
        assert_eq!(data, source.data);
    }

    #[tokio::test]
    async fn read_all_fails_on_early_eof() {
        let err = Lying.read_all().await.unwrap_err();
        assert!(err.to_string().contains("0 of 4"));
    }
}
