use anyhow::{Context, Result};
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

/// Default upper bound on bytes returned by a single poll
pub const DEFAULT_READ_CEILING: usize = 64 * 1024;

/// Tails a file that an independent writer keeps appending to.
///
/// Each `poll()` returns only the bytes that appeared since the previous
/// successful poll. The cursor only moves forward, and only after a read
/// succeeds, so a failed poll can simply be retried on the next tick.
pub struct FileTailer {
    path: PathBuf,
    file: Option<File>,
    offset: u64,
    read_ceiling: usize,
}

impl FileTailer {
    /// Create a tailer positioned at offset 0.
    ///
    /// The file does not need to exist yet; it is opened lazily on the first poll
    /// that finds it.
    pub fn new(path: impl AsRef<Path>, read_ceiling: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: None,
            offset: 0,
            read_ceiling: read_ceiling.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes consumed so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read newly appended bytes, at most `read_ceiling` of them.
    ///
    /// Returns an empty buffer when the file has not grown.
    pub async fn poll(&mut self) -> Result<Bytes> {
        self.poll_until(u64::MAX).await
    }

    /// Current length of the file on storage
    pub async fn file_len(&mut self) -> Result<u64> {
        self.ensure_open().await?;

        let path = &self.path;
        let Some(file) = self.file.as_ref() else {
            return Ok(0);
        };

        Ok(file
            .metadata()
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len())
    }

    /// Like `poll()`, but never reads past stream offset `end`
    pub async fn poll_until(&mut self, end: u64) -> Result<Bytes> {
        let size = self.file_len().await?;
        let offset = self.offset;

        if size < offset {
            warn!(
                "{} shrank below the consumed offset ({} < {}), waiting for it to grow",
                self.path.display(),
                size,
                offset
            );
            return Ok(Bytes::new());
        }

        let available = size.min(end);
        if available <= offset {
            return Ok(Bytes::new());
        }

        let wanted = (available - offset).min(self.read_ceiling as u64);
        let mut buf = Vec::with_capacity(wanted as usize);

        let path = &self.path;
        let Some(file) = self.file.as_mut() else {
            return Ok(Bytes::new());
        };

        file.seek(SeekFrom::Start(offset))
            .await
            .with_context(|| format!("Failed to seek {}", path.display()))?;
        (&mut *file)
            .take(wanted)
            .read_to_end(&mut buf)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        self.offset += buf.len() as u64;

        Ok(Bytes::from(buf))
    }

    async fn ensure_open(&mut self) -> Result<()> {
        if self.file.is_none() {
            let file = File::open(&self.path)
                .await
                .with_context(|| format!("Failed to open {}", self.path.display()))?;
            debug!("Opened {} for tailing", self.path.display());
            self.file = Some(file);
        }
        Ok(())
    }
}
