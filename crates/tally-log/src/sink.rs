//! Archive sinks: where archived log blobs go.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tally_types::{ArchiveError, ArchiveSink};
use tokio::sync::RwLock;

/// Writes each archive as a file in a directory, never overwriting an existing one
/// (a numeric suffix is added instead, like a browser download).
pub struct DirectoryArchiveSink {
    dir: PathBuf,
}

impl DirectoryArchiveSink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn free_path(&self, suggested: &str) -> PathBuf {
        let candidate = self.dir.join(suggested);
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
        let (stem, ext) = match suggested.rsplit_once('.') {
            Some((s, e)) => (s.to_string(), format!(".{e}")),
            None => (suggested.to_string(), String::new()),
        };
        let mut n = 1;
        loop {
            let candidate = self.dir.join(format!("{stem} ({n}){ext}"));
            if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return candidate;
            }
            n += 1;
        }
    }
}

#[async_trait]
impl ArchiveSink for DirectoryArchiveSink {
    async fn export(&self, bytes: Vec<u8>, suggested_filename: &str) -> Result<(), ArchiveError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ArchiveError::Export(e.to_string()))?;
        let path = self.free_path(suggested_filename).await;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ArchiveError::Export(format!("{}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), "archive written");
        Ok(())
    }
}

/// One exported archive held by [`MemoryArchiveSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveBlob {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Keeps exported archives in memory (process lifetime only).
#[derive(Default)]
pub struct MemoryArchiveSink {
    exports: RwLock<Vec<ArchiveBlob>>,
}

impl MemoryArchiveSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn exports(&self) -> Vec<ArchiveBlob> {
        self.exports.read().await.clone()
    }
}

#[async_trait]
impl ArchiveSink for MemoryArchiveSink {
    async fn export(&self, bytes: Vec<u8>, suggested_filename: &str) -> Result<(), ArchiveError> {
        self.exports.write().await.push(ArchiveBlob {
            filename: suggested_filename.to_string(),
            bytes,
        });
        Ok(())
    }
}
