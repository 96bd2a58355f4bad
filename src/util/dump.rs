//! Append-only sink for telegrams the grammar parser complained about.

use crate::error::P1Error;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Append-only dump file.
///
/// Every append writes the whole buffer and flushes it, so sessions sharing
/// one dump path by opening it separately never interleave inside a telegram.
#[derive(Debug)]
pub struct DumpSink {
    file: File,
    path: PathBuf,
}

impl DumpSink {
    /// Opens `path` for appending, creating it if needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, P1Error> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| P1Error::DumpOpen {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        Ok(DumpSink {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `bytes` and flushes.
    pub async fn append(&mut self, bytes: &[u8]) -> Result<(), P1Error> {
        self.file.write_all(bytes).await?;
        self.file.flush().await?;
        Ok(())
    }
}
