//! Upload payload sources

use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{Result, TransferError};

/// Bytes to upload: a file on disk or an in-memory buffer
pub(crate) enum Payload {
    File {
        path: PathBuf,
        file: File,
        size: u64,
    },
    Buffer(Bytes),
}

impl Payload {
    /// Open a regular file for upload
    pub(crate) async fn open(path: &Path) -> Result<Self> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            TransferError::Input(format!("cannot access {}: {}", path.display(), e))
        })?;

        if !metadata.is_file() {
            return Err(TransferError::Input(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        let file = File::open(path).await.map_err(|e| {
            TransferError::Input(format!("cannot open {}: {}", path.display(), e))
        })?;

        Ok(Payload::File {
            path: path.to_path_buf(),
            file,
            size: metadata.len(),
        })
    }

    pub(crate) fn size(&self) -> u64 {
        match self {
            Payload::File { size, .. } => *size,
            Payload::Buffer(data) => data.len() as u64,
        }
    }

    /// Read exactly `len` bytes starting at `offset`
    pub(crate) async fn read_range(&mut self, offset: u64, len: u64) -> Result<Bytes> {
        match self {
            Payload::Buffer(data) => {
                let start = offset as usize;
                let end = start + len as usize;
                if end > data.len() {
                    return Err(TransferError::Input(format!(
                        "range {}..{} is outside a {} byte buffer",
                        start,
                        end,
                        data.len()
                    )));
                }
                Ok(data.slice(start..end))
            }
            Payload::File { path, file, .. } => {
                file.seek(SeekFrom::Start(offset))
                    .await
                    .map_err(|e| TransferError::io(format!("seek in {}", path.display()), e))?;

                let mut buffer = vec![0u8; len as usize];
                file.read_exact(&mut buffer).await.map_err(|e| {
                    TransferError::io(
                        format!("read {} bytes at {} from {}", len, offset, path.display()),
                        e,
                    )
                })?;
                Ok(Bytes::from(buffer))
            }
        }
    }

    /// The whole payload in memory
    pub(crate) async fn read_all(&mut self) -> Result<Bytes> {
        if let Payload::Buffer(data) = &*self {
            return Ok(data.clone());
        }
        let size = self.size();
        self.read_range(0, size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_ranges() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let mut payload = Payload::open(&path).await.unwrap();
        assert_eq!(payload.size(), 10);
        assert_eq!(payload.read_range(3, 4).await.unwrap(), Bytes::from("3456"));
        assert_eq!(payload.read_range(8, 2).await.unwrap(), Bytes::from("89"));
        assert_eq!(payload.read_all().await.unwrap(), Bytes::from("0123456789"));
        assert!(payload.read_range(8, 5).await.is_err());
    }

    #[tokio::test]
    async fn test_buffer_ranges() {
        let mut payload = Payload::Buffer(Bytes::from("abcdef"));
        assert_eq!(payload.read_range(2, 3).await.unwrap(), Bytes::from("cde"));
        assert!(matches!(
            payload.read_range(4, 5).await,
            Err(TransferError::Input(_))
        ));
    }

    #[tokio::test]
    async fn test_open_rejects_missing_and_directories() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Payload::open(&dir.path().join("missing")).await,
            Err(TransferError::Input(_))
        ));
        assert!(matches!(
            Payload::open(dir.path()).await,
            Err(TransferError::Input(_))
        ));
    }
}
