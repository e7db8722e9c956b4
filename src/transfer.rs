//! 上传、下载与列表的核心操作，供 HTTP 层调用。

use std::fmt;
use std::io::{self, ErrorKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tracing::{debug, info};

use crate::locking::LockManager;
use crate::registry::{FileMetadata, FileRegistry};
use crate::storage::{Storage, StorageError};

/// Owns the storage root, the registry and the per-name locks.
#[derive(Debug)]
pub struct FileService {
    storage: Arc<Storage>,
    registry: FileRegistry,
    locks: LockManager,
    lock_timeout: Duration,
}

/// An opened file ready to be streamed back to a client.
#[derive(Debug)]
pub struct FileDownload {
    pub name: String,
    pub length: u64,
    pub file: File,
}

#[derive(Debug)]
pub enum UploadError {
    InvalidName,
    Busy,
    Io(io::Error),
}

#[derive(Debug)]
pub enum DownloadError {
    InvalidName,
    NotFound(String),
}

impl FileService {
    pub fn new(storage: Arc<Storage>, registry: FileRegistry, lock_timeout: Duration) -> Self {
        Self {
            storage,
            registry,
            locks: LockManager::new(),
            lock_timeout,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn registry(&self) -> &FileRegistry {
        &self.registry
    }

    /// 写入文件后再登记；同名上传在锁内串行执行。
    pub async fn upload(&self, name: &str, contents: &[u8]) -> Result<FileMetadata, UploadError> {
        self.storage.resolve_file(name)?;
        let _guard = self
            .locks
            .lock_name_with_timeout(name, self.lock_timeout)
            .await
            .map_err(|_| UploadError::Busy)?;

        let size = self.storage.write_file(name, contents).await?;
        let metadata = FileMetadata::now(name);
        self.registry.put(metadata.clone()).await;
        info!(name, size, "file uploaded");
        Ok(metadata)
    }

    /// 打开文件用于下载；不查询登记表。
    pub async fn download(&self, name: &str) -> Result<FileDownload, DownloadError> {
        let (file, length) = self.storage.open_file(name).await.map_err(|err| match err {
            StorageError::InvalidName => DownloadError::InvalidName,
            StorageError::Io(err) => {
                debug!(name, error = %err, "download target unavailable");
                DownloadError::NotFound(name.to_string())
            }
        })?;
        Ok(FileDownload {
            name: name.to_string(),
            length,
            file,
        })
    }

    pub async fn list_files(&self) -> Vec<FileMetadata> {
        self.registry.list().await
    }
}

impl From<StorageError> for UploadError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidName => UploadError::InvalidName,
            StorageError::Io(err) => UploadError::Io(err),
        }
    }
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::InvalidName => f.write_str("invalid file name"),
            UploadError::Busy => f.write_str("file is being written by another upload"),
            UploadError::Io(err) if err.kind() == ErrorKind::StorageFull => {
                write!(f, "storage full: {err}")
            }
            UploadError::Io(err) => write!(f, "write failed: {err}"),
        }
    }
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadError::InvalidName => f.write_str("invalid file name"),
            DownloadError::NotFound(name) => write!(f, "file not found: {name}"),
        }
    }
}
