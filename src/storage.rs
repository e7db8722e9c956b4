use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, ErrorKind};
use tracing::{info, warn};

use crate::atomic::{AtomicFile, is_temp_name};
use crate::config::TEMP_DIR_NAME;

/// Outcome of [`ensure_directory`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirectoryState {
    Created,
    AlreadyExists,
}

/// Creates `path` and any missing parents. An existing directory is not an error.
pub async fn ensure_directory(path: &Path) -> io::Result<DirectoryState> {
    let state = match fs::metadata(path).await {
        Ok(metadata) if metadata.is_dir() => DirectoryState::AlreadyExists,
        Ok(_) => {
            return Err(io::Error::new(
                ErrorKind::AlreadyExists,
                format!("{} exists and is not a directory", path.display()),
            ));
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            fs::create_dir_all(path).await?;
            DirectoryState::Created
        }
        Err(err) => return Err(err),
    };
    let metadata = fs::metadata(path).await?;
    if metadata.permissions().readonly() {
        return Err(io::Error::new(
            ErrorKind::PermissionDenied,
            format!("{} is read-only", path.display()),
        ));
    }
    Ok(state)
}

#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        match ensure_directory(&self.root).await? {
            DirectoryState::Created => info!(root = ?self.root, "created storage root"),
            DirectoryState::AlreadyExists => info!(root = ?self.root, "storage root exists"),
        }
        self.ensure_temp_dir().await
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.root.join(TEMP_DIR_NAME)
    }

    /// 创建临时目录；不会重建已被移除的根目录。
    async fn ensure_temp_dir(&self) -> io::Result<()> {
        match fs::create_dir(self.temp_dir()).await {
            Err(err) if err.kind() != ErrorKind::AlreadyExists => Err(err),
            _ => Ok(()),
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// 将文件名解析为根目录下的路径，拒绝任何会离开根目录的名称。
    pub fn resolve_file(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_file_name(name)?;
        Ok(self.root.join(name))
    }

    /// 原子写入：先写临时文件，同步后重命名覆盖目标。
    pub async fn write_file(&self, name: &str, contents: &[u8]) -> Result<u64, StorageError> {
        let target = self.resolve_file(name)?;
        self.ensure_temp_dir().await?;
        let mut atomic = AtomicFile::new(&target, &self.temp_dir()).await?;
        if let Err(err) = atomic.file_mut().write_all(contents).await {
            atomic.cleanup().await;
            return Err(StorageError::Io(err));
        }
        atomic.finalize().await?;
        Ok(contents.len() as u64)
    }

    /// 打开文件用于读取，返回句柄与打开时的长度。根目录下的符号链接不会被跟随。
    pub async fn open_file(&self, name: &str) -> Result<(File, u64), StorageError> {
        let target = self.resolve_file(name)?;
        if fs::symlink_metadata(&target).await?.file_type().is_symlink() {
            return Err(StorageError::Io(io::Error::new(
                ErrorKind::NotFound,
                "path is a symlink",
            )));
        }
        let file = File::open(&target).await?;
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(StorageError::Io(io::Error::new(
                ErrorKind::NotFound,
                "path is not a file",
            )));
        }
        Ok((file, metadata.len()))
    }

    /// 删除临时目录中超过 `ttl` 的残留临时文件，返回删除数量。
    pub async fn sweep_temp_files(&self, ttl: Duration) -> io::Result<usize> {
        let now = SystemTime::now();
        let mut dir = match fs::read_dir(self.temp_dir()).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err),
        };
        let mut removed = 0;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            if !is_temp_name(&name.to_string_lossy()) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            if age.is_none_or(|age| age < ttl) {
                continue;
            }
            let path = entry.path();
            match fs::remove_file(&path).await {
                Ok(()) => {
                    info!(path = ?path, "removed stale temp file");
                    removed += 1;
                }
                Err(err) => warn!(path = ?path, error = %err, "failed to remove stale temp file"),
            }
        }
        Ok(removed)
    }
}

fn validate_file_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() || name.contains(['/', '\\']) || name.chars().any(char::is_control) {
        return Err(StorageError::InvalidName);
    }
    if name.eq_ignore_ascii_case(TEMP_DIR_NAME) {
        return Err(StorageError::InvalidName);
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(segment)), None) if segment == name => Ok(()),
        _ => Err(StorageError::InvalidName),
    }
}

#[derive(Debug)]
pub enum StorageError {
    InvalidName,
    Io(io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::InvalidName => f.write_str("invalid file name"),
            StorageError::Io(err) => err.fmt(f),
        }
    }
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_storage() -> (tempfile::TempDir, Storage) {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("storage");
        std::fs::create_dir_all(&root).expect("create storage root");
        (temp, Storage::new(root))
    }

    #[tokio::test]
    async fn ensure_directory_is_idempotent() {
        let temp = tempdir().expect("tempdir");
        let nested = temp.path().join("a").join("b").join("c");

        let first = ensure_directory(&nested).await.expect("first ensure");
        let second = ensure_directory(&nested).await.expect("second ensure");

        assert_eq!(first, DirectoryState::Created);
        assert_eq!(second, DirectoryState::AlreadyExists);
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn ensure_directory_rejects_regular_file() {
        let temp = tempdir().expect("tempdir");
        let file = temp.path().join("not-a-dir");
        std::fs::write(&file, b"x").expect("write file");

        assert!(ensure_directory(&file).await.is_err());
    }

    #[test]
    fn resolve_file_rejects_traversal_and_separators() {
        let storage = Storage::new(PathBuf::from("/srv/files"));
        for name in ["", ".", "..", "../secret.txt", "a/b.txt", "a\\b.txt", "bad\nname"] {
            assert!(
                matches!(storage.resolve_file(name), Err(StorageError::InvalidName)),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn resolve_file_accepts_unicode_names() {
        let storage = Storage::new(PathBuf::from("/srv/files"));
        let path = storage.resolve_file("résumé 报告.pdf").expect("resolve");
        assert_eq!(path, PathBuf::from("/srv/files/résumé 报告.pdf"));
    }

    #[tokio::test]
    async fn write_then_open_returns_same_bytes() {
        let (_temp, storage) = make_storage();
        storage.write_file("a.bin", b"first").await.expect("write");
        storage.write_file("a.bin", b"second!").await.expect("overwrite");

        let (_file, length) = storage.open_file("a.bin").await.expect("open");
        assert_eq!(length, 7);
        let contents = std::fs::read(storage.root_path().join("a.bin")).expect("read");
        assert_eq!(contents, b"second!");
    }

    #[tokio::test]
    async fn write_leaves_no_temp_files_behind() {
        let (_temp, storage) = make_storage();
        storage.write_file("a.bin", b"data").await.expect("write");

        let mut names: Vec<_> = std::fs::read_dir(storage.root_path())
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                std::ffi::OsString::from(TEMP_DIR_NAME),
                std::ffi::OsString::from("a.bin")
            ]
        );
        assert_eq!(
            std::fs::read_dir(storage.temp_dir()).expect("read temp dir").count(),
            0
        );
    }

    #[tokio::test]
    async fn long_names_accepted_by_the_filesystem_can_be_written() {
        let (_temp, storage) = make_storage();
        let name = format!("{}.txt", "n".repeat(240));
        assert_eq!(name.len(), 244);

        storage.write_file(&name, b"long").await.expect("write long name");
        let (_file, length) = storage.open_file(&name).await.expect("open long name");
        assert_eq!(length, 4);
    }

    #[test]
    fn reserved_temp_dir_name_is_rejected() {
        let storage = Storage::new(PathBuf::from("/srv/files"));
        assert!(matches!(
            storage.resolve_file(TEMP_DIR_NAME),
            Err(StorageError::InvalidName)
        ));
        assert!(matches!(
            storage.resolve_file(&TEMP_DIR_NAME.to_uppercase()),
            Err(StorageError::InvalidName)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn open_file_does_not_follow_symlinks() {
        use std::os::unix::fs::symlink;

        let (temp, storage) = make_storage();
        let outside = temp.path().join("outside.txt");
        std::fs::write(&outside, b"secret").expect("write outside file");
        symlink(&outside, storage.root_path().join("link.txt")).expect("symlink");

        let result = storage.open_file("link.txt").await;
        assert!(matches!(result, Err(StorageError::Io(err)) if err.kind() == ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn open_missing_file_is_not_found() {
        let (_temp, storage) = make_storage();
        let result = storage.open_file("missing.txt").await;
        assert!(matches!(result, Err(StorageError::Io(err)) if err.kind() == ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_temp_files() {
        let (_temp, storage) = make_storage();
        storage.ensure_root().await.expect("ensure root");
        let stray = storage
            .temp_dir()
            .join("0b0e3f4c-8a9d-4c1e-9a57-5b1d1e2f3a4b.tmp");
        std::fs::write(&stray, b"x").expect("write temp");
        storage.write_file("keep.bin", b"x").await.expect("write file");

        let removed = storage
            .sweep_temp_files(Duration::from_secs(3600))
            .await
            .expect("sweep");
        assert_eq!(removed, 0);

        let removed = storage
            .sweep_temp_files(Duration::ZERO)
            .await
            .expect("sweep");
        assert_eq!(removed, 1);
        assert!(!stray.exists());
        assert!(storage.root_path().join("keep.bin").exists());
    }

    #[tokio::test]
    async fn sweep_keeps_uploads_named_like_temp_files() {
        let (_temp, storage) = make_storage();
        let names = [
            ".report.pdf.tmp.0b0e3f4c-8a9d-4c1e-9a57-5b1d1e2f3a4b",
            "0b0e3f4c-8a9d-4c1e-9a57-5b1d1e2f3a4b.tmp",
        ];
        for name in names {
            storage.write_file(name, b"user data").await.expect("write");
        }

        let removed = storage
            .sweep_temp_files(Duration::ZERO)
            .await
            .expect("sweep");
        assert_eq!(removed, 0);
        for name in names {
            let (_file, length) = storage.open_file(name).await.expect("open");
            assert_eq!(length, 9);
        }
    }
}
