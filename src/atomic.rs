//! 临时写入与原子替换的辅助方法。

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use uuid::Uuid;

const TEMP_SUFFIX: &str = ".tmp";

/// 可用于原子替换的临时文件封装。
pub struct AtomicFile {
    target: PathBuf,
    temp_path: PathBuf,
    file: File,
}

impl AtomicFile {
    /// 在 `temp_dir` 中创建临时文件；`temp_dir` 须与目标位于同一文件系统。
    pub async fn new(target: &Path, temp_dir: &Path) -> io::Result<Self> {
        let temp_path = temp_dir.join(format!("{}{TEMP_SUFFIX}", Uuid::new_v4()));
        let file = File::create(&temp_path).await?;
        Ok(Self {
            target: target.to_path_buf(),
            temp_path,
            file,
        })
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    /// 放弃并清理临时文件。
    pub async fn cleanup(self) {
        drop(self.file);
        let _ = fs::remove_file(&self.temp_path).await;
    }

    /// 同步并原子替换目标文件。
    pub async fn finalize(self) -> io::Result<()> {
        if let Err(err) = self.file.sync_all().await {
            drop(self.file);
            let _ = fs::remove_file(&self.temp_path).await;
            return Err(err);
        }
        drop(self.file);

        if let Err(err) = fs::rename(&self.temp_path, &self.target).await {
            #[cfg(windows)]
            {
                if fs::remove_file(&self.target).await.is_ok() {
                    return fs::rename(&self.temp_path, &self.target).await;
                }
            }
            let _ = fs::remove_file(&self.temp_path).await;
            return Err(err);
        }

        if let Some(parent) = self.target.parent() {
            let _ = sync_dir(parent).await;
        }

        Ok(())
    }
}

/// 判断文件名是否为 [`AtomicFile`] 产生的临时文件。
pub fn is_temp_name(name: &str) -> bool {
    name.strip_suffix(TEMP_SUFFIX)
        .is_some_and(|id| Uuid::parse_str(id).is_ok())
}

#[cfg(unix)]
async fn sync_dir(path: &Path) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = std::fs::File::open(path)?;
        dir.sync_all()
    })
    .await
    .map_err(|err| io::Error::other(err.to_string()))?
}

#[cfg(not(unix))]
async fn sync_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}
