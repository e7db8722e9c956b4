//! 已上传文件的内存索引。
//!
//! The registry is a best-effort index: it is never re-validated against the
//! storage root, so an entry may outlive its file and a file may exist without
//! an entry.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileMetadata {
    pub name: String,
    pub uploaded_at: DateTime<Utc>,
}

impl FileMetadata {
    /// 以当前时间创建元数据。
    pub fn now(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uploaded_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
pub struct FileRegistry {
    entries: RwLock<HashMap<String, FileMetadata>>,
}

impl FileRegistry {
    /// 使用示例条目初始化，这些条目不要求存在对应文件。
    pub fn with_samples<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = names
            .into_iter()
            .map(|name| {
                let metadata = FileMetadata::now(name);
                (metadata.name.clone(), metadata)
            })
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// 插入或覆盖同名条目。
    pub async fn put(&self, metadata: FileMetadata) {
        self.entries
            .write()
            .await
            .insert(metadata.name.clone(), metadata);
    }

    /// 返回按名称（忽略大小写）排序的快照。
    pub async fn list(&self) -> Vec<FileMetadata> {
        let mut snapshot: Vec<FileMetadata> =
            self.entries.read().await.values().cloned().collect();
        snapshot.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name))
        });
        snapshot
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
