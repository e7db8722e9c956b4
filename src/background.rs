//! 定期清理存储根目录中残留的临时文件。

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::TEMP_CLEAN_INTERVAL_SECS;
use crate::storage::Storage;

/// 启动临时文件清理任务；`temp_ttl` 为零时不启动。
pub fn spawn_temp_sweeper(storage: Arc<Storage>, temp_ttl: Duration) {
    if temp_ttl.is_zero() {
        return;
    }
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(TEMP_CLEAN_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match storage.sweep_temp_files(temp_ttl).await {
                Ok(removed) => debug!(removed, "temp sweep finished"),
                Err(err) => warn!(error = %err, "temp sweep failed"),
            }
        }
    });
}
