//! 按文件名的内存锁：串行化同名文件的写入与登记。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time;

/// Lock wait exceeded its timeout.
#[derive(Debug)]
pub struct LockTimeout;

/// Manages asynchronous mutexes keyed by file name.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在给定超时时间内获取文件名锁。
    pub async fn lock_name_with_timeout(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<OwnedMutexGuard<()>, LockTimeout> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Entries only referenced by the table are idle.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| LockTimeout)
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_name_waits_and_times_out() {
        let manager = LockManager::new();
        let _guard = manager
            .lock_name_with_timeout("a.txt", Duration::from_secs(1))
            .await
            .expect("first lock");

        let second = manager
            .lock_name_with_timeout("a.txt", Duration::from_millis(20))
            .await;
        assert!(second.is_err());

        let other = manager
            .lock_name_with_timeout("b.txt", Duration::from_millis(20))
            .await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let manager = LockManager::new();
        for name in ["a", "b", "c"] {
            let guard = manager
                .lock_name_with_timeout(name, Duration::from_secs(1))
                .await
                .expect("lock");
            drop(guard);
        }
        assert_eq!(manager.tracked().await, 1);
    }
}
