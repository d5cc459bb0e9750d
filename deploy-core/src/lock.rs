use crate::error::{DeployError, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 部署操作互斥锁
///
/// 持有期间其他进程无法获取同一把锁；句柄 drop 时由操作系统释放。
#[derive(Debug)]
pub struct OperationLock {
    _file: File,
    path: PathBuf,
}

impl OperationLock {
    /// 非阻塞地获取排他锁，已被占用时返回 `LockHeld`
    pub fn acquire(lock_path: &Path) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                // 记录持有者 PID 便于排查
                let _ = file.set_len(0);
                let _ = writeln!(file, "{}", std::process::id());
                debug!("已获取部署锁: {}", lock_path.display());
                Ok(Self {
                    _file: file,
                    path: lock_path.to_path_buf(),
                })
            }
            Err(e) => {
                debug!("获取部署锁失败: {} (kind: {:?})", e, e.kind());
                Err(DeployError::LockHeld {
                    path: lock_path.to_path_buf(),
                })
            }
        }
    }
}

impl Drop for OperationLock {
    fn drop(&mut self) {
        debug!("释放部署锁: {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_fails_until_released() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("backups/.deploy.lock");

        let first = OperationLock::acquire(&path).unwrap();
        let second = OperationLock::acquire(&path);
        assert!(matches!(second, Err(DeployError::LockHeld { .. })));

        drop(first);
        assert!(OperationLock::acquire(&path).is_ok());
    }
}
