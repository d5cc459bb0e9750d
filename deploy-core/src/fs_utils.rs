//! 文件树操作
//!
//! 备份、恢复与安装共用的复制、删除、切换逻辑。阻塞的文件系统操作都放到
//! `spawn_blocking` 中执行，避免阻塞异步运行时。

use crate::error::{DeployError, Result};
use nix::unistd::{Gid, Uid, chown};
use remove_dir_all::remove_dir_all;
use std::fs;
use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt, symlink};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// 判断文件名是否命中凭证规则
///
/// 规则支持精确文件名（`token.json`）和后缀匹配（`*.pem`）。
pub fn is_secret(file_name: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| match pattern.strip_prefix('*') {
        Some(suffix) => file_name.ends_with(suffix),
        None => file_name == pattern,
    })
}

/// 递归复制目录，保留符号链接本身（虚拟环境中的 python 是符号链接）
///
/// 文件和目录的属主、目录权限都沿用源目录；以 root 运行时，服务用户拥有的
/// 虚拟环境复制后仍归服务用户所有。返回复制的普通文件数量。
pub fn copy_tree(source: &Path, target: &Path) -> io::Result<u64> {
    fs::create_dir_all(target)?;
    let mut copied = 0u64;
    // 目录权限在内容复制完之后再设置，避免只读目录挡住子项写入
    let mut directories = vec![(target.to_path_buf(), fs::metadata(source)?)];

    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::other(format!("计算相对路径失败: {e}")))?;
        let destination = target.join(relative);
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            let link_target = fs::read_link(entry.path())?;
            copy_symlink(&link_target, &destination)?;
        } else if file_type.is_dir() {
            fs::create_dir_all(&destination)?;
            directories.push((destination, entry.metadata().map_err(io::Error::other)?));
        } else {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &destination)?;
            copy_owner(&entry.metadata().map_err(io::Error::other)?, &destination);
            copied += 1;
        }
    }

    for (path, meta) in directories.iter().rev() {
        copy_owner(meta, path);
        fs::set_permissions(path, meta.permissions())?;
    }

    Ok(copied)
}

/// 沿用源文件的属主；非 root 运行时无法改成其他用户，只记录日志
fn copy_owner(meta: &fs::Metadata, destination: &Path) {
    let owner = Some(Uid::from_raw(meta.uid()));
    let group = Some(Gid::from_raw(meta.gid()));
    if let Err(e) = chown(destination, owner, group) {
        debug!("无法保留属主 {}: {}", destination.display(), e);
    }
}

fn copy_symlink(link_target: &Path, destination: &Path) -> io::Result<()> {
    if destination.symlink_metadata().is_ok() {
        fs::remove_file(destination)?;
    }
    symlink(link_target, destination)
}

/// 删除目录树，不存在时直接返回
pub fn remove_tree(path: &Path) -> io::Result<()> {
    match path.symlink_metadata() {
        Ok(meta) if meta.is_dir() => remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// 将暂存目录切换为正式目录
///
/// 旧目录先改名为同级的 `.previous` 目录，新目录改名到正式路径后再删除旧目录；
/// 第二次改名失败时把旧目录改回原位。两次 rename 都在同一个父目录内完成。
pub fn swap_into_place(staging: &Path, live: &Path) -> io::Result<()> {
    let parent = live
        .parent()
        .ok_or_else(|| io::Error::other(format!("无效的目标路径: {}", live.display())))?;
    fs::create_dir_all(parent)?;

    if live.symlink_metadata().is_err() {
        return fs::rename(staging, live);
    }

    let previous = previous_path(live);
    remove_tree(&previous)?;
    fs::rename(live, &previous)?;

    if let Err(e) = fs::rename(staging, live) {
        warn!("⚠️ 切换目录失败，恢复原目录: {}", e);
        fs::rename(&previous, live)?;
        return Err(e);
    }

    if let Err(e) = remove_tree(&previous) {
        warn!("⚠️ 清理旧目录失败: {} - {}", previous.display(), e);
    }
    Ok(())
}

fn previous_path(live: &Path) -> PathBuf {
    let name = live
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "install".to_string());
    live.with_file_name(format!(".{name}.previous"))
}

/// 在目标目录旁创建暂存目录，并沿用目标目录的权限与属主
///
/// 暂存目录与目标目录位于同一父目录下，保证之后的 rename 不跨文件系统。
pub fn prepare_staging_dir(live: &Path) -> io::Result<TempDir> {
    let parent = live
        .parent()
        .ok_or_else(|| io::Error::other(format!("无效的目标路径: {}", live.display())))?;
    fs::create_dir_all(parent)?;

    let name = live
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "install".to_string());
    let staging = tempfile::Builder::new()
        .prefix(&format!(".{name}-staging-"))
        .tempdir_in(parent)?;

    match fs::metadata(live) {
        Ok(meta) => {
            fs::set_permissions(staging.path(), meta.permissions())?;
            copy_owner(&meta, staging.path());
        }
        Err(_) => {
            fs::set_permissions(staging.path(), fs::Permissions::from_mode(0o755))?;
        }
    }

    debug!("创建暂存目录: {}", staging.path().display());
    Ok(staging)
}

/// 在阻塞线程中执行文件操作，并把错误映射为部署错误
pub(crate) async fn run_blocking<T, F, E>(op: F, map_err: E) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> io::Result<T> + Send + 'static,
    E: FnOnce(String) -> DeployError,
{
    match tokio::task::spawn_blocking(op).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(map_err(e.to_string())),
        Err(e) => Err(map_err(format!("后台任务失败: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_secret_patterns() {
        let patterns = vec!["token.json".to_string(), "*.pem".to_string()];
        assert!(is_secret("token.json", &patterns));
        assert!(is_secret("client.pem", &patterns));
        assert!(!is_secret("settings.conf", &patterns));
        assert!(!is_secret("token.json.bak", &patterns));
    }

    #[test]
    fn test_copy_tree_preserves_content_and_symlinks() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        fs::create_dir_all(source.join("venv/bin")).unwrap();
        fs::write(source.join("app.py"), "print('hi')").unwrap();
        fs::write(source.join("venv/bin/python3"), "binary").unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink("python3", source.join("venv/bin/python")).unwrap();

        let target = temp.path().join("dst");
        let copied = copy_tree(&source, &target).unwrap();

        assert_eq!(copied, 2);
        assert_eq!(
            fs::read_to_string(target.join("app.py")).unwrap(),
            "print('hi')"
        );
        #[cfg(unix)]
        assert_eq!(
            fs::read_link(target.join("venv/bin/python")).unwrap(),
            PathBuf::from("python3")
        );
    }

    #[test]
    fn test_copy_tree_keeps_owner_and_directory_modes() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        fs::create_dir_all(source.join("venv/lib")).unwrap();
        fs::write(source.join("venv/lib/site.py"), "x").unwrap();
        fs::set_permissions(source.join("venv/lib"), fs::Permissions::from_mode(0o750)).unwrap();
        fs::set_permissions(&source, fs::Permissions::from_mode(0o711)).unwrap();

        // 只有 root 才能把文件改给其他用户
        let root = nix::unistd::geteuid().is_root();
        if root {
            chown(
                source.join("venv/lib/site.py").as_path(),
                Some(Uid::from_raw(4242)),
                Some(Gid::from_raw(4242)),
            )
            .unwrap();
        }

        let target = temp.path().join("dst");
        copy_tree(&source, &target).unwrap();

        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&target), 0o711);
        assert_eq!(mode(&target.join("venv/lib")), 0o750);

        let copied = fs::metadata(target.join("venv/lib/site.py")).unwrap();
        let original = fs::metadata(source.join("venv/lib/site.py")).unwrap();
        assert_eq!(copied.uid(), original.uid());
        assert_eq!(copied.gid(), original.gid());
        if root {
            assert_eq!(copied.uid(), 4242);
        }
    }

    #[test]
    fn test_swap_into_place_replaces_live_dir() {
        let temp = TempDir::new().unwrap();
        let live = temp.path().join("opt/meet-bot");
        let staging = temp.path().join("opt/.staging");
        fs::create_dir_all(&live).unwrap();
        fs::create_dir_all(&staging).unwrap();
        fs::write(live.join("VERSION"), "old").unwrap();
        fs::write(staging.join("VERSION"), "new").unwrap();

        swap_into_place(&staging, &live).unwrap();

        assert_eq!(fs::read_to_string(live.join("VERSION")).unwrap(), "new");
        assert!(!staging.exists());
        assert!(!previous_path(&live).exists());
    }

    #[test]
    fn test_swap_into_place_without_existing_live_dir() {
        let temp = TempDir::new().unwrap();
        let live = temp.path().join("fresh/meet-bot");
        let staging = temp.path().join("staging");
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("app.py"), "a").unwrap();

        swap_into_place(&staging, &live).unwrap();
        assert!(live.join("app.py").exists());
    }

    #[test]
    fn test_staging_dir_is_sibling_of_live_dir() {
        let temp = TempDir::new().unwrap();
        let live = temp.path().join("opt/meet-bot");
        fs::create_dir_all(&live).unwrap();
        fs::set_permissions(&live, fs::Permissions::from_mode(0o750)).unwrap();

        let staging = prepare_staging_dir(&live).unwrap();
        assert_eq!(staging.path().parent(), live.parent());
        let mode = fs::metadata(staging.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_remove_tree_missing_path_is_ok() {
        let temp = TempDir::new().unwrap();
        assert!(remove_tree(&temp.path().join("missing")).is_ok());
    }
}
