//! 备份管理
//!
//! 每条备份记录是备份根目录下的一个子目录：
//!
//! ```text
//! meet-bot_20250601_120000_123/
//! ├── app/                 安装目录的完整副本
//! ├── meet-bot.service     单元文件（可选）
//! ├── config/              非凭证配置文件（可选）
//! └── backup_info          元数据，最后写入
//! ```
//!
//! 没有 `backup_info` 的目录视为不完整，不会被列出或用于恢复。

use crate::config::AppConfig;
use crate::constants::backup::{APP_DIR, CONFIG_DIR, INFO_FILE, TIMESTAMP_FORMAT};
use crate::error::{DeployError, Result};
use crate::fs_utils::{self, run_blocking};
use crate::service::ServiceStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 备份元数据（`backup_info`）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub service: String,
    pub created_at: DateTime<Utc>,
    pub previous_version: String,
    pub service_status: ServiceStatus,
    /// 执行备份的用户
    pub actor: String,
    pub hostname: String,
    pub has_unit_file: bool,
    #[serde(default)]
    pub config_files: Vec<String>,
}

/// 一条完整的备份记录
#[derive(Debug, Clone, PartialEq)]
pub struct BackupRecord {
    pub path: PathBuf,
    pub info: BackupInfo,
}

impl BackupRecord {
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn app_dir(&self) -> PathBuf {
        self.path.join(APP_DIR)
    }

    pub fn config_dir(&self) -> PathBuf {
        self.path.join(CONFIG_DIR)
    }

    /// 从记录目录读取元数据
    fn load(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path.join(INFO_FILE))?;
        let info: BackupInfo = toml::from_str(&content).map_err(io::Error::other)?;
        Ok(Self {
            path: path.to_path_buf(),
            info,
        })
    }
}

/// 最近一次备份的指针记录（`last_backup.toml`）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastBackupPointer {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub previous_version: String,
}

/// 清理结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    pub removed: Vec<PathBuf>,
    pub kept: Vec<PathBuf>,
    /// 超出保留数量但因被指针引用而保留的记录
    pub protected: Option<PathBuf>,
}

/// 备份管理器
#[derive(Debug, Clone)]
pub struct BackupManager {
    backup_root: PathBuf,
    pointer_path: PathBuf,
    install_dir: PathBuf,
    config_dir: PathBuf,
    unit_path: PathBuf,
    unit_file_name: String,
    service_name: String,
    secret_patterns: Vec<String>,
}

impl BackupManager {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            backup_root: config.get_backup_dir(),
            pointer_path: config.get_last_backup_path(),
            install_dir: config.get_install_dir(),
            config_dir: config.get_config_dir(),
            unit_path: config.get_unit_path(),
            unit_file_name: config.service.unit_file.clone(),
            service_name: config.service.name.clone(),
            secret_patterns: config.backup.secret_patterns.clone(),
        }
    }

    /// 创建备份并更新最近备份指针
    pub async fn create_backup(
        &self,
        previous_version: &str,
        service_status: ServiceStatus,
        actor: &str,
    ) -> Result<BackupRecord> {
        info!("💾 创建备份到 {}", self.backup_root.display());

        let manager = self.clone();
        let info = BackupInfo {
            service: self.service_name.clone(),
            created_at: Utc::now(),
            previous_version: previous_version.to_string(),
            service_status,
            actor: actor.to_string(),
            hostname: current_hostname(),
            has_unit_file: false,
            config_files: Vec::new(),
        };

        let record = run_blocking(move || manager.write_record(info), DeployError::backup).await?;

        // 记录完整后才更新指针；失败时保留旧指针
        let pointer = LastBackupPointer {
            path: record.path.clone(),
            created_at: record.info.created_at,
            previous_version: record.info.previous_version.clone(),
        };
        let pointer_path = self.pointer_path.clone();
        run_blocking(
            move || write_pointer(&pointer_path, &pointer),
            DeployError::backup,
        )
        .await?;

        info!("✅ 备份已创建: {}", record.path.display());
        Ok(record)
    }

    fn write_record(&self, mut info: BackupInfo) -> io::Result<BackupRecord> {
        fs::create_dir_all(&self.backup_root)?;
        let record_dir = self.allocate_record_dir(&info.created_at)?;

        match self.fill_record(&record_dir, &mut info) {
            Ok(()) => Ok(BackupRecord {
                path: record_dir,
                info,
            }),
            Err(e) => {
                warn!("❌ 备份失败，清理不完整的备份目录: {}", record_dir.display());
                if let Err(cleanup) = fs_utils::remove_tree(&record_dir) {
                    warn!("清理失败: {}", cleanup);
                }
                Err(e)
            }
        }
    }

    /// 按 app → 单元文件 → 配置 → 元数据的顺序写入
    fn fill_record(&self, record_dir: &Path, info: &mut BackupInfo) -> io::Result<()> {
        let app_dir = record_dir.join(APP_DIR);
        fs::create_dir_all(&app_dir)?;
        if self.install_dir.is_dir() {
            let files = fs_utils::copy_tree(&self.install_dir, &app_dir)?;
            debug!("已备份 {} 个安装文件", files);
        } else {
            info!("安装目录不存在，创建空备份: {}", self.install_dir.display());
        }

        if self.unit_path.is_file() {
            fs::copy(&self.unit_path, record_dir.join(&self.unit_file_name))?;
            info.has_unit_file = true;
        }

        if self.config_dir.is_dir() {
            info.config_files = self.copy_config(&record_dir.join(CONFIG_DIR))?;
        }

        let content = toml::to_string_pretty(&*info).map_err(io::Error::other)?;
        fs::write(record_dir.join(INFO_FILE), content)?;
        Ok(())
    }

    /// 复制配置目录下的普通文件，跳过凭证
    fn copy_config(&self, target: &Path) -> io::Result<Vec<String>> {
        let mut copied = Vec::new();
        for entry in fs::read_dir(&self.config_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if fs_utils::is_secret(&name, &self.secret_patterns) {
                debug!("跳过凭证文件: {}", name);
                continue;
            }
            fs::create_dir_all(target)?;
            fs::copy(entry.path(), target.join(&name))?;
            copied.push(name);
        }
        copied.sort();
        Ok(copied)
    }

    fn allocate_record_dir(&self, created_at: &DateTime<Utc>) -> io::Result<PathBuf> {
        let base = format!("{}_{}", self.service_name, created_at.format(TIMESTAMP_FORMAT));
        let mut candidate = self.backup_root.join(&base);
        let mut suffix = 1;
        loop {
            match fs::create_dir(&candidate) {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    candidate = self.backup_root.join(format!("{base}_{suffix}"));
                    suffix += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// 列出所有完整的备份记录，按创建时间从新到旧排序
    pub async fn list_backups(&self) -> Result<Vec<BackupRecord>> {
        let root = self.backup_root.clone();
        run_blocking(move || scan_records(&root), DeployError::backup).await
    }

    /// 读取最近备份指针，并确认其指向的记录仍然完整
    pub async fn last_backup(&self) -> Result<BackupRecord> {
        let pointer = match read_pointer(&self.pointer_path) {
            Ok(Some(pointer)) => pointer,
            Ok(None) => return Err(DeployError::rollback_not_found("尚未创建任何备份")),
            Err(e) => {
                return Err(DeployError::rollback_not_found(format!(
                    "无法读取备份指针 {}: {}",
                    self.pointer_path.display(),
                    e
                )));
            }
        };

        if !pointer.path.is_dir() {
            return Err(DeployError::rollback_not_found(format!(
                "备份目录不存在: {}",
                pointer.path.display()
            )));
        }

        BackupRecord::load(&pointer.path).map_err(|e| {
            DeployError::rollback_not_found(format!(
                "备份记录不完整 {}: {}",
                pointer.path.display(),
                e
            ))
        })
    }

    /// 按保留数量清理旧备份，指针引用的记录始终保留
    pub async fn prune_backups(&self, retain: usize) -> Result<PruneReport> {
        let records = self.list_backups().await?;
        let protected_path = match read_pointer(&self.pointer_path) {
            Ok(pointer) => pointer.map(|p| p.path),
            Err(e) => {
                warn!("⚠️ 无法读取备份指针: {}", e);
                None
            }
        };

        if records.len() <= retain {
            debug!("备份数量 {} 未超过保留数量 {}", records.len(), retain);
            return Ok(PruneReport {
                kept: records.into_iter().map(|r| r.path).collect(),
                ..Default::default()
            });
        }

        info!("🧹 清理旧备份，保留最近 {} 个", retain);
        let mut report = PruneReport::default();
        for (index, record) in records.into_iter().enumerate() {
            if index < retain {
                report.kept.push(record.path);
                continue;
            }
            if protected_path.as_deref() == Some(record.path.as_path()) {
                info!("保留最近备份指针引用的记录: {}", record.name());
                report.protected = Some(record.path.clone());
                report.kept.push(record.path);
                continue;
            }

            let name = record.name();
            let target = record.path.clone();
            run_blocking(move || fs_utils::remove_tree(&target), DeployError::backup).await?;
            info!("🗑️ 已删除备份: {}", name);
            report.removed.push(record.path);
        }

        Ok(report)
    }

    /// 用备份记录替换安装目录，并把单元文件恢复到备份时的状态
    ///
    /// 备份时不存在单元文件的，删除当前的单元文件。返回单元文件是否有变动，
    /// 调用方据此决定是否重新加载服务定义。
    pub async fn restore(&self, record: &BackupRecord) -> Result<bool> {
        info!("♻️ 从备份恢复: {}", record.path.display());

        let app_dir = record.app_dir();
        if !app_dir.is_dir() {
            return Err(DeployError::rollback_not_found(format!(
                "备份中缺少 app 目录: {}",
                app_dir.display()
            )));
        }

        let install_dir = self.install_dir.clone();
        run_blocking(
            move || {
                let staging = fs_utils::prepare_staging_dir(&install_dir)?;
                fs_utils::copy_tree(&app_dir, staging.path())?;
                fs_utils::swap_into_place(staging.path(), &install_dir)
            },
            DeployError::backup,
        )
        .await?;

        let unit_backup = record.path.join(&self.unit_file_name);
        let unit_path = self.unit_path.clone();
        let unit_changed = if record.info.has_unit_file {
            run_blocking(
                move || {
                    if !unit_backup.is_file() {
                        return Err(io::Error::other(format!(
                            "备份中缺少单元文件: {}",
                            unit_backup.display()
                        )));
                    }
                    if let Some(parent) = unit_path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::copy(&unit_backup, &unit_path).map(|_| ())
                },
                DeployError::backup,
            )
            .await?;
            info!("已恢复单元文件: {}", self.unit_path.display());
            true
        } else if unit_path.is_file() {
            // 备份时没有单元文件，删除升级过程中新装的单元文件
            run_blocking(move || fs::remove_file(&unit_path), DeployError::backup).await?;
            info!("已删除备份之后新增的单元文件: {}", self.unit_path.display());
            true
        } else {
            false
        };

        info!("✅ 安装目录已恢复");
        Ok(unit_changed)
    }
}

fn scan_records(root: &Path) -> io::Result<Vec<BackupRecord>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let path = entry.path();
        if !path.join(INFO_FILE).is_file() {
            debug!("跳过不完整的备份目录: {}", path.display());
            continue;
        }
        match BackupRecord::load(&path) {
            Ok(record) => records.push(record),
            Err(e) => warn!("⚠️ 无法解析备份元数据 {}: {}", path.display(), e),
        }
    }

    records.sort_by(|a, b| {
        b.info
            .created_at
            .cmp(&a.info.created_at)
            .then_with(|| b.path.cmp(&a.path))
    });
    Ok(records)
}

fn read_pointer(path: &Path) -> io::Result<Option<LastBackupPointer>> {
    match fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content)
            .map(Some)
            .map_err(io::Error::other),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// 先写临时文件再改名，避免留下半个指针文件
fn write_pointer(path: &Path, pointer: &LastBackupPointer) -> io::Result<()> {
    let content = toml::to_string_pretty(pointer).map_err(io::Error::other)?;
    let tmp = path.with_extension("toml.tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)
}

fn current_hostname() -> String {
    nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
