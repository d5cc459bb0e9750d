//! 发布包校验与安装
//!
//! 安装时先在安装目录旁复制一份当前安装，再覆盖发布包中的文件，最后整体切换到
//! 正式路径。切换前的任何失败都不会影响正在使用的安装目录。

use crate::config::{AppConfig, BundleConfig};
use crate::constants::bundle::VERSION_DATE_FORMAT;
use crate::error::{DeployError, Result};
use crate::fs_utils::{self, run_blocking};
use crate::service::ServiceManager;
use chrono::Local;
use nix::unistd::{User, chown};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 安装器
pub struct Installer<S> {
    manager: Arc<S>,
    bundle: BundleConfig,
    install_dir: PathBuf,
    unit_path: PathBuf,
    unit_file_name: String,
    service_user: String,
}

impl<S: ServiceManager> Installer<S> {
    pub fn new(config: &AppConfig, manager: Arc<S>) -> Self {
        Self {
            manager,
            bundle: config.bundle.clone(),
            install_dir: config.get_install_dir(),
            unit_path: config.get_unit_path(),
            unit_file_name: config.service.unit_file.clone(),
            service_user: config.service.user.clone(),
        }
    }

    /// 检查发布包是否包含必需文件，不修改任何文件
    pub fn validate_bundle(&self, bundle_path: &Path) -> Result<()> {
        validate_bundle(&self.bundle, bundle_path)
    }

    /// 安装发布包，返回安装后的版本号
    ///
    /// 升级流程在停服前已经预检过发布包，这里再校验一次只用于发现预检之后发布包
    /// 被改动的情况。此时返回的 `MissingFile` 属于安装阶段失败，会触发自动回滚。
    pub async fn install(&self, bundle_path: &Path) -> Result<String> {
        self.validate_bundle(bundle_path)?;
        info!("📦 安装发布包: {}", bundle_path.display());

        let plan = StagePlan {
            bundle_path: bundle_path.to_path_buf(),
            install_dir: self.install_dir.clone(),
            bundle: self.bundle.clone(),
            service_user: self.service_user.clone(),
        };
        let version = run_blocking(move || plan.execute(), DeployError::install).await?;
        info!("✅ 已安装版本 {}", version);

        let unit_source = bundle_path.join(&self.unit_file_name);
        if unit_source.is_file() {
            self.install_unit_file(&unit_source).await?;
        }

        Ok(version)
    }

    async fn install_unit_file(&self, unit_source: &Path) -> Result<()> {
        info!("📝 更新服务单元文件: {}", self.unit_path.display());
        if let Some(parent) = self.unit_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DeployError::install(format!("无法创建单元文件目录: {e}")))?;
        }
        tokio::fs::copy(unit_source, &self.unit_path)
            .await
            .map_err(|e| DeployError::install(format!("无法复制单元文件: {e}")))?;

        self.manager.reload_definitions().await
    }
}

/// 校验发布包
pub fn validate_bundle(bundle: &BundleConfig, bundle_path: &Path) -> Result<()> {
    if !bundle_path.is_dir() {
        return Err(DeployError::missing_file("bundle", bundle_path));
    }

    let app = bundle_path.join(&bundle.app_file);
    if !app.is_file() {
        return Err(DeployError::missing_file("app", app));
    }

    let requirements = bundle_path.join(&bundle.requirements_file);
    if !requirements.is_file() {
        return Err(DeployError::missing_file("requirements", requirements));
    }

    debug!("发布包校验通过: {}", bundle_path.display());
    Ok(())
}

/// 在阻塞线程中执行的暂存与切换
struct StagePlan {
    bundle_path: PathBuf,
    install_dir: PathBuf,
    bundle: BundleConfig,
    service_user: String,
}

impl StagePlan {
    fn execute(self) -> io::Result<String> {
        let staging = fs_utils::prepare_staging_dir(&self.install_dir)?;
        let stage = staging.path();

        if self.install_dir.is_dir() {
            fs_utils::copy_tree(&self.install_dir, stage)?;
        }

        let app_target = stage.join(&self.bundle.app_file);
        fs::copy(self.bundle_path.join(&self.bundle.app_file), &app_target)?;
        fs::copy(
            self.bundle_path.join(&self.bundle.requirements_file),
            stage.join(&self.bundle.requirements_file),
        )?;

        let version = self.stamp_version(stage)?;
        self.fix_artifact(&app_target)?;

        fs_utils::swap_into_place(stage, &self.install_dir)?;
        Ok(version)
    }

    /// 优先使用发布包中的版本文件，否则以当前日期生成
    fn stamp_version(&self, stage: &Path) -> io::Result<String> {
        let source = self.bundle_path.join(&self.bundle.version_file);
        let target = stage.join(&self.bundle.version_file);

        let declared = match fs::read_to_string(&source) {
            Ok(content) => content.lines().next().map(|l| l.trim().to_string()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };

        match declared.filter(|v| !v.is_empty()) {
            Some(version) => {
                fs::copy(&source, &target)?;
                Ok(version)
            }
            None => {
                let version = Local::now().format(VERSION_DATE_FORMAT).to_string();
                info!("发布包未提供版本号，使用日期版本 {}", version);
                fs::write(&target, format!("{version}\n"))?;
                Ok(version)
            }
        }
    }

    fn fix_artifact(&self, artifact: &Path) -> io::Result<()> {
        fs::set_permissions(artifact, fs::Permissions::from_mode(0o755))?;

        match User::from_name(&self.service_user) {
            Ok(Some(user)) => {
                if let Err(e) = chown(artifact, Some(user.uid), Some(user.gid)) {
                    warn!("⚠️ 无法将 {} 的属主设置为 {}: {}", artifact.display(), self.service_user, e);
                }
            }
            Ok(None) => debug!("服务用户 {} 不存在，跳过设置属主", self.service_user),
            Err(e) => warn!("⚠️ 查询服务用户失败: {}", e),
        }
        Ok(())
    }
}
