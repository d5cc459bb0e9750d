//! 升级编排
//!
//! 升级按 `BackingUp → Stopping → Installing → UpdatingDeps → Starting →
//! Verifying → Pruning → Done` 的顺序执行。备份完成之后的失败（停止超时除外）
//! 都会自动回滚到刚创建的备份；回滚再次失败时返回 `RollbackFatal`。

use crate::backup::{BackupManager, BackupRecord, PruneReport};
use crate::config::AppConfig;
use crate::constants::service::RECENT_LOG_LINES;
use crate::dependencies::{DependencyResolver, DependencyUpdater, PipResolver};
use crate::error::{DeployError, Result};
use crate::inspector::Inspector;
use crate::installer::Installer;
use crate::lock::OperationLock;
use crate::service::{
    HealthProbe, HttpHealthProbe, ServiceController, ServiceManager, ServiceStatus,
    ServiceTimings, SystemctlManager,
};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub type ProgressCallback = Box<dyn Fn(UpgradeStep, &str) + Send + Sync>;

/// 升级状态机的各个阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpgradeStep {
    Idle,
    BackingUp,
    Stopping,
    Installing,
    UpdatingDeps,
    Starting,
    Verifying,
    Pruning,
    Done,
    RollingBack,
}

impl UpgradeStep {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Idle => "预检",
            Self::BackingUp => "创建备份",
            Self::Stopping => "停止服务",
            Self::Installing => "安装发布包",
            Self::UpdatingDeps => "更新依赖",
            Self::Starting => "启动服务",
            Self::Verifying => "健康检查",
            Self::Pruning => "清理旧备份",
            Self::Done => "完成",
            Self::RollingBack => "回滚",
        }
    }

    /// 该阶段失败时是否需要自动回滚
    ///
    /// 安装之前旧版本没有任何改动，直接中止即可。
    pub fn requires_rollback(&self) -> bool {
        matches!(self, Self::Installing | Self::UpdatingDeps | Self::Starting)
    }
}

impl fmt::Display for UpgradeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// 升级结果
#[derive(Debug, Clone, Serialize)]
pub struct UpgradeReport {
    pub from_version: String,
    pub to_version: String,
    pub backup_path: PathBuf,
    /// 健康检查是否通过
    pub healthy: bool,
    /// 清理失败时为 None
    pub prune: Option<PruneReport>,
}

/// 回滚结果
#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
    pub backup_path: PathBuf,
    pub restored_version: String,
    pub healthy: bool,
}

/// 服务状态概览
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub service: String,
    pub version: String,
    pub status: ServiceStatus,
    pub recent_logs: Vec<String>,
}

/// 升级编排器
pub struct Orchestrator<S, H, D> {
    config: AppConfig,
    manager: Arc<S>,
    probe: Arc<H>,
    inspector: Inspector<S>,
    backups: BackupManager,
    controller: ServiceController<S, H>,
    installer: Installer<S>,
    dependencies: DependencyUpdater<D>,
    progress: Option<ProgressCallback>,
    actor: String,
}

/// 生产环境使用的编排器
pub type SystemOrchestrator = Orchestrator<SystemctlManager, HttpHealthProbe, PipResolver>;

impl SystemOrchestrator {
    pub fn from_config(config: AppConfig) -> Self {
        let probe = HttpHealthProbe::new(config.service.health_url.clone());
        Orchestrator::new(
            config,
            Arc::new(SystemctlManager::new()),
            Arc::new(probe),
            Arc::new(PipResolver::new()),
        )
    }
}

impl<S, H, D> Orchestrator<S, H, D>
where
    S: ServiceManager,
    H: HealthProbe,
    D: DependencyResolver,
{
    pub fn new(config: AppConfig, manager: Arc<S>, probe: Arc<H>, resolver: Arc<D>) -> Self {
        let timings = ServiceTimings::from(&config.timeouts);
        Self {
            inspector: Inspector::new(&config, manager.clone()),
            backups: BackupManager::new(&config),
            controller: ServiceController::new(
                manager.clone(),
                probe.clone(),
                config.service.name.clone(),
                timings,
            ),
            installer: Installer::new(&config, manager.clone()),
            dependencies: DependencyUpdater::new(&config, resolver),
            progress: None,
            actor: current_actor(),
            config,
            manager,
            probe,
        }
    }

    /// 覆盖配置文件中的超时参数
    pub fn with_timings(mut self, timings: ServiceTimings) -> Self {
        self.controller = ServiceController::new(
            self.manager.clone(),
            self.probe.clone(),
            self.config.service.name.clone(),
            timings,
        );
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn with_actor<A: Into<String>>(mut self, actor: A) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn check_prerequisites(&self) -> Result<()> {
        self.controller.check_prerequisites()
    }

    /// 执行完整升级流程
    pub async fn upgrade(&self, bundle_path: &Path) -> Result<UpgradeReport> {
        let _lock = OperationLock::acquire(&self.config.get_lock_path())?;

        self.report(UpgradeStep::Idle, "校验发布包");
        self.installer.validate_bundle(bundle_path)?;

        let from_version = self.inspector.current_version();
        let status = self.inspector.service_status().await;
        info!("当前版本: {} ({})", from_version, status);

        self.report(UpgradeStep::BackingUp, "备份当前安装");
        let record = self
            .backups
            .create_backup(&from_version, status, &self.actor)
            .await?;

        let to_version = match self.apply(bundle_path).await {
            Ok(version) => version,
            Err((step, e)) if step.requires_rollback() => {
                return Err(self.recover(step, e, &record).await);
            }
            Err((step, e)) => {
                error!("❌ {}阶段失败，旧版本未改动: {}", step, e);
                return Err(e);
            }
        };

        self.report(UpgradeStep::Verifying, "检查服务健康状态");
        let healthy = self.controller.probe_health_default().await;

        self.report(UpgradeStep::Pruning, "清理旧备份");
        let prune = match self.backups.prune_backups(self.config.backup.retain).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("⚠️ 清理旧备份失败: {}", e);
                None
            }
        };

        self.report(UpgradeStep::Done, "升级完成");
        info!("🎉 升级完成: {} → {}", from_version, to_version);
        Ok(UpgradeReport {
            from_version,
            to_version,
            backup_path: record.path,
            healthy,
            prune,
        })
    }

    /// 停止、安装、更新依赖、启动；失败时带上所在阶段
    async fn apply(&self, bundle_path: &Path) -> std::result::Result<String, (UpgradeStep, DeployError)> {
        self.report(UpgradeStep::Stopping, "停止服务");
        self.controller
            .stop_default()
            .await
            .map_err(|e| (UpgradeStep::Stopping, e))?;

        self.report(UpgradeStep::Installing, "安装发布包");
        let version = self
            .installer
            .install(bundle_path)
            .await
            .map_err(|e| (UpgradeStep::Installing, e))?;

        self.report(UpgradeStep::UpdatingDeps, "更新依赖");
        self.dependencies
            .update()
            .await
            .map_err(|e| (UpgradeStep::UpdatingDeps, e))?;

        self.report(UpgradeStep::Starting, "启动服务");
        self.controller
            .start_default()
            .await
            .map_err(|e| (UpgradeStep::Starting, e))?;

        Ok(version)
    }

    async fn recover(&self, step: UpgradeStep, cause: DeployError, record: &BackupRecord) -> DeployError {
        error!("❌ {}阶段失败: {}", step, cause);
        self.report(UpgradeStep::RollingBack, "自动回滚到升级前的备份");

        match self.restore_from(record).await {
            Ok(_) => {
                info!("✅ 已回滚到版本 {}", record.info.previous_version);
                DeployError::RolledBack {
                    step: step.display_name().to_string(),
                    source: Box::new(cause),
                }
            }
            Err(rollback_error) => {
                error!("❌ 回滚失败: {}", rollback_error);
                DeployError::rollback_fatal(format!(
                    "{step}阶段失败 ({cause})，回滚时再次失败: {rollback_error}"
                ))
            }
        }
    }

    /// 停止服务、恢复安装目录和单元文件、再启动服务；返回健康检查结果
    async fn restore_from(&self, record: &BackupRecord) -> Result<bool> {
        self.controller.stop_default().await?;

        if self.backups.restore(record).await? {
            self.manager.reload_definitions().await?;
        }

        self.controller.start_default().await?;
        Ok(self.controller.probe_health_default().await)
    }

    /// 根据最近备份指针回滚
    pub async fn rollback(&self) -> Result<RollbackReport> {
        let _lock = OperationLock::acquire(&self.config.get_lock_path())?;

        let record = self.backups.last_backup().await?;
        info!(
            "回滚到备份 {} (版本 {})",
            record.name(),
            record.info.previous_version
        );

        self.report(UpgradeStep::RollingBack, "从最近的备份恢复");
        let healthy = self.restore_from(&record).await.map_err(|e| {
            error!("❌ 回滚失败: {}", e);
            DeployError::rollback_fatal(e.to_string())
        })?;

        self.report(UpgradeStep::Done, "回滚完成");
        Ok(RollbackReport {
            restored_version: self.inspector.current_version(),
            backup_path: record.path,
            healthy,
        })
    }

    /// 只创建备份
    pub async fn backup(&self) -> Result<BackupRecord> {
        let _lock = OperationLock::acquire(&self.config.get_lock_path())?;

        let version = self.inspector.current_version();
        let status = self.inspector.service_status().await;
        self.report(UpgradeStep::BackingUp, "备份当前安装");
        self.backups.create_backup(&version, status, &self.actor).await
    }

    /// 只清理旧备份，未指定数量时使用配置的保留数量
    pub async fn clean(&self, retain: Option<usize>) -> Result<PruneReport> {
        let _lock = OperationLock::acquire(&self.config.get_lock_path())?;

        let retain = retain.unwrap_or(self.config.backup.retain);
        self.report(UpgradeStep::Pruning, "清理旧备份");
        self.backups.prune_backups(retain).await
    }

    pub async fn list_backups(&self) -> Result<Vec<BackupRecord>> {
        self.backups.list_backups().await
    }

    /// 最近备份指针引用的记录
    pub async fn last_backup(&self) -> Result<BackupRecord> {
        self.backups.last_backup().await
    }

    /// 查询状态，只读且不会失败
    pub async fn status(&self) -> StatusReport {
        StatusReport {
            service: self.config.service.name.clone(),
            version: self.inspector.current_version(),
            status: self.inspector.service_status().await,
            recent_logs: self.inspector.recent_activity(RECENT_LOG_LINES).await,
        }
    }

    fn report(&self, step: UpgradeStep, message: &str) {
        debug!("[{:?}] {}", step, message);
        if let Some(callback) = &self.progress {
            callback(step, message);
        }
    }
}

/// 发起操作的用户：优先取 sudo 之前的用户
pub fn current_actor() -> String {
    if let Some(user) = std::env::var("SUDO_USER").ok().filter(|u| !u.is_empty()) {
        return user;
    }

    let uid = nix::unistd::geteuid();
    match nix::unistd::User::from_uid(uid) {
        Ok(Some(user)) => user.name,
        _ => format!("uid:{uid}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_names() {
        assert_eq!(UpgradeStep::Stopping.to_string(), "停止服务");
        assert_eq!(UpgradeStep::RollingBack.display_name(), "回滚");
    }

    #[test]
    fn test_rollback_only_after_install_begins() {
        assert!(!UpgradeStep::Idle.requires_rollback());
        assert!(!UpgradeStep::BackingUp.requires_rollback());
        assert!(!UpgradeStep::Stopping.requires_rollback());
        assert!(UpgradeStep::Installing.requires_rollback());
        assert!(UpgradeStep::UpdatingDeps.requires_rollback());
        assert!(UpgradeStep::Starting.requires_rollback());
        assert!(!UpgradeStep::Verifying.requires_rollback());
        assert!(!UpgradeStep::Pruning.requires_rollback());
    }

    #[test]
    fn test_current_actor_is_not_empty() {
        assert!(!current_actor().is_empty());
    }
}
