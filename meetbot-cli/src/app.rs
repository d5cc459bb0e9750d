use anyhow::Result;
use deploy_core::config::AppConfig;
use deploy_core::upgrade::{SystemOrchestrator, UpgradeStep};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::cli::Commands;
use crate::commands;
use crate::utils::step_reporter;

pub struct CliApp {
    pub config_path: PathBuf,
    pub orchestrator: SystemOrchestrator,
    /// 最近进入的升级阶段，用于失败时的总结
    pub last_step: Arc<Mutex<Option<UpgradeStep>>>,
}

impl CliApp {
    /// 使用指定配置文件路径初始化CLI应用
    pub fn new_with_config_path<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();
        let config = AppConfig::load_or_default(config_path)?;
        Ok(Self::with_config(config_path, config))
    }

    /// 配置文件无法解析时回退到默认配置，供只读命令使用
    pub fn new_lenient<P: AsRef<Path>>(config_path: P) -> Self {
        let config_path = config_path.as_ref();
        let config = AppConfig::load_or_default(config_path).unwrap_or_else(|e| {
            warn!("⚠️ 无法加载配置文件 {}，使用默认配置: {}", config_path.display(), e);
            AppConfig::default()
        });
        Self::with_config(config_path, config)
    }

    /// 按命令初始化：`status` 总能运行，其余命令要求配置有效
    pub fn for_command<P: AsRef<Path>>(config_path: P, command: &Commands) -> Result<Self> {
        match command {
            Commands::Status { .. } => Ok(Self::new_lenient(config_path)),
            _ => Self::new_with_config_path(config_path),
        }
    }

    fn with_config(config_path: &Path, config: AppConfig) -> Self {
        debug!("使用配置: {} (安装目录 {})", config_path.display(), config.paths.install_dir);

        let last_step = Arc::new(Mutex::new(None));
        let orchestrator =
            SystemOrchestrator::from_config(config).with_progress(step_reporter(last_step.clone()));

        Self {
            config_path: config_path.to_path_buf(),
            orchestrator,
            last_step,
        }
    }

    pub fn config(&self) -> &AppConfig {
        self.orchestrator.config()
    }

    /// 失败时停留的阶段
    pub fn failed_step(&self) -> Option<UpgradeStep> {
        self.last_step.lock().ok().and_then(|step| *step)
    }

    /// 运行应用命令
    pub async fn run_command(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Upgrade { args } => commands::run_upgrade(self, args).await,
            Commands::Rollback { yes } => commands::run_rollback(self, yes).await,
            Commands::Status { json } => commands::run_status(self, json).await,
            Commands::Backup => commands::run_backup(self).await,
            Commands::Clean { keep } => commands::run_clean(self, keep).await,
            Commands::ListBackups { json } => commands::run_list_backups(self, json).await,
        }
    }
}
