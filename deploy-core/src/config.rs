use crate::constants::{backup, bundle, paths, service, timeout};
use crate::error::{DeployError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 应用配置结构
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub bundle: BundleConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// 被管理服务的配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceConfig {
    /// 服务名称，备份目录以它为前缀
    pub name: String,
    /// systemd 单元文件名
    pub unit_file: String,
    /// 运行服务的系统用户，安装后入口文件归属该用户
    pub user: String,
    /// 健康检查地址
    pub health_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: service::SERVICE_NAME.to_string(),
            unit_file: service::UNIT_FILE_NAME.to_string(),
            user: service::SERVICE_USER.to_string(),
            health_url: service::HEALTH_URL.to_string(),
        }
    }
}

/// 路径配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PathsConfig {
    pub install_dir: String,
    pub config_dir: String,
    pub systemd_dir: String,
    pub backup_root: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            install_dir: paths::INSTALL_DIR.to_string(),
            config_dir: paths::CONFIG_DIR.to_string(),
            systemd_dir: paths::SYSTEMD_DIR.to_string(),
            backup_root: paths::BACKUP_ROOT.to_string(),
        }
    }
}

/// 发布包文件名配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BundleConfig {
    pub app_file: String,
    pub requirements_file: String,
    pub version_file: String,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            app_file: bundle::APP_FILE.to_string(),
            requirements_file: bundle::REQUIREMENTS_FILE.to_string(),
            version_file: bundle::VERSION_FILE.to_string(),
        }
    }
}

/// 备份相关配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackupConfig {
    /// 保留的备份数量
    pub retain: usize,
    /// 不进入备份的凭证文件，支持 `*.ext` 形式的后缀匹配
    pub secret_patterns: Vec<String>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            retain: backup::DEFAULT_RETAIN,
            secret_patterns: backup::SECRET_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// 超时配置（秒）
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TimeoutConfig {
    pub stop: u64,
    pub start: u64,
    pub poll_interval: u64,
    pub health_grace: u64,
    pub health_request: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            stop: timeout::SERVICE_STOP_TIMEOUT,
            start: timeout::SERVICE_START_TIMEOUT,
            poll_interval: timeout::SERVICE_CHECK_INTERVAL,
            health_grace: timeout::HEALTH_GRACE_DELAY,
            health_request: timeout::HEALTH_REQUEST_TIMEOUT,
        }
    }
}

impl TimeoutConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn health_grace(&self) -> Duration {
        Duration::from_secs(self.health_grace)
    }

    pub fn health_request(&self) -> Duration {
        Duration::from_secs(self.health_request)
    }
}

impl AppConfig {
    /// 加载配置文件，文件不存在时使用默认配置
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            tracing::debug!("加载配置文件: {}", path.display());
            Self::load_from_file(path)
        } else {
            tracing::debug!("未找到配置文件 {}，使用默认配置", path.display());
            Ok(Self::default())
        }
    }

    /// 从指定文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| DeployError::Config(format!("解析配置文件失败: {e}")))?;
        config.validate()?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DeployError::Config(format!("序列化配置失败: {e}")))?;
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(())
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.service.name.trim().is_empty() {
            return Err(DeployError::Config("service.name 不能为空".to_string()));
        }
        if self.service.unit_file.trim().is_empty() {
            return Err(DeployError::Config("service.unit_file 不能为空".to_string()));
        }
        if self.bundle.app_file.trim().is_empty() || self.bundle.requirements_file.trim().is_empty()
        {
            return Err(DeployError::Config(
                "bundle.app_file 与 bundle.requirements_file 不能为空".to_string(),
            ));
        }
        if self.backup.retain == 0 {
            return Err(DeployError::Config("backup.retain 必须大于 0".to_string()));
        }
        if self.timeouts.poll_interval == 0 {
            return Err(DeployError::Config(
                "timeouts.poll_interval 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }

    /// 获取安装目录
    pub fn get_install_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.install_dir)
    }

    /// 获取配置目录
    pub fn get_config_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.config_dir)
    }

    /// 获取备份根目录
    pub fn get_backup_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.backup_root)
    }

    /// 获取 systemd 单元文件路径
    pub fn get_unit_path(&self) -> PathBuf {
        Path::new(&self.paths.systemd_dir).join(&self.service.unit_file)
    }

    /// 获取最近备份指针文件路径
    pub fn get_last_backup_path(&self) -> PathBuf {
        self.get_backup_dir().join(paths::LAST_BACKUP_FILE)
    }

    /// 获取互斥锁文件路径
    pub fn get_lock_path(&self) -> PathBuf {
        self.get_backup_dir().join(paths::LOCK_FILE)
    }

    /// 获取安装目录下的版本文件路径
    pub fn get_version_file_path(&self) -> PathBuf {
        self.get_install_dir().join(&self.bundle.version_file)
    }

    /// 获取 Python 虚拟环境目录
    pub fn get_venv_dir(&self) -> PathBuf {
        self.get_install_dir().join(paths::VENV_DIR)
    }

    /// 以指定根目录重写所有路径，便于测试和非标准安装
    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        let join = |p: &str| {
            root.join(p.trim_start_matches('/'))
                .to_string_lossy()
                .to_string()
        };

        Self {
            paths: PathsConfig {
                install_dir: join(paths::INSTALL_DIR),
                config_dir: join(paths::CONFIG_DIR),
                systemd_dir: join(paths::SYSTEMD_DIR),
                backup_root: join(paths::BACKUP_ROOT),
            },
            ..Self::default()
        }
    }
}
