use crate::config::AppConfig;
use crate::constants::service::UNKNOWN_VERSION;
use crate::service::{ServiceManager, ServiceStatus};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// 读取已安装版本与服务状态，所有查询都不会失败
pub struct Inspector<S> {
    manager: Arc<S>,
    service_name: String,
    version_file: PathBuf,
}

impl<S: ServiceManager> Inspector<S> {
    pub fn new(config: &AppConfig, manager: Arc<S>) -> Self {
        Self {
            manager,
            service_name: config.service.name.clone(),
            version_file: config.get_version_file_path(),
        }
    }

    /// 当前安装的版本，版本文件不存在或不可读时为 "unknown"
    pub fn current_version(&self) -> String {
        match fs::read_to_string(&self.version_file) {
            Ok(content) => content
                .lines()
                .next()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(UNKNOWN_VERSION)
                .to_string(),
            Err(e) => {
                debug!("读取版本文件失败 {}: {}", self.version_file.display(), e);
                UNKNOWN_VERSION.to_string()
            }
        }
    }

    pub async fn service_status(&self) -> ServiceStatus {
        match self.manager.is_active(&self.service_name).await {
            Ok(active) => ServiceStatus::from_active(active),
            Err(e) => {
                warn!("无法查询服务状态，按已停止处理: {}", e);
                ServiceStatus::Stopped
            }
        }
    }

    /// 最近的服务日志，不可用时返回空列表
    pub async fn recent_activity(&self, lines: usize) -> Vec<String> {
        self.manager
            .recent_logs(&self.service_name, lines)
            .await
            .unwrap_or_else(|e| {
                warn!("无法读取服务日志: {}", e);
                Vec::new()
            })
    }
}
