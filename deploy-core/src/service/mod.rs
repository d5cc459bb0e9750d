//! 服务管理
//!
//! `ServiceManager` 和 `HealthProbe` 是对外部协作者（systemd、健康检查接口）的抽象，
//! 生产环境使用 `SystemctlManager` / `HttpHealthProbe`，测试中可以替换为内存实现。

mod controller;
mod health;
mod systemctl;
pub mod types;

use crate::error::Result;
use std::time::Duration;

// 重新导出公共API
pub use controller::{ServiceController, ServiceTimings, StopOutcome};
pub use health::HttpHealthProbe;
pub use systemctl::SystemctlManager;
pub use types::ServiceStatus;

/// 进程管理器接口
#[allow(async_fn_in_trait)]
pub trait ServiceManager {
    /// 发送停止命令（不等待）
    async fn stop(&self, name: &str) -> Result<()>;
    /// 发送启动命令（不等待）
    async fn start(&self, name: &str) -> Result<()>;
    /// 服务是否处于 active 状态
    async fn is_active(&self, name: &str) -> Result<bool>;
    /// 重新加载服务定义
    async fn reload_definitions(&self) -> Result<()>;
    /// 最近的服务日志
    async fn recent_logs(&self, name: &str, lines: usize) -> Result<Vec<String>>;

    /// 检查运行环境是否满足要求
    fn check_prerequisites(&self) -> Result<()> {
        Ok(())
    }
}

/// 健康检查接口
#[allow(async_fn_in_trait)]
pub trait HealthProbe {
    /// 发起一次存活检查，成功返回 true
    async fn probe(&self, timeout: Duration) -> bool;
}
