use super::{HealthProbe, ServiceManager};
use crate::config::TimeoutConfig;
use crate::error::{DeployError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{info, warn};

/// 服务控制所用的时间参数
#[derive(Debug, Clone, Copy)]
pub struct ServiceTimings {
    pub stop_timeout: Duration,
    pub start_timeout: Duration,
    pub poll_interval: Duration,
    pub health_grace: Duration,
    pub health_request: Duration,
}

impl From<&TimeoutConfig> for ServiceTimings {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            stop_timeout: config.stop_timeout(),
            start_timeout: config.start_timeout(),
            poll_interval: config.poll_interval(),
            health_grace: config.health_grace(),
            health_request: config.health_request(),
        }
    }
}

impl Default for ServiceTimings {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

/// 停止操作的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// 服务本来就没有运行，未发送停止命令
    AlreadyStopped,
    /// 已发送停止命令并确认停止
    Stopped,
}

/// 服务控制器：发出启停命令并轮询状态变化
pub struct ServiceController<S, H> {
    manager: Arc<S>,
    probe: Arc<H>,
    service_name: String,
    timings: ServiceTimings,
}

impl<S: ServiceManager, H: HealthProbe> ServiceController<S, H> {
    pub fn new(
        manager: Arc<S>,
        probe: Arc<H>,
        service_name: impl Into<String>,
        timings: ServiceTimings,
    ) -> Self {
        Self {
            manager,
            probe,
            service_name: service_name.into(),
            timings,
        }
    }

    pub fn check_prerequisites(&self) -> Result<()> {
        self.manager.check_prerequisites()
    }

    /// 停止服务并等待其进入非活动状态
    pub async fn stop(&self, timeout: Duration) -> Result<StopOutcome> {
        if !self.query_active().await {
            info!("服务 {} 未在运行", self.service_name);
            return Ok(StopOutcome::AlreadyStopped);
        }

        info!("⏹️ 停止服务 {}...", self.service_name);
        self.manager.stop(&self.service_name).await?;

        if self.wait_for_state(false, timeout).await {
            info!("✅ 服务已停止");
            Ok(StopOutcome::Stopped)
        } else {
            Err(DeployError::ServiceStopTimeout {
                service: self.service_name.clone(),
                timeout_seconds: timeout.as_secs(),
            })
        }
    }

    /// 启动服务并等待其进入活动状态
    pub async fn start(&self, timeout: Duration) -> Result<()> {
        info!("▶️ 启动服务 {}...", self.service_name);
        self.manager.start(&self.service_name).await?;

        if self.wait_for_state(true, timeout).await {
            info!("✅ 服务已启动");
            Ok(())
        } else {
            Err(DeployError::ServiceStartTimeout {
                service: self.service_name.clone(),
                timeout_seconds: timeout.as_secs(),
            })
        }
    }

    /// 等待宽限期后执行一次健康检查
    pub async fn probe_health(&self, grace: Duration, timeout: Duration) -> bool {
        if !grace.is_zero() {
            info!("⏳ 等待 {} 秒后进行健康检查...", grace.as_secs());
            sleep(grace).await;
        }

        let healthy = self.probe.probe(timeout).await;
        if healthy {
            info!("✅ 健康检查通过");
        } else {
            warn!("⚠️ 健康检查未通过，服务可能处于降级状态");
        }
        healthy
    }

    /// 使用配置的时间参数停止服务
    pub async fn stop_default(&self) -> Result<StopOutcome> {
        self.stop(self.timings.stop_timeout).await
    }

    /// 使用配置的时间参数启动服务
    pub async fn start_default(&self) -> Result<()> {
        self.start(self.timings.start_timeout).await
    }

    /// 使用配置的时间参数进行健康检查
    pub async fn probe_health_default(&self) -> bool {
        self.probe_health(self.timings.health_grace, self.timings.health_request)
            .await
    }

    /// 查询失败时视为未运行
    async fn query_active(&self) -> bool {
        match self.manager.is_active(&self.service_name).await {
            Ok(active) => active,
            Err(e) => {
                warn!("检查服务状态时出错: {}", e);
                false
            }
        }
    }

    async fn wait_for_state(&self, active: bool, timeout: Duration) -> bool {
        let start_time = Instant::now();

        loop {
            match self.manager.is_active(&self.service_name).await {
                Ok(current) if current == active => return true,
                Ok(_) => {}
                Err(e) => warn!("检查服务状态时出错: {}", e),
            }

            let elapsed = start_time.elapsed();
            if elapsed >= timeout {
                warn!(
                    "等待服务{}超时 ({} 秒)",
                    if active { "启动" } else { "停止" },
                    timeout.as_secs()
                );
                return false;
            }
            sleep(self.timings.poll_interval.min(timeout - elapsed)).await;
        }
    }
}
