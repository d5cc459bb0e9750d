use super::ServiceManager;
use crate::command::{ensure_success, run_command};
use crate::error::{DeployError, Result};
use tracing::{debug, info, warn};

/// 基于 systemctl / journalctl 的服务管理器
#[derive(Debug, Clone, Default)]
pub struct SystemctlManager;

impl SystemctlManager {
    pub fn new() -> Self {
        Self
    }
}

impl ServiceManager for SystemctlManager {
    async fn stop(&self, name: &str) -> Result<()> {
        let output = run_command("systemctl", ["stop", name]).await?;
        ensure_success(&output, "systemctl stop")
    }

    async fn start(&self, name: &str) -> Result<()> {
        let output = run_command("systemctl", ["start", name]).await?;
        ensure_success(&output, "systemctl start")
    }

    async fn is_active(&self, name: &str) -> Result<bool> {
        // is-active 以退出码表示状态：0 为 active，其余均视为未运行
        let output = run_command("systemctl", ["is-active", "--quiet", name]).await?;
        Ok(output.status.success())
    }

    async fn reload_definitions(&self) -> Result<()> {
        let output = run_command("systemctl", ["daemon-reload"]).await?;
        ensure_success(&output, "systemctl daemon-reload")
    }

    async fn recent_logs(&self, name: &str, lines: usize) -> Result<Vec<String>> {
        let lines = lines.to_string();
        let output = run_command(
            "journalctl",
            ["-u", name, "-n", lines.as_str(), "--no-pager", "-o", "short-iso"],
        )
        .await?;
        ensure_success(&output, "journalctl")?;

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|l| !l.starts_with("-- "))
            .map(|l| l.to_string())
            .collect())
    }

    /// 检查 systemctl 是否可用
    fn check_prerequisites(&self) -> Result<()> {
        info!("🔍 检查 systemd 环境...");
        match which::which("systemctl") {
            Ok(path) => {
                debug!("systemctl: {}", path.display());
                info!("✅ systemd 环境检查完成");
                Ok(())
            }
            Err(e) => {
                warn!("❌ 未找到 systemctl: {}", e);
                Err(DeployError::command("systemctl", "未安装或不在 PATH 中"))
            }
        }
    }
}
