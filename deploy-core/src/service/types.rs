use serde::{Deserialize, Serialize};
use std::fmt;

/// 服务运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// 运行中
    Running,
    /// 已停止（包括无法查询的情况）
    Stopped,
}

impl ServiceStatus {
    pub fn from_active(active: bool) -> Self {
        if active { Self::Running } else { Self::Stopped }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }

    /// 获取状态的显示名称
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Running => "运行中",
            Self::Stopped => "已停止",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
