//! 部署错误定义

use std::path::PathBuf;
use thiserror::Error;

/// 部署流程错误类型
#[derive(Debug, Error)]
pub enum DeployError {
    /// 备份读写失败
    #[error("备份失败: {reason}")]
    BackupIo { reason: String },

    /// 等待服务停止超时
    #[error("等待服务 {service} 停止超时 ({timeout_seconds} 秒)")]
    ServiceStopTimeout {
        service: String,
        timeout_seconds: u64,
    },

    /// 等待服务启动超时
    #[error("等待服务 {service} 启动超时 ({timeout_seconds} 秒)")]
    ServiceStartTimeout {
        service: String,
        timeout_seconds: u64,
    },

    /// 发布包缺少必需文件
    #[error("发布包缺少必需文件: {name} ({})", path.display())]
    MissingFile { name: String, path: PathBuf },

    /// 依赖安装失败
    #[error("依赖安装失败: {message}")]
    DependencyResolution { message: String },

    /// 找不到可回滚的备份
    #[error("找不到可用于回滚的备份: {reason}")]
    RollbackNotFound { reason: String },

    /// 回滚过程中再次失败，需要人工介入
    #[error("回滚失败，需要人工介入: {reason}")]
    RollbackFatal { reason: String },

    /// 升级失败，已自动回滚到备份
    #[error("升级在「{step}」阶段失败，已自动回滚: {source}")]
    RolledBack {
        step: String,
        source: Box<DeployError>,
    },

    /// 安装（暂存/切换）失败
    #[error("安装失败: {reason}")]
    Install { reason: String },

    /// 外部命令执行失败
    #[error("命令执行失败: {command}: {message}")]
    Command { command: String, message: String },

    /// 已有其他部署进程在运行
    #[error("另一个部署进程正在运行 (锁文件: {})", path.display())]
    LockHeld { path: PathBuf },

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 文件操作错误
    #[error("文件操作失败: {0}")]
    Io(#[from] std::io::Error),
}

impl DeployError {
    /// 创建备份错误
    pub fn backup<S: Into<String>>(reason: S) -> Self {
        Self::BackupIo {
            reason: reason.into(),
        }
    }

    /// 创建缺失文件错误
    pub fn missing_file<S: Into<String>>(name: S, path: impl Into<PathBuf>) -> Self {
        Self::MissingFile {
            name: name.into(),
            path: path.into(),
        }
    }

    /// 创建依赖安装错误
    pub fn dependency<S: Into<String>>(message: S) -> Self {
        Self::DependencyResolution {
            message: message.into(),
        }
    }

    /// 创建回滚目标缺失错误
    pub fn rollback_not_found<S: Into<String>>(reason: S) -> Self {
        Self::RollbackNotFound {
            reason: reason.into(),
        }
    }

    /// 创建回滚致命错误
    pub fn rollback_fatal<S: Into<String>>(reason: S) -> Self {
        Self::RollbackFatal {
            reason: reason.into(),
        }
    }

    /// 创建安装错误
    pub fn install<S: Into<String>>(reason: S) -> Self {
        Self::Install {
            reason: reason.into(),
        }
    }

    /// 创建命令执行错误
    pub fn command<S: Into<String>, M: Into<String>>(command: S, message: M) -> Self {
        Self::Command {
            command: command.into(),
            message: message.into(),
        }
    }

    /// 需要人工介入的错误
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RollbackFatal { .. })
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, DeployError>;
