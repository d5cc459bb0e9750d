use clap::{Args, Parser, Subcommand};
use deploy_core::constants::paths::DEFAULT_CONFIG_FILE;
use std::path::PathBuf;

/// 升级相关参数
#[derive(Args, Debug)]
pub struct UpgradeArgs {
    /// 发布包目录（默认为当前目录）
    pub bundle: Option<PathBuf>,

    /// 跳过交互确认
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser)]
#[command(name = "meetbot-cli")]
#[command(about = "meet-bot 服务安装、升级与回滚工具")]
#[command(version)]
pub struct Cli {
    /// 配置文件路径，不存在时使用内置默认值
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, env = "MEETBOT_CONFIG")]
    pub config: PathBuf,

    /// 详细输出
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 备份当前安装并升级到指定发布包，失败时自动回滚
    Upgrade {
        #[command(flatten)]
        args: UpgradeArgs,
    },
    /// 回滚到最近一次备份
    Rollback {
        /// 跳过交互确认
        #[arg(short, long)]
        yes: bool,
    },
    /// 显示当前版本、服务状态和最近日志
    Status {
        /// 以 JSON 格式输出
        #[arg(long)]
        json: bool,
    },
    /// 只创建备份
    Backup,
    /// 清理旧备份
    Clean {
        /// 保留的备份数量（默认使用配置中的值）
        #[arg(long)]
        keep: Option<usize>,
    },
    /// 列出所有备份
    ListBackups {
        /// 以 JSON 格式输出
        #[arg(long)]
        json: bool,
    },
}
