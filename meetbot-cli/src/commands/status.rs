use crate::app::CliApp;
use anyhow::Result;
use deploy_core::upgrade::StatusReport;
use tracing::info;

/// 显示客户端版本信息（标题和基本信息）
pub fn show_client_version() {
    info!("🤖 meet-bot 状态");
    info!("==================");
    info!("   工具版本: v{}", env!("CARGO_PKG_VERSION"));
}

/// 显示服务状态，只读操作，总是成功返回
pub async fn run_status(app: &mut CliApp, json: bool) -> Result<()> {
    let report = app.orchestrator.status().await;

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(output) => println!("{output}"),
            Err(e) => info!("无法序列化状态: {}", e),
        }
        return Ok(());
    }

    show_client_version();
    print_report(app, &report);
    Ok(())
}

fn print_report(app: &CliApp, report: &StatusReport) {
    let config = app.config();
    info!("📋 基本信息:");
    info!("   服务: {}", report.service);
    info!("   已安装版本: {}", report.version);
    info!("   安装目录: {}", config.paths.install_dir);
    info!("   配置文件: {}", app.config_path.display());

    let marker = if report.status.is_running() { "✅" } else { "⏹️" };
    info!("{} 服务状态: {}", marker, report.status.display_name());

    if report.recent_logs.is_empty() {
        info!("📜 暂无服务日志");
    } else {
        info!("📜 最近日志:");
        for line in &report.recent_logs {
            info!("   {}", line);
        }
    }
}
