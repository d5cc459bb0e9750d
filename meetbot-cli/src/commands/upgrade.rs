use crate::app::CliApp;
use crate::cli::UpgradeArgs;
use crate::utils::confirm;
use anyhow::Result;
use deploy_core::DeployError;
use tracing::{error, info, warn};

/// 执行升级
pub async fn run_upgrade(app: &mut CliApp, args: UpgradeArgs) -> Result<()> {
    let bundle = match args.bundle {
        Some(path) => path,
        None => std::env::current_dir()?,
    };

    info!("🚀 meet-bot 升级");
    info!("   发布包: {}", bundle.display());
    info!("   安装目录: {}", app.config().paths.install_dir);

    app.orchestrator.check_prerequisites()?;

    if !args.yes && !confirm("升级期间服务将短暂停止，确认继续?")? {
        warn!("操作已取消");
        return Ok(());
    }

    match app.orchestrator.upgrade(&bundle).await {
        Ok(report) => {
            info!("✅ 升级成功: {} → {}", report.from_version, report.to_version);
            info!("   备份: {}", report.backup_path.display());
            if !report.healthy {
                warn!("⚠️ 服务已启动但健康检查未通过，请检查服务日志");
            }
            match &report.prune {
                Some(prune) if !prune.removed.is_empty() => {
                    info!("   已清理 {} 个旧备份", prune.removed.len());
                }
                Some(_) => {}
                None => warn!("⚠️ 旧备份清理失败，可稍后执行 clean 命令"),
            }
            Ok(())
        }
        Err(e) => {
            report_failure(app, &e);
            Err(e.into())
        }
    }
}

/// 输出失败总结：失败阶段以及是否已回滚
fn report_failure(app: &CliApp, err: &DeployError) {
    match err {
        DeployError::RolledBack { step, .. } => {
            error!("❌ 升级失败（阶段: {}），已回滚到升级前的版本", step);
        }
        DeployError::RollbackFatal { .. } => {
            error!("❌ 升级失败且自动回滚失败，需要人工介入");
            error!("   可尝试执行 `meetbot-cli rollback` 或手动恢复最近的备份");
        }
        _ => {
            let step = app
                .failed_step()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "准备".to_string());
            error!("❌ 升级失败（阶段: {}），安装未被修改，无需回滚", step);
        }
    }
}
