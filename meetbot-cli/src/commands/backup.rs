use crate::app::CliApp;
use crate::utils::confirm;
use anyhow::Result;
use chrono::Local;
use deploy_core::backup::BackupRecord;
use serde::Serialize;
use tracing::{info, warn};

/// 备份列表的 JSON 输出格式
#[derive(Debug, Serialize)]
pub struct BackupListEntry {
    pub name: String,
    pub path: String,
    pub created_at: String,
    pub previous_version: String,
    pub service_status: String,
    pub actor: String,
    pub is_last: bool,
}

impl BackupListEntry {
    fn from_record(record: &BackupRecord, last: Option<&BackupRecord>) -> Self {
        Self {
            name: record.name(),
            path: record.path.display().to_string(),
            created_at: record.info.created_at.to_rfc3339(),
            previous_version: record.info.previous_version.clone(),
            service_status: record.info.service_status.to_string(),
            actor: record.info.actor.clone(),
            is_last: last.is_some_and(|l| l.path == record.path),
        }
    }
}

/// 手动创建备份
pub async fn run_backup(app: &mut CliApp) -> Result<()> {
    info!("💾 创建备份...");
    let record = app.orchestrator.backup().await?;
    info!("✅ 备份完成: {}", record.path.display());
    info!("   版本: {}", record.info.previous_version);
    Ok(())
}

/// 回滚到最近一次备份
pub async fn run_rollback(app: &mut CliApp, yes: bool) -> Result<()> {
    app.orchestrator.check_prerequisites()?;

    if !yes {
        warn!("⚠️ 警告: 此操作会用最近的备份替换当前安装，服务将被重启");
        if !confirm("请确认您要回滚到最近的备份")? {
            warn!("操作已取消");
            return Ok(());
        }
    }

    let report = app.orchestrator.rollback().await?;
    info!("✅ 回滚完成，当前版本 {}", report.restored_version);
    info!("   备份: {}", report.backup_path.display());
    if !report.healthy {
        warn!("⚠️ 服务已启动但健康检查未通过，请检查服务日志");
    }
    Ok(())
}

/// 清理旧备份
pub async fn run_clean(app: &mut CliApp, keep: Option<usize>) -> Result<()> {
    let report = app.orchestrator.clean(keep).await?;
    if report.removed.is_empty() {
        info!("没有需要清理的备份（共 {} 个）", report.kept.len());
    } else {
        info!(
            "✅ 已删除 {} 个旧备份，保留 {} 个",
            report.removed.len(),
            report.kept.len()
        );
    }
    if let Some(protected) = &report.protected {
        info!("   最近备份指针引用的记录已保留: {}", protected.display());
    }
    Ok(())
}

/// 列出所有备份
pub async fn run_list_backups(app: &mut CliApp, json: bool) -> Result<()> {
    let records = app.orchestrator.list_backups().await?;
    // 指针缺失或失效时不标记
    let last = app.orchestrator.last_backup().await.ok();
    let entries: Vec<BackupListEntry> = records
        .iter()
        .map(|r| BackupListEntry::from_record(r, last.as_ref()))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if records.is_empty() {
        info!("📦 暂无备份");
        return Ok(());
    }

    info!("📦 备份列表 ({} 个):", records.len());
    for (record, entry) in records.iter().zip(&entries) {
        let marker = if entry.is_last { " ← 最近" } else { "" };
        info!(
            "   {}  {}  版本 {}  {}{}",
            record.name(),
            record
                .info
                .created_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S"),
            record.info.previous_version,
            record.info.service_status.display_name(),
            marker
        );
    }
    Ok(())
}
