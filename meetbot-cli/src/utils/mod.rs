use anyhow::Result;
use deploy_core::upgrade::{ProgressCallback, UpgradeStep};
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

/// 日志文件路径环境变量，设置后日志写入该文件而非终端
pub const LOG_FILE_ENV: &str = "MEETBOT_LOG_FILE";

/// 初始化日志
///
/// - `-v, --verbose` 启用 DEBUG 级别；`RUST_LOG` 可以覆盖默认级别
/// - 设置 `MEETBOT_LOG_FILE` 时写入文件，返回的 guard 需要保持到程序结束
pub fn setup_logging(verbose: bool) -> Option<WorkerGuard> {
    use tracing_subscriber::{EnvFilter, fmt};

    let default_level = if verbose { "debug" } else { "info" };
    let mut env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // 过滤掉第三方库的详细日志，减少噪音
    for directive in ["reqwest=warn", "tokio=warn", "hyper=warn"] {
        if let Ok(directive) = directive.parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    if let Ok(log_file) = std::env::var(LOG_FILE_ENV) {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
        {
            Ok(file) => {
                let (writer, guard) = tracing_appender::non_blocking(file);
                fmt()
                    .with_env_filter(env_filter)
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .with_line_number(true)
                    .init();
                return Some(guard);
            }
            Err(e) => eprintln!("无法打开日志文件 {log_file}: {e}，改为输出到终端"),
        }
    }

    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_names(false)
        .with_line_number(false)
        .without_time()
        .compact()
        .init();
    None
}

/// 交互确认 (y/N)
pub fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} (y/N): ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(is_yes(&input))
}

fn is_yes(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

/// 升级阶段的序号，用于输出 [n/8]
fn step_position(step: UpgradeStep) -> Option<usize> {
    match step {
        UpgradeStep::BackingUp => Some(1),
        UpgradeStep::Stopping => Some(2),
        UpgradeStep::Installing => Some(3),
        UpgradeStep::UpdatingDeps => Some(4),
        UpgradeStep::Starting => Some(5),
        UpgradeStep::Verifying => Some(6),
        UpgradeStep::Pruning => Some(7),
        UpgradeStep::Done => Some(8),
        UpgradeStep::Idle | UpgradeStep::RollingBack => None,
    }
}

/// 输出阶段标题并记录最近的阶段
pub fn step_reporter(last_step: Arc<Mutex<Option<UpgradeStep>>>) -> ProgressCallback {
    Box::new(move |step, message| {
        if let Ok(mut last) = last_step.lock() {
            *last = Some(step);
        }
        match step_position(step) {
            Some(position) => info!("==> [{}/8] {}: {}", position, step, message),
            None => info!("==> {}: {}", step, message),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes("\n"));
        assert!(!is_yes("n"));
    }

    #[test]
    fn test_step_reporter_records_last_step() {
        let last = Arc::new(Mutex::new(None));
        let reporter = step_reporter(last.clone());

        reporter(UpgradeStep::Stopping, "停止服务");
        reporter(UpgradeStep::Installing, "安装发布包");
        assert_eq!(*last.lock().unwrap(), Some(UpgradeStep::Installing));
    }
}
