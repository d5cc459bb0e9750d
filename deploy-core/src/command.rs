use crate::error::{DeployError, Result};
use std::ffi::OsStr;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

/// 执行外部命令并收集输出
pub(crate) async fn run_command<I, S>(program: &str, args: I) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<_> = args
        .into_iter()
        .map(|a| a.as_ref().to_os_string())
        .collect();
    debug!("执行命令: {} {:?}", program, args);

    let output = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| DeployError::command(program, format!("无法启动: {e}")))?;

    Ok(output)
}

/// 要求命令以 0 退出，否则把 stderr 的最后几行带进错误信息
pub(crate) fn ensure_success(output: &Output, command: &str) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }

    Err(DeployError::command(
        command,
        format!("{} {}", output.status, stderr_tail(output, 5)),
    ))
}

/// 截取 stderr 的最后几行
pub(crate) fn stderr_tail(output: &Output, lines: usize) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let all: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join(" | ")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_command_success() {
        let output = run_command("sh", ["-c", "echo ok"]).await.unwrap();
        assert!(ensure_success(&output, "sh").is_ok());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "ok");
    }

    #[tokio::test]
    async fn test_failure_carries_stderr_tail() {
        let output = run_command("sh", ["-c", "echo first >&2; echo boom >&2; exit 3"])
            .await
            .unwrap();
        let err = ensure_success(&output, "sh").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("boom"));
        assert!(message.contains("first"));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let result = run_command("definitely-not-a-real-program-xyz", ["--version"]).await;
        assert!(matches!(result, Err(DeployError::Command { .. })));
    }
}
