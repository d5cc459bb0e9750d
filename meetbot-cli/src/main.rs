use clap::Parser;
use deploy_core::DeployError;
use meetbot_cli::{Cli, CliApp, setup_logging};
use tracing::error;

/// 回滚失败、需要人工介入时的退出码
const EXIT_ROLLBACK_FATAL: i32 = 2;

#[tokio::main]
async fn main() {
    let Cli {
        config,
        verbose,
        command,
    } = Cli::parse();
    let guard = setup_logging(verbose);

    let result = async {
        let mut app = CliApp::for_command(&config, &command)?;
        app.run_command(command).await
    }
    .await;

    if let Err(e) = result {
        error!("❌ {:#}", e);
        let code = match e.downcast_ref::<DeployError>() {
            Some(err) if err.is_fatal() => EXIT_ROLLBACK_FATAL,
            _ => 1,
        };
        drop(guard);
        std::process::exit(code);
    }
}
