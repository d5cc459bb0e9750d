use clap::Parser;
use deploy_core::config::AppConfig;
use meetbot_cli::{Cli, CliApp, Commands};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config(temp: &TempDir) -> (AppConfig, PathBuf) {
    let config = AppConfig::with_root(temp.path());
    let path = temp.path().join("deploy.toml");
    config.save_to_file(&path).unwrap();

    let install = config.get_install_dir();
    fs::create_dir_all(&install).unwrap();
    fs::write(install.join("app.py"), "print('v1')\n").unwrap();
    fs::write(install.join("VERSION"), "1.0.0\n").unwrap();
    (config, path)
}

#[test]
fn test_parse_upgrade_defaults() {
    let cli = Cli::try_parse_from(["meetbot-cli", "upgrade"]).unwrap();
    assert_eq!(cli.config, PathBuf::from("/etc/meet-bot/deploy.toml"));
    assert!(!cli.verbose);
    match cli.command {
        Commands::Upgrade { args } => {
            assert!(args.bundle.is_none());
            assert!(!args.yes);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_parse_upgrade_with_bundle() {
    let cli = Cli::try_parse_from([
        "meetbot-cli",
        "-v",
        "-c",
        "/tmp/deploy.toml",
        "upgrade",
        "/srv/release",
        "--yes",
    ])
    .unwrap();
    assert!(cli.verbose);
    assert_eq!(cli.config, PathBuf::from("/tmp/deploy.toml"));
    match cli.command {
        Commands::Upgrade { args } => {
            assert_eq!(args.bundle, Some(PathBuf::from("/srv/release")));
            assert!(args.yes);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_parse_other_commands() {
    let cli = Cli::try_parse_from(["meetbot-cli", "clean", "--keep", "3"]).unwrap();
    assert!(matches!(cli.command, Commands::Clean { keep: Some(3) }));

    let cli = Cli::try_parse_from(["meetbot-cli", "status", "--json"]).unwrap();
    assert!(matches!(cli.command, Commands::Status { json: true }));

    let cli = Cli::try_parse_from(["meetbot-cli", "list-backups"]).unwrap();
    assert!(matches!(cli.command, Commands::ListBackups { json: false }));

    let cli = Cli::try_parse_from(["meetbot-cli", "rollback", "-y"]).unwrap();
    assert!(matches!(cli.command, Commands::Rollback { yes: true }));

    assert!(Cli::try_parse_from(["meetbot-cli", "clean", "--keep", "many"]).is_err());
    assert!(Cli::try_parse_from(["meetbot-cli", "deploy"]).is_err());
}

#[tokio::test]
async fn test_status_never_fails() {
    let temp = TempDir::new().unwrap();
    let (_config, path) = write_config(&temp);
    let mut app = CliApp::new_with_config_path(&path).unwrap();

    app.run_command(Commands::Status { json: true }).await.unwrap();
    app.run_command(Commands::Status { json: false }).await.unwrap();

    let report = app.orchestrator.status().await;
    assert_eq!(report.version, "1.0.0");
}

#[tokio::test]
async fn test_status_with_malformed_config() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("deploy.toml");
    fs::write(&path, "[backup]\nretain = \"five\"\n").unwrap();

    assert!(CliApp::new_with_config_path(&path).is_err());
    assert!(CliApp::for_command(&path, &Commands::Backup).is_err());

    let command = Commands::Status { json: true };
    let mut app = CliApp::for_command(&path, &command).unwrap();
    assert_eq!(app.config().paths.install_dir, "/opt/meet-bot");
    app.run_command(command).await.unwrap();
}

#[tokio::test]
async fn test_backup_list_and_clean() {
    let temp = TempDir::new().unwrap();
    let (config, path) = write_config(&temp);
    let mut app = CliApp::new_with_config_path(&path).unwrap();
    assert_eq!(app.config().paths.install_dir, config.paths.install_dir);

    for _ in 0..3 {
        app.run_command(Commands::Backup).await.unwrap();
    }
    app.run_command(Commands::ListBackups { json: true })
        .await
        .unwrap();
    assert_eq!(app.orchestrator.list_backups().await.unwrap().len(), 3);

    app.run_command(Commands::Clean { keep: Some(0) }).await.unwrap();

    // 最近备份指针引用的记录不会被清理
    let remaining = app.orchestrator.list_backups().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0], app.orchestrator.last_backup().await.unwrap());
}

#[test]
fn test_missing_config_uses_defaults() {
    let temp = TempDir::new().unwrap();
    let app = CliApp::new_with_config_path(temp.path().join("missing.toml")).unwrap();
    assert_eq!(app.config().paths.install_dir, "/opt/meet-bot");
}
