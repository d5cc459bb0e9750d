//! 集成测试共用的内存实现

#![allow(dead_code)]

use deploy_core::config::AppConfig;
use deploy_core::dependencies::DependencyResolver;
use deploy_core::service::{HealthProbe, ServiceManager, ServiceTimings};
use deploy_core::upgrade::Orchestrator;
use deploy_core::{DeployError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use walkdir::WalkDir;

/// 模拟 systemd
#[derive(Default)]
pub struct FakeSystemd {
    pub active: AtomicBool,
    /// 为 true 时 stop 命令不生效
    pub stuck_running: AtomicBool,
    /// 为 true 时 start 命令不生效
    pub refuse_start: AtomicBool,
    pub stop_calls: AtomicUsize,
    pub start_calls: AtomicUsize,
    pub reloads: AtomicUsize,
}

impl FakeSystemd {
    pub fn running() -> Arc<Self> {
        let fake = Self::default();
        fake.active.store(true, Ordering::SeqCst);
        Arc::new(fake)
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }
}

impl ServiceManager for FakeSystemd {
    async fn stop(&self, _name: &str) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if !self.stuck_running.load(Ordering::SeqCst) {
            self.active.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn start(&self, _name: &str) -> Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if !self.refuse_start.load(Ordering::SeqCst) {
            self.active.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn is_active(&self, _name: &str) -> Result<bool> {
        Ok(self.active.load(Ordering::SeqCst))
    }

    async fn reload_definitions(&self) -> Result<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn recent_logs(&self, name: &str, lines: usize) -> Result<Vec<String>> {
        Ok((0..lines.min(3))
            .map(|i| format!("{name}[100]: request {i}"))
            .collect())
    }
}

pub struct FakeProbe {
    pub healthy: AtomicBool,
}

impl FakeProbe {
    pub fn new(healthy: bool) -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(healthy),
        })
    }
}

impl HealthProbe for FakeProbe {
    async fn probe(&self, _timeout: Duration) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

/// 模拟 pip
#[derive(Default)]
pub struct FakeResolver {
    pub fail_with: Mutex<Option<String>>,
    pub installs: Mutex<Vec<PathBuf>>,
}

impl FakeResolver {
    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_with: Mutex::new(Some(message.to_string())),
            ..Default::default()
        })
    }
}

impl DependencyResolver for FakeResolver {
    async fn install(&self, _venv: &Path, manifest: &Path) -> Result<()> {
        self.installs.lock().unwrap().push(manifest.to_path_buf());
        match self.fail_with.lock().unwrap().clone() {
            Some(message) => Err(DeployError::dependency(message)),
            None => Ok(()),
        }
    }
}

pub type TestOrchestrator = Orchestrator<FakeSystemd, FakeProbe, FakeResolver>;

pub fn fast_timings() -> ServiceTimings {
    ServiceTimings {
        stop_timeout: Duration::from_millis(100),
        start_timeout: Duration::from_millis(100),
        poll_interval: Duration::from_millis(5),
        health_grace: Duration::ZERO,
        health_request: Duration::from_millis(100),
    }
}

/// 测试环境：临时根目录下的一套完整安装
pub struct TestEnv {
    pub temp: TempDir,
    pub config: AppConfig,
}

impl TestEnv {
    /// 已安装 1.0.0 版本，带单元文件和配置目录（含凭证）
    pub fn installed() -> Self {
        let temp = TempDir::new().unwrap();
        let config = AppConfig::with_root(temp.path());

        let install = config.get_install_dir();
        fs::create_dir_all(install.join("venv/bin")).unwrap();
        fs::write(install.join("app.py"), "print('v1')\n").unwrap();
        fs::write(install.join("requirements.txt"), "flask==3.0\n").unwrap();
        fs::write(install.join("VERSION"), "1.0.0\n").unwrap();
        fs::write(install.join("venv/bin/python3"), "python").unwrap();
        std::os::unix::fs::symlink("python3", install.join("venv/bin/python")).unwrap();

        let config_dir = config.get_config_dir();
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("meet-bot.env.example"), "PORT=5000\n").unwrap();
        fs::write(config_dir.join("service-account.json"), "{\"secret\":1}").unwrap();

        let unit = config.get_unit_path();
        fs::create_dir_all(unit.parent().unwrap()).unwrap();
        fs::write(&unit, "[Service]\nExecStart=/opt/meet-bot/venv/bin/python app.py\n").unwrap();

        Self { temp, config }
    }

    pub fn orchestrator(
        &self,
        manager: Arc<FakeSystemd>,
        probe: Arc<FakeProbe>,
        resolver: Arc<FakeResolver>,
    ) -> TestOrchestrator {
        Orchestrator::new(self.config.clone(), manager, probe, resolver)
            .with_timings(fast_timings())
            .with_actor("tester")
    }

    /// 在临时目录下准备一个发布包
    pub fn bundle(&self, version: Option<&str>) -> PathBuf {
        let bundle = self.temp.path().join("bundle");
        fs::create_dir_all(&bundle).unwrap();
        fs::write(bundle.join("app.py"), "print('v2')\n").unwrap();
        fs::write(bundle.join("requirements.txt"), "flask==3.1\n").unwrap();
        if let Some(version) = version {
            fs::write(bundle.join("VERSION"), format!("{version}\n")).unwrap();
        }
        bundle
    }

    pub fn install_dir(&self) -> PathBuf {
        self.config.get_install_dir()
    }

    pub fn backup_count(&self) -> usize {
        let root = self.config.get_backup_dir();
        if !root.exists() {
            return 0;
        }
        fs::read_dir(root)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().join("backup_info").is_file())
            .count()
    }
}

/// 目录快照：相对路径 → 文件内容（符号链接记录其目标）
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut files = BTreeMap::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.unwrap();
        let relative = entry.path().strip_prefix(root).unwrap().to_path_buf();
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            let target = fs::read_link(entry.path()).unwrap();
            files.insert(relative, target.to_string_lossy().as_bytes().to_vec());
        } else if file_type.is_file() {
            files.insert(relative, fs::read(entry.path()).unwrap());
        }
    }
    files
}
