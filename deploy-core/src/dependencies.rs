use crate::command::{run_command, stderr_tail};
use crate::config::AppConfig;
use crate::error::{DeployError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// 依赖解析器接口
#[allow(async_fn_in_trait)]
pub trait DependencyResolver {
    /// 在虚拟环境中安装/升级清单中的依赖
    async fn install(&self, venv: &Path, manifest: &Path) -> Result<()>;
}

/// 基于 pip 的依赖解析器
#[derive(Debug, Clone)]
pub struct PipResolver {
    python: String,
}

impl Default for PipResolver {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
        }
    }
}

impl PipResolver {
    pub fn new() -> Self {
        Self::default()
    }

    async fn ensure_venv(&self, venv: &Path) -> Result<()> {
        if venv.join("bin").join("pip").exists() {
            return Ok(());
        }

        info!("🐍 创建虚拟环境: {}", venv.display());
        let output = run_command(&self.python, [Path::new("-m"), Path::new("venv"), venv])
            .await
            .map_err(|e| DeployError::dependency(e.to_string()))?;
        if !output.status.success() {
            return Err(DeployError::dependency(format!(
                "创建虚拟环境失败: {}",
                stderr_tail(&output, 5)
            )));
        }
        Ok(())
    }
}

impl DependencyResolver for PipResolver {
    async fn install(&self, venv: &Path, manifest: &Path) -> Result<()> {
        self.ensure_venv(venv).await?;

        let pip = venv.join("bin").join("pip");
        let pip = pip.to_string_lossy();
        let output = run_command(
            &pip,
            [
                Path::new("install"),
                Path::new("--upgrade"),
                Path::new("--quiet"),
                Path::new("-r"),
                manifest,
            ],
        )
        .await
        .map_err(|e| DeployError::dependency(e.to_string()))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(DeployError::dependency(stderr_tail(&output, 10)))
        }
    }
}

/// 依赖更新器
pub struct DependencyUpdater<D> {
    resolver: Arc<D>,
    manifest: PathBuf,
    venv: PathBuf,
}

impl<D: DependencyResolver> DependencyUpdater<D> {
    pub fn new(config: &AppConfig, resolver: Arc<D>) -> Self {
        Self {
            resolver,
            manifest: config.get_install_dir().join(&config.bundle.requirements_file),
            venv: config.get_venv_dir(),
        }
    }

    /// 重新解析依赖清单，没有清单时直接成功
    pub async fn update(&self) -> Result<()> {
        if !self.manifest.is_file() {
            debug!("未找到依赖清单，跳过: {}", self.manifest.display());
            return Ok(());
        }

        info!("📚 更新依赖: {}", self.manifest.display());
        self.resolver
            .install(&self.venv, &self.manifest)
            .await
            .map_err(|e| match e {
                DeployError::DependencyResolution { .. } => e,
                other => DeployError::dependency(other.to_string()),
            })?;
        info!("✅ 依赖更新完成");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingResolver {
        calls: Mutex<Vec<(PathBuf, PathBuf)>>,
        fail: bool,
    }

    impl DependencyResolver for RecordingResolver {
        async fn install(&self, venv: &Path, manifest: &Path) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((venv.to_path_buf(), manifest.to_path_buf()));
            if self.fail {
                Err(DeployError::command("pip", "No matching distribution found for flask==99"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_update_without_manifest_is_noop() {
        let temp = TempDir::new().unwrap();
        let config = AppConfig::with_root(temp.path());
        let resolver = Arc::new(RecordingResolver::default());

        DependencyUpdater::new(&config, resolver.clone()).update().await.unwrap();
        assert!(resolver.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_uses_install_venv() {
        let temp = TempDir::new().unwrap();
        let config = AppConfig::with_root(temp.path());
        fs::create_dir_all(config.get_install_dir()).unwrap();
        fs::write(config.get_install_dir().join("requirements.txt"), "flask\n").unwrap();
        let resolver = Arc::new(RecordingResolver::default());

        DependencyUpdater::new(&config, resolver.clone()).update().await.unwrap();
        let calls = resolver.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, config.get_venv_dir());
    }

    #[tokio::test]
    async fn test_resolver_error_is_wrapped() {
        let temp = TempDir::new().unwrap();
        let config = AppConfig::with_root(temp.path());
        fs::create_dir_all(config.get_install_dir()).unwrap();
        fs::write(config.get_install_dir().join("requirements.txt"), "flask==99\n").unwrap();
        let resolver = Arc::new(RecordingResolver {
            fail: true,
            ..Default::default()
        });

        let err = DependencyUpdater::new(&config, resolver).update().await.unwrap_err();
        assert!(matches!(err, DeployError::DependencyResolution { ref message } if message.contains("flask==99")));
    }
}
