use super::HealthProbe;
use std::time::Duration;
use tracing::{debug, warn};

/// 通过 HTTP GET 检查服务存活
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    url: String,
    client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, timeout: Duration) -> bool {
        debug!("健康检查: GET {}", self.url);
        match self.client.get(&self.url).timeout(timeout).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("健康检查返回非成功状态: {}", response.status());
                false
            }
            Err(e) => {
                warn!("健康检查请求失败: {}", e);
                false
            }
        }
    }
}
