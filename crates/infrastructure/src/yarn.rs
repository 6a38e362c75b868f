use async_trait::async_trait;
use orchestrator_domain::ExternalJobCleaner;
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use std::time::Duration;
use tracing::{info, warn};

/// 通过ResourceManager REST接口终止YARN应用
#[derive(Debug, Clone)]
pub struct YarnJobCleaner {
    client: reqwest::Client,
    resource_manager_url: String,
}

impl YarnJobCleaner {
    pub fn new(resource_manager_url: &str) -> OrchestratorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| OrchestratorError::network(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self {
            client,
            resource_manager_url: resource_manager_url.trim_end_matches('/').to_string(),
        })
    }

    async fn kill_application(&self, app_id: &str) -> OrchestratorResult<()> {
        let url = format!(
            "{}/ws/v1/cluster/apps/{}/state",
            self.resource_manager_url, app_id
        );
        let response = self
            .client
            .put(&url)
            .json(&serde_json::json!({ "state": "KILLED" }))
            .send()
            .await
            .map_err(|e| OrchestratorError::network(format!("终止YARN应用 {app_id} 失败: {e}")))?;

        if !response.status().is_success() {
            return Err(OrchestratorError::network(format!(
                "终止YARN应用 {app_id} 失败: HTTP {}",
                response.status()
            )));
        }
        info!("已终止YARN应用: {}", app_id);
        Ok(())
    }
}

#[async_trait]
impl ExternalJobCleaner for YarnJobCleaner {
    /// 逐个终止，单个失败不影响其余应用
    async fn kill_applications(&self, app_ids: &[String]) -> OrchestratorResult<()> {
        let mut failed = Vec::new();
        for app_id in app_ids {
            if let Err(e) = self.kill_application(app_id).await {
                warn!("{}", e);
                failed.push(app_id.clone());
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(OrchestratorError::network(format!(
                "部分YARN应用终止失败: {}",
                failed.join(",")
            )))
        }
    }
}
