use async_trait::async_trait;
use orchestrator_domain::{Host, TakeOverRequest, TaskDispatchRequest, TaskExecutorClient};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Worker接口的统一响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// 基于HTTP/JSON的Worker客户端
#[derive(Debug, Clone)]
pub struct HttpTaskExecutorClient {
    client: reqwest::Client,
}

impl HttpTaskExecutorClient {
    pub fn new(timeout: Duration) -> OrchestratorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OrchestratorError::network(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self { client })
    }

    fn url(host: &Host, path: &str) -> String {
        format!("http://{host}/api/v1/tasks{path}")
    }

    async fn post<B: Serialize + Sync>(
        &self,
        host: &Host,
        path: &str,
        body: Option<&B>,
    ) -> OrchestratorResult<WorkerResponse> {
        let url = Self::url(host, path);
        debug!("调用Worker接口: {}", url);

        let mut request = self.client.post(&url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(|e| map_reqwest_error(host, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OrchestratorError::network(format!(
                "Worker {host} 返回HTTP状态 {status}"
            )));
        }
        response
            .json::<WorkerResponse>()
            .await
            .map_err(|e| OrchestratorError::Serialization(format!("解析Worker响应失败: {e}")))
    }
}

fn map_reqwest_error(host: &Host, err: reqwest::Error) -> OrchestratorError {
    if err.is_timeout() {
        OrchestratorError::Timeout(format!("调用Worker {host} 超时"))
    } else {
        OrchestratorError::network(format!("调用Worker {host} 失败: {err}"))
    }
}

#[async_trait]
impl TaskExecutorClient for HttpTaskExecutorClient {
    async fn dispatch_task(
        &self,
        host: &Host,
        request: &TaskDispatchRequest,
    ) -> OrchestratorResult<()> {
        let response = self.post(host, "/dispatch", Some(request)).await?;
        if response.success {
            Ok(())
        } else {
            Err(OrchestratorError::DispatchRejected {
                host: host.to_string(),
                reason: response.message.unwrap_or_default(),
            })
        }
    }

    async fn kill_task(&self, host: &Host, task_instance_id: i64) -> OrchestratorResult<()> {
        let response = self
            .post::<()>(host, &format!("/{task_instance_id}/kill"), None)
            .await?;
        if !response.success {
            return Err(OrchestratorError::network(format!(
                "Worker {host} 终止任务 {task_instance_id} 失败: {}",
                response.message.unwrap_or_default()
            )));
        }
        Ok(())
    }

    async fn pause_task(&self, host: &Host, task_instance_id: i64) -> OrchestratorResult<()> {
        let response = self
            .post::<()>(host, &format!("/{task_instance_id}/pause"), None)
            .await?;
        if !response.success {
            return Err(OrchestratorError::network(format!(
                "Worker {host} 暂停任务 {task_instance_id} 失败: {}",
                response.message.unwrap_or_default()
            )));
        }
        Ok(())
    }

    async fn take_over_task(
        &self,
        host: &Host,
        request: &TakeOverRequest,
    ) -> OrchestratorResult<bool> {
        let response = self.post(host, "/take-over", Some(request)).await?;
        Ok(response.success)
    }
}
