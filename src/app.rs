use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use orchestrator_api::create_app;
use orchestrator_config::AppConfig;
use orchestrator_domain::{ExternalJobCleaner, Host, NoopJobCleaner};
use orchestrator_infrastructure::{
    install_prometheus_exporter, HttpTaskExecutorClient, InMemoryCommandRepository,
    InMemoryTaskInstanceRepository, InMemoryWorkflowDefinitionRepository,
    InMemoryWorkflowInstanceRepository, YarnJobCleaner,
};
use orchestrator_master::{MasterRepositories, MasterServer};
use orchestrator_registry::InMemoryRegistry;
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{error, info, warn};

/// Master进程：引擎加上对外的HTTP接口
pub struct Application {
    config: AppConfig,
    server: Arc<MasterServer>,
}

impl Application {
    pub fn new(config: AppConfig) -> Result<Self> {
        let master_host = resolve_master_host(&config)?;
        info!("初始化Master {}", master_host);

        if config.observability.metrics_enabled {
            install_prometheus_exporter(&config.observability.metrics_bind_address)?;
        }

        let repositories = MasterRepositories {
            workflow_definitions: Arc::new(InMemoryWorkflowDefinitionRepository::new()),
            workflow_instances: Arc::new(InMemoryWorkflowInstanceRepository::new()),
            task_instances: Arc::new(InMemoryTaskInstanceRepository::new()),
            commands: Arc::new(InMemoryCommandRepository::new()),
        };
        let registry = Arc::new(InMemoryRegistry::with_capacity(
            config.registry.subscription_capacity,
        ));
        let executor_client = Arc::new(
            HttpTaskExecutorClient::new(Duration::from_millis(config.dispatch.send_timeout_ms))
                .context("创建Worker客户端失败")?,
        );
        let job_cleaner = create_job_cleaner(&config)?;

        let server = Arc::new(MasterServer::new(
            config.clone(),
            master_host,
            repositories,
            registry,
            executor_client,
            job_cleaner,
        ));

        Ok(Self { config, server })
    }

    /// 启动引擎与HTTP接口，收到关闭信号后依次停止
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.server.start().await.context("启动Master失败")?;

        let api_handle = if self.config.api.enabled {
            let app = create_app(self.server.rpc(), &self.config.api);
            let listener = TcpListener::bind(&self.config.api.bind_address)
                .await
                .with_context(|| format!("绑定API地址失败: {}", self.config.api.bind_address))?;
            info!("API服务器监听: {}", self.config.api.bind_address);

            let mut api_shutdown = shutdown_rx.resubscribe();
            Some(tokio::spawn(async move {
                let served = axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = api_shutdown.recv().await;
                    })
                    .await;
                if let Err(e) = served {
                    error!("API服务器异常退出: {}", e);
                }
            }))
        } else {
            warn!("API已禁用，Worker无法回报任务状态");
            None
        };

        let _ = shutdown_rx.recv().await;
        info!("停止Master");

        self.server
            .stop(Duration::from_secs(self.config.master.stop_wait_timeout_seconds))
            .await;
        if let Some(handle) = api_handle {
            if let Err(e) = handle.await {
                error!("等待API服务器退出失败: {}", e);
            }
        }
        Ok(())
    }
}

fn resolve_master_host(config: &AppConfig) -> Result<Host> {
    let ip = match &config.master.advertise_host {
        Some(host) => host.clone(),
        None => hostname::get()
            .context("获取主机名失败")?
            .to_string_lossy()
            .into_owned(),
    };
    Ok(Host::new(ip, config.master.listen_port))
}

fn create_job_cleaner(config: &AppConfig) -> Result<Arc<dyn ExternalJobCleaner>> {
    match (
        config.failover.kill_yarn_job_when_failover,
        config.failover.yarn_resource_manager_url.as_deref(),
    ) {
        (true, Some(url)) => {
            let cleaner = YarnJobCleaner::new(url).context("创建YARN作业清理器失败")?;
            Ok(Arc::new(cleaner))
        }
        (true, None) => {
            warn!("未配置YARN ResourceManager地址，容错时不会清理外部作业");
            Ok(Arc::new(NoopJobCleaner))
        }
        (false, _) => Ok(Arc::new(NoopJobCleaner)),
    }
}
