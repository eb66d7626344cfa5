//! Wiring shared by every command that touches agents.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use pinbot_config::PinbotConfig;
use pinbot_cron::dispatcher::JobDispatcher;
use pinbot_cron::store::JobStore;
use pinbot_engine::{ActionExecutor, AgentService, Backends};
use pinbot_engine::slots::AgentSlots;
use pinbot_hooks::{StatusEvent, StatusRegistry};
use pinbot_platform::{OracleClient, PlatformClient};
use pinbot_storage::AgentStore;

pub struct App {
    pub config: PinbotConfig,
    pub dispatcher: Arc<JobDispatcher>,
    pub status: Arc<StatusRegistry>,
    pub platform: Arc<PlatformClient>,
    pub executor: Arc<ActionExecutor>,
    pub service: Arc<AgentService>,
}

impl App {
    pub async fn build(config: PinbotConfig) -> anyhow::Result<Self> {
        let db_path = config.db_path()?;
        let store = Arc::new(
            AgentStore::open(&db_path)
                .with_context(|| format!("failed to open {}", db_path.display()))?,
        );
        info!("Storage initialized: {}", db_path.display());

        let dispatcher = Arc::new(if config.engine.durable_jobs {
            JobDispatcher::with_store(Arc::new(JobStore::open(&db_path)?))
        } else {
            JobDispatcher::new()
        });

        let status = Arc::new(StatusRegistry::new());
        status
            .on(
                "*",
                Arc::new(|event: StatusEvent| {
                    Box::pin(async move {
                        info!(channel = event.channel(), "{}", event.message());
                    })
                }),
            )
            .await;

        let platform = Arc::new(PlatformClient::new(config.platform.clone())?);
        let oracle = Arc::new(OracleClient::new(config.oracle.clone())?);
        let backends = Backends {
            content: platform.clone(),
            oracle,
            actions: platform.clone(),
            tokens: platform.clone(),
        };

        let slots = Arc::new(AgentSlots::new());
        let executor = Arc::new(ActionExecutor::new(
            store.clone(),
            slots.clone(),
            status.clone(),
            backends,
            config.engine.browse.clone(),
        ));
        let service = Arc::new(AgentService::new(
            store,
            dispatcher.clone(),
            slots,
            executor.clone(),
            status.clone(),
        ));

        Ok(Self {
            config,
            dispatcher,
            status,
            platform,
            executor,
            service,
        })
    }
}
