//! Wiring and lifecycle of the whole service.
//!
//! Startup order: provision cloud resources, start the local proxy client,
//! then attach the health loop and the domain file watcher. Shutdown runs
//! the same chain in reverse on ctrl-c.

use anyhow::{Context, Result};
use async_trait::async_trait;
use azrelay_cloud::provision::EndpointSource;
use azrelay_cloud::{AzureClient, AzureCredentials, ProvisioningEngine};
use azrelay_config::{RoutingConfig, Settings};
use azrelay_proxy::{
    ChangeWatcher, HealthController, HealthTarget, HttpProbe, ProcessSupervisor, payload,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

type Engine = ProvisioningEngine<AzureClient>;

pub async fn run(settings: Settings) -> Result<()> {
    let routing = load_routing(&settings);

    let client = Arc::new(AzureClient::new(AzureCredentials {
        tenant_id: settings.tenant_id.clone(),
        client_id: settings.client_id.clone(),
        client_secret: settings.client_secret.clone(),
        subscription_id: settings.subscription_id.clone(),
    }));
    let server_config = payload::server_config_bytes(&settings)?;
    let engine: Arc<Engine> =
        Arc::new(ProvisioningEngine::new(settings.clone(), client, server_config));

    engine
        .ensure_all()
        .await
        .context("cloud provisioning failed")?;

    let mut supervisor = ProcessSupervisor::new(
        settings.clone(),
        routing,
        Arc::clone(&engine) as Arc<dyn EndpointSource>,
    );
    supervisor
        .initialize()
        .await
        .context("proxy client initialization failed")?;
    supervisor
        .start()
        .await
        .context("proxy client failed to start")?;
    let supervisor = Arc::new(Mutex::new(supervisor));

    info!(
        socks = settings.socks_port,
        http = settings.http_port,
        "proxy is up on 127.0.0.1"
    );

    let target = Arc::new(Orchestrator {
        supervisor: Arc::clone(&supervisor),
        engine: Arc::clone(&engine),
    });
    let probe = Arc::new(HttpProbe::new(settings.socks_port)?);
    let health = HealthController::start(target, probe, settings.check_interval);

    let watcher = settings.domain_file.clone().map(|path| {
        let supervisor = Arc::clone(&supervisor);
        ChangeWatcher::start(path.clone(), move || {
            let supervisor = Arc::clone(&supervisor);
            let path = path.clone();
            async move {
                let routing = RoutingConfig::load(&path)?;
                let mut supervisor = supervisor.lock().await;
                supervisor.set_routing(routing);
                supervisor.restart().await
            }
        })
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");

    if let Some(watcher) = watcher {
        watcher.stop().await;
    }
    health.stop().await;
    if let Err(e) = supervisor.lock().await.stop().await {
        error!(error = %e, "failed to stop proxy client cleanly");
    }
    engine.drain_background().await;

    info!("goodbye");
    Ok(())
}

fn load_routing(settings: &Settings) -> RoutingConfig {
    match &settings.domain_file {
        Some(path) => match RoutingConfig::load(path) {
            Ok(routing) => routing,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load domain file, using the baseline list");
                RoutingConfig::baseline()
            }
        },
        None => RoutingConfig::baseline(),
    }
}

/// Glue between the health loop and the pieces it heals.
struct Orchestrator {
    supervisor: Arc<Mutex<ProcessSupervisor>>,
    engine: Arc<Engine>,
}

#[async_trait]
impl HealthTarget for Orchestrator {
    async fn is_running(&self) -> bool {
        self.supervisor.lock().await.is_running()
    }

    async fn restart_proxy(&self) -> azrelay_proxy::Result<()> {
        self.supervisor.lock().await.restart().await
    }

    async fn repair_endpoint(&self) -> azrelay_proxy::Result<()> {
        self.engine.repair_compute().await?;
        Ok(())
    }
}
