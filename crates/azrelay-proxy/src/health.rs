//! Periodic health checking and self-healing.
//!
//! Each tick first makes sure the local process is up, then checks real
//! connectivity by fetching a known URL through the local socks inbound.
//! Consecutive connectivity failures escalate to an endpoint repair. Ticks
//! never overlap; a slow tick delays the next one.

use crate::error::{ProxyError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Connectivity failures in a row before the endpoint is repaired.
const FAILURE_THRESHOLD: u32 = 3;

/// How long a repaired endpoint gets to come up before the local process
/// is restarted against it.
const REPAIR_SETTLE: Duration = Duration::from_secs(30);

/// Extra delay after a tick that itself errored.
const ERROR_BACKOFF: Duration = Duration::from_secs(60);

const PROBE_URL: &str = "https://www.google.com/generate_204";
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// What the controller acts on: the supervised process and the endpoint
/// behind it.
#[async_trait]
pub trait HealthTarget: Send + Sync {
    async fn is_running(&self) -> bool;
    async fn restart_proxy(&self) -> Result<()>;
    async fn repair_endpoint(&self) -> Result<()>;
}

/// End-to-end connectivity check through the proxy.
#[async_trait]
pub trait ProxyProbe: Send + Sync {
    async fn check(&self) -> Result<()>;
}

/// Fetches a no-content URL through the local socks inbound.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(socks_port: u16) -> Result<Self> {
        let proxy = reqwest::Proxy::all(format!("socks5h://127.0.0.1:{socks_port}"))?;
        let client = reqwest::Client::builder()
            .proxy(proxy)
            .timeout(PROBE_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ProxyProbe for HttpProbe {
    async fn check(&self) -> Result<()> {
        let response = self.client.get(PROBE_URL).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProxyError::Probe(format!("unexpected status {}", response.status())))
        }
    }
}

pub struct HealthController {
    handle: Option<JoinHandle<()>>,
}

impl HealthController {
    /// Spawn the check loop with the given tick interval.
    pub fn start(
        target: Arc<dyn HealthTarget>,
        probe: Arc<dyn ProxyProbe>,
        interval: Duration,
    ) -> Self {
        info!(interval_secs = interval.as_secs(), "starting health checks");
        let handle = tokio::spawn(async move {
            let mut failures = 0u32;
            loop {
                sleep(interval).await;
                if let Err(e) = tick(&target, &probe, &mut failures).await {
                    warn!(error = %e, backoff_secs = ERROR_BACKOFF.as_secs(), "health check errored");
                    sleep(ERROR_BACKOFF).await;
                }
            }
        });
        Self { handle: Some(handle) }
    }

    /// Cancel the check loop and wait for it to wind down.
    pub async fn stop(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

async fn tick(
    target: &Arc<dyn HealthTarget>,
    probe: &Arc<dyn ProxyProbe>,
    failures: &mut u32,
) -> Result<()> {
    if !target.is_running().await {
        // A dead process is a local problem, not evidence against the
        // endpoint; it does not count toward the failure threshold.
        warn!("proxy client is not running, restarting it");
        return target.restart_proxy().await;
    }

    match probe.check().await {
        Ok(()) => {
            debug!("connectivity check passed");
            *failures = 0;
            Ok(())
        }
        Err(e) => {
            *failures += 1;
            warn!(failures, threshold = FAILURE_THRESHOLD, error = %e, "connectivity check failed");
            if *failures < FAILURE_THRESHOLD {
                return Ok(());
            }
            info!("failure threshold reached, repairing endpoint");
            let outcome = repair(target).await;
            // Counting restarts from zero after a repair attempt, successful
            // or not, keeps a broken endpoint from being repaired every tick.
            *failures = 0;
            outcome
        }
    }
}

async fn repair(target: &Arc<dyn HealthTarget>) -> Result<()> {
    target.repair_endpoint().await?;
    sleep(REPAIR_SETTLE).await;
    target.restart_proxy().await
}
