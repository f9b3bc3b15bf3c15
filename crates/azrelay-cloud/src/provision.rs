//! Idempotent resource provisioning.
//!
//! [`ProvisioningEngine::ensure_all`] walks the five-stage resource chain
//! (resource group, storage account, file share, remote config artifact,
//! container group), creating whatever is missing and verifying whatever
//! exists. Every stage tolerates being re-run at any time; repeated passes
//! with no external change perform only reads.

use crate::backoff::BackoffPolicy;
use crate::client::{ContainerGroup, ContainerGroupSpec, ControlPlane, ShareFileLocation};
use crate::error::{CloudError, Result};
use async_trait::async_trait;
use azrelay_config::Settings;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Quota for the config share; it only ever holds one small JSON file.
const SHARE_QUOTA_GB: u32 = 1;

/// Where the config share is mounted inside the relay container.
const CONFIG_MOUNT_PATH: &str = "/etc/v2ray";

/// Snapshot of the provisioned relay endpoint. Replaced wholesale on every
/// provisioning pass, never patched in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedEndpoint {
    /// IP when the provider assigned one, DNS name otherwise.
    pub address: String,
    pub port: u16,
    pub user_id: Uuid,
}

/// Read side of the engine, consumed by the process supervisor.
#[async_trait]
pub trait EndpointSource: Send + Sync {
    /// Fresh endpoint snapshot, queried from the provider on every call.
    async fn endpoint(&self) -> Result<ProvisionedEndpoint>;
}

/// What `ensure_all` did on a given pass.
#[derive(Debug, Clone, Default)]
pub struct EnsureReport {
    pub group_created: bool,
    pub storage_created: bool,
    pub share_created: bool,
    /// Whether the stored config artifact was rewritten this pass. A rewrite
    /// forces container replacement: a running container never sees new
    /// mounted content.
    pub config_updated: bool,
    pub compute: ComputeOutcome,
}

/// How the compute stage resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ComputeOutcome {
    /// An existing group was valid and running.
    #[default]
    Reused,
    /// An existing group was valid but stopped, and was started.
    Resumed,
    /// A new group was created (and stale ones swept).
    Created,
}

#[derive(Default)]
struct EngineState {
    storage_key: Option<String>,
    active_group: Option<String>,
    sweep: Option<JoinHandle<()>>,
}

/// Orchestrates [`ControlPlane`] calls into the ensure-present-and-correct
/// workflow, and owns the retry/backoff policy for doing so.
pub struct ProvisioningEngine<C: ControlPlane> {
    settings: Settings,
    client: Arc<C>,
    retry: BackoffPolicy,
    readiness: BackoffPolicy,
    /// Desired bytes of the server-side config artifact (stage 4).
    remote_config: Vec<u8>,
    state: RwLock<EngineState>,
}

impl<C: ControlPlane + 'static> ProvisioningEngine<C> {
    pub fn new(settings: Settings, client: Arc<C>, remote_config: Vec<u8>) -> Self {
        Self {
            settings,
            client,
            retry: BackoffPolicy::default(),
            readiness: BackoffPolicy::storage_provisioning(),
            remote_config,
            state: RwLock::new(EngineState::default()),
        }
    }

    /// Ensure the whole resource chain exists and matches configuration.
    ///
    /// Stages run strictly in order; any stage that exhausts its retry budget
    /// aborts the pass with an error.
    pub async fn ensure_all(&self) -> Result<EnsureReport> {
        info!("verifying cloud resources");
        let mut report = EnsureReport::default();

        report.group_created = self.ensure_resource_group().await?;
        report.storage_created = self.ensure_storage_account().await?;
        report.share_created = self.ensure_file_share().await?;
        report.config_updated = self.sync_remote_config().await?;
        report.compute = self.ensure_container_group(report.config_updated).await?;

        info!(?report, "cloud resources verified");
        Ok(report)
    }

    /// Restart the active container group; falls back to a full provisioning
    /// pass when the group has vanished.
    pub async fn repair_compute(&self) -> Result<()> {
        let Some(name) = self.active_group_name().await? else {
            warn!("no container group to repair, provisioning from scratch");
            self.ensure_all().await?;
            return Ok(());
        };

        info!(group = name, "restarting container group");
        let group = self.settings.resource_group.as_str();
        let name_ref = name.as_str();
        match self
            .retry
            .retry("restart container group", || {
                self.client.restart_container_group(group, name_ref)
            })
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                warn!(group = name, "container group vanished, provisioning from scratch");
                self.state.write().await.active_group = None;
                self.ensure_all().await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Await any in-flight stale-group sweep. Called on shutdown so no
    /// background deletion outlives the process's control.
    pub async fn drain_background(&self) {
        let handle = self.state.write().await.sweep.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    // Stage 1: resource group. Mismatched region is reported, not corrected.
    async fn ensure_resource_group(&self) -> Result<bool> {
        let name = self.settings.resource_group.as_str();
        let location = self.settings.location.as_str();

        match self
            .retry
            .retry("get resource group", || self.client.get_resource_group(name))
            .await
        {
            Ok(group) => {
                if !group.location.eq_ignore_ascii_case(location) {
                    warn!(
                        group = name,
                        actual = group.location,
                        configured = location,
                        "resource group region differs from configuration, leaving as-is"
                    );
                }
                debug!(group = name, "resource group exists");
                Ok(false)
            }
            Err(e) if e.is_not_found() => {
                info!(group = name, location, "creating resource group");
                match self
                    .retry
                    .retry("create resource group", || {
                        self.client.create_resource_group(name, location)
                    })
                    .await
                {
                    Ok(()) => Ok(true),
                    Err(e) if e.is_already_exists() => {
                        debug!(group = name, "resource group created concurrently");
                        Ok(false)
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    // Stage 2: storage account, polled to a terminal state and probed for
    // file-service readiness before its key is trusted.
    async fn ensure_storage_account(&self) -> Result<bool> {
        let group = self.settings.resource_group.as_str();
        let location = self.settings.location.as_str();
        let account = self.settings.storage_account_name()?;
        let acct = account.as_str();

        let created = match self
            .retry
            .retry("get storage account", || self.client.get_storage_account(group, acct))
            .await
        {
            Ok(existing) if existing.provisioning_state.is_terminal_success() => {
                debug!(account = acct, "storage account exists");
                false
            }
            Ok(_) => {
                // Found but still materializing (e.g. a previous run died
                // mid-create); fall through to the readiness wait.
                info!(account = acct, "storage account still provisioning");
                self.wait_for_storage(group, acct).await?;
                false
            }
            Err(e) if e.is_not_found() => {
                info!(account = acct, "creating storage account");
                match self
                    .retry
                    .retry("create storage account", || {
                        self.client.create_storage_account(group, acct, location)
                    })
                    .await
                {
                    Ok(()) => {}
                    Err(e) if e.is_already_exists() => {
                        debug!(account = acct, "storage account created concurrently");
                    }
                    Err(e) => return Err(e),
                }
                self.wait_for_storage(group, acct).await?;
                true
            }
            Err(e) => return Err(e),
        };

        // The key is cached only once the file service actually answers;
        // until then data-plane auth failures mean "not ready yet".
        let key = self.confirm_file_service_ready(group, acct).await?;
        self.state.write().await.storage_key = Some(key);
        Ok(created)
    }

    async fn wait_for_storage(&self, group: &str, account: &str) -> Result<()> {
        self.readiness
            .wait_until("storage account provisioning", || async move {
                let state = self.client.get_storage_account(group, account).await?;
                Ok(state.provisioning_state.is_terminal_success())
            })
            .await
    }

    /// Probe the file service until it answers, then hand back the key it
    /// answered for. A NotFound answer to the probe means the service is up;
    /// auth failures mean the freshly created account is not yet usable.
    async fn confirm_file_service_ready(&self, group: &str, account: &str) -> Result<String> {
        for attempt in 0..self.readiness.max_attempts {
            let keys = self.client.list_storage_keys(group, account).await?;
            let candidate = keys.into_iter().next().ok_or_else(|| {
                CloudError::Auth(format!("storage account {account} returned no access keys"))
            })?;

            match self.client.probe_file_service(account, &candidate).await {
                Ok(()) | Err(CloudError::NotFound(_)) => return Ok(candidate),
                Err(e) if e.is_auth() => {
                    debug!(account, attempt = attempt + 1, "file service not ready yet");
                }
                Err(e) => return Err(e),
            }

            if attempt + 1 < self.readiness.max_attempts {
                sleep(self.readiness.delay_for(attempt)).await;
            }
        }

        Err(CloudError::RetriesExhausted {
            operation: "file service readiness".to_string(),
            attempts: self.readiness.max_attempts,
        })
    }

    // Stage 3: file share. Existence is success.
    async fn ensure_file_share(&self) -> Result<bool> {
        let group = self.settings.resource_group.as_str();
        let account = self.settings.storage_account_name()?;
        let acct = account.as_str();
        let share = self.settings.share_name.as_str();

        match self
            .retry
            .retry("get file share", || self.client.get_file_share(group, acct, share))
            .await
        {
            Ok(existing) => {
                debug!(share, quota_gb = existing.quota_gb, "file share exists");
                Ok(false)
            }
            Err(e) if e.is_not_found() => {
                info!(share, quota_gb = SHARE_QUOTA_GB, "creating file share");
                match self
                    .retry
                    .retry("create file share", || {
                        self.client.create_file_share(group, acct, share, SHARE_QUOTA_GB)
                    })
                    .await
                {
                    Ok(()) => Ok(true),
                    Err(e) if e.is_already_exists() => {
                        debug!(share, "file share created concurrently");
                        Ok(false)
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    // Stage 4: the stored config artifact. Uploaded only when absent or
    // byte-different from the desired payload; the returned flag drives the
    // compute stage's staleness decision.
    async fn sync_remote_config(&self) -> Result<bool> {
        let account = self.settings.storage_account_name()?;
        let key = self.storage_key().await?;
        let loc = ShareFileLocation {
            account: &account,
            key: &key,
            share: &self.settings.share_name,
            path: &self.settings.remote_config_name,
        };
        let loc_ref = &loc;

        let existing = match self
            .retry
            .retry("download remote config", || self.client.download_file(loc_ref))
            .await
        {
            Ok(bytes) => Some(bytes),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        if existing.as_deref() == Some(self.remote_config.as_slice()) {
            debug!("remote config is up to date");
            return Ok(false);
        }

        info!(
            size = self.remote_config.len(),
            existed = existing.is_some(),
            "uploading remote config"
        );
        self.retry
            .retry("upload remote config", || {
                self.client.upload_file(loc_ref, &self.remote_config)
            })
            .await?;
        Ok(true)
    }

    // Stage 5: the container group. Two separately reported reasons force
    // replacement: a just-updated config artifact, and no region-matching
    // instance to reuse.
    async fn ensure_container_group(&self, config_updated: bool) -> Result<ComputeOutcome> {
        let group = self.settings.resource_group.as_str();
        let prefix = format!("{}-", self.settings.deployment_prefix());

        let mut candidates: Vec<ContainerGroup> = self
            .retry
            .retry("list container groups", || self.client.list_container_groups(group))
            .await?
            .into_iter()
            .filter(|g| g.name.starts_with(&prefix))
            .collect();
        // Names embed a zero-padded creation timestamp, so lexicographic
        // order is creation order; when several groups are valid the last
        // created wins.
        candidates.sort_by(|a, b| a.name.cmp(&b.name));

        let reusable = candidates
            .last()
            .filter(|g| g.location.eq_ignore_ascii_case(&self.settings.location));

        if config_updated {
            info!("config artifact changed, replacing container group");
        } else if let Some(existing) = reusable {
            let outcome = if existing.is_running() {
                debug!(group = existing.name, "reusing running container group");
                ComputeOutcome::Reused
            } else {
                info!(
                    group = existing.name,
                    state = existing.state.as_deref().unwrap_or("unknown"),
                    "container group not running, starting it"
                );
                let name_ref = existing.name.as_str();
                self.retry
                    .retry("start container group", || {
                        self.client.start_container_group(group, name_ref)
                    })
                    .await?;
                ComputeOutcome::Resumed
            };
            self.state.write().await.active_group = Some(existing.name.clone());
            return Ok(outcome);
        } else if candidates.is_empty() {
            info!("no container group found, creating one");
        } else {
            info!(
                configured = self.settings.location,
                "no container group in the configured region, creating one"
            );
        }

        let spec = self.new_group_spec().await?;
        let spec_ref = &spec;
        info!(group = spec.name, "creating container group");
        let created = self
            .retry
            .retry("create container group", || {
                self.client.create_container_group(group, spec_ref)
            })
            .await?;

        self.state.write().await.active_group = Some(created.name.clone());
        self.sweep_stale_groups(&created.name, &candidates).await;
        Ok(ComputeOutcome::Created)
    }

    async fn new_group_spec(&self) -> Result<ContainerGroupSpec> {
        // Millisecond timestamp plus a random fragment: sortable by creation
        // time, unique even for back-to-back replacements.
        let timestamp = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let fragment = &Uuid::new_v4().simple().to_string()[..6];
        let name = format!("{}-{timestamp:013}-{fragment}", self.settings.deployment_prefix());

        Ok(ContainerGroupSpec {
            dns_label: name.clone(),
            name,
            location: self.settings.location.clone(),
            image: self.settings.container_image.clone(),
            port: self.settings.proxy_port,
            share_name: self.settings.share_name.clone(),
            storage_account: self.settings.storage_account_name()?,
            storage_key: self.storage_key().await?,
            mount_path: CONFIG_MOUNT_PATH.to_string(),
            command: vec![
                "v2ray".to_string(),
                "run".to_string(),
                "-c".to_string(),
                format!("{CONFIG_MOUNT_PATH}/{}", self.settings.remote_config_name),
            ],
        })
    }

    /// Delete prior prefix-matching groups in the background. Failures here
    /// are logged and swallowed; a leftover group costs money but never
    /// correctness.
    async fn sweep_stale_groups(&self, keep: &str, candidates: &[ContainerGroup]) {
        let stale: Vec<String> = candidates
            .iter()
            .filter(|g| g.name != keep)
            .map(|g| g.name.clone())
            .collect();
        if stale.is_empty() {
            return;
        }

        let client = Arc::clone(&self.client);
        let resource_group = self.settings.resource_group.clone();
        let handle = tokio::spawn(async move {
            for name in stale {
                match client.delete_container_group(&resource_group, &name).await {
                    Ok(()) => info!(group = name, "deleted stale container group"),
                    Err(e) if e.is_not_found() => {}
                    Err(e) => {
                        warn!(group = name, error = %e, "failed to delete stale container group")
                    }
                }
            }
        });
        self.state.write().await.sweep = Some(handle);
    }

    async fn storage_key(&self) -> Result<String> {
        self.state.read().await.storage_key.clone().ok_or_else(|| {
            CloudError::Auth("storage key not initialized, run ensure_all first".to_string())
        })
    }

    async fn active_group_name(&self) -> Result<Option<String>> {
        if let Some(name) = self.state.read().await.active_group.clone() {
            return Ok(Some(name));
        }

        // Cold start (e.g. repair before any ensure pass): take the newest
        // prefix-matching group.
        let prefix = format!("{}-", self.settings.deployment_prefix());
        let mut names: Vec<String> = self
            .client
            .list_container_groups(&self.settings.resource_group)
            .await?
            .into_iter()
            .filter(|g| g.name.starts_with(&prefix))
            .map(|g| g.name)
            .collect();
        names.sort();
        Ok(names.pop())
    }
}

#[async_trait]
impl<C: ControlPlane + 'static> EndpointSource for ProvisioningEngine<C> {
    async fn endpoint(&self) -> Result<ProvisionedEndpoint> {
        let name = self
            .active_group_name()
            .await?
            .ok_or_else(|| CloudError::NotFound("no active container group".to_string()))?;

        let resource_group = self.settings.resource_group.as_str();
        let name_ref = name.as_str();
        let group = self
            .retry
            .retry("get container group", || {
                self.client.get_container_group(resource_group, name_ref)
            })
            .await?;

        let address = group.address().ok_or(CloudError::EndpointUnresolvable)?;
        if group.ip.is_none() {
            warn!(group = name, "container group has no ip address, falling back to fqdn");
        }

        Ok(ProvisionedEndpoint {
            address: address.to_string(),
            port: self.settings.proxy_port,
            user_id: self.settings.user_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{FileShare, ProvisioningState, ResourceGroup, StorageAccount};
    use std::collections::HashMap;
    use std::sync::Mutex;

    const TEST_UUID: &str = "f5a3e6d1-4b2c-4e8f-9a7b-1c2d3e4f5a6b";
    // deployment_prefix for TEST_UUID: container prefix + first 8 uuid chars
    const PREFIX: &str = "azrelayf5a3e6d1";

    fn test_settings() -> Settings {
        temp_env::with_vars(
            [
                ("AZURE_TENANT_ID", Some("tenant")),
                ("AZURE_CLIENT_ID", Some("client")),
                ("AZURE_CLIENT_SECRET", Some("secret")),
                ("AZURE_SUBSCRIPTION_ID", Some("sub")),
                ("V2RAY_USER_ID", Some(TEST_UUID)),
            ],
            || Settings::from_env().unwrap(),
        )
    }

    #[derive(Default)]
    struct FakeState {
        resource_group: Option<ResourceGroup>,
        storage: Option<StorageAccount>,
        shares: Vec<String>,
        files: HashMap<String, Vec<u8>>,
        groups: Vec<ContainerGroup>,
        // not-ready answers the file-service probe gives before readiness
        probe_failures: u32,
        // call counters
        creates: HashMap<&'static str, u32>,
        uploads: u32,
        starts: u32,
        restarts: u32,
        deletes: Vec<String>,
    }

    #[derive(Default)]
    struct FakeControlPlane {
        state: Mutex<FakeState>,
    }

    impl FakeControlPlane {
        fn bump(state: &mut FakeState, what: &'static str) {
            *state.creates.entry(what).or_insert(0) += 1;
        }

        fn creates(&self, what: &'static str) -> u32 {
            *self.state.lock().unwrap().creates.get(what).unwrap_or(&0)
        }

        fn with_group(self, name: &str, location: &str, state: &str) -> Self {
            self.state.lock().unwrap().groups.push(ContainerGroup {
                name: name.to_string(),
                location: location.to_string(),
                state: Some(state.to_string()),
                ip: Some("20.0.0.1".to_string()),
                fqdn: Some("azrelay.example.io".to_string()),
            });
            self
        }

        /// Pretend every resource up to the config artifact already exists.
        fn with_chain(self, config: &[u8]) -> Self {
            {
                let mut state = self.state.lock().unwrap();
                state.resource_group = Some(ResourceGroup {
                    name: "azrelay-rg".into(),
                    location: "southeastasia".into(),
                });
                state.storage = Some(StorageAccount {
                    name: "store".into(),
                    location: "southeastasia".into(),
                    provisioning_state: ProvisioningState::Succeeded,
                });
                state.shares.push("proxy-config".into());
                state.files.insert("config.json".into(), config.to_vec());
            }
            self
        }
    }

    #[async_trait]
    impl ControlPlane for FakeControlPlane {
        async fn get_resource_group(&self, name: &str) -> Result<ResourceGroup> {
            self.state
                .lock()
                .unwrap()
                .resource_group
                .clone()
                .ok_or_else(|| CloudError::NotFound(name.to_string()))
        }

        async fn create_resource_group(&self, name: &str, location: &str) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            Self::bump(&mut state, "rg");
            state.resource_group = Some(ResourceGroup {
                name: name.to_string(),
                location: location.to_string(),
            });
            Ok(())
        }

        async fn get_storage_account(&self, _group: &str, name: &str) -> Result<StorageAccount> {
            self.state
                .lock()
                .unwrap()
                .storage
                .clone()
                .ok_or_else(|| CloudError::NotFound(name.to_string()))
        }

        async fn create_storage_account(
            &self,
            _group: &str,
            name: &str,
            location: &str,
        ) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            Self::bump(&mut state, "storage");
            state.storage = Some(StorageAccount {
                name: name.to_string(),
                location: location.to_string(),
                provisioning_state: ProvisioningState::Succeeded,
            });
            Ok(())
        }

        async fn list_storage_keys(&self, _group: &str, _name: &str) -> Result<Vec<String>> {
            Ok(vec!["a2V5".to_string()])
        }

        async fn probe_file_service(&self, account: &str, _key: &str) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            if state.probe_failures > 0 {
                state.probe_failures -= 1;
                return Err(CloudError::Auth(account.to_string()));
            }
            Err(CloudError::NotFound("probe share".to_string()))
        }

        async fn get_file_share(
            &self,
            _group: &str,
            _account: &str,
            share: &str,
        ) -> Result<FileShare> {
            let state = self.state.lock().unwrap();
            if state.shares.iter().any(|s| s == share) {
                Ok(FileShare {
                    name: share.to_string(),
                    quota_gb: SHARE_QUOTA_GB,
                })
            } else {
                Err(CloudError::NotFound(share.to_string()))
            }
        }

        async fn create_file_share(
            &self,
            _group: &str,
            _account: &str,
            share: &str,
            _quota_gb: u32,
        ) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            Self::bump(&mut state, "share");
            state.shares.push(share.to_string());
            Ok(())
        }

        async fn download_file(&self, loc: &ShareFileLocation<'_>) -> Result<Vec<u8>> {
            self.state
                .lock()
                .unwrap()
                .files
                .get(loc.path)
                .cloned()
                .ok_or_else(|| CloudError::NotFound(loc.path.to_string()))
        }

        async fn upload_file(&self, loc: &ShareFileLocation<'_>, contents: &[u8]) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.uploads += 1;
            state.files.insert(loc.path.to_string(), contents.to_vec());
            Ok(())
        }

        async fn list_container_groups(&self, _group: &str) -> Result<Vec<ContainerGroup>> {
            Ok(self.state.lock().unwrap().groups.clone())
        }

        async fn get_container_group(&self, _group: &str, name: &str) -> Result<ContainerGroup> {
            self.state
                .lock()
                .unwrap()
                .groups
                .iter()
                .find(|g| g.name == name)
                .cloned()
                .ok_or_else(|| CloudError::NotFound(name.to_string()))
        }

        async fn create_container_group(
            &self,
            _group: &str,
            spec: &ContainerGroupSpec,
        ) -> Result<ContainerGroup> {
            let mut state = self.state.lock().unwrap();
            Self::bump(&mut state, "container");
            let group = ContainerGroup {
                name: spec.name.clone(),
                location: spec.location.clone(),
                state: Some("Running".to_string()),
                ip: Some("20.0.0.9".to_string()),
                fqdn: None,
            };
            state.groups.push(group.clone());
            Ok(group)
        }

        async fn delete_container_group(&self, _group: &str, name: &str) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.groups.retain(|g| g.name != name);
            state.deletes.push(name.to_string());
            Ok(())
        }

        async fn restart_container_group(&self, _group: &str, name: &str) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            if !state.groups.iter().any(|g| g.name == name) {
                return Err(CloudError::NotFound(name.to_string()));
            }
            state.restarts += 1;
            Ok(())
        }

        async fn start_container_group(&self, _group: &str, name: &str) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            let Some(group) = state.groups.iter_mut().find(|g| g.name == name) else {
                return Err(CloudError::NotFound(name.to_string()));
            };
            group.state = Some("Running".to_string());
            state.starts += 1;
            Ok(())
        }
    }

    fn engine(client: Arc<FakeControlPlane>) -> ProvisioningEngine<FakeControlPlane> {
        ProvisioningEngine::new(test_settings(), client, b"{\"desired\":1}".to_vec())
    }

    #[tokio::test(start_paused = true)]
    async fn first_pass_creates_everything() {
        let client = Arc::new(FakeControlPlane::default());
        let engine = engine(Arc::clone(&client));

        let report = engine.ensure_all().await.unwrap();
        assert!(report.group_created);
        assert!(report.storage_created);
        assert!(report.share_created);
        assert!(report.config_updated);
        assert_eq!(report.compute, ComputeOutcome::Created);
        assert_eq!(client.creates("container"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_passes_only_verify() {
        let client = Arc::new(FakeControlPlane::default());
        let engine = engine(Arc::clone(&client));

        engine.ensure_all().await.unwrap();
        let report = engine.ensure_all().await.unwrap();

        assert!(!report.group_created);
        assert!(!report.storage_created);
        assert!(!report.share_created);
        assert!(!report.config_updated);
        assert_eq!(report.compute, ComputeOutcome::Reused);

        assert_eq!(client.creates("rg"), 1);
        assert_eq!(client.creates("storage"), 1);
        assert_eq!(client.creates("share"), 1);
        assert_eq!(client.creates("container"), 1);
        assert_eq!(client.state.lock().unwrap().uploads, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn changed_config_uploads_once_and_replaces_compute() {
        let client = Arc::new(FakeControlPlane::default());
        let first = engine(Arc::clone(&client));
        first.ensure_all().await.unwrap();
        first.drain_background().await;

        let second = ProvisioningEngine::new(
            test_settings(),
            Arc::clone(&client),
            b"{\"desired\":2}".to_vec(),
        );
        let report = second.ensure_all().await.unwrap();
        second.drain_background().await;

        assert!(report.config_updated);
        assert_eq!(report.compute, ComputeOutcome::Created);
        let state = client.state.lock().unwrap();
        assert_eq!(state.uploads, 2);
        // The first group was swept after the replacement.
        assert_eq!(state.deletes.len(), 1);
        assert_eq!(state.groups.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_group_is_resumed_not_replaced() {
        let client = Arc::new(
            FakeControlPlane::default()
                .with_chain(b"{\"desired\":1}")
                .with_group(&format!("{PREFIX}-0000000000001-aaaaaa"), "southeastasia", "Stopped"),
        );

        let engine = engine(Arc::clone(&client));
        let report = engine.ensure_all().await.unwrap();

        assert_eq!(report.compute, ComputeOutcome::Resumed);
        assert_eq!(client.state.lock().unwrap().starts, 1);
        assert_eq!(client.creates("container"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn newest_of_several_valid_groups_wins() {
        let older = format!("{PREFIX}-0000000000001-aaaaaa");
        let newer = format!("{PREFIX}-0000000000007-bbbbbb");
        let client = Arc::new(
            FakeControlPlane::default()
                .with_chain(b"{\"desired\":1}")
                .with_group(&older, "southeastasia", "Running")
                .with_group(&newer, "southeastasia", "Running"),
        );

        let engine = engine(Arc::clone(&client));
        let report = engine.ensure_all().await.unwrap();
        assert_eq!(report.compute, ComputeOutcome::Reused);
        assert_eq!(engine.state.read().await.active_group.as_deref(), Some(newer.as_str()));

        let endpoint = engine.endpoint().await.unwrap();
        assert_eq!(endpoint.address, "20.0.0.1");
        assert_eq!(endpoint.port, 443);
    }

    #[tokio::test(start_paused = true)]
    async fn region_mismatch_forces_replacement() {
        let misplaced = format!("{PREFIX}-0000000000001-aaaaaa");
        let client = Arc::new(
            FakeControlPlane::default()
                .with_chain(b"{\"desired\":1}")
                .with_group(&misplaced, "westeurope", "Running"),
        );

        let engine = engine(Arc::clone(&client));
        let report = engine.ensure_all().await.unwrap();
        engine.drain_background().await;

        assert_eq!(report.compute, ComputeOutcome::Created);
        // The out-of-region group got swept.
        assert_eq!(client.state.lock().unwrap().deletes, vec![misplaced]);
    }

    #[tokio::test(start_paused = true)]
    async fn file_service_readiness_is_awaited_before_key_caching() {
        let client = Arc::new(FakeControlPlane::default());
        client.state.lock().unwrap().probe_failures = 2;

        let engine = engine(Arc::clone(&client));
        engine.ensure_all().await.unwrap();

        assert_eq!(engine.state.read().await.storage_key.as_deref(), Some("a2V5"));
    }

    #[tokio::test(start_paused = true)]
    async fn repair_restarts_the_active_group() {
        let client = Arc::new(FakeControlPlane::default());
        let engine = engine(Arc::clone(&client));
        engine.ensure_all().await.unwrap();

        engine.repair_compute().await.unwrap();
        assert_eq!(client.state.lock().unwrap().restarts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn repair_with_no_group_reprovisions() {
        let client = Arc::new(FakeControlPlane::default());
        let engine = engine(Arc::clone(&client));

        engine.repair_compute().await.unwrap();
        assert_eq!(client.creates("container"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn endpoint_errors_without_any_address() {
        let client = Arc::new(FakeControlPlane::default());
        let engine = engine(Arc::clone(&client));
        engine.ensure_all().await.unwrap();

        {
            let mut state = client.state.lock().unwrap();
            let group = state.groups.last_mut().unwrap();
            group.ip = None;
            group.fqdn = None;
        }

        assert!(matches!(engine.endpoint().await, Err(CloudError::EndpointUnresolvable)));
    }
}
