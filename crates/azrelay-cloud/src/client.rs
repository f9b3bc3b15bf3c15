//! Control-plane abstraction.
//!
//! [`ControlPlane`] is the seam between the provisioning workflow and Azure:
//! the production implementation is [`crate::azure::AzureClient`], tests use
//! an in-memory fake. Operations are typed per resource rather than generic;
//! azrelay manages exactly one resource chain and a generic provider model is
//! an explicit non-goal.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Typed calls against the cloud control plane (and the file-share data
/// plane, which shares the same error taxonomy).
///
/// Existence failures surface as [`crate::CloudError::NotFound`] and name
/// conflicts as [`crate::CloudError::AlreadyExists`] so callers can treat
/// create races as success.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    // Resource group
    async fn get_resource_group(&self, name: &str) -> Result<ResourceGroup>;
    async fn create_resource_group(&self, name: &str, location: &str) -> Result<()>;

    // Storage account
    async fn get_storage_account(&self, group: &str, name: &str) -> Result<StorageAccount>;
    async fn create_storage_account(&self, group: &str, name: &str, location: &str) -> Result<()>;
    async fn list_storage_keys(&self, group: &str, name: &str) -> Result<Vec<String>>;

    /// Lightweight data-plane call against the account's file service,
    /// used as a readiness probe after creation. Maps the service's answer to
    /// the usual taxonomy: `NotFound` means the service is up and answering,
    /// `Auth` means the account is not yet usable.
    async fn probe_file_service(&self, account: &str, key: &str) -> Result<()>;

    // File share (management plane)
    async fn get_file_share(&self, group: &str, account: &str, share: &str) -> Result<FileShare>;
    async fn create_file_share(
        &self,
        group: &str,
        account: &str,
        share: &str,
        quota_gb: u32,
    ) -> Result<()>;

    // Files within the share (data plane)
    async fn download_file(&self, loc: &ShareFileLocation<'_>) -> Result<Vec<u8>>;
    async fn upload_file(&self, loc: &ShareFileLocation<'_>, contents: &[u8]) -> Result<()>;

    // Container groups
    async fn list_container_groups(&self, group: &str) -> Result<Vec<ContainerGroup>>;
    async fn get_container_group(&self, group: &str, name: &str) -> Result<ContainerGroup>;
    async fn create_container_group(
        &self,
        group: &str,
        spec: &ContainerGroupSpec,
    ) -> Result<ContainerGroup>;
    async fn delete_container_group(&self, group: &str, name: &str) -> Result<()>;
    async fn restart_container_group(&self, group: &str, name: &str) -> Result<()>;
    async fn start_container_group(&self, group: &str, name: &str) -> Result<()>;
}

/// Address of a file within an Azure file share.
#[derive(Debug, Clone)]
pub struct ShareFileLocation<'a> {
    pub account: &'a str,
    pub key: &'a str,
    pub share: &'a str,
    pub path: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub name: String,
    pub location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageAccount {
    pub name: String,
    pub location: String,
    pub provisioning_state: ProvisioningState,
}

/// Terminal and in-flight provisioning states as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisioningState {
    Creating,
    Succeeded,
    Failed,
    Other(String),
}

impl ProvisioningState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "Creating" | "ResolvingDNS" => ProvisioningState::Creating,
            "Succeeded" => ProvisioningState::Succeeded,
            "Failed" => ProvisioningState::Failed,
            other => ProvisioningState::Other(other.to_string()),
        }
    }

    pub fn is_terminal_success(&self) -> bool {
        matches!(self, ProvisioningState::Succeeded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileShare {
    pub name: String,
    pub quota_gb: u32,
}

/// A container group as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerGroup {
    pub name: String,
    pub location: String,
    /// Last-known run state ("Running", "Stopped", ...); absent while the
    /// instance view has not materialized yet.
    pub state: Option<String>,
    pub ip: Option<String>,
    pub fqdn: Option<String>,
}

impl ContainerGroup {
    pub fn is_running(&self) -> bool {
        self.state.as_deref() == Some("Running")
    }

    /// Public address, IP preferred over the DNS name so the tunnel keeps
    /// working when DNS is interfered with.
    pub fn address(&self) -> Option<&str> {
        self.ip.as_deref().or(self.fqdn.as_deref())
    }
}

/// Desired shape of a new container group.
#[derive(Debug, Clone)]
pub struct ContainerGroupSpec {
    pub name: String,
    pub location: String,
    pub image: String,
    pub port: u16,
    pub dns_label: String,
    pub share_name: String,
    pub storage_account: String,
    pub storage_key: String,
    /// Mount point for the config share inside the container.
    pub mount_path: String,
    pub command: Vec<String>,
}
