//! Cloud control plane for the relay endpoint.
//!
//! [`azure::AzureClient`] speaks the provider's REST management and file
//! data planes; [`provision::ProvisioningEngine`] drives it through the
//! idempotent ensure-present-and-correct workflow and hands the resulting
//! endpoint to consumers through [`provision::EndpointSource`].

pub mod azure;
pub mod backoff;
pub mod client;
pub mod error;
pub mod provision;

pub use azure::{AzureClient, AzureCredentials};
pub use backoff::BackoffPolicy;
pub use client::{
    ContainerGroup, ContainerGroupSpec, ControlPlane, FileShare, ProvisioningState, ResourceGroup,
    ShareFileLocation, StorageAccount,
};
pub use error::{CloudError, Result};
pub use provision::{
    ComputeOutcome, EndpointSource, EnsureReport, ProvisionedEndpoint, ProvisioningEngine,
};
