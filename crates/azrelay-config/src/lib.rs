//! Deployment settings for azrelay.
//!
//! All configuration comes from environment variables; the binary loads an
//! optional `.env` file before calling [`Settings::from_env`]. Derived
//! resource names (storage account, DNS label) are decorated with a suffix
//! taken from the proxy user UUID so deployments never collide globally.

pub mod domains;
pub mod error;

pub use domains::RoutingConfig;
pub use error::*;

use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Storage account names must be globally unique and follow Azure's grammar.
const STORAGE_NAME_MIN: usize = 3;
const STORAGE_NAME_MAX: usize = 24;

/// Deployment configuration, immutable after [`Settings::from_env`].
#[derive(Debug, Clone)]
pub struct Settings {
    // Azure service principal
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub subscription_id: String,

    // Azure resources
    pub resource_group: String,
    pub location: String,
    pub storage_account_base: String,
    pub share_name: String,
    pub remote_config_name: String,
    pub container_prefix: String,
    pub container_image: String,

    // Proxy protocol
    pub user_id: Uuid,
    pub proxy_port: u16,
    pub ws_path: String,

    // Local client
    pub socks_port: u16,
    pub http_port: u16,
    pub check_interval: Duration,
    pub domain_file: Option<PathBuf>,
}

impl Settings {
    /// Build settings from the process environment.
    ///
    /// Missing required variables and malformed values are fatal; there is no
    /// retry for configuration errors.
    pub fn from_env() -> Result<Self> {
        let user_id_raw = env_required("V2RAY_USER_ID")?;
        let user_id = Uuid::parse_str(&user_id_raw)
            .map_err(|_| ConfigError::InvalidUserId(user_id_raw))?;

        let settings = Self {
            tenant_id: env_required("AZURE_TENANT_ID")?,
            client_id: env_required("AZURE_CLIENT_ID")?,
            client_secret: env_required("AZURE_CLIENT_SECRET")?,
            subscription_id: env_required("AZURE_SUBSCRIPTION_ID")?,

            resource_group: env_or("AZURE_RESOURCE_GROUP", "azrelay-rg"),
            location: env_or("AZURE_LOCATION", "southeastasia"),
            storage_account_base: env_or("AZURE_STORAGE_ACCOUNT", "azrelaystore"),
            share_name: env_or("AZURE_FILE_SHARE", "proxy-config"),
            remote_config_name: env_or("AZURE_CONFIG_FILE", "config.json"),
            container_prefix: env_or("AZURE_CONTAINER_PREFIX", "azrelay"),
            container_image: env_or("CONTAINER_IMAGE", "v2fly/v2fly-core:latest"),

            user_id,
            proxy_port: env_parse("V2RAY_PORT", 443)?,
            ws_path: env_or("V2RAY_WS_PATH", "/azrelayws"),

            socks_port: env_parse("SOCKS_PORT", 1080)?,
            http_port: env_parse("HTTP_PORT", 1081)?,
            check_interval: Duration::from_secs(env_parse("HEALTH_CHECK_INTERVAL", 600u64)?),
            domain_file: std::env::var("DOMAIN_FILE").ok().map(PathBuf::from),
        };

        // Fail fast on an unusable derived name rather than at the first
        // storage API call.
        settings.storage_account_name()?;

        Ok(settings)
    }

    /// Suffix shared by all decorated resource names, taken from the first
    /// 8 hex chars of the user UUID.
    pub fn unique_suffix(&self) -> String {
        self.user_id.simple().to_string()[..8].to_string()
    }

    /// Globally unique storage account name, validated against Azure's
    /// naming grammar.
    pub fn storage_account_name(&self) -> Result<String> {
        let name = format!(
            "{}{}",
            self.storage_account_base.to_lowercase(),
            self.unique_suffix()
        );
        let valid = (STORAGE_NAME_MIN..=STORAGE_NAME_MAX).contains(&name.len())
            && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        if !valid {
            return Err(ConfigError::InvalidStorageName(name));
        }
        Ok(name)
    }

    /// Prefix shared by this deployment's container groups; decorated group
    /// names (and their DNS labels) are built on top of it.
    pub fn deployment_prefix(&self) -> String {
        format!("{}{}", self.container_prefix.to_lowercase(), self.unique_suffix())
    }
}

fn env_required(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingEnvVar(name.to_string())),
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => v.parse().map_err(|_| ConfigError::InvalidEnvVar {
            name: name.to_string(),
            value: v,
        }),
        _ => Ok(default),
    }
}
