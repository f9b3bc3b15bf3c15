//! Cloud control-plane error types

use thiserror::Error;

/// Errors raised by control-plane calls and the provisioning workflow.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("token acquisition failed: {0}")]
    Token(String),

    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("{operation} did not succeed after {attempts} attempts")]
    RetriesExhausted { operation: String, attempts: u32 },

    #[error("container group has neither an ip address nor a fqdn")]
    EndpointUnresolvable,

    #[error("configuration error: {0}")]
    Config(#[from] azrelay_config::ConfigError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, CloudError::AlreadyExists(_))
    }

    /// Auth failures double as a not-yet-ready signal from the file service
    /// right after storage account creation.
    pub fn is_auth(&self) -> bool {
        matches!(self, CloudError::Auth(_))
    }

    /// Errors worth retrying under the backoff policy.
    pub fn is_transient(&self) -> bool {
        match self {
            CloudError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            CloudError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
