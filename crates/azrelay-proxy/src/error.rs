use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("proxy binary '{0}' not found on PATH")]
    BinaryNotFound(String),

    #[error("proxy process exited during startup: {output}")]
    StartupFailed { output: String },

    #[error("no endpoint available: {0}")]
    Endpoint(#[from] azrelay_cloud::CloudError),

    #[error(transparent)]
    Config(#[from] azrelay_config::ConfigError),

    #[error("health probe failed: {0}")]
    Probe(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProxyError>;
