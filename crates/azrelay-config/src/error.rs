use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("environment variable {0} is required")]
    MissingEnvVar(String),

    #[error("environment variable {name} has an invalid value: {value}")]
    InvalidEnvVar { name: String, value: String },

    #[error("V2RAY_USER_ID is not a valid UUID: {0}")]
    InvalidUserId(String),

    #[error(
        "derived storage account name '{0}' is invalid\n\
        storage account names must be 3-24 characters, lowercase letters and digits only"
    )]
    InvalidStorageName(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
