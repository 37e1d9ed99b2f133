use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TenureError {
    #[error("config not found at {}: run 'tenure init' to create one", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, TenureError>;
