use thiserror::Error;

use crate::keys::store::StoreError;

/// Top-level error taxonomy for the fallible edges: remote issuance,
/// persistence, and startup configuration. Validation re-prompts and policy
/// rejections are conversation outcomes, not errors; they stay user-visible
/// replies and never surface here.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("key issuance failed: {0}")]
    Remote(#[from] reqwest::Error),
    #[error("key issuance failed: unexpected response shape ({0})")]
    RemoteShape(&'static str),
    #[error("persistence failure: {0}")]
    Store(#[from] StoreError),
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    Message(String),
}

pub type AppResult<T> = Result<T, AppError>;
