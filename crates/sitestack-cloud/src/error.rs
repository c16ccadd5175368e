//! Provisioning error types

use thiserror::Error;

/// Provisioning errors
///
/// Everything except [`CloudError::AssetRead`] aborts the run.
/// [`CloudError::TransientProvider`] is retried first and only aborts once
/// the retry budget is spent.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Certificate for {domain} was not validated after {attempts} attempts")]
    ValidationTimeout { domain: String, attempts: u32 },

    #[error("No such hosted zone for {0}")]
    ZoneNotFound(String),

    #[error("Conflict on {resource}: {message} (resolve manually, nothing was overwritten)")]
    Conflict { resource: String, message: String },

    #[error("Transient provider error: {0}")]
    TransientProvider(String),

    #[error("Failed to read asset {path}: {message}")]
    AssetRead { path: String, message: String },

    #[error("Provider rejected {resource}: {message}")]
    Provider { resource: String, message: String },

    #[error("Certificate is not validated: {0}")]
    CertificateNotValidated(String),

    #[error("Origin access control creation failed: {0}")]
    OriginAccessControl(String),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether the execution engine may retry the failed operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, CloudError::TransientProvider(_))
    }

    /// Whether the error aborts the whole run
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CloudError::AssetRead { .. })
    }

    pub fn conflict(resource: impl Into<String>, message: impl Into<String>) -> Self {
        CloudError::Conflict {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn provider(resource: impl Into<String>, message: impl Into<String>) -> Self {
        CloudError::Provider {
            resource: resource.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
