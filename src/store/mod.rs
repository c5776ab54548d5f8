pub mod aws;
pub mod credentials;
pub mod sigv4;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Metadata returned when describing a stored secret.
#[derive(Debug, Clone, PartialEq)]
pub struct SecretMetadata {
    pub name: String,
    pub arn: Option<String>,
    /// Set when the secret is scheduled for deletion but still restorable.
    pub deleted_date: Option<DateTime<Utc>>,
}

impl SecretMetadata {
    pub fn is_soft_deleted(&self) -> bool {
        self.deleted_date.is_some()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("secret not found: {0}")]
    NotFound(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service returned {status} {code}: {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
    },

    #[error("request signing failed: {0}")]
    Signing(String),

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Abstraction over the store that receives the bootstrap material.
/// Implementations: SecretsManagerStore (AWS Secrets Manager).
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Look up a secret by name. Must return `StoreError::NotFound` when it does not exist.
    async fn describe(&self, name: &str) -> Result<SecretMetadata, StoreError>;

    /// Create a secret with an initial string value.
    async fn create(&self, name: &str, description: &str, value: &str) -> Result<(), StoreError>;

    /// Cancel a scheduled deletion.
    async fn restore(&self, name: &str) -> Result<(), StoreError>;

    /// Overwrite the secret's current value.
    async fn update(&self, name: &str, value: &str) -> Result<(), StoreError>;
}
