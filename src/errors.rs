use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("secret store {operation} failed for '{secret}': {source}")]
    SecretStore {
        operation: &'static str,
        secret: String,
        #[source]
        source: StoreError,
    },

    #[error("vault init failed after {attempts} attempts (last status: {})", display_status(.last_status))]
    InitExhausted {
        attempts: u32,
        last_status: Option<u16>,
    },

    #[error("vault {operation} request failed: {source}")]
    Vault {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("unable to resolve AWS credentials: {0}")]
    Credentials(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("malformed vault init response: {0}")]
    MalformedInitResponse(#[source] serde_json::Error),

    #[error("vault init response is missing root_token")]
    MissingRootToken,

    #[error("vault init response carries an unusable root_token")]
    InvalidRootToken,

    #[error("failed to encode bootstrap payload: {0}")]
    Encode(#[source] serde_json::Error),
}

impl BootstrapError {
    pub(crate) fn store(operation: &'static str, secret: &str, source: StoreError) -> Self {
        Self::SecretStore {
            operation,
            secret: secret.to_string(),
            source,
        }
    }
}

fn display_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "no response".to_string(),
    }
}
