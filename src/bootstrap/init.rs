use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::errors::BootstrapError;
use crate::vault::{InitRequest, InitResponse, VaultClient};

pub const MAX_INIT_ATTEMPTS: u32 = 10;
pub const INIT_INTERVAL: Duration = Duration::from_secs(10);

/// Pacing for the init loop. A fixed delay precedes every attempt, including the
/// first, to give a freshly started Vault time to come up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for InitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_INIT_ATTEMPTS,
            interval: INIT_INTERVAL,
        }
    }
}

#[derive(Debug)]
pub struct Initialized {
    pub response: InitResponse,
    pub attempts: u32,
}

/// Call `PUT /v1/sys/init` until Vault answers 200 or the policy runs out.
///
/// Transport errors and every non-200 status are retried alike, including
/// Vault's "already initialized" 400. A 200 whose body is not a valid init
/// payload fails immediately.
pub async fn initialize(
    vault: &VaultClient,
    request: InitRequest,
    policy: &InitPolicy,
) -> Result<Initialized, BootstrapError> {
    let body = Bytes::from(serde_json::to_vec(&request).map_err(BootstrapError::Encode)?);

    let mut attempts = 0;
    let mut last_status: Option<u16> = None;
    let mut accepted = None;

    while attempts < policy.max_attempts {
        sleep(policy.interval).await;
        attempts += 1;

        match vault.put_init(body.clone()).await {
            Ok(resp) if resp.status() == StatusCode::OK => {
                accepted = Some(resp);
                break;
            }
            Ok(resp) => {
                let status = resp.status();
                last_status = Some(status.as_u16());
                let text = resp.text().await.unwrap_or_default();
                warn!(
                    attempt = attempts,
                    max_attempts = policy.max_attempts,
                    status = %status,
                    body = %text.trim(),
                    "vault init rejected, retrying"
                );
            }
            Err(e) => {
                last_status = None;
                warn!(
                    attempt = attempts,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "vault init request failed, retrying"
                );
            }
        }
    }

    let Some(resp) = accepted else {
        return Err(BootstrapError::InitExhausted {
            attempts,
            last_status,
        });
    };

    let payload = resp.bytes().await.map_err(|source| BootstrapError::Vault {
        operation: "read init response",
        source,
    })?;
    let response = InitResponse::from_slice(&payload)?;

    info!(attempts, keys = ?response.keys(), "vault initialized");
    Ok(Initialized { response, attempts })
}
