use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::errors::BootstrapError;
use crate::store::SecretStore;
use crate::vault::{InitResponse, VaultClient};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persisted {
    /// Status of the KV mount call, when it was made.
    pub kv_mount_status: Option<u16>,
    pub keys: Vec<String>,
}

/// Optionally mount KV v2 with the new root token, then overwrite the secret with the
/// complete init payload.
///
/// The mount happens first; a transport failure there aborts before the write.
pub async fn persist(
    store: &dyn SecretStore,
    vault: &VaultClient,
    secret_name: &str,
    response: &InitResponse,
    mount_kv: bool,
) -> Result<Persisted, BootstrapError> {
    let kv_mount_status = if mount_kv {
        let resp = vault.mount_kv(response.root_token()).await?;
        let status = resp.status();
        if status.is_success() {
            info!(status = %status, "enabled kv v2 secrets engine");
        } else {
            // Only the transport outcome is enforced here.
            warn!(status = %status, "kv mount returned a non-success status");
        }
        Some(status.as_u16())
    } else {
        None
    };

    let payload = Zeroizing::new(encode(response)?);
    store
        .update(secret_name, &payload)
        .await
        .map_err(|e| BootstrapError::store("update", secret_name, e))?;

    let keys = response.keys();
    info!(secret = %secret_name, keys = ?keys, "stored vault init payload");

    Ok(Persisted {
        kv_mount_status,
        keys,
    })
}

/// Serialize every key Vault returned, unfiltered.
pub fn encode(response: &InitResponse) -> Result<String, BootstrapError> {
    serde_json::to_string(response.as_map()).map_err(BootstrapError::Encode)
}
