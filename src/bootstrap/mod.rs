//! The bootstrap protocol: prepare the secret, initialize Vault, persist the result.
//!
//! Steps run strictly in order on the caller's task. Nothing here guards against two
//! runs racing on the same Vault or the same secret.

pub mod init;
pub mod persist;
pub mod prepare;

pub use init::{initialize, InitPolicy, Initialized, INIT_INTERVAL, MAX_INIT_ATTEMPTS};
pub use persist::{persist, Persisted};
pub use prepare::{
    prepare_secret, Preparation, PLACEHOLDER_VALUE, SECRET_DESCRIPTION, WRITE_CHECK_VALUE,
};

use tracing::info;

use crate::config::BootstrapConfig;
use crate::errors::BootstrapError;
use crate::store::SecretStore;
use crate::vault::{InitRequest, VaultClient};

#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    pub init: InitPolicy,
    /// Enable a KV v2 engine at `kv/` with the new root token.
    pub mount_kv: bool,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            init: InitPolicy::default(),
            mount_kv: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOutcome {
    pub secret: Preparation,
    pub attempts: u32,
    pub kv_mount_status: Option<u16>,
    pub persisted_keys: Vec<String>,
}

/// Run the whole bootstrap once.
pub async fn run_bootstrap(
    config: &BootstrapConfig,
    store: &dyn SecretStore,
    vault: &VaultClient,
    options: &BootstrapOptions,
) -> Result<BootstrapOutcome, BootstrapError> {
    info!(secret = %config.secret_name, vault = %vault.addr(), "starting vault bootstrap");

    let secret = prepare_secret(store, &config.secret_name).await?;

    let request = InitRequest {
        recovery_shares: config.recovery_shares,
        recovery_threshold: config.recovery_threshold,
    };
    let Initialized { response, attempts } = initialize(vault, request, &options.init).await?;

    let persisted = persist(
        store,
        vault,
        &config.secret_name,
        &response,
        options.mount_kv,
    )
    .await?;

    Ok(BootstrapOutcome {
        secret,
        attempts,
        kv_mount_status: persisted.kv_mount_status,
        persisted_keys: persisted.keys,
    })
}
