use tracing::{debug, info};

use crate::errors::BootstrapError;
use crate::store::SecretStore;

pub const SECRET_DESCRIPTION: &str = "Initial Vault Root Token and Recovery Keys";
pub const PLACEHOLDER_VALUE: &str = "created";
/// Written over the placeholder to prove `UpdateSecret` works before init.
pub const WRITE_CHECK_VALUE: &str = "updated";

/// What the preparer had to do to make the secret usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preparation {
    Created,
    Restored,
    Reused,
}

/// Make sure `name` exists, is not pending deletion, and accepts writes.
///
/// Called before Vault init, so an unwritable secret fails while nothing has been minted.
pub async fn prepare_secret(
    store: &dyn SecretStore,
    name: &str,
) -> Result<Preparation, BootstrapError> {
    let preparation = match store.describe(name).await {
        Err(e) if e.is_not_found() => {
            store
                .create(name, SECRET_DESCRIPTION, PLACEHOLDER_VALUE)
                .await
                .map_err(|e| BootstrapError::store("create", name, e))?;
            info!(secret = %name, "created placeholder secret");
            Preparation::Created
        }
        Err(e) => return Err(BootstrapError::store("describe", name, e)),
        Ok(meta) if meta.is_soft_deleted() => {
            store
                .restore(name)
                .await
                .map_err(|e| BootstrapError::store("restore", name, e))?;
            info!(secret = %name, deleted_date = ?meta.deleted_date, "restored soft-deleted secret");
            Preparation::Restored
        }
        Ok(_) => {
            info!(secret = %name, "reusing existing secret");
            Preparation::Reused
        }
    };

    store
        .update(name, WRITE_CHECK_VALUE)
        .await
        .map_err(|e| BootstrapError::store("update placeholder", name, e))?;
    debug!(secret = %name, "secret accepts updates");

    Ok(preparation)
}
