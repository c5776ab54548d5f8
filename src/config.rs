use crate::errors::BootstrapError;

pub const DEFAULT_RECOVERY_SHARES: u32 = 5;
pub const DEFAULT_RECOVERY_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    /// Name of the Secrets Manager secret that receives the init payload.
    /// Set via AWS_SECRET_NAME (required).
    pub secret_name: String,
    /// Vault base address, without a trailing slash.
    /// Set via VAULT_ADDR (required).
    pub vault_addr: String,
    /// Set via VAULT_RECOVERY_SHARES. Default: 5.
    pub recovery_shares: u32,
    /// Set via VAULT_RECOVERY_THRESHOLD. Default: 3.
    pub recovery_threshold: u32,
}

/// Load the bootstrap configuration from the process environment.
/// A `.env` file in the working directory is honoured when present.
pub fn load() -> Result<BootstrapConfig, BootstrapError> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Build the configuration from an arbitrary key lookup.
pub fn from_lookup<F>(lookup: F) -> Result<BootstrapConfig, BootstrapError>
where
    F: Fn(&str) -> Option<String>,
{
    let secret_name = required(&lookup, "AWS_SECRET_NAME")?;
    let vault_addr = required(&lookup, "VAULT_ADDR")?
        .trim_end_matches('/')
        .to_string();
    let recovery_shares = integer(&lookup, "VAULT_RECOVERY_SHARES", DEFAULT_RECOVERY_SHARES)?;
    let recovery_threshold =
        integer(&lookup, "VAULT_RECOVERY_THRESHOLD", DEFAULT_RECOVERY_THRESHOLD)?;

    if recovery_threshold == 0 {
        return Err(BootstrapError::Config(
            "VAULT_RECOVERY_THRESHOLD must be at least 1".into(),
        ));
    }
    if recovery_threshold > recovery_shares {
        return Err(BootstrapError::Config(format!(
            "VAULT_RECOVERY_THRESHOLD ({}) must not exceed VAULT_RECOVERY_SHARES ({})",
            recovery_threshold, recovery_shares
        )));
    }

    Ok(BootstrapConfig {
        secret_name,
        vault_addr,
        recovery_shares,
        recovery_threshold,
    })
}

fn required<F>(lookup: &F, key: &str) -> Result<String, BootstrapError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BootstrapError::Config(format!("required key {} missing value", key)))
}

fn integer<F>(lookup: &F, key: &str, default: u32) -> Result<u32, BootstrapError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|e| {
            BootstrapError::Config(format!("{} must be a non-negative integer: {}", key, e))
        }),
        _ => Ok(default),
    }
}
