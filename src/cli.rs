use clap::{Parser, ValueEnum};

/// vault-bootstrap: initialize Vault and park the root token and recovery keys in
/// AWS Secrets Manager.
///
/// The secret name, Vault address and recovery parameters are read from
/// AWS_SECRET_NAME, VAULT_ADDR, VAULT_RECOVERY_SHARES and VAULT_RECOVERY_THRESHOLD.
#[derive(Parser)]
#[command(name = "vault-bootstrap", version, about)]
pub struct Cli {
    /// Do not enable the KV v2 secrets engine after init
    #[arg(long, env = "VAULT_SKIP_KV_MOUNT")]
    pub skip_kv_mount: bool,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
