use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vault_bootstrap::bootstrap::{run_bootstrap, BootstrapOptions};
use vault_bootstrap::config;
use vault_bootstrap::store::aws::{AwsSettings, SecretsManagerStore};
use vault_bootstrap::vault::VaultClient;

mod cli;

// Single-threaded on purpose: every step waits on the previous one.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    init_tracing(args.log_format);

    let result = run(&args).await;

    if let Err(ref e) = result {
        tracing::error!("vault bootstrap failed: {:#}", e);
    }
    result
}

async fn run(args: &cli::Cli) -> anyhow::Result<()> {
    let cfg = config::load()?;
    let aws = AwsSettings::from_env()?;

    let store = SecretsManagerStore::connect(aws)
        .await
        .context("setting up Secrets Manager client")?;
    let vault = VaultClient::new(&cfg.vault_addr).context("setting up Vault client")?;

    let options = BootstrapOptions {
        mount_kv: !args.skip_kv_mount,
        ..BootstrapOptions::default()
    };

    let outcome = run_bootstrap(&cfg, &store, &vault, &options)
        .await
        .with_context(|| format!("bootstrapping {} into secret {}", cfg.vault_addr, cfg.secret_name))?;

    tracing::info!(
        secret = %cfg.secret_name,
        preparation = ?outcome.secret,
        attempts = outcome.attempts,
        kv_mount_status = ?outcome.kv_mount_status,
        keys = ?outcome.persisted_keys,
        "vault bootstrap complete"
    );
    Ok(())
}

fn init_tracing(format: cli::LogFormat) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "vault_bootstrap=info".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        cli::LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        cli::LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}
