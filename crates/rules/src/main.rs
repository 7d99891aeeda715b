use anyhow::Context;
use tracing_subscriber::EnvFilter;

use sentinel_rules::{cli, config, run};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::parse();
    let cfg = config::load_from_file(&args.config_path)
        .with_context(|| format!("loading {}", args.config_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level)),
        )
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "sentinel rule engine starting");
    run::run(cfg)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))
}
