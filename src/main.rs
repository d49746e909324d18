use clap::Parser;
use pulseboard::{config::Config, run_dashboard};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cfg = Config::parse();
    run_dashboard(cfg).await?;
    Ok(())
}
