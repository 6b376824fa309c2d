use anyhow::Result;
use clap::Parser;
use eagle_autosend::cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt::init();
    tracing::info!("eagle-autosend startup: tracing initialised, environment loaded");

    let cli = Cli::parse();
    let result = run(cli).await;
    match &result {
        Ok(_) => tracing::info!("eagle-autosend exited cleanly"),
        Err(e) => tracing::error!(error = %e, "eagle-autosend exited with error"),
    }
    result
}
