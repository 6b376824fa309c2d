//! Command-line surface for eagle-autosend.
//!
//! - `serve` runs the HTTP bridge.
//! - `send` pushes a single image through the same pipeline, for scripting and checks.
use crate::load_config::load_or_default;
use crate::send::{autosend_request, send_to_library};
use crate::server::serve;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// CLI for eagle-autosend: forward generated images into an Eagle library.
#[derive(Parser)]
#[clap(
    name = "eagle-autosend",
    version,
    about = "Forward generated images with their prompt metadata into an Eagle library"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP bridge
    Serve {
        /// Path to the YAML config file
        #[clap(long, env = "EAGLE_AUTOSEND_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Send one image to the library using the stored settings
    Send {
        /// Image file to send
        path: PathBuf,
        /// Library folder name or id; defaults to the configured folder name
        #[clap(long)]
        folder: Option<String>,
        /// Path to the YAML config file
        #[clap(long, env = "EAGLE_AUTOSEND_CONFIG")]
        config: Option<PathBuf>,
    },
}

/// Async CLI entrypoint for main() and integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve { config } => {
            let config = load_or_default(config.as_deref())?;
            let addr: SocketAddr = config
                .bind
                .parse()
                .with_context(|| format!("Invalid bind address {:?}", config.bind))?;
            tracing::info!(command = "serve", %addr, "Starting bridge");
            serve(addr, config.app_state())
                .await
                .context("HTTP server failed")
        }
        Commands::Send {
            path,
            folder,
            config,
        } => {
            let config = load_or_default(config.as_deref())?;
            let state = config.app_state();
            let Some(request) = autosend_request(&path, folder, &state.settings.load()) else {
                tracing::info!(command = "send", path = %path.display(), "Autosend disabled, skipping");
                println!("Autosend is disabled, {} not sent", path.display());
                return Ok(());
            };
            tracing::info!(command = "send", path = %path.display(), "Sending image");
            match send_to_library(&request, &state.settings, &state.csv_dir).await {
                Ok(report) => {
                    println!("Sent {} ({} tags)", report.path.display(), report.tags.len());
                    if let Some(folder_id) = &report.folder_id {
                        println!("Folder: {folder_id}");
                    }
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "send", error = %e, "Send failed");
                    Err(anyhow::Error::new(e))
                }
            }
        }
    }
}
