//! Live menu ticker - Entry Point

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Live menu ticker: joins pushed price ticks with item metadata.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via MENU_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any WS connections)
    menu_ws::init_crypto();

    let args = Args::parse();

    let config_path = menu_app::AppConfig::resolve_path(args.config);
    let config = menu_app::AppConfig::from_file(&config_path)?;

    menu_telemetry::init_logging(&config.telemetry.log_level)?;

    info!("Starting menu ticker v{}", env!("CARGO_PKG_VERSION"));
    info!(config_path = %config_path, ws_url = %config.ws_url, "Configuration loaded");

    let app = menu_app::Application::new(config)?;
    let stats = app.run().await?;
    info!(?stats, "Stopped");

    Ok(())
}
