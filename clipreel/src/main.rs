mod server;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use clipreel_core::{logging, Config};

use server::ClipReelServer;

#[derive(Parser, Debug)]
#[command(name = "clipreel")]
#[command(about = "Highlight capture and replay server", long_about = None)]
struct Args {
    /// Configuration file (yaml, toml or json)
    #[arg(long, env = "CLIPREEL_CONFIG_PATH", default_value = "config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let config = Config::load(Some(&args.config))?;

    // 2. Validate configuration (fail fast on misconfigurations)
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    // 3. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("ClipReel server starting...");
    info!("HTTP address: {}", config.http_address());
    info!("Capture backend: {}", config.backend.base_url);

    // 4. Wire components and serve until shutdown
    let server = ClipReelServer::build(config).await?;
    server.start().await
}
