use std::path::PathBuf;

use clap::Parser;

use winget_mirror::config::load_config;
use winget_mirror::lifecycle::startup;
use winget_mirror::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "winget-mirror", version)]
#[command(about = "Static HTTPS mirror for winget manifests and installers", long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, default_value = "mirror.toml")]
    config: PathBuf,

    /// Validate configuration, roots and certificate, then exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        https_address = %config.listener.https_address,
        routes = config.routes.len(),
        "winget-mirror starting"
    );

    if args.check {
        startup::preflight(&config)?;
        tracing::info!("Configuration OK");
        return Ok(());
    }

    startup::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
