use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use signal_forwarder::api;
use signal_forwarder::config::Config;
use signal_forwarder::daemon::{DaemonApi, HttpDaemon};
use signal_forwarder::error;
use signal_forwarder::logging;
use signal_forwarder::session::SessionManager;

#[derive(Debug, Parser)]
#[command(name = "signal-forwarder", version, about = "Relay messages between Signal groups")]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(
        long = "cp",
        short = 'c',
        default_value = "config.json",
        env = "SIGNAL_FORWARDER_CONFIG"
    )]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // No subscriber yet
    let config = Config::load(&args.config).unwrap_or_else(|e| {
        eprintln!("Error: failed to load {}: {}", args.config.display(), e);
        std::process::exit(1);
    });

    logging::init(config.enable_debug_messages);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        daemon = %config.cli_address,
        account = %config.self_number,
        rules = config.forwarding.len(),
        sending = config.is_sending_enabled,
        "Starting signal forwarder"
    );

    run(Arc::new(config)).await?;

    info!("Shut down cleanly");
    Ok(())
}

async fn run(config: Arc<Config>) -> error::Result<()> {
    let daemon: Arc<dyn DaemonApi> = Arc::new(HttpDaemon::from_config(&config));

    // ── Control plane ───────────────────────────────────────────────────
    {
        let address = config.control_address.clone();
        let daemon = Arc::clone(&daemon);
        tokio::spawn(async move {
            if let Err(e) = api::serve(&address, daemon).await {
                error!(address = %address, error = %e, "Control API failed");
            }
        });
    }

    // ── Session ─────────────────────────────────────────────────────────
    SessionManager::new(config, daemon).run().await?;
    Ok(())
}
