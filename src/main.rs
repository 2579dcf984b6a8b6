use tracing::{error, info};

use gold_sentinel::config::Config;
use gold_sentinel::sentinel::{RunOutcome, Sentinel};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gold_sentinel=info")),
        )
        .init();

    // Missing secrets is the only fatal condition
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let sentinel = match Sentinel::new(&config) {
        Ok(sentinel) => sentinel,
        Err(e) => {
            // Not a configuration problem, so the run ends without a failing status
            error!("Failed to initialize GoldSentinel: {:#}", e);
            return;
        }
    };

    info!("GoldSentinel run starting (model {})", config.gemini_model);
    match sentinel.run_once().await {
        RunOutcome::NoUpdate => info!("Run complete: nothing to report"),
        RunOutcome::Duplicate(_) => info!("Run complete: duplicate update skipped"),
        RunOutcome::Alerted {
            delivered,
            persisted,
            ..
        } => info!(
            "Run complete: alert delivered={}, history saved={}",
            delivered, persisted
        ),
    }
}
