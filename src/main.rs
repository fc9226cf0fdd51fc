//! LOADBOARD: freight marketplace core.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the last snapshot (or starts fresh), serves the API, and
//! snapshots periodically until shutdown.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use loadboard::api::{self, AppContext};
use loadboard::config;
use loadboard::lifecycle::LoadEvent;
use loadboard::storage::{self, Snapshot};

const BANNER: &str = r#"
 _     ___    _    ____  ____   ___    _    ____  ____
| |   / _ \  / \  |  _ \| __ ) / _ \  / \  |  _ \|  _ \
| |  | | | |/ _ \ | | | |  _ \| | | |/ _ \ | |_) | | | |
| |__| |_| / ___ \| |_| | |_) | |_| / ___ \|  _ <| |_| |
|_____\___/_/   \_\____/|____/ \___/_/   \_\_| \_\____/

  Freight marketplace core
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("LOADBOARD_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::AppConfig::load_or_default(&config_path)?;

    init_logging(&cfg.logging);

    println!("{BANNER}");
    info!(
        service = %cfg.service.name,
        score_threshold = cfg.eligibility.score_threshold,
        required_consents = ?cfg.eligibility.required_consents,
        "LOADBOARD starting up"
    );

    // -- Wire services ---------------------------------------------------

    let ctx = Arc::new(AppContext::from_config(&cfg));
    let snapshot_path = cfg.storage.snapshot_path.as_str();

    // -- Restore or start fresh ------------------------------------------

    match storage::load_snapshot(Some(snapshot_path))? {
        Some(snapshot) => {
            let restored = snapshot.restore_into(&ctx.registry).await?;
            info!(loads = restored, "Resumed from saved snapshot");
        }
        None => info!("Fresh start"),
    }

    // -- API ---------------------------------------------------------------

    if cfg.api.enabled {
        api::spawn_api(ctx.clone(), cfg.api.port)?;
    } else {
        warn!("API disabled in config");
    }

    let mut events = ctx.registry.events().subscribe();

    // -- Main loop -------------------------------------------------------

    let snapshot_interval = Duration::from_secs(cfg.storage.snapshot_interval_secs.max(1));
    let mut interval = tokio::time::interval(snapshot_interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.storage.snapshot_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let pruned = ctx.eligibility.prune_expired();
                if pruned > 0 {
                    info!(pruned, "Expired eligibility verdicts dropped");
                }
                let snapshot = Snapshot::capture(&ctx.registry).await;
                if let Err(e) = storage::save_snapshot(&snapshot, Some(snapshot_path)) {
                    error!(error = %e, "Failed to save snapshot");
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => log_event(&event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event log fell behind");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    // Save final snapshot
    let snapshot = Snapshot::capture(&ctx.registry).await;
    storage::save_snapshot(&snapshot, Some(snapshot_path))?;
    info!(
        loads = snapshot.loads.len(),
        offers = snapshot.offers.len(),
        "LOADBOARD shut down cleanly."
    );

    Ok(())
}

/// One line per lifecycle event.
fn log_event(event: &LoadEvent) {
    match serde_json::to_string(event) {
        Ok(json) => info!(target: "loadboard::events", event = %json, "Load event"),
        Err(e) => warn!(error = %e, "Unserialisable load event"),
    }
}

/// Initialise the `tracing` subscriber.
///
/// `RUST_LOG` wins over the configured filter; JSON output is on if either
/// the config or `LOADBOARD_LOG_JSON` asks for it.
fn init_logging(cfg: &config::LoggingConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.filter))
        .unwrap_or_else(|_| EnvFilter::new("loadboard=info"));

    let json_logging = cfg.json || std::env::var("LOADBOARD_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
