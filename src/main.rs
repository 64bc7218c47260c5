// =============================================================================
// Prism Chart Engine — Main Entry Point
// =============================================================================
//
// Boots the candle aggregation and indicator engine: loads the runtime
// config, seeds a market session per configured symbol from REST history,
// attaches live trade feeds, and serves snapshots over HTTP and WebSocket.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod error;
mod indicators;
mod market_data;
mod runtime_config;
mod session;
mod signals;
mod types;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::runtime_config::RuntimeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Prism Chart Engine — Starting Up                 ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = RuntimeConfig::load("runtime_config.json").unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    // Override symbols from env if available.
    if let Ok(syms) = std::env::var("PRISM_SYMBOLS") {
        config.symbols = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if config.symbols.is_empty() {
        config.symbols = vec!["BTCUSDT".into(), "ETHUSDT".into()];
    }

    info!(symbols = ?config.symbols, interval = %config.interval, "Configured markets");

    // ── 2. Build shared state ────────────────────────────────────────────
    let interval = config.interval;
    let symbols = config.symbols.clone();
    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(config);

    // ── 3. Seed sessions and attach live feeds ───────────────────────────
    for symbol in &symbols {
        if let Err(e) = state.subscribe(symbol, interval).await {
            error!(symbol = %symbol, error = %e, "Failed to start session");
        }
    }
    info!(count = state.session_keys().len(), "Market sessions live");

    // ── 4. Start the API server ──────────────────────────────────────────
    let app = api::rest::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "API server listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Shutdown signal received, stopping");
        }
    }

    if let Err(e) = state.runtime_config.read().save("runtime_config.json") {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("Prism Chart Engine shut down complete.");
    Ok(())
}
