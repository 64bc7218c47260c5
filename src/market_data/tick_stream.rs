// =============================================================================
// Live Tick Feed — Binance trade WebSocket stream
// =============================================================================
//
// Connects to the public `@trade` stream for one symbol and folds every trade
// into its session, strictly in arrival order. Runs until the stream
// disconnects or errors, then returns so the caller can mark the session
// Reconnecting and retry.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::market_data::ApplyOutcome;
use crate::session::MarketSession;
use crate::types::Tick;

/// Connect to the trade stream for `symbol` and feed ticks into `session`.
///
/// `on_update` fires after every tick that changed session state — the host
/// uses it to bump the snapshot version. Returns `Ok(())` on a clean stream
/// end (including a closed session) and `Err` on transport failures, in both
/// cases leaving reconnection policy to the caller:
///
/// ```ignore
/// loop {
///     if let Err(e) = run_trade_stream(&ws_base, "BTCUSDT", &session, &bump).await {
///         error!("stream error: {e}");
///     }
///     session.lock().mark_reconnecting();
///     tokio::time::sleep(Duration::from_secs(5)).await;
/// }
/// ```
pub async fn run_trade_stream(
    ws_base_url: &str,
    symbol: &str,
    session: &Arc<Mutex<MarketSession>>,
    on_update: &(dyn Fn() + Send + Sync),
) -> Result<()> {
    let lower = symbol.to_lowercase();
    let url = format!("{ws_base_url}/{lower}@trade");
    info!(url = %url, symbol = %symbol, "connecting to trade WebSocket");

    let (ws_stream, _response) = connect_async(&url)
        .await
        .context("failed to connect to trade WebSocket")?;

    info!(symbol = %symbol, "trade WebSocket connected");
    // Feed restored — a session parked in Reconnecting goes Live again.
    session.lock().mark_resumed();

    let (_write, mut read) = ws_stream.split();

    loop {
        match read.next().await {
            Some(Ok(msg)) => {
                if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                    let tick = match parse_trade_message(&text) {
                        Ok(tick) => tick,
                        Err(e) => {
                            warn!(error = %e, "failed to parse trade message");
                            continue;
                        }
                    };

                    match session.lock().apply_tick(tick) {
                        Ok(ApplyOutcome::TickDropped) => {}
                        Ok(outcome) => {
                            debug!(symbol = %symbol, ?outcome, price = tick.price, "tick applied");
                            on_update();
                        }
                        Err(EngineError::SessionClosed) => {
                            info!(symbol = %symbol, "session closed — ending trade stream");
                            return Ok(());
                        }
                        Err(e) => {
                            error!(symbol = %symbol, error = %e, "tick rejected");
                            return Err(e.into());
                        }
                    }
                }
                // Silently ignore Ping / Pong / Binary / Close frames --
                // tungstenite handles pong replies automatically.
            }
            Some(Err(e)) => {
                error!(error = %e, "trade WebSocket read error");
                return Err(e.into());
            }
            None => {
                warn!(symbol = %symbol, "trade WebSocket stream ended");
                return Ok(());
            }
        }
    }
}

/// Parse a single trade event into a tick.
///
/// Expected shape (single stream — no combined-stream wrapper):
/// ```json
/// { "e": "trade", "s": "BTCUSDT", "T": 1700000000123, "p": "37000.1", "q": "0.5" }
/// ```
fn parse_trade_message(text: &str) -> Result<Tick> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse trade JSON")?;

    // Support both combined-stream envelope and direct single-stream payload.
    let data = if root.get("data").is_some() {
        &root["data"]
    } else {
        &root
    };

    let event_time_ms = data["T"].as_i64().context("missing field T")?;
    let price = parse_string_f64(&data["p"], "p")?;
    let size = parse_string_f64(&data["q"], "q")?;

    Ok(Tick {
        timestamp: event_time_ms / 1000,
        price,
        size,
    })
}

/// Binance sends numeric values as JSON strings inside trade objects.
fn parse_string_f64(val: &serde_json::Value, name: &str) -> Result<f64> {
    match val {
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .with_context(|| format!("failed to parse {name} as f64: {s}")),
        serde_json::Value::Number(n) => n
            .as_f64()
            .with_context(|| format!("field {name} is not a valid f64")),
        _ => anyhow::bail!("field {name} has unexpected JSON type"),
    }
}
