// =============================================================================
// Runtime Configuration — engine settings with atomic save
// =============================================================================
//
// Central configuration hub for the Prism chart engine: which sessions to
// open at startup, indicator parameters, and the API bind address.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::Interval;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
}

fn default_interval() -> Interval {
    Interval::OneMinute
}

fn default_candle_limit() -> u32 {
    500
}

fn default_chart_ema_period() -> usize {
    14
}

fn default_ema_fast_period() -> usize {
    9
}

fn default_ema_slow_period() -> usize {
    21
}

fn default_rsi_period() -> usize {
    14
}

fn default_macd_fast() -> usize {
    12
}

fn default_macd_slow() -> usize {
    26
}

fn default_macd_signal() -> usize {
    9
}

fn default_trend_lookback() -> usize {
    5
}

fn default_bind_addr() -> String {
    "0.0.0.0:8090".to_string()
}

fn default_rest_base_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_ws_base_url() -> String {
    "wss://stream.binance.com:9443/ws".to_string()
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

// =============================================================================
// SignalSource
// =============================================================================

/// Which crossover pair drives the session's Buy/Sell markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalSource {
    /// Fast EMA vs slow EMA.
    Ema,
    /// MACD line vs its signal line.
    Macd,
}

impl Default for SignalSource {
    fn default() -> Self {
        Self::Ema
    }
}

impl std::fmt::Display for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ema => write!(f, "ema"),
            Self::Macd => write!(f, "macd"),
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the Prism engine.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Sessions ------------------------------------------------------------

    /// Symbols the engine opens sessions for at startup.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Candle interval for the startup sessions.
    #[serde(default = "default_interval")]
    pub interval: Interval,

    /// How many historical candles to seed each session with.
    #[serde(default = "default_candle_limit")]
    pub candle_limit: u32,

    // --- Indicator parameters ------------------------------------------------

    /// Period of the single overlay EMA drawn on the price chart.
    #[serde(default = "default_chart_ema_period")]
    pub chart_ema_period: usize,

    /// Fast leg of the EMA crossover pair.
    #[serde(default = "default_ema_fast_period")]
    pub ema_fast_period: usize,

    /// Slow leg of the EMA crossover pair.
    #[serde(default = "default_ema_slow_period")]
    pub ema_slow_period: usize,

    /// RSI look-back period.
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,

    /// MACD fast EMA period.
    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,

    /// MACD slow EMA period.
    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,

    /// MACD signal EMA period.
    #[serde(default = "default_macd_signal")]
    pub macd_signal: usize,

    // --- Signals -------------------------------------------------------------

    /// Which crossover pair produces the Buy/Sell markers.
    #[serde(default)]
    pub signal_source: SignalSource,

    /// Candle count for the trend-sign label.
    #[serde(default = "default_trend_lookback")]
    pub trend_lookback: usize,

    // --- Transport -----------------------------------------------------------

    /// Address the snapshot API binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Base URL for the historical klines REST API.
    #[serde(default = "default_rest_base_url")]
    pub rest_base_url: String,

    /// Base URL for the live trade WebSocket feed.
    #[serde(default = "default_ws_base_url")]
    pub ws_base_url: String,

    /// Seconds to wait before reconnecting a dropped feed.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            interval: default_interval(),
            candle_limit: default_candle_limit(),
            chart_ema_period: default_chart_ema_period(),
            ema_fast_period: default_ema_fast_period(),
            ema_slow_period: default_ema_slow_period(),
            rsi_period: default_rsi_period(),
            macd_fast: default_macd_fast(),
            macd_slow: default_macd_slow(),
            macd_signal: default_macd_signal(),
            signal_source: SignalSource::default(),
            trend_lookback: default_trend_lookback(),
            bind_addr: default_bind_addr(),
            rest_base_url: default_rest_base_url(),
            ws_base_url: default_ws_base_url(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

impl RuntimeConfig {
    /// Load config from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            interval = %config.interval,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Save config to a JSON file atomically (tmp + rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        // Atomic write: write to a temporary sibling file, then rename.
        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}
