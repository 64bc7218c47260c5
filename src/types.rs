// =============================================================================
// Shared types used across the Prism chart engine
// =============================================================================

use std::str::FromStr;

use serde::{Deserialize, Serialize};

// =============================================================================
// Market data primitives
// =============================================================================

/// A single OHLCV candle over a fixed time bucket.
///
/// `bucket_start` is in whole seconds and is always a multiple of the owning
/// session's interval length. Exactly one candle per session — the last one —
/// is mutable (the "open" candle); everything before it is frozen history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub bucket_start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Open a fresh candle from the first tick of its bucket.
    pub fn from_tick(bucket_start: i64, price: f64, size: f64) -> Self {
        Self {
            bucket_start,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: size,
        }
    }

    /// A zero-volume candle whose OHLC all sit at `price`. Used to fill
    /// bucket gaps so the series keeps its fixed step.
    pub fn flat(bucket_start: i64, price: f64) -> Self {
        Self {
            bucket_start,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
        }
    }
}

/// A single trade/price event from the live feed. Ephemeral — folded into a
/// candle and then discarded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Event time in whole seconds.
    pub timestamp: i64,
    pub price: f64,
    pub size: f64,
}

// =============================================================================
// Interval
// =============================================================================

/// Candle interval. The set matches what the dashboard's timeframe selector
/// offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl Interval {
    /// Bucket length in seconds.
    pub fn seconds(&self) -> i64 {
        match self {
            Self::OneMinute => 60,
            Self::FiveMinutes => 300,
            Self::FifteenMinutes => 900,
            Self::ThirtyMinutes => 1_800,
            Self::OneHour => 3_600,
            Self::FourHours => 14_400,
            Self::OneDay => 86_400,
        }
    }

    /// The Binance interval token ("1m", "5m", ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::FourHours => "4h",
            Self::OneDay => "1d",
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Self::OneMinute),
            "5m" => Ok(Self::FiveMinutes),
            "15m" => Ok(Self::FifteenMinutes),
            "30m" => Ok(Self::ThirtyMinutes),
            "1h" => Ok(Self::OneHour),
            "4h" => Ok(Self::FourHours),
            "1d" => Ok(Self::OneDay),
            other => Err(format!("unknown interval: {other}")),
        }
    }
}

/// Composite key that identifies a unique candle session.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CandleKey {
    pub symbol: String,
    pub interval: Interval,
}

impl std::fmt::Display for CandleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.interval)
    }
}

// =============================================================================
// Derived series & signals
// =============================================================================

/// One aligned entry of an indicator series. `value == None` marks the
/// warm-up span where the indicator is undefined — never zero-filled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub time: i64,
    pub value: Option<f64>,
}

/// Direction of a crossover signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    Buy,
    Sell,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "Buy"),
            Self::Sell => write!(f, "Sell"),
        }
    }
}

/// A discrete crossover event. Derived, never source of truth — the full list
/// is recomputable from the two feeding series at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub time: i64,
    pub kind: SignalKind,
    /// Which crossover pair fired ("ema" or "macd").
    pub source: String,
}

/// Buy/Sell label from the sign of recent candle bodies. Deliberately the
/// only "prediction" this engine makes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendHint {
    pub kind: SignalKind,
    /// Sum of close - open over the lookback window.
    pub momentum: f64,
}

// =============================================================================
// Session lifecycle
// =============================================================================

/// Lifecycle of a per-(symbol, interval) session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Uninitialized,
    Loading,
    Live,
    Reconnecting,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "Uninitialized"),
            Self::Loading => write!(f, "Loading"),
            Self::Live => write!(f, "Live"),
            Self::Reconnecting => write!(f, "Reconnecting"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_roundtrip() {
        for iv in [
            Interval::OneMinute,
            Interval::FiveMinutes,
            Interval::FifteenMinutes,
            Interval::ThirtyMinutes,
            Interval::OneHour,
            Interval::FourHours,
            Interval::OneDay,
        ] {
            let parsed: Interval = iv.as_str().parse().unwrap();
            assert_eq!(parsed, iv);
        }
    }

    #[test]
    fn interval_unknown_token() {
        assert!("7m".parse::<Interval>().is_err());
    }

    #[test]
    fn interval_seconds() {
        assert_eq!(Interval::OneMinute.seconds(), 60);
        assert_eq!(Interval::OneHour.seconds(), 3_600);
        assert_eq!(Interval::OneDay.seconds(), 86_400);
    }

    #[test]
    fn candle_key_display() {
        let key = CandleKey {
            symbol: "BTCUSDT".into(),
            interval: Interval::OneMinute,
        };
        assert_eq!(key.to_string(), "BTCUSDT@1m");
    }

    #[test]
    fn candle_from_tick() {
        let c = Candle::from_tick(120, 100.5, 2.0);
        assert_eq!(c.bucket_start, 120);
        assert_eq!(c.open, 100.5);
        assert_eq!(c.high, 100.5);
        assert_eq!(c.low, 100.5);
        assert_eq!(c.close, 100.5);
        assert_eq!(c.volume, 2.0);
    }

    #[test]
    fn flat_candle_has_no_volume() {
        let c = Candle::flat(60, 42.0);
        assert_eq!(c.volume, 0.0);
        assert_eq!(c.open, c.close);
        assert_eq!(c.high, c.low);
    }
}
