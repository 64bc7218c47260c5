// =============================================================================
// Trend Hint — sign of recent candle bodies
// =============================================================================
//
// Sums close - open over the last `lookback` candles and labels the result
// Buy (positive) or Sell (otherwise). This is the full extent of the engine's
// "prediction" — anything smarter is out of scope.

use crate::types::{Candle, SignalKind, TrendHint};

/// Label the most recent trend. `None` on an empty series.
pub fn trend_hint(candles: &[Candle], lookback: usize) -> Option<TrendHint> {
    if candles.is_empty() || lookback == 0 {
        return None;
    }
    let start = candles.len().saturating_sub(lookback);
    let momentum: f64 = candles[start..].iter().map(|c| c.close - c.open).sum();
    let kind = if momentum > 0.0 {
        SignalKind::Buy
    } else {
        SignalKind::Sell
    };
    Some(TrendHint { kind, momentum })
}
