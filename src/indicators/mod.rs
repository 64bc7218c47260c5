// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Incremental implementations of the indicators the chart engine renders.
// Each indicator carries the minimal sufficient statistics needed to extend
// its series by one candle without rescanning history, plus the aligned
// output series itself (one entry per candle, `None` during warm-up).
//
// The central correctness property: `cold_compute` over a candle list must
// match, value for value, what incremental extension would have produced had
// it processed the same candles in order. Every indicator here is built as a
// "committed" state covering all frozen candles plus a provisional last entry
// derived from the still-open candle, so the open candle can mutate freely.

pub mod ema;
pub mod macd;
pub mod rsi;

pub use ema::Ema;
pub use macd::Macd;
pub use rsi::Rsi;

use crate::error::EngineError;
use crate::types::{Candle, SeriesPoint};

/// Uniform surface over the indicator set. Selected by configuration, not by
/// string-keyed branching at call sites.
pub trait Indicator: Send {
    /// Stable name used to key the series in snapshots (e.g. "ema_14").
    fn name(&self) -> &str;

    /// O(n) full computation from scratch. Fewer than warm-up candles yields
    /// an all-absent series, not an error.
    fn cold_compute(&mut self, candles: &[Candle]);

    /// Advance by one new bucket: commit the previously open candle into the
    /// running state and append a provisional entry for `candle`.
    fn extend(&mut self, candle: &Candle) -> Result<(), EngineError>;

    /// Recompute only the last series entry from the running state and the
    /// mutated open candle. Prior entries and the committed state are
    /// untouched.
    fn update_last(&mut self, candle: &Candle) -> Result<(), EngineError>;

    /// The aligned output series, one or more named lines.
    fn lines(&self) -> Vec<(String, &[SeriesPoint])>;
}
