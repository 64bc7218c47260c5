// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing
// =============================================================================
//
// RSI measures the speed and magnitude of recent price changes to evaluate
// whether an asset is overbought or oversold.
//
// Step 1 — Compute price changes (deltas) from consecutive closes.
// Step 2 — Seed average gain / average loss with the SMA of the first `period`
//          gains / losses (losses as positive magnitudes).
// Step 3 — Apply Wilder's exponential smoothing:
//            avg_gain = (prev_avg_gain * (period - 1) + current_gain) / period
//            avg_loss = (prev_avg_loss * (period - 1) + current_loss) / period
// Step 4 — RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
//
// avg_loss == 0 is special-cased to RSI = 100 — never fed into the ratio.
// =============================================================================

use crate::error::EngineError;
use crate::indicators::Indicator;
use crate::types::{Candle, SeriesPoint};

/// Wilder averages over committed closes only.
#[derive(Debug, Clone, Copy)]
struct RsiState {
    period: usize,
    /// Close of the most recent committed candle — needed for the next delta.
    prev_close: Option<f64>,
    deltas_seen: usize,
    seed_gain: f64,
    seed_loss: f64,
    avg_gain: f64,
    avg_loss: f64,
}

impl RsiState {
    fn new(period: usize) -> Self {
        debug_assert!(period >= 1);
        Self {
            period,
            prev_close: None,
            deltas_seen: 0,
            seed_gain: 0.0,
            seed_loss: 0.0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        }
    }

    fn reset(&mut self) {
        *self = Self::new(self.period);
    }

    fn commit(&mut self, close: f64) -> Option<f64> {
        let Some(prev) = self.prev_close else {
            // The very first candle produces no delta.
            self.prev_close = Some(close);
            return None;
        };
        self.prev_close = Some(close);

        let delta = close - prev;
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);
        let period_f = self.period as f64;

        if self.deltas_seen < self.period {
            self.seed_gain += gain;
            self.seed_loss += loss;
            self.deltas_seen += 1;
            if self.deltas_seen == self.period {
                self.avg_gain = self.seed_gain / period_f;
                self.avg_loss = self.seed_loss / period_f;
                return Some(rsi_from_averages(self.avg_gain, self.avg_loss));
            }
            return None;
        }

        self.avg_gain = (self.avg_gain * (period_f - 1.0) + gain) / period_f;
        self.avg_loss = (self.avg_loss * (period_f - 1.0) + loss) / period_f;
        Some(rsi_from_averages(self.avg_gain, self.avg_loss))
    }

    fn peek(&self, close: f64) -> Option<f64> {
        let mut probe = *self;
        probe.commit(close)
    }
}

/// Convert average gain / average loss into an RSI value in [0, 100].
///
/// A zero average loss yields exactly 100 — the divide-by-zero case is
/// special-cased, never silently defaulted to a ratio of 1.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

// =============================================================================
// Rsi — the series-producing indicator
// =============================================================================

/// RSI over candle closes, with an aligned output series. The first defined
/// entry sits at index `period` (one full delta window consumed).
pub struct Rsi {
    name: String,
    state: RsiState,
    open_close: Option<f64>,
    series: Vec<SeriesPoint>,
    initialized: bool,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self {
            name: format!("rsi_{period}"),
            state: RsiState::new(period),
            open_close: None,
            series: Vec::new(),
            initialized: false,
        }
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.series
    }

    pub fn last_value(&self) -> Option<f64> {
        self.series.last().and_then(|p| p.value)
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn cold_compute(&mut self, candles: &[Candle]) {
        self.state.reset();
        self.series.clear();
        self.open_close = None;
        self.initialized = true;

        let n = candles.len();
        for (i, c) in candles.iter().enumerate() {
            let value = if i + 1 < n {
                self.state.commit(c.close)
            } else {
                self.open_close = Some(c.close);
                self.state.peek(c.close)
            };
            self.series.push(SeriesPoint {
                time: c.bucket_start,
                value,
            });
        }
    }

    fn extend(&mut self, candle: &Candle) -> Result<(), EngineError> {
        if !self.initialized {
            return Err(EngineError::UninitializedState("rsi"));
        }
        if let Some(close) = self.open_close.take() {
            self.state.commit(close);
        }
        self.open_close = Some(candle.close);
        self.series.push(SeriesPoint {
            time: candle.bucket_start,
            value: self.state.peek(candle.close),
        });
        Ok(())
    }

    fn update_last(&mut self, candle: &Candle) -> Result<(), EngineError> {
        if !self.initialized {
            return Err(EngineError::UninitializedState("rsi"));
        }
        let Some(last) = self.series.last_mut() else {
            return self.extend(candle);
        };
        last.time = candle.bucket_start;
        last.value = self.state.peek(candle.close);
        self.open_close = Some(candle.close);
        Ok(())
    }

    fn lines(&self) -> Vec<(String, &[SeriesPoint])> {
        vec![(self.name.clone(), self.series.as_slice())]
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candle(t: i64, close: f64) -> Candle {
        Candle {
            bucket_start: t,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    fn candles_from(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| candle(i as i64 * 60, c))
            .collect()
    }

    fn defined(rsi: &Rsi) -> Vec<f64> {
        rsi.points().iter().filter_map(|p| p.value).collect()
    }

    // ---- warm-up alignment -------------------------------------------------

    #[test]
    fn first_value_appears_at_index_period() {
        let mut rsi = Rsi::new(3);
        rsi.cold_compute(&candles_from(&[1.0, 2.0, 3.0, 4.0, 5.0]));
        let points = rsi.points();
        assert_eq!(points.len(), 5);
        assert!(points[..3].iter().all(|p| p.value.is_none()));
        assert!(points[3].value.is_some());
        assert!(points[4].value.is_some());
    }

    #[test]
    fn short_input_is_all_absent() {
        let mut rsi = Rsi::new(14);
        rsi.cold_compute(&candles_from(&[1.0, 2.0, 3.0]));
        assert!(rsi.points().iter().all(|p| p.value.is_none()));
    }

    // ---- edge values -------------------------------------------------------

    #[test]
    fn all_gains_is_exactly_100() {
        let closes: Vec<f64> = (1..=30).map(|x| x as f64).collect();
        let mut rsi = Rsi::new(14);
        rsi.cold_compute(&candles_from(&closes));
        for v in defined(&rsi) {
            assert!(v.is_finite());
            assert_eq!(v, 100.0);
        }
    }

    #[test]
    fn all_losses_is_zero() {
        let closes: Vec<f64> = (1..=30).rev().map(|x| x as f64).collect();
        let mut rsi = Rsi::new(14);
        rsi.cold_compute(&candles_from(&closes));
        for v in defined(&rsi) {
            assert!(v.abs() < 1e-10, "expected 0.0, got {v}");
        }
    }

    #[test]
    fn flat_window_hits_the_zero_loss_rule() {
        // No losses at all => avg_loss == 0 => RSI pinned to 100.
        let mut rsi = Rsi::new(14);
        rsi.cold_compute(&candles_from(&vec![100.0; 30]));
        for v in defined(&rsi) {
            assert_eq!(v, 100.0);
        }
    }

    #[test]
    fn rsi_stays_in_range() {
        let closes = [
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 44.18, 44.22, 44.57, 43.42, 42.66, 43.13,
        ];
        let mut rsi = Rsi::new(14);
        rsi.cold_compute(&candles_from(&closes));
        for v in defined(&rsi) {
            assert!((0.0..=100.0).contains(&v), "RSI {v} out of range");
        }
    }

    // ---- incremental -------------------------------------------------------

    #[test]
    fn extend_matches_cold_compute() {
        let closes = [
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 44.18, 44.22, 44.57, 43.42, 42.66, 43.13,
        ];
        let candles = candles_from(&closes);

        let mut cold = Rsi::new(5);
        cold.cold_compute(&candles);

        let mut inc = Rsi::new(5);
        inc.cold_compute(&[]);
        for c in &candles {
            inc.extend(c).unwrap();
            // Intrabar churn should not disturb the committed state.
            inc.update_last(&Candle { close: c.close + 1.0, ..*c }).unwrap();
            inc.update_last(c).unwrap();
        }

        for (a, b) in cold.points().iter().zip(inc.points()) {
            assert_eq!(a.time, b.time);
            match (a.value, b.value) {
                (None, None) => {}
                (Some(x), Some(y)) => assert!((x - y).abs() < 1e-9),
                other => panic!("mismatch: {other:?}"),
            }
        }
    }

    #[test]
    fn extend_requires_initialization() {
        let mut rsi = Rsi::new(14);
        assert!(matches!(
            rsi.extend(&candle(0, 1.0)),
            Err(EngineError::UninitializedState("rsi"))
        ));
    }
}
