// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = (close_t - EMA_{t-1}) * multiplier + EMA_{t-1}
//
// The very first EMA value is seeded with the SMA of the first `period`
// closes; entries before the seed completes are absent.
// =============================================================================

use crate::error::EngineError;
use crate::indicators::Indicator;
use crate::types::{Candle, SeriesPoint};

/// Running EMA statistics over *committed* (frozen) values only.
///
/// `commit` folds one value in permanently; `peek` answers "what would the
/// EMA be if this value were next" without mutating, which is how the open
/// candle's provisional entry is derived. Also reused by MACD for its fast,
/// slow, and signal lines.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EmaState {
    period: usize,
    multiplier: f64,
    seed_sum: f64,
    seed_count: usize,
    prev: Option<f64>,
}

impl EmaState {
    pub(crate) fn new(period: usize) -> Self {
        debug_assert!(period >= 1);
        Self {
            period,
            multiplier: 2.0 / (period as f64 + 1.0),
            seed_sum: 0.0,
            seed_count: 0,
            prev: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new(self.period);
    }

    /// Fold `value` into the running state; returns the EMA at that step, or
    /// `None` while the SMA seed is still filling.
    pub(crate) fn commit(&mut self, value: f64) -> Option<f64> {
        match self.prev {
            Some(prev) => {
                let ema = (value - prev) * self.multiplier + prev;
                self.prev = Some(ema);
                Some(ema)
            }
            None => {
                self.seed_sum += value;
                self.seed_count += 1;
                if self.seed_count == self.period {
                    let sma = self.seed_sum / self.period as f64;
                    self.prev = Some(sma);
                    Some(sma)
                } else {
                    None
                }
            }
        }
    }

    /// The EMA this state would produce for `value`, without committing it.
    pub(crate) fn peek(&self, value: f64) -> Option<f64> {
        let mut probe = *self;
        probe.commit(value)
    }
}

// =============================================================================
// Ema — the series-producing indicator
// =============================================================================

/// EMA over candle closes, with an aligned output series.
pub struct Ema {
    name: String,
    state: EmaState,
    /// Close of the current open candle — not yet committed.
    open_close: Option<f64>,
    series: Vec<SeriesPoint>,
    initialized: bool,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self {
            name: format!("ema_{period}"),
            state: EmaState::new(period),
            open_close: None,
            series: Vec::new(),
            initialized: false,
        }
    }

    /// The raw point series (single line).
    pub fn points(&self) -> &[SeriesPoint] {
        &self.series
    }

    /// Latest value, if past warm-up.
    pub fn last_value(&self) -> Option<f64> {
        self.series.last().and_then(|p| p.value)
    }
}

impl Indicator for Ema {
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
            // All candles but the last are frozen; the last entry stays
            // provisional so an in-progress candle can be re-derived.
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
            return Err(EngineError::UninitializedState("ema"));
        }
        // The previously open candle just froze — commit its final close.
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
            return Err(EngineError::UninitializedState("ema"));
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

    // ---- cold compute ------------------------------------------------------

    #[test]
    fn ema3_known_series() {
        // SMA seed of [1,2,3] = 2.0, multiplier = 0.5, then 3.0, 4.0.
        let mut ema = Ema::new(3);
        ema.cold_compute(&candles_from(&[1.0, 2.0, 3.0, 4.0, 5.0]));

        let values: Vec<Option<f64>> = ema.points().iter().map(|p| p.value).collect();
        assert_eq!(values[0], None);
        assert_eq!(values[1], None);
        assert!((values[2].unwrap() - 2.0).abs() < 1e-12);
        assert!((values[3].unwrap() - 3.0).abs() < 1e-12);
        assert!((values[4].unwrap() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn short_input_is_all_absent() {
        let mut ema = Ema::new(5);
        ema.cold_compute(&candles_from(&[1.0, 2.0, 3.0]));
        assert_eq!(ema.points().len(), 3);
        assert!(ema.points().iter().all(|p| p.value.is_none()));
        assert_eq!(ema.last_value(), None);
    }

    #[test]
    fn series_is_time_aligned() {
        let mut ema = Ema::new(2);
        ema.cold_compute(&candles_from(&[10.0, 11.0, 12.0]));
        let times: Vec<i64> = ema.points().iter().map(|p| p.time).collect();
        assert_eq!(times, vec![0, 60, 120]);
    }

    // ---- incremental -------------------------------------------------------

    #[test]
    fn extend_matches_cold_compute() {
        let closes = [3.0, 1.0, 4.0, 1.5, 9.0, 2.6, 5.3, 5.8, 9.7, 9.3];
        let candles = candles_from(&closes);

        let mut cold = Ema::new(4);
        cold.cold_compute(&candles);

        let mut inc = Ema::new(4);
        inc.cold_compute(&[]);
        for c in &candles {
            inc.extend(c).unwrap();
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
    fn update_last_recomputes_only_the_tail() {
        let candles = candles_from(&[1.0, 2.0, 3.0, 4.0]);
        let mut ema = Ema::new(3);
        ema.cold_compute(&candles);
        let before: Vec<SeriesPoint> = ema.points().to_vec();

        // Mutate the open candle's close a few times, then settle back.
        ema.update_last(&candle(180, 10.0)).unwrap();
        assert!((ema.last_value().unwrap() - 6.0).abs() < 1e-12); // (10-2)*0.5+2
        ema.update_last(&candle(180, 4.0)).unwrap();

        assert_eq!(ema.points(), before.as_slice());
    }

    #[test]
    fn update_then_extend_commits_final_close() {
        let mut inc = Ema::new(3);
        inc.cold_compute(&[]);
        inc.extend(&candle(0, 1.0)).unwrap();
        inc.extend(&candle(60, 2.0)).unwrap();
        inc.extend(&candle(120, 99.0)).unwrap();
        // Intrabar churn on the open candle; final close is 3.0.
        inc.update_last(&candle(120, 0.5)).unwrap();
        inc.update_last(&candle(120, 3.0)).unwrap();
        inc.extend(&candle(180, 4.0)).unwrap();
        inc.update_last(&candle(180, 4.0)).unwrap();

        let mut cold = Ema::new(3);
        cold.cold_compute(&candles_from(&[1.0, 2.0, 3.0, 4.0]));
        assert_eq!(inc.points(), cold.points());
    }

    #[test]
    fn extend_requires_initialization() {
        let mut ema = Ema::new(3);
        assert!(matches!(
            ema.extend(&candle(0, 1.0)),
            Err(EngineError::UninitializedState("ema"))
        ));
    }
}
