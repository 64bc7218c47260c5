// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
//   macd      = EMA(fast) - EMA(slow)
//   signal    = EMA(macd series, signal period)
//   histogram = macd - signal
//
// The MACD line is defined only from the first index where both the fast and
// slow EMAs are defined; the signal line starts after its own SMA seed over
// the MACD output. The histogram's sign drives render color, nothing else.
// =============================================================================

use crate::error::EngineError;
use crate::indicators::ema::EmaState;
use crate::indicators::Indicator;
use crate::types::{Candle, SeriesPoint};

/// Committed MACD statistics: two close-driven EMA states plus a signal EMA
/// state fed by the committed MACD output.
#[derive(Debug, Clone, Copy)]
struct MacdState {
    fast: EmaState,
    slow: EmaState,
    signal: EmaState,
}

/// One aligned step of MACD output.
#[derive(Debug, Clone, Copy, PartialEq)]
struct MacdStep {
    macd: Option<f64>,
    signal: Option<f64>,
    histogram: Option<f64>,
}

impl MacdState {
    fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast: EmaState::new(fast),
            slow: EmaState::new(slow),
            signal: EmaState::new(signal),
        }
    }

    fn commit(&mut self, close: f64) -> MacdStep {
        let fast = self.fast.commit(close);
        let slow = self.slow.commit(close);
        match (fast, slow) {
            (Some(f), Some(s)) => {
                let macd = f - s;
                let signal = self.signal.commit(macd);
                MacdStep {
                    macd: Some(macd),
                    signal,
                    histogram: signal.map(|sig| macd - sig),
                }
            }
            _ => MacdStep {
                macd: None,
                signal: None,
                histogram: None,
            },
        }
    }

    fn peek(&self, close: f64) -> MacdStep {
        let mut probe = *self;
        probe.commit(close)
    }
}

// =============================================================================
// Macd — the series-producing indicator
// =============================================================================

/// MACD over candle closes: three aligned lines (macd, signal, histogram).
pub struct Macd {
    name: String,
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
    state: MacdState,
    open_close: Option<f64>,
    macd_line: Vec<SeriesPoint>,
    signal_line: Vec<SeriesPoint>,
    histogram: Vec<SeriesPoint>,
    initialized: bool,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        debug_assert!(fast < slow);
        Self {
            name: format!("macd_{fast}_{slow}_{signal}"),
            fast_period: fast,
            slow_period: slow,
            signal_period: signal,
            state: MacdState::new(fast, slow, signal),
            open_close: None,
            macd_line: Vec::new(),
            signal_line: Vec::new(),
            histogram: Vec::new(),
            initialized: false,
        }
    }

    pub fn macd_points(&self) -> &[SeriesPoint] {
        &self.macd_line
    }

    pub fn signal_points(&self) -> &[SeriesPoint] {
        &self.signal_line
    }

    pub fn histogram_points(&self) -> &[SeriesPoint] {
        &self.histogram
    }

    fn push_step(&mut self, time: i64, step: MacdStep) {
        self.macd_line.push(SeriesPoint { time, value: step.macd });
        self.signal_line.push(SeriesPoint { time, value: step.signal });
        self.histogram.push(SeriesPoint { time, value: step.histogram });
    }

    fn set_last_step(&mut self, time: i64, step: MacdStep) {
        // All three lines grow in lockstep; if one has a tail they all do.
        if let (Some(m), Some(s), Some(h)) = (
            self.macd_line.last_mut(),
            self.signal_line.last_mut(),
            self.histogram.last_mut(),
        ) {
            *m = SeriesPoint { time, value: step.macd };
            *s = SeriesPoint { time, value: step.signal };
            *h = SeriesPoint { time, value: step.histogram };
        } else {
            self.push_step(time, step);
        }
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn cold_compute(&mut self, candles: &[Candle]) {
        self.state = MacdState::new(self.fast_period, self.slow_period, self.signal_period);
        self.macd_line.clear();
        self.signal_line.clear();
        self.histogram.clear();
        self.open_close = None;
        self.initialized = true;

        let n = candles.len();
        for (i, c) in candles.iter().enumerate() {
            let step = if i + 1 < n {
                self.state.commit(c.close)
            } else {
                self.open_close = Some(c.close);
                self.state.peek(c.close)
            };
            self.push_step(c.bucket_start, step);
        }
    }

    fn extend(&mut self, candle: &Candle) -> Result<(), EngineError> {
        if !self.initialized {
            return Err(EngineError::UninitializedState("macd"));
        }
        if let Some(close) = self.open_close.take() {
            self.state.commit(close);
        }
        self.open_close = Some(candle.close);
        let step = self.state.peek(candle.close);
        self.push_step(candle.bucket_start, step);
        Ok(())
    }

    fn update_last(&mut self, candle: &Candle) -> Result<(), EngineError> {
        if !self.initialized {
            return Err(EngineError::UninitializedState("macd"));
        }
        let step = self.state.peek(candle.close);
        self.set_last_step(candle.bucket_start, step);
        self.open_close = Some(candle.close);
        Ok(())
    }

    fn lines(&self) -> Vec<(String, &[SeriesPoint])> {
        vec![
            ("macd".to_string(), self.macd_line.as_slice()),
            ("macd_signal".to_string(), self.signal_line.as_slice()),
            ("macd_histogram".to_string(), self.histogram.as_slice()),
        ]
    }
}
