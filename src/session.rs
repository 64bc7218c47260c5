// =============================================================================
// Market Session — per-(symbol, interval) orchestrator
// =============================================================================
//
// Owns one candle aggregator and one indicator set, processes inbound ticks
// strictly in arrival order, and hands the rendering layer read-only
// snapshots. Lifecycle:
//
//   Uninitialized → Loading → Live → (Reconnecting ↔ Live) | Closed
//
// A session in Reconnecting retains all in-memory state — the transport
// collaborator is responsible for redelivering missed ticks after it
// restores the feed. Closed is terminal; further applies fail with
// `SessionClosed` and a replacement session must be created.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::indicators::{Ema, Indicator, Macd, Rsi};
use crate::market_data::{ApplyOutcome, CandleAggregator};
use crate::runtime_config::{RuntimeConfig, SignalSource};
use crate::signals::{check_latest, detect_crossovers, trend_hint};
use crate::types::{
    Candle, CandleKey, Interval, SeriesPoint, SessionState, SignalEvent, Tick, TrendHint,
};

// =============================================================================
// Snapshot types
// =============================================================================

/// One named indicator line, copied out for the rendering collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorLine {
    pub name: String,
    pub points: Vec<SeriesPoint>,
}

/// Read-only copy of everything a renderer needs. Owns its data — no
/// lifetime coupling with the session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub symbol: String,
    pub interval: Interval,
    pub state: SessionState,
    pub candles: Vec<Candle>,
    pub indicators: Vec<IndicatorLine>,
    pub signals: Vec<SignalEvent>,
    pub trend: Option<TrendHint>,
    pub dropped_ticks: u64,
    /// ISO 8601 generation timestamp.
    pub generated_at: String,
}

// =============================================================================
// MarketSession
// =============================================================================

pub struct MarketSession {
    key: CandleKey,
    state: SessionState,
    aggregator: CandleAggregator,
    indicators: Vec<Box<dyn Indicator>>,
    /// Names of the two lines the signal detector consumes.
    signal_pair: (String, String),
    /// "ema" or "macd" — stamped onto emitted events.
    signal_source: String,
    trend_lookback: usize,
}

impl MarketSession {
    /// Build a session with the configured indicator set. The session starts
    /// Uninitialized; call `begin_loading` + `seed` before applying ticks.
    pub fn new(symbol: impl Into<String>, interval: Interval, config: &RuntimeConfig) -> Self {
        let mut indicators: Vec<Box<dyn Indicator>> = Vec::new();

        // The chart overlay EMA is skipped when it duplicates a crossover leg.
        if config.chart_ema_period != config.ema_fast_period
            && config.chart_ema_period != config.ema_slow_period
        {
            indicators.push(Box::new(Ema::new(config.chart_ema_period)));
        }
        indicators.push(Box::new(Ema::new(config.ema_fast_period)));
        indicators.push(Box::new(Ema::new(config.ema_slow_period)));
        indicators.push(Box::new(Rsi::new(config.rsi_period)));
        indicators.push(Box::new(Macd::new(
            config.macd_fast,
            config.macd_slow,
            config.macd_signal,
        )));

        let signal_pair = match config.signal_source {
            SignalSource::Ema => (
                format!("ema_{}", config.ema_fast_period),
                format!("ema_{}", config.ema_slow_period),
            ),
            SignalSource::Macd => ("macd".to_string(), "macd_signal".to_string()),
        };

        Self {
            key: CandleKey {
                symbol: symbol.into(),
                interval,
            },
            state: SessionState::Uninitialized,
            aggregator: CandleAggregator::new(interval.seconds()),
            indicators,
            signal_pair,
            signal_source: config.signal_source.to_string(),
            trend_lookback: config.trend_lookback,
        }
    }

    pub fn key(&self) -> &CandleKey {
        &self.key
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn candles(&self) -> &[Candle] {
        self.aggregator.candles()
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Mark the session as fetching its historical seed.
    pub fn begin_loading(&mut self) {
        if self.state == SessionState::Uninitialized {
            self.state = SessionState::Loading;
        }
    }

    /// Seed with a historical tail and cold-compute every indicator.
    ///
    /// On success the session goes Live. `InvalidSeed` leaves it in Loading
    /// so the caller can fetch and try again.
    pub fn seed(&mut self, candles: Vec<Candle>) -> Result<(), EngineError> {
        if self.state == SessionState::Closed {
            return Err(EngineError::SessionClosed);
        }
        self.aggregator.seed(candles)?;
        for ind in &mut self.indicators {
            ind.cold_compute(self.aggregator.candles());
        }
        self.state = SessionState::Live;
        info!(
            key = %self.key,
            candles = self.aggregator.len(),
            "session seeded and live"
        );
        Ok(())
    }

    /// Transport lost the feed; all in-memory state is retained.
    pub fn mark_reconnecting(&mut self) {
        if self.state == SessionState::Live {
            self.state = SessionState::Reconnecting;
            info!(key = %self.key, "session reconnecting");
        }
    }

    /// Transport restored the feed.
    pub fn mark_resumed(&mut self) {
        if self.state == SessionState::Reconnecting {
            self.state = SessionState::Live;
            info!(key = %self.key, "session resumed");
        }
    }

    /// Terminal shutdown after an unrecoverable transport error.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
        info!(key = %self.key, "session closed");
    }

    // -------------------------------------------------------------------------
    // Tick pipeline
    // -------------------------------------------------------------------------

    /// Fold one tick through aggregator and indicators.
    ///
    /// Ticks arriving during Reconnecting are still processed — the session
    /// stays valid and resumable across the outage.
    pub fn apply_tick(&mut self, tick: Tick) -> Result<ApplyOutcome, EngineError> {
        match self.state {
            SessionState::Closed => return Err(EngineError::SessionClosed),
            SessionState::Uninitialized | SessionState::Loading => {
                return Err(EngineError::UninitializedState("session"));
            }
            SessionState::Live | SessionState::Reconnecting => {}
        }

        let outcome = self.aggregator.apply(tick);

        match outcome {
            ApplyOutcome::TickDropped => {}
            ApplyOutcome::CandleUpdated => {
                if let Some(last) = self.aggregator.last().copied() {
                    for ind in &mut self.indicators {
                        ind.update_last(&last)?;
                    }
                }
            }
            ApplyOutcome::NewCandleOpened => {
                if let Some(last) = self.aggregator.last().copied() {
                    for ind in &mut self.indicators {
                        ind.extend(&last)?;
                    }
                }
            }
            ApplyOutcome::GapFilled { synthesized } => {
                // Synthesized flats plus the freshly opened candle all extend
                // the series, in order.
                let start = self.aggregator.len() - synthesized - 1;
                for i in start..self.aggregator.len() {
                    let c = self.aggregator.candles()[i];
                    for ind in &mut self.indicators {
                        ind.extend(&c)?;
                    }
                }
            }
        }

        if outcome != ApplyOutcome::TickDropped {
            if let Some(event) = self.latest_signal() {
                debug!(key = %self.key, kind = %event.kind, time = event.time, "crossover at tail");
            }
        }

        Ok(outcome)
    }

    // -------------------------------------------------------------------------
    // Derived views
    // -------------------------------------------------------------------------

    fn line(&self, name: &str) -> Option<Vec<SeriesPoint>> {
        for ind in &self.indicators {
            for (line_name, points) in ind.lines() {
                if line_name == name {
                    return Some(points.to_vec());
                }
            }
        }
        None
    }

    /// All signal events derived from the configured crossover pair.
    pub fn signals(&self) -> Vec<SignalEvent> {
        let (Some(a), Some(b)) = (self.line(&self.signal_pair.0), self.line(&self.signal_pair.1))
        else {
            return Vec::new();
        };
        detect_crossovers(&a, &b, &self.signal_source)
    }

    /// The crossover event at the current tail bar, if any.
    pub fn latest_signal(&self) -> Option<SignalEvent> {
        let (a, b) = (self.line(&self.signal_pair.0)?, self.line(&self.signal_pair.1)?);
        check_latest(&a, &b, &self.signal_source)
    }

    /// Copy-out snapshot for the rendering collaborator.
    pub fn snapshot(&self) -> SessionSnapshot {
        let indicators = self
            .indicators
            .iter()
            .flat_map(|ind| {
                ind.lines().into_iter().map(|(name, points)| IndicatorLine {
                    name,
                    points: points.to_vec(),
                })
            })
            .collect();

        SessionSnapshot {
            symbol: self.key.symbol.clone(),
            interval: self.key.interval,
            state: self.state,
            candles: self.aggregator.candles().to_vec(),
            indicators,
            signals: self.signals(),
            trend: trend_hint(self.aggregator.candles(), self.trend_lookback),
            dropped_ticks: self.aggregator.dropped_ticks(),
            generated_at: Utc::now().to_rfc3339(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_config::RuntimeConfig;

    fn small_config() -> RuntimeConfig {
        RuntimeConfig {
            chart_ema_period: 4,
            ema_fast_period: 2,
            ema_slow_period: 3,
            rsi_period: 3,
            macd_fast: 3,
            macd_slow: 5,
            macd_signal: 2,
            trend_lookback: 3,
            ..RuntimeConfig::default()
        }
    }

    fn seed_candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + ((i as f64) * 0.8).sin() * 4.0;
                Candle {
                    bucket_start: i as i64 * 60,
                    open: close - 0.5,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 10.0,
                }
            })
            .collect()
    }

    fn tick(ts: i64, price: f64) -> Tick {
        Tick {
            timestamp: ts,
            price,
            size: 1.0,
        }
    }

    fn live_session(seed_len: usize) -> MarketSession {
        let mut session = MarketSession::new("BTCUSDT", Interval::OneMinute, &small_config());
        session.begin_loading();
        session.seed(seed_candles(seed_len)).unwrap();
        session
    }

    // ---- lifecycle ---------------------------------------------------------

    #[test]
    fn lifecycle_reaches_live() {
        let mut session = MarketSession::new("BTCUSDT", Interval::OneMinute, &small_config());
        assert_eq!(session.state(), SessionState::Uninitialized);
        session.begin_loading();
        assert_eq!(session.state(), SessionState::Loading);
        session.seed(seed_candles(10)).unwrap();
        assert_eq!(session.state(), SessionState::Live);
    }

    #[test]
    fn apply_before_seed_fails() {
        let mut session = MarketSession::new("BTCUSDT", Interval::OneMinute, &small_config());
        assert!(matches!(
            session.apply_tick(tick(0, 100.0)),
            Err(EngineError::UninitializedState(_))
        ));
    }

    #[test]
    fn invalid_seed_stays_loading() {
        let mut session = MarketSession::new("BTCUSDT", Interval::OneMinute, &small_config());
        session.begin_loading();
        let mut bad = seed_candles(5);
        bad[2].bucket_start = 61; // not a multiple of 60
        assert!(matches!(session.seed(bad), Err(EngineError::InvalidSeed(_))));
        assert_eq!(session.state(), SessionState::Loading);
    }

    #[test]
    fn closed_session_rejects_everything() {
        let mut session = live_session(10);
        session.close();
        assert!(matches!(
            session.apply_tick(tick(601, 100.0)),
            Err(EngineError::SessionClosed)
        ));
        assert!(matches!(
            session.seed(seed_candles(5)),
            Err(EngineError::SessionClosed)
        ));
    }

    #[test]
    fn reconnecting_retains_state_and_resumes() {
        let mut session = live_session(10);
        let candles_before = session.candles().len();

        session.mark_reconnecting();
        assert_eq!(session.state(), SessionState::Reconnecting);
        assert_eq!(session.candles().len(), candles_before);

        // Redelivered ticks during the outage are still folded in.
        session.apply_tick(tick(601, 101.0)).unwrap();

        session.mark_resumed();
        assert_eq!(session.state(), SessionState::Live);
        assert_eq!(session.candles().len(), candles_before + 1);
    }

    // ---- tick routing ------------------------------------------------------

    #[test]
    fn indicator_series_track_candle_count() {
        let mut session = live_session(10);
        session.apply_tick(tick(601, 101.0)).unwrap(); // new bucket 600
        session.apply_tick(tick(610, 102.0)).unwrap(); // same bucket
        session.apply_tick(tick(790, 103.0)).unwrap(); // gap: 660..=720 flat, 780 opens

        let snapshot = session.snapshot();
        assert_eq!(snapshot.candles.len(), 14);
        for line in &snapshot.indicators {
            assert_eq!(line.points.len(), 14, "line {} misaligned", line.name);
        }
    }

    #[test]
    fn dropped_tick_changes_nothing() {
        let mut session = live_session(10);
        let before = session.snapshot();
        let outcome = session.apply_tick(tick(30, 1.0)).unwrap();
        assert_eq!(outcome, ApplyOutcome::TickDropped);
        let after = session.snapshot();
        assert_eq!(before.candles, after.candles);
        assert_eq!(before.signals, after.signals);
    }

    // ---- the central equivalence property ----------------------------------

    #[test]
    fn incremental_session_matches_cold_compute_on_final_candles() {
        let mut session = live_session(8);

        // Drive a few buckets of ticks, with intrabar churn on each.
        let mut ts = 8 * 60;
        for step in 0..20 {
            let base = 100.0 + (step as f64 * 0.6).cos() * 5.0;
            session.apply_tick(tick(ts, base)).unwrap();
            session.apply_tick(tick(ts + 15, base * 1.002)).unwrap();
            session.apply_tick(tick(ts + 45, base * 0.999)).unwrap();
            ts += 60;
        }

        let final_candles = session.candles().to_vec();
        let incremental = session.snapshot();

        // A fresh session cold-computed over the same candle list must agree
        // value-for-value on every indicator line.
        let mut fresh = MarketSession::new("BTCUSDT", Interval::OneMinute, &small_config());
        fresh.begin_loading();
        fresh.seed(final_candles).unwrap();
        let cold = fresh.snapshot();

        assert_eq!(incremental.indicators.len(), cold.indicators.len());
        for (inc_line, cold_line) in incremental.indicators.iter().zip(&cold.indicators) {
            assert_eq!(inc_line.name, cold_line.name);
            for (a, b) in inc_line.points.iter().zip(&cold_line.points) {
                assert_eq!(a.time, b.time);
                match (a.value, b.value) {
                    (None, None) => {}
                    (Some(x), Some(y)) => assert!(
                        (x - y).abs() < 1e-9,
                        "{}: {x} vs {y} at t={}",
                        inc_line.name,
                        a.time
                    ),
                    other => panic!("{}: {other:?}", inc_line.name),
                }
            }
        }

        // And the derived signal lists must be identical.
        assert_eq!(incremental.signals, cold.signals);
    }

    // ---- derived views -----------------------------------------------------

    #[test]
    fn snapshot_is_a_copy() {
        let mut session = live_session(10);
        let snapshot = session.snapshot();
        session.apply_tick(tick(601, 150.0)).unwrap();
        // The earlier snapshot must not observe the new tick.
        assert_eq!(snapshot.candles.len(), 10);
    }

    #[test]
    fn snapshot_carries_trend_and_source() {
        let session = live_session(10);
        let snapshot = session.snapshot();
        assert!(snapshot.trend.is_some());
        for ev in &snapshot.signals {
            assert_eq!(ev.source, "ema");
        }
    }

    #[test]
    fn macd_signal_source_uses_macd_lines() {
        let config = RuntimeConfig {
            signal_source: crate::runtime_config::SignalSource::Macd,
            ..small_config()
        };
        let mut session = MarketSession::new("ETHUSDT", Interval::OneMinute, &config);
        session.begin_loading();
        session.seed(seed_candles(30)).unwrap();
        for ev in session.signals() {
            assert_eq!(ev.source, "macd");
        }
    }
}
