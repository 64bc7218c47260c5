// =============================================================================
// Candle Aggregator — folds ticks into fixed-interval OHLCV candles
// =============================================================================
//
// Bucketing uses floor division: bucket = floor(ts / interval) * interval.
// The last candle in the series is the "open" candle and is mutated in place;
// everything before it is immutable once superseded.
//
// Gap policy: when a tick lands more than one interval past the open candle,
// flat candles (OHLC = last close, volume 0) are synthesized for the missing
// buckets so the series keeps its fixed step. Out-of-order ticks are dropped,
// never merged — mutating closed history would invalidate already-emitted
// indicator state.

use tracing::{debug, warn};

use crate::error::EngineError;
use crate::types::{Candle, Tick};

/// What `apply` did with a tick. Callers use this to decide whether to extend
/// the indicator series or merely refresh the tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The open candle was frozen and a new one opened.
    NewCandleOpened,
    /// The open candle was updated in place.
    CandleUpdated,
    /// Out-of-order tick, ignored.
    TickDropped,
    /// Flat candles were synthesized for skipped buckets, then a new candle
    /// opened. `synthesized` counts only the flat fills.
    GapFilled { synthesized: usize },
}

/// Per-session tick-to-candle aggregator.
#[derive(Debug)]
pub struct CandleAggregator {
    interval_secs: i64,
    candles: Vec<Candle>,
    /// Ticks rejected for arriving out of order.
    dropped_ticks: u64,
}

impl CandleAggregator {
    pub fn new(interval_secs: i64) -> Self {
        debug_assert!(interval_secs > 0);
        Self {
            interval_secs,
            candles: Vec::new(),
            dropped_ticks: 0,
        }
    }

    /// Replace all state with a historical tail.
    ///
    /// The batch must already satisfy the bucket invariant: strictly
    /// increasing `bucket_start`, each a multiple of the interval, and sane
    /// OHLC bounds. Any violation fails with `InvalidSeed` and leaves the
    /// previous state untouched.
    pub fn seed(&mut self, candles: Vec<Candle>) -> Result<(), EngineError> {
        for (i, c) in candles.iter().enumerate() {
            if c.bucket_start.rem_euclid(self.interval_secs) != 0 {
                return Err(EngineError::InvalidSeed(format!(
                    "bucket {} is not a multiple of the {}s interval",
                    c.bucket_start, self.interval_secs
                )));
            }
            if i > 0 && c.bucket_start <= candles[i - 1].bucket_start {
                return Err(EngineError::InvalidSeed(format!(
                    "bucket {} does not increase past {}",
                    c.bucket_start,
                    candles[i - 1].bucket_start
                )));
            }
            if c.high < c.open.max(c.close) || c.low > c.open.min(c.close) {
                return Err(EngineError::InvalidSeed(format!(
                    "candle at {} violates high/low bounds",
                    c.bucket_start
                )));
            }
        }

        debug!(count = candles.len(), "aggregator seeded");
        self.candles = candles;
        self.dropped_ticks = 0;
        Ok(())
    }

    /// Fold one tick into the series.
    pub fn apply(&mut self, tick: Tick) -> ApplyOutcome {
        let bucket = tick.timestamp.div_euclid(self.interval_secs) * self.interval_secs;

        let Some(open) = self.candles.last_mut() else {
            // Cold start with no history: the first tick opens the series.
            self.candles
                .push(Candle::from_tick(bucket, tick.price, tick.size));
            return ApplyOutcome::NewCandleOpened;
        };

        if bucket == open.bucket_start {
            open.close = tick.price;
            open.high = open.high.max(tick.price);
            open.low = open.low.min(tick.price);
            open.volume += tick.size;
            return ApplyOutcome::CandleUpdated;
        }

        if bucket < open.bucket_start {
            self.dropped_ticks += 1;
            warn!(
                tick_ts = tick.timestamp,
                open_bucket = open.bucket_start,
                dropped_total = self.dropped_ticks,
                "late tick dropped"
            );
            return ApplyOutcome::TickDropped;
        }

        // The open candle freezes as-is; fill any skipped buckets with flats
        // at its close before opening the new candle.
        let last_close = open.close;
        let mut next = open.bucket_start + self.interval_secs;
        let mut synthesized = 0usize;
        while next < bucket {
            self.candles.push(Candle::flat(next, last_close));
            next += self.interval_secs;
            synthesized += 1;
        }

        self.candles
            .push(Candle::from_tick(bucket, tick.price, tick.size));

        if synthesized > 0 {
            debug!(synthesized, bucket, "gap filled with flat candles");
            ApplyOutcome::GapFilled { synthesized }
        } else {
            ApplyOutcome::NewCandleOpened
        }
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn dropped_ticks(&self) -> u64 {
        self.dropped_ticks
    }
}
