// =============================================================================
// Crossover Detector — Buy/Sell events from two aligned series
// =============================================================================
//
// At each step i where a[i-1], b[i-1], a[i], b[i] are all defined:
//   cross-up:   a[i-1] <= b[i-1]  &&  a[i] > b[i]   => Buy at time[i]
//   cross-down: a[i-1] >= b[i-1]  &&  a[i] < b[i]   => Sell at time[i]
//
// Equality at i-1 is included in both legs' "prior" side so a flat-then-cross
// sequence still fires exactly once; whichever direction the current step
// strictly satisfies wins, and a step where both sides are equal produces no
// event. Warm-up gaps (absent values) suppress the step entirely.

use crate::types::{SeriesPoint, SignalEvent, SignalKind};

/// Classify a single step given both prior and current values.
fn classify_step(prev_a: f64, prev_b: f64, a: f64, b: f64) -> Option<SignalKind> {
    if prev_a <= prev_b && a > b {
        Some(SignalKind::Buy)
    } else if prev_a >= prev_b && a < b {
        Some(SignalKind::Sell)
    } else {
        None
    }
}

/// The event (if any) at index `i` of two aligned series.
fn event_at(a: &[SeriesPoint], b: &[SeriesPoint], i: usize, source: &str) -> Option<SignalEvent> {
    if i == 0 || i >= a.len() || i >= b.len() {
        return None;
    }
    let (pa, pb) = (a[i - 1].value?, b[i - 1].value?);
    let (ca, cb) = (a[i].value?, b[i].value?);
    classify_step(pa, pb, ca, cb).map(|kind| SignalEvent {
        time: a[i].time,
        kind,
        source: source.to_string(),
    })
}

/// Full scan over two aligned series. Stateless: recomputing this at any time
/// equals the result of appending one `check_latest` per new bar.
pub fn detect_crossovers(a: &[SeriesPoint], b: &[SeriesPoint], source: &str) -> Vec<SignalEvent> {
    let n = a.len().min(b.len());
    (1..n).filter_map(|i| event_at(a, b, i, source)).collect()
}

/// The event (if any) at the final bar only.
pub fn check_latest(a: &[SeriesPoint], b: &[SeriesPoint], source: &str) -> Option<SignalEvent> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    event_at(a, b, n - 1, source)
}
