// =============================================================================
// Signals Module
// =============================================================================
//
// Derived, stateless signal layers over the indicator series:
//   - crossover: discrete Buy/Sell events where one series crosses another
//   - trend: the sign-of-recent-bodies label shown next to the chart
//
// Nothing in here owns state. Every output is recomputable from the feeding
// series at any time, which is what makes signal emission idempotent.

pub mod crossover;
pub mod trend;

pub use crossover::{check_latest, detect_crossovers};
pub use trend::trend_hint;
