pub mod aggregator;
pub mod history;
pub mod tick_stream;

// Re-export the aggregation surface for convenient access
// (e.g. `use crate::market_data::CandleAggregator`).
pub use aggregator::{ApplyOutcome, CandleAggregator};
pub use history::fetch_klines;
pub use tick_stream::run_trade_stream;
