pub mod action;
pub mod coin_snapshot;
pub mod historical_record;
pub mod market_context;
pub mod timing_signals;
pub mod trade_outcome;
