pub mod market_data;
pub mod model_store;
