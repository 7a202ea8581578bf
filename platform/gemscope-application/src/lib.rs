pub mod benchmarking;
pub mod config;
pub mod live;
pub mod models;
pub mod training;
