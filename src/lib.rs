//! tickflow: streaming trade-price aggregation and SMA-crossover signals.
//!
//! Pipeline: Redis pub/sub feed → JSON decode → fixed-period buckets →
//! SMA ring with gap fill → crossover signals → SQLite, under a cooperative
//! shutdown coordinator.

pub mod bucket;
pub mod config;
pub mod decode;
pub mod engine;
pub mod feed;
pub mod health;
pub mod shutdown;
pub mod signal;
pub mod sink;
pub mod sma;
pub mod stats;
pub mod types;
