//! Runtime configuration from environment variables.

use std::env;

/// Configuration shared by the tickflow binaries.
///
/// Loaded from environment variables with sensible defaults; binaries call
/// `dotenv::dotenv().ok()` first so a local `.env` file works too.
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis connection URL for the trade feed
    pub redis_url: String,

    /// Pub/sub topic carrying trade JSON payloads
    pub feed_topic: String,

    /// Path to the SQLite database file
    pub db_path: String,

    /// Bucket length in milliseconds for the aggregator runtime
    pub bucket_period_ms: i64,

    /// Short moving-average window (buckets)
    pub sma_short: usize,

    /// Long moving-average window (buckets); also the SMA ring capacity
    pub sma_long: usize,

    /// Buffer size of every inter-stage channel
    pub channel_buffer: usize,

    /// Port for the `/health` liveness endpoint
    pub health_port: u16,

    /// Delay between reconnect attempts (Redis and websocket)
    pub reconnect_delay_secs: u64,

    /// Bucket lengths aggregated concurrently by the cacher runtime
    pub cacher_periods_ms: Vec<i64>,

    /// Exchange websocket base URL (fetcher)
    pub binance_ws_url: String,

    /// Trade symbol, lowercase (fetcher)
    pub symbol: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `TICKFLOW_REDIS_URL` (default: redis://127.0.0.1:6379)
    /// - `TICKFLOW_FEED_TOPIC` (default: binance:trade:btcusdt)
    /// - `TICKFLOW_DB_PATH` (default: tickflow.db)
    /// - `TICKFLOW_BUCKET_PERIOD_MS` (default: 15000)
    /// - `TICKFLOW_SMA_SHORT` (default: 50)
    /// - `TICKFLOW_SMA_LONG` (default: 200)
    /// - `TICKFLOW_CHANNEL_BUFFER` (default: 1024)
    /// - `TICKFLOW_HEALTH_PORT` (default: 8080)
    /// - `TICKFLOW_RECONNECT_DELAY_SECS` (default: 5)
    /// - `TICKFLOW_CACHER_PERIODS_MS` (default: 1000,15000,60000)
    /// - `TICKFLOW_BINANCE_WS_URL` (default: wss://stream.binance.com:9443)
    /// - `TICKFLOW_SYMBOL` (default: btcusdt)
    pub fn from_env() -> Self {
        Self {
            redis_url: env::var("TICKFLOW_REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),

            feed_topic: env::var("TICKFLOW_FEED_TOPIC")
                .unwrap_or_else(|_| "binance:trade:btcusdt".to_string()),

            db_path: env::var("TICKFLOW_DB_PATH").unwrap_or_else(|_| "tickflow.db".to_string()),

            // Non-positive periods and windows would poison the pipeline
            // downstream, so they fall back to the defaults like any other
            // unparsable value.
            bucket_period_ms: env::var("TICKFLOW_BUCKET_PERIOD_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&p: &i64| p > 0)
                .unwrap_or(15_000),

            sma_short: env::var("TICKFLOW_SMA_SHORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n: &usize| n >= 1)
                .unwrap_or(50),

            sma_long: env::var("TICKFLOW_SMA_LONG")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n: &usize| n >= 1)
                .unwrap_or(200),

            channel_buffer: env::var("TICKFLOW_CHANNEL_BUFFER")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n: &usize| n >= 1)
                .unwrap_or(1_024),

            health_port: env::var("TICKFLOW_HEALTH_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8_080),

            reconnect_delay_secs: env::var("TICKFLOW_RECONNECT_DELAY_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),

            cacher_periods_ms: env::var("TICKFLOW_CACHER_PERIODS_MS")
                .map(|s| {
                    s.split(',')
                        .filter_map(|p| p.trim().parse().ok())
                        .filter(|&p: &i64| p > 0)
                        .collect()
                })
                .ok()
                .filter(|v: &Vec<i64>| !v.is_empty())
                .unwrap_or_else(|| vec![1_000, 15_000, 60_000]),

            binance_ws_url: env::var("TICKFLOW_BINANCE_WS_URL")
                .unwrap_or_else(|_| "wss://stream.binance.com:9443".to_string()),

            symbol: env::var("TICKFLOW_SYMBOL").unwrap_or_else(|_| "btcusdt".to_string()),
        }
    }
}
