//! Aggregator runtime: the production signal pipeline.
//!
//! Subscribes to the trade feed, buckets ticks into fixed-length windows,
//! maintains short/long moving averages over the closes, and persists
//! buckets, SMA pairs, and crossover signals to SQLite.
//!
//! Usage:
//!   cargo run --release --bin aggregator
//!
//! Environment variables: see `tickflow::config::Config::from_env`.

use dotenv::dotenv;
use log::info;
use std::sync::Arc;
use std::time::Duration;
use tickflow::bucket::{current_day_start_ms, spawn_bucket_stage};
use tickflow::config::Config;
use tickflow::decode::spawn_decoder;
use tickflow::engine::SignalEngine;
use tickflow::feed::{spawn_subscription, EventSource, RedisEventSource};
use tickflow::health;
use tickflow::shutdown::ShutdownCoordinator;
use tickflow::sink::{SqliteTradeSink, TradeSink};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    info!("🚀 tickflow aggregator");
    info!("   ├─ Feed: {} on {}", config.feed_topic, config.redis_url);
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Bucket period: {}ms", config.bucket_period_ms);
    info!(
        "   └─ SMA windows: short={} long={}",
        config.sma_short, config.sma_long
    );

    // Fatal startup errors only: DB open, listener bind, bad Redis URL.
    let _health = health::spawn(config.health_port)?;
    let sink: Arc<dyn TradeSink> = Arc::new(SqliteTradeSink::open(&config.db_path)?);
    let source: Arc<dyn EventSource> = Arc::new(RedisEventSource::new(
        &config.redis_url,
        Duration::from_secs(config.reconnect_delay_secs),
    )?);

    let coordinator = Arc::new(ShutdownCoordinator::new());
    Arc::clone(&coordinator).spawn_signal_listener();

    let raw_rx = spawn_subscription(
        source,
        config.feed_topic.clone(),
        config.channel_buffer,
        coordinator.register(),
    );
    let ticks_rx = spawn_decoder(raw_rx, config.channel_buffer, coordinator.register());
    let summaries_rx = spawn_bucket_stage(
        ticks_rx,
        current_day_start_ms(),
        config.bucket_period_ms,
        config.channel_buffer,
        coordinator.register(),
    );

    let mut engine = SignalEngine::new(
        Arc::clone(&sink),
        config.bucket_period_ms,
        config.sma_short,
        config.sma_long,
    );
    engine.warm_start().await;
    tokio::spawn(engine.run(summaries_rx, coordinator.register()));

    info!("pipeline running, press CTRL+C to stop");
    coordinator.wait_done().await;
    info!("✅ aggregator stopped cleanly");
    Ok(())
}
