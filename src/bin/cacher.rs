//! Cacher runtime: concurrent bucket statistics over several periods.
//!
//! Runs one subscribe→decode→bucket sub-pipeline per configured period over
//! the same feed topic, merges the closed buckets into one stream, and
//! persists each one tagged with its period.
//!
//! Usage:
//!   cargo run --release --bin cacher
//!
//! Environment variables: see `tickflow::config::Config::from_env`
//! (`TICKFLOW_CACHER_PERIODS_MS` selects the periods).

use dotenv::dotenv;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tickflow::bucket::current_day_start_ms;
use tickflow::config::Config;
use tickflow::feed::{EventSource, RedisEventSource};
use tickflow::shutdown::ShutdownCoordinator;
use tickflow::sink::{SqliteTradeSink, TradeSink};
use tickflow::stats::PeriodicStatsSet;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    info!("🚀 tickflow cacher");
    info!("   ├─ Feed: {} on {}", config.feed_topic, config.redis_url);
    info!("   ├─ Database: {}", config.db_path);
    info!("   └─ Periods: {:?}ms", config.cacher_periods_ms);

    let sink: Arc<dyn TradeSink> = Arc::new(SqliteTradeSink::open(&config.db_path)?);
    let source: Arc<dyn EventSource> = Arc::new(RedisEventSource::new(
        &config.redis_url,
        Duration::from_secs(config.reconnect_delay_secs),
    )?);

    let coordinator = Arc::new(ShutdownCoordinator::new());
    Arc::clone(&coordinator).spawn_signal_listener();

    let bucket_start_ms = current_day_start_ms();
    let mut set = PeriodicStatsSet::new();
    for period_ms in &config.cacher_periods_ms {
        set.add(
            Arc::clone(&source),
            &config.feed_topic,
            *period_ms,
            bucket_start_ms,
            config.channel_buffer,
            &coordinator,
        );
    }
    let mut merged = set.fan_in(config.channel_buffer, &coordinator);

    let consumer_sink = Arc::clone(&sink);
    let consumer_handle = coordinator.register();
    tokio::spawn(async move {
        while let Some(stats) = merged.recv().await {
            info!(
                "closed {}ms bucket: first={} last={} min={} max={}",
                stats.period_ms,
                stats.value.first,
                stats.value.last,
                stats.value.min,
                stats.value.max
            );
            if let Err(e) = consumer_sink.write_bucket(stats.period_ms, &stats.value).await {
                error!("failed to persist {}ms bucket: {e}", stats.period_ms);
            }
        }
        consumer_handle.acknowledge().await;
    });

    info!("cacher running, press CTRL+C to stop");
    coordinator.wait_done().await;
    info!("✅ cacher stopped cleanly");
    Ok(())
}
