//! Fetcher runtime: exchange websocket → Redis pub/sub bridge.
//!
//! Subscribes to the Binance trade stream for one symbol, reshapes each
//! trade into the feed's `{tradeTimeMillis, price}` JSON, and publishes it
//! on the configured Redis topic. Reconnects forever with a fixed delay.
//!
//! Usage:
//!   cargo run --release --bin fetcher
//!
//! Environment variables: see `tickflow::config::Config::from_env`
//! (`TICKFLOW_BINANCE_WS_URL` / `TICKFLOW_SYMBOL` select the stream).

use dotenv::dotenv;
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use redis::AsyncCommands;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tickflow::config::Config;
use tickflow::shutdown::{ShutdownCoordinator, StageHandle};
use tickflow::types::PriceTick;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// The fields of Binance's trade stream event this bridge cares about.
#[derive(Debug, Deserialize)]
struct BinanceTrade {
    #[serde(rename = "T")]
    trade_time_ms: i64,
    #[serde(rename = "p")]
    price: String,
}

/// One websocket session. Returns true when stop was requested.
async fn bridge_session(
    ws_url: &str,
    topic: &str,
    redis_client: &redis::Client,
    handle: &mut StageHandle,
) -> bool {
    let mut redis_conn = match redis_client.get_multiplexed_async_connection().await {
        Ok(conn) => conn,
        Err(e) => {
            warn!("redis connection failed: {e}");
            return false;
        }
    };

    let (ws, _) = match connect_async(ws_url).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("websocket connect to {ws_url} failed: {e}");
            return false;
        }
    };
    info!("connected to {ws_url}");
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            _ = handle.stopped() => return true,
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let trade: BinanceTrade = match serde_json::from_str(&text) {
                        Ok(trade) => trade,
                        Err(e) => {
                            warn!("skipping unrecognized trade event: {e}");
                            continue;
                        }
                    };
                    let tick = PriceTick {
                        trade_time_ms: trade.trade_time_ms,
                        price: trade.price,
                    };
                    match serde_json::to_string(&tick) {
                        Ok(payload) => {
                            if let Err(e) = redis_conn.publish::<_, _, ()>(topic, payload).await {
                                warn!("publish to {topic} failed: {e}");
                            }
                        }
                        Err(e) => warn!("cannot encode tick: {e}"),
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("websocket read failed: {e}");
                    return false;
                }
                None => {
                    warn!("websocket stream closed by peer");
                    return false;
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let ws_url = format!("{}/ws/{}@trade", config.binance_ws_url, config.symbol);
    info!("🚀 tickflow fetcher");
    info!("   ├─ Stream: {ws_url}");
    info!("   └─ Publishing to {} on {}", config.feed_topic, config.redis_url);

    let redis_client = redis::Client::open(config.redis_url.as_str())?;

    let coordinator = Arc::new(ShutdownCoordinator::new());
    Arc::clone(&coordinator).spawn_signal_listener();

    let mut handle = coordinator.register();
    let topic = config.feed_topic.clone();
    let reconnect_delay = Duration::from_secs(config.reconnect_delay_secs);
    tokio::spawn(async move {
        loop {
            if bridge_session(&ws_url, &topic, &redis_client, &mut handle).await {
                break;
            }
            info!("reconnecting in {reconnect_delay:?}");
            tokio::select! {
                _ = handle.stopped() => break,
                _ = tokio::time::sleep(reconnect_delay) => {}
            }
        }
        handle.acknowledge().await;
    });

    info!("fetcher running, press CTRL+C to stop");
    coordinator.wait_done().await;
    info!("✅ fetcher stopped cleanly");
    Ok(())
}
