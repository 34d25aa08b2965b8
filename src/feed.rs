//! Feed ingestion: the `EventSource` seam and its Redis pub/sub
//! implementation.
//!
//! The subscription stage owns the transport connection and is the only
//! stage that races incoming data against the stop signal; everything
//! downstream just drains its channel. Transport loss never surfaces past
//! this stage: the source reconnects forever with a fixed delay.

use crate::shutdown::StageHandle;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// A subscription-style message source feeding raw payloads downstream.
///
/// Implementations run until the stop signal fires, then acknowledge through
/// the handle and return.
#[async_trait]
pub trait EventSource: Send + Sync + 'static {
    async fn run(self: Arc<Self>, topic: String, out: mpsc::Sender<String>, handle: StageHandle);
}

/// Spawns the subscription stage for `source`; returns the raw payload
/// channel.
pub fn spawn_subscription(
    source: Arc<dyn EventSource>,
    topic: String,
    buffer: usize,
    handle: StageHandle,
) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(buffer);
    tokio::spawn(source.run(topic, tx, handle));
    rx
}

enum SessionEnd {
    /// Stop was requested (or the downstream channel closed).
    Stop,
    /// The connection dropped; reconnect after the delay.
    Lost,
}

/// Redis pub/sub event source.
pub struct RedisEventSource {
    client: redis::Client,
    reconnect_delay: Duration,
}

impl RedisEventSource {
    pub fn new(url: &str, reconnect_delay: Duration) -> Result<Self, redis::RedisError> {
        Ok(Self {
            client: redis::Client::open(url)?,
            reconnect_delay,
        })
    }

    async fn subscribe_once(
        &self,
        topic: &str,
        out: &mpsc::Sender<String>,
        handle: &mut StageHandle,
    ) -> SessionEnd {
        let mut pubsub = match self.client.get_async_pubsub().await {
            Ok(pubsub) => pubsub,
            Err(e) => {
                log::warn!("redis connection failed: {e}");
                return SessionEnd::Lost;
            }
        };
        if let Err(e) = pubsub.subscribe(topic).await {
            log::warn!("redis subscribe to {topic} failed: {e}");
            return SessionEnd::Lost;
        }
        log::info!("subscribed to {topic}");

        let mut messages = pubsub.on_message();
        loop {
            tokio::select! {
                _ = handle.stopped() => return SessionEnd::Stop,
                msg = messages.next() => {
                    let Some(msg) = msg else {
                        log::warn!("redis subscription to {topic} ended");
                        return SessionEnd::Lost;
                    };
                    let payload: String = match msg.get_payload() {
                        Ok(payload) => payload,
                        Err(e) => {
                            log::warn!("unreadable pub/sub payload: {e}");
                            continue;
                        }
                    };
                    tokio::select! {
                        _ = handle.stopped() => return SessionEnd::Stop,
                        sent = out.send(payload) => {
                            if sent.is_err() {
                                return SessionEnd::Stop;
                            }
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl EventSource for RedisEventSource {
    async fn run(self: Arc<Self>, topic: String, out: mpsc::Sender<String>, mut handle: StageHandle) {
        loop {
            match self.subscribe_once(&topic, &out, &mut handle).await {
                SessionEnd::Stop => break,
                SessionEnd::Lost => {}
            }
            log::info!(
                "reconnecting to {} in {:?}",
                topic,
                self.reconnect_delay
            );
            tokio::select! {
                _ = handle.stopped() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
        log::debug!("subscription stage stopped");
        handle.acknowledge().await;
    }
}
