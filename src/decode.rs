//! Raw feed payload decoding.

use crate::shutdown::StageHandle;
use crate::types::PriceTick;
use tokio::sync::mpsc;

/// Parses one feed payload into a [`PriceTick`].
pub fn decode_tick(payload: &str) -> Result<PriceTick, serde_json::Error> {
    serde_json::from_str(payload)
}

/// Spawns the decoder stage: raw payloads in, ticks out.
///
/// Malformed payloads are dropped with a warning; the stream keeps flowing.
/// Drains its input to the end before acknowledging shutdown.
pub fn spawn_decoder(
    mut raw_rx: mpsc::Receiver<String>,
    buffer: usize,
    handle: StageHandle,
) -> mpsc::Receiver<PriceTick> {
    let (tx, rx) = mpsc::channel(buffer);

    tokio::spawn(async move {
        while let Some(payload) = raw_rx.recv().await {
            match decode_tick(&payload) {
                Ok(tick) => {
                    if tx.send(tick).await.is_err() {
                        break;
                    }
                }
                Err(e) => log::warn!("dropping malformed feed payload: {e}"),
            }
        }
        log::debug!("decoder stage stopped");
        handle.acknowledge().await;
    });

    rx
}
