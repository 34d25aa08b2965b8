//! Signal engine: the single consumer of closed buckets.
//!
//! Persists each close, feeds it into the SMA ring (gap-filled), and once
//! the long window is warm evaluates the crossover, persisting the SMA pair
//! and any signal. The first evaluation after warm-up only establishes the
//! short/long difference; a signal needs an actual cross between two
//! consecutive evaluations.

use crate::shutdown::StageHandle;
use crate::signal;
use crate::sink::TradeSink;
use crate::sma::SmaBuffer;
use crate::types::{BucketSummary, SmaSnapshot, TradeSignal};
use std::sync::Arc;
use tokio::sync::mpsc;

const PROGRESS_LOG_EVERY: u64 = 100;

pub struct SignalEngine {
    sink: Arc<dyn TradeSink>,
    sma: SmaBuffer,
    period_ms: i64,
    short_window: usize,
    long_window: usize,
    prev_diff: Option<f64>,
    closes_seen: u64,
}

impl SignalEngine {
    pub fn new(
        sink: Arc<dyn TradeSink>,
        period_ms: i64,
        short_window: usize,
        long_window: usize,
    ) -> Self {
        Self {
            sink,
            sma: SmaBuffer::new(long_window),
            period_ms,
            short_window,
            long_window,
            prev_diff: None,
            closes_seen: 0,
        }
    }

    /// Preloads the SMA ring from the most recent persisted closes so a
    /// restart does not start cold.
    pub async fn warm_start(&mut self) {
        match self.sink.recent_closes(self.period_ms, self.long_window).await {
            Ok(closes) => {
                let n = closes.len();
                for (price, time_ms) in closes {
                    self.sma.add_with_gap_fill(price, time_ms, self.period_ms);
                }
                if n > 0 {
                    log::info!("warm-started SMA buffer with {n} persisted closes");
                }
            }
            Err(e) => log::warn!("warm start skipped, cannot read persisted closes: {e}"),
        }
    }

    async fn handle_summary(&mut self, summary: BucketSummary) {
        if let Err(e) = self.sink.write_bucket(self.period_ms, &summary).await {
            log::error!("failed to persist bucket summary: {e}");
        }

        self.sma
            .add_with_gap_fill(summary.last, summary.last_time_ms, self.period_ms);

        self.closes_seen += 1;
        if self.closes_seen % PROGRESS_LOG_EVERY == 0 {
            log::info!(
                "processed {} closes, latest {} at {}",
                self.closes_seen,
                summary.last,
                summary.last_time_ms
            );
        }

        if !self.sma.is_ready(self.long_window) {
            log::debug!(
                "SMA warming up: {}/{} closes",
                self.sma.len(),
                self.long_window
            );
            return;
        }

        let (Ok(sma_short), Ok(sma_long)) = (
            self.sma.sma(self.short_window),
            self.sma.sma(self.long_window),
        ) else {
            return;
        };

        if let Err(e) = self
            .sink
            .write_sma(&SmaSnapshot {
                time_ms: summary.last_time_ms,
                sma_short,
                sma_long,
            })
            .await
        {
            log::error!("failed to persist SMA snapshot: {e}");
        }

        let prev_diff = match self.prev_diff {
            Some(prev) => prev,
            None => {
                // First evaluation establishes the baseline difference.
                self.prev_diff = Some(sma_short - sma_long);
                return;
            }
        };

        let (detected, diff) = signal::detect(sma_short, sma_long, prev_diff);
        self.prev_diff = Some(diff);

        if let Some(kind) = detected {
            let trade_signal = TradeSignal {
                time_ms: chrono::Utc::now().timestamp_millis(),
                signal: kind,
                price: summary.last,
                sma_short,
                sma_long,
            };
            log::info!(
                "{} signal at price {} (sma {}={:.4}, {}={:.4})",
                kind.as_str(),
                summary.last,
                self.short_window,
                sma_short,
                self.long_window,
                sma_long
            );
            if let Err(e) = self.sink.write_signal(&trade_signal).await {
                log::error!("failed to persist {} signal: {e}", kind.as_str());
            }
        }
    }

    /// Consumes closed buckets until the channel closes, then acknowledges.
    pub async fn run(mut self, mut summaries_rx: mpsc::Receiver<BucketSummary>, handle: StageHandle) {
        while let Some(summary) = summaries_rx.recv().await {
            self.handle_summary(summary).await;
        }
        log::debug!("signal engine stopped after {} closes", self.closes_seen);
        handle.acknowledge().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SqliteTradeSink;
    use crate::types::Signal;

    fn close(price: f64, time_ms: i64) -> BucketSummary {
        let mut s = BucketSummary::empty();
        s.update(time_ms, price);
        s
    }

    fn temp_sink() -> (tempfile::TempDir, Arc<SqliteTradeSink>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.db");
        let sink = Arc::new(SqliteTradeSink::open(path.to_str().unwrap()).unwrap());
        (dir, sink)
    }

    #[tokio::test]
    async fn test_crossovers_persisted_after_warmup() {
        let (_dir, sink) = temp_sink();
        let period = 1_000;
        let mut engine = SignalEngine::new(sink.clone(), period, 2, 3);

        // Closes: 10, 20, 5, 30, 40. The long window is warm at the third
        // close (baseline only); the fourth crosses down, the fifth up.
        for (i, price) in [10.0, 20.0, 5.0, 30.0, 40.0].iter().enumerate() {
            engine.handle_summary(close(*price, 100 + i as i64 * period)).await;
        }

        let signals = sink.signals(10).await.unwrap();
        let kinds: Vec<Signal> = signals.iter().map(|s| s.signal).collect();
        assert_eq!(kinds, vec![Signal::Sell, Signal::Buy]);

        // Every close was persisted, and one SMA pair per warm evaluation.
        let closes = sink.recent_closes(period, 10).await.unwrap();
        assert_eq!(closes.len(), 5);
    }

    #[tokio::test]
    async fn test_no_signal_during_warmup() {
        let (_dir, sink) = temp_sink();
        let mut engine = SignalEngine::new(sink.clone(), 1_000, 2, 3);

        engine.handle_summary(close(10.0, 100)).await;
        engine.handle_summary(close(1.0, 1_100)).await;

        assert!(sink.signals(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_warm_start_resumes_from_persisted_closes() {
        let (_dir, sink) = temp_sink();
        let period = 1_000;

        // Persist three closes as a previous run would have.
        for (i, price) in [10.0, 20.0, 30.0].iter().enumerate() {
            let mut s = BucketSummary::empty();
            s.update(100 + i as i64 * period, *price);
            sink.write_bucket(period, &s).await.unwrap();
        }

        let mut engine = SignalEngine::new(sink.clone(), period, 2, 3);
        engine.warm_start().await;
        assert!(engine.sma.is_ready(3));
        assert_eq!(engine.sma.sma(3).unwrap(), 20.0);
    }

    #[tokio::test]
    async fn test_run_acknowledges_on_close() {
        use crate::shutdown::ShutdownCoordinator;
        let (_dir, sink) = temp_sink();
        let coordinator = ShutdownCoordinator::new();
        let handle = coordinator.register();

        let (tx, rx) = mpsc::channel(4);
        let engine = SignalEngine::new(sink, 1_000, 2, 3);
        tokio::spawn(engine.run(rx, handle));

        tx.send(close(10.0, 100)).await.unwrap();
        drop(tx);

        coordinator.trigger();
        coordinator.wait_done().await;
    }
}
