//! End-to-end pipeline tests: scripted feed → decode → buckets → signal
//! engine → SQLite, plus shutdown completeness across the whole pipeline.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tickflow::bucket::spawn_bucket_stage;
use tickflow::decode::spawn_decoder;
use tickflow::engine::SignalEngine;
use tickflow::feed::{spawn_subscription, EventSource};
use tickflow::shutdown::{ShutdownCoordinator, StageHandle};
use tickflow::sink::{SqliteTradeSink, TradeSink};
use tickflow::stats::PeriodicStatsSet;
use tickflow::types::Signal;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Feed stand-in: emits a scripted list of payloads on every subscription,
/// then waits for the stop signal like a real source.
struct ScriptedSource {
    payloads: Vec<String>,
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn run(
        self: Arc<Self>,
        _topic: String,
        out: mpsc::Sender<String>,
        mut handle: StageHandle,
    ) {
        for payload in &self.payloads {
            if out.send(payload.clone()).await.is_err() {
                break;
            }
        }
        handle.stopped().await;
        handle.acknowledge().await;
    }
}

fn payload(time_ms: i64, price: f64) -> String {
    format!(r#"{{"tradeTimeMillis":{time_ms},"price":"{price}"}}"#)
}

fn temp_sink() -> (tempfile::TempDir, Arc<SqliteTradeSink>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipeline.db");
    let sink = Arc::new(SqliteTradeSink::open(path.to_str().unwrap()).unwrap());
    (dir, sink)
}

#[tokio::test]
async fn test_full_pipeline_emits_crossover_signals() {
    let (_dir, sink) = temp_sink();
    let coordinator = Arc::new(ShutdownCoordinator::new());
    let period = 1_000;

    // One tick per window; each tick closes the previous bucket, the last
    // bucket (price 50) stays pending and is discarded at shutdown.
    // Closes seen by the engine: 10, 20, 5, 30, 40.
    // With windows short=2, long=3 the third close is the baseline, the
    // fourth crosses the short average below the long one, the fifth back
    // above it.
    let prices = [10.0, 20.0, 5.0, 30.0, 40.0, 50.0];
    let source: Arc<dyn EventSource> = Arc::new(ScriptedSource {
        payloads: prices
            .iter()
            .enumerate()
            .map(|(k, p)| payload(100 + k as i64 * period, *p))
            .collect(),
    });

    let raw_rx = spawn_subscription(source, "trades".to_string(), 32, coordinator.register());
    let ticks_rx = spawn_decoder(raw_rx, 32, coordinator.register());
    let summaries_rx = spawn_bucket_stage(ticks_rx, 0, period, 32, coordinator.register());

    let engine = SignalEngine::new(sink.clone() as Arc<dyn TradeSink>, period, 2, 3);
    tokio::spawn(engine.run(summaries_rx, coordinator.register()));

    // The scripted source idles after its last payload, so shutdown drains
    // everything that is in flight.
    coordinator.trigger();
    timeout(Duration::from_secs(2), coordinator.wait_done())
        .await
        .expect("pipeline never finished shutting down");

    let closes = sink.recent_closes(period, 100).await.unwrap();
    assert_eq!(
        closes.iter().map(|(p, _)| *p).collect::<Vec<_>>(),
        vec![10.0, 20.0, 5.0, 30.0, 40.0]
    );

    let signals = sink.signals(100).await.unwrap();
    let kinds: Vec<Signal> = signals.iter().map(|s| s.signal).collect();
    assert_eq!(kinds, vec![Signal::Sell, Signal::Buy]);
    // Signals carry the close price that triggered them.
    assert_eq!(signals[0].price, 30.0);
    assert_eq!(signals[1].price, 40.0);
}

#[tokio::test]
async fn test_malformed_payloads_do_not_stall_pipeline() {
    let (_dir, sink) = temp_sink();
    let coordinator = Arc::new(ShutdownCoordinator::new());
    let period = 1_000;

    let source: Arc<dyn EventSource> = Arc::new(ScriptedSource {
        payloads: vec![
            payload(100, 10.0),
            "not json".to_string(),
            r#"{"tradeTimeMillis":500,"price":"oops"}"#.to_string(),
            payload(1_100, 20.0),
            payload(2_100, 30.0),
        ],
    });

    let raw_rx = spawn_subscription(source, "trades".to_string(), 16, coordinator.register());
    let ticks_rx = spawn_decoder(raw_rx, 16, coordinator.register());
    let summaries_rx = spawn_bucket_stage(ticks_rx, 0, period, 16, coordinator.register());

    let engine = SignalEngine::new(sink.clone() as Arc<dyn TradeSink>, period, 2, 3);
    tokio::spawn(engine.run(summaries_rx, coordinator.register()));

    coordinator.trigger();
    timeout(Duration::from_secs(2), coordinator.wait_done())
        .await
        .expect("pipeline never finished shutting down");

    // The two well-formed windows closed; the junk in between was dropped.
    let closes = sink.recent_closes(period, 100).await.unwrap();
    assert_eq!(
        closes.iter().map(|(p, _)| *p).collect::<Vec<_>>(),
        vec![10.0, 20.0]
    );
}

#[tokio::test]
async fn test_shutdown_waits_for_every_stage() {
    let (_dir, sink) = temp_sink();
    let coordinator = Arc::new(ShutdownCoordinator::new());

    let source: Arc<dyn EventSource> = Arc::new(ScriptedSource {
        payloads: vec![payload(100, 10.0)],
    });
    let raw_rx = spawn_subscription(source, "trades".to_string(), 8, coordinator.register());
    let ticks_rx = spawn_decoder(raw_rx, 8, coordinator.register());
    let summaries_rx = spawn_bucket_stage(ticks_rx, 0, 1_000, 8, coordinator.register());
    let engine = SignalEngine::new(sink as Arc<dyn TradeSink>, 1_000, 2, 3);
    tokio::spawn(engine.run(summaries_rx, coordinator.register()));

    // Without a trigger nothing completes.
    assert!(timeout(Duration::from_millis(100), coordinator.wait_done())
        .await
        .is_err());

    coordinator.trigger();
    timeout(Duration::from_secs(2), coordinator.wait_done())
        .await
        .expect("a stage failed to acknowledge shutdown");
}

#[tokio::test]
async fn test_multi_period_fan_in_persists_tagged_buckets() {
    let (_dir, sink) = temp_sink();
    let coordinator = Arc::new(ShutdownCoordinator::new());

    // Ticks spanning 10+ seconds so both periods close at least one bucket.
    let source: Arc<dyn EventSource> = Arc::new(ScriptedSource {
        payloads: vec![
            payload(100, 10.0),
            payload(2_500, 12.0),
            payload(11_000, 14.0),
        ],
    });

    let mut set = PeriodicStatsSet::new();
    for period_ms in [1_000, 5_000] {
        set.add(Arc::clone(&source), "trades", period_ms, 0, 16, &coordinator);
    }
    let mut merged = set.fan_in(16, &coordinator);

    let writer_sink = sink.clone();
    let writer_handle = coordinator.register();
    let writer = tokio::spawn(async move {
        while let Some(stats) = merged.recv().await {
            writer_sink
                .write_bucket(stats.period_ms, &stats.value)
                .await
                .unwrap();
        }
        writer_handle.acknowledge().await;
    });

    coordinator.trigger();
    timeout(Duration::from_secs(2), coordinator.wait_done())
        .await
        .expect("fan-in never finished shutting down");
    writer.await.unwrap();

    // 1000ms: bucket [0,1000) closed with last=10, bucket [2000,3000)
    // closed with last=12. 5000ms: bucket [0,5000) closed with last=12.
    let fast = sink.recent_closes(1_000, 100).await.unwrap();
    assert_eq!(fast.iter().map(|(p, _)| *p).collect::<Vec<_>>(), vec![10.0, 12.0]);
    let slow = sink.recent_closes(5_000, 100).await.unwrap();
    assert_eq!(slow.iter().map(|(p, _)| *p).collect::<Vec<_>>(), vec![12.0]);
}
