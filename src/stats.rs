//! Multi-period aggregation: one subscribe→decode→bucket sub-pipeline per
//! bucket length, merged into a single stream.
//!
//! Every task in every sub-pipeline registers with the shutdown coordinator
//! individually. The merged stream closes exactly once: each forwarder
//! drains its sub-pipeline to the end before dropping its sender, so
//! buffered summaries are never lost on shutdown.

use crate::bucket::spawn_bucket_stage;
use crate::decode::spawn_decoder;
use crate::feed::{spawn_subscription, EventSource};
use crate::shutdown::{ShutdownCoordinator, StageHandle};
use crate::types::BucketSummary;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One closed bucket tagged with the sub-pipeline that produced it.
#[derive(Debug, Clone)]
pub struct PeriodicStats {
    pub topic: String,
    pub period_ms: i64,
    pub value: BucketSummary,
}

struct Member {
    topic: String,
    period_ms: i64,
    summaries_rx: mpsc::Receiver<BucketSummary>,
}

/// Builder/owner of the per-period sub-pipelines.
#[derive(Default)]
pub struct PeriodicStatsSet {
    members: Vec<Member>,
}

impl PeriodicStatsSet {
    pub fn new() -> Self {
        Self { members: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Adds one subscribe→decode→bucket sub-pipeline for `period_ms`.
    pub fn add(
        &mut self,
        source: Arc<dyn EventSource>,
        topic: &str,
        period_ms: i64,
        bucket_start_ms: i64,
        buffer: usize,
        coordinator: &ShutdownCoordinator,
    ) {
        let raw_rx = spawn_subscription(
            Arc::clone(&source),
            topic.to_string(),
            buffer,
            coordinator.register(),
        );
        let ticks_rx = spawn_decoder(raw_rx, buffer, coordinator.register());
        let summaries_rx = spawn_bucket_stage(
            ticks_rx,
            bucket_start_ms,
            period_ms,
            buffer,
            coordinator.register(),
        );
        self.members.push(Member {
            topic: topic.to_string(),
            period_ms,
            summaries_rx,
        });
    }

    /// Merges all sub-pipelines into one stream of tagged summaries.
    ///
    /// Spawns one forwarder per member; the merged receiver yields `None`
    /// once every forwarder has drained its sub-pipeline.
    pub fn fan_in(
        self,
        buffer: usize,
        coordinator: &ShutdownCoordinator,
    ) -> mpsc::Receiver<PeriodicStats> {
        let (tx, rx) = mpsc::channel(buffer);
        for member in self.members {
            tokio::spawn(forward_member(member, tx.clone(), coordinator.register()));
        }
        rx
    }
}

async fn forward_member(
    mut member: Member,
    tx: mpsc::Sender<PeriodicStats>,
    handle: StageHandle,
) {
    while let Some(value) = member.summaries_rx.recv().await {
        let stats = PeriodicStats {
            topic: member.topic.clone(),
            period_ms: member.period_ms,
            value,
        };
        if tx.send(stats).await.is_err() {
            break;
        }
    }
    log::debug!(
        "stats forwarder for {}@{}ms stopped",
        member.topic,
        member.period_ms
    );
    handle.acknowledge().await;
}
