//! Fixed-period time bucketing of the tick stream.
//!
//! `BucketAggregator` is the pure state machine; `spawn_bucket_stage` wraps
//! it in a channel-driven task. A bucket closes when a tick lands at or past
//! the next boundary; empty windows are never emitted and emitted summaries
//! are strictly ordered in time.

use crate::shutdown::StageHandle;
use crate::types::{BucketSummary, PriceTick};
use tokio::sync::mpsc;

/// Groups ticks into consecutive `period_ms` windows starting at
/// `bucket_start_ms`.
pub struct BucketAggregator {
    period_ms: i64,
    last_boundary_ms: i64,
    current: BucketSummary,
}

impl BucketAggregator {
    /// `period_ms` must be positive; callers take it from a validated
    /// config period.
    pub fn new(bucket_start_ms: i64, period_ms: i64) -> Self {
        Self {
            period_ms,
            last_boundary_ms: bucket_start_ms,
            current: BucketSummary::empty(),
        }
    }

    /// The open (not yet emitted) bucket.
    pub fn current(&self) -> &BucketSummary {
        &self.current
    }

    /// Folds one tick in; returns the closed summary when the tick starts a
    /// new bucket.
    ///
    /// Ticks with unparsable prices and ticks older than the current window
    /// are dropped with a warning and leave the state untouched.
    pub fn apply(&mut self, tick: &PriceTick) -> Option<BucketSummary> {
        let price: f64 = match tick.price.parse() {
            Ok(p) => p,
            Err(_) => {
                log::warn!("dropping tick with unparsable price {:?}", tick.price);
                return None;
            }
        };

        let mut delta = tick.trade_time_ms - self.last_boundary_ms;
        let mut closed = None;

        if delta >= self.period_ms {
            if !self.current.is_empty() {
                closed = Some(self.current);
            }
            self.current.reset();
            // Advance by whole periods so a multi-period gap is one step.
            self.last_boundary_ms += (delta / self.period_ms) * self.period_ms;
            delta = tick.trade_time_ms - self.last_boundary_ms;
        }

        if delta >= 0 {
            self.current.update(tick.trade_time_ms, price);
        } else {
            log::warn!(
                "dropping out-of-order tick at {} (current bucket starts at {})",
                tick.trade_time_ms,
                self.last_boundary_ms
            );
        }

        closed
    }
}

/// Epoch milliseconds of today's UTC midnight, the conventional starting
/// boundary for freshly started aggregators.
pub fn current_day_start_ms() -> i64 {
    chrono::Utc::now()
        .date_naive()
        .and_time(chrono::NaiveTime::MIN)
        .and_utc()
        .timestamp_millis()
}

/// Spawns the bucketing stage: ticks in, closed summaries out.
///
/// Drains its input to the end (the upstream stage owns stop detection), so
/// buffered ticks are never lost on shutdown. The final partial bucket is
/// dropped rather than emitted, keeping emission monotonic across restarts.
pub fn spawn_bucket_stage(
    mut ticks_rx: mpsc::Receiver<PriceTick>,
    bucket_start_ms: i64,
    period_ms: i64,
    buffer: usize,
    handle: StageHandle,
) -> mpsc::Receiver<BucketSummary> {
    let (tx, rx) = mpsc::channel(buffer);

    tokio::spawn(async move {
        let mut aggregator = BucketAggregator::new(bucket_start_ms, period_ms);
        while let Some(tick) = ticks_rx.recv().await {
            if let Some(summary) = aggregator.apply(&tick) {
                if tx.send(summary).await.is_err() {
                    break;
                }
            }
        }
        if !aggregator.current().is_empty() {
            log::info!("discarding partial bucket at stream end");
        }
        log::debug!("bucket stage stopped");
        handle.acknowledge().await;
    });

    rx
}
