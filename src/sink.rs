//! Persistence seam for the pipeline and its SQLite implementation.

use crate::types::{BucketSummary, Signal, SmaSnapshot, TradeSignal};
use async_trait::async_trait;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

/// Error type at the sink seam. Writes are at-most-once: callers log a
/// failure and move on rather than retrying.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Idempotent schema, applied on every open.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS bucket_summaries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    period_ms INTEGER NOT NULL,
    first_time_ms INTEGER NOT NULL,
    last_time_ms INTEGER NOT NULL,
    first_price REAL NOT NULL,
    last_price REAL NOT NULL,
    min_price REAL NOT NULL,
    max_price REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_bucket_summaries_period_time
    ON bucket_summaries (period_ms, last_time_ms);

CREATE TABLE IF NOT EXISTS sma_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    time_ms INTEGER NOT NULL,
    sma_short REAL NOT NULL,
    sma_long REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS trade_signals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    time_ms INTEGER NOT NULL,
    signal TEXT NOT NULL,
    price REAL NOT NULL,
    sma_short REAL NOT NULL,
    sma_long REAL NOT NULL
);
"#;

/// Trait for persisting closed buckets, SMA pairs, and trade signals.
#[async_trait]
pub trait TradeSink: Send + Sync {
    /// Append one closed bucket for the given period.
    async fn write_bucket(&self, period_ms: i64, summary: &BucketSummary) -> Result<(), SinkError>;

    /// Append one short/long SMA pair.
    async fn write_sma(&self, snapshot: &SmaSnapshot) -> Result<(), SinkError>;

    /// Append one crossover signal.
    async fn write_signal(&self, signal: &TradeSignal) -> Result<(), SinkError>;

    /// The most recent `limit` bucket closes for the period, oldest first,
    /// as `(last_price, last_time_ms)`. Used to warm-start the SMA buffer.
    async fn recent_closes(&self, period_ms: i64, limit: usize)
        -> Result<Vec<(f64, i64)>, SinkError>;

    /// The most recent `limit` signals, oldest first.
    async fn signals(&self, limit: usize) -> Result<Vec<TradeSignal>, SinkError>;
}

/// SQLite-backed [`TradeSink`].
pub struct SqliteTradeSink {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTradeSink {
    /// Opens (creating if needed) the database, enables WAL, applies the
    /// schema.
    pub fn open(db_path: &str) -> Result<Self, SinkError> {
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        log::info!("opened SQLite sink at {db_path}");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl TradeSink for SqliteTradeSink {
    async fn write_bucket(&self, period_ms: i64, summary: &BucketSummary) -> Result<(), SinkError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO bucket_summaries (
                period_ms, first_time_ms, last_time_ms,
                first_price, last_price, min_price, max_price
            ) VALUES (?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                period_ms,
                summary.first_time_ms,
                summary.last_time_ms,
                summary.first,
                summary.last,
                summary.min,
                summary.max,
            ],
        )?;
        Ok(())
    }

    async fn write_sma(&self, snapshot: &SmaSnapshot) -> Result<(), SinkError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sma_snapshots (time_ms, sma_short, sma_long) VALUES (?, ?, ?)",
            rusqlite::params![snapshot.time_ms, snapshot.sma_short, snapshot.sma_long],
        )?;
        Ok(())
    }

    async fn write_signal(&self, signal: &TradeSignal) -> Result<(), SinkError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO trade_signals (time_ms, signal, price, sma_short, sma_long)
             VALUES (?, ?, ?, ?, ?)",
            rusqlite::params![
                signal.time_ms,
                signal.signal.as_str(),
                signal.price,
                signal.sma_short,
                signal.sma_long,
            ],
        )?;
        Ok(())
    }

    async fn recent_closes(
        &self,
        period_ms: i64,
        limit: usize,
    ) -> Result<Vec<(f64, i64)>, SinkError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT last_price, last_time_ms FROM bucket_summaries
             WHERE period_ms = ?
             ORDER BY last_time_ms DESC, id DESC
             LIMIT ?",
        )?;
        let mut closes = stmt
            .query_map(rusqlite::params![period_ms, limit as i64], |row| {
                Ok((row.get::<_, f64>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        closes.reverse();
        Ok(closes)
    }

    async fn signals(&self, limit: usize) -> Result<Vec<TradeSignal>, SinkError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT time_ms, signal, price, sma_short, sma_long FROM trade_signals
             ORDER BY time_ms DESC, id DESC
             LIMIT ?",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut signals: Vec<TradeSignal> = rows
            .into_iter()
            .filter_map(|(time_ms, signal, price, sma_short, sma_long)| {
                let Some(signal) = Signal::from_str(&signal) else {
                    log::warn!("skipping row with unknown signal {signal:?}");
                    return None;
                };
                Some(TradeSignal {
                    time_ms,
                    signal,
                    price,
                    sma_short,
                    sma_long,
                })
            })
            .collect();
        signals.reverse();
        Ok(signals)
    }
}
