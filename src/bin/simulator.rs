//! Simulator: offline paper-wallet replay of persisted signals.
//!
//! Reads the trade signals a previous aggregator run left in SQLite and
//! replays them against a paper wallet (all-in on BUY, all-out on SELL),
//! reporting the resulting profit and loss.
//!
//! Usage:
//!   cargo run --release --bin simulator
//!
//! Environment variables: `TICKFLOW_DB_PATH` selects the database.

use dotenv::dotenv;
use log::info;
use tickflow::config::Config;
use tickflow::sink::{SqliteTradeSink, TradeSink};
use tickflow::types::Signal;

const STARTING_QUOTE: f64 = 1_000.0;
const MAX_SIGNALS: usize = 10_000;

/// Paper wallet holding a base asset and a quote currency.
#[derive(Debug, Clone, Copy)]
struct Wallet {
    base: f64,
    quote: f64,
}

impl Wallet {
    fn new(quote: f64) -> Self {
        Self { base: 0.0, quote }
    }

    /// Converts the whole quote balance into base at `price`.
    fn buy_all(&mut self, price: f64) {
        if price > 0.0 && self.quote > 0.0 {
            self.base += self.quote / price;
            self.quote = 0.0;
        }
    }

    /// Converts the whole base balance into quote at `price`.
    fn sell_all(&mut self, price: f64) {
        if self.base > 0.0 {
            self.quote += self.base * price;
            self.base = 0.0;
        }
    }

    /// Wallet value in quote terms at `price`.
    fn value_at(&self, price: f64) -> f64 {
        self.quote + self.base * price
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    info!("🚀 tickflow simulator");
    info!("   └─ Database: {}", config.db_path);

    let sink = SqliteTradeSink::open(&config.db_path)?;
    let signals = sink.signals(MAX_SIGNALS).await?;
    if signals.is_empty() {
        info!("no persisted signals to replay");
        return Ok(());
    }
    info!("replaying {} signals", signals.len());

    let mut wallet = Wallet::new(STARTING_QUOTE);
    let mut last_price = 0.0;
    for signal in &signals {
        match signal.signal {
            Signal::Buy => wallet.buy_all(signal.price),
            Signal::Sell => wallet.sell_all(signal.price),
        }
        last_price = signal.price;
        info!(
            "{} at {:.2} -> base={:.6} quote={:.2}",
            signal.signal.as_str(),
            signal.price,
            wallet.base,
            wallet.quote
        );
    }

    let final_value = wallet.value_at(last_price);
    info!(
        "final value {:.2} (started with {:.2}, P&L {:+.2}%)",
        final_value,
        STARTING_QUOTE,
        (final_value - STARTING_QUOTE) / STARTING_QUOTE * 100.0
    );
    Ok(())
}
