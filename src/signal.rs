//! Moving-average crossover detection.

use crate::types::Signal;

/// Evaluates one short/long SMA pair against the previous difference.
///
/// Returns the signal (if the difference crossed zero) and the new difference
/// for the caller to carry into the next evaluation. BUY fires when the short
/// average crosses above the long one, SELL when it crosses below; a
/// difference sitting exactly at zero arms both directions.
pub fn detect(sma_short: f64, sma_long: f64, prev_diff: f64) -> (Option<Signal>, f64) {
    let diff = sma_short - sma_long;
    let signal = if diff > 0.0 && prev_diff <= 0.0 {
        Some(Signal::Buy)
    } else if diff < 0.0 && prev_diff >= 0.0 {
        Some(Signal::Sell)
    } else {
        None
    };
    (signal, diff)
}
