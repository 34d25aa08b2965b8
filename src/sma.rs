//! Fixed-capacity ring buffer of bucket closes with simple-moving-average
//! computation and linear-interpolation gap fill.

use std::fmt;

/// Returned by [`SmaBuffer::sma`] when fewer closes have been accepted than
/// the requested window. Expected during warm-up; callers check
/// [`SmaBuffer::is_ready`] first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsufficientData;

impl fmt::Display for InsufficientData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "insufficient data for SMA calculation")
    }
}

impl std::error::Error for InsufficientData {}

/// Ring of the most recent `(price, time_ms)` bucket closes.
///
/// A write cursor walks the backing storage; a saturating count tracks how
/// many slots hold real data, so averages over windows larger than the
/// accepted history are rejected rather than diluted with stale slots.
pub struct SmaBuffer {
    prices: Vec<f64>,
    times: Vec<i64>,
    pos: usize,
    count: usize,
}

impl SmaBuffer {
    /// `capacity` must be at least 1; callers take it from a validated
    /// config window.
    pub fn new(capacity: usize) -> Self {
        Self {
            prices: vec![0.0; capacity],
            times: vec![0; capacity],
            pos: 0,
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.prices.len()
    }

    /// Number of slots holding accepted closes (saturates at capacity).
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// True once at least `window` closes have been accepted.
    pub fn is_ready(&self, window: usize) -> bool {
        window <= self.count
    }

    fn wrap(&self, index: isize) -> usize {
        index.rem_euclid(self.prices.len() as isize) as usize
    }

    /// Appends one close, overwriting the oldest slot once full.
    pub fn add(&mut self, price: f64, time_ms: i64) {
        self.pos = if self.count == 0 {
            // First write lands on the initial cursor slot.
            self.pos
        } else {
            self.wrap(self.pos as isize + 1)
        };
        self.prices[self.pos] = price;
        self.times[self.pos] = time_ms;
        if self.count < self.prices.len() {
            self.count += 1;
        }
    }

    /// Appends one close, first synthesizing linearly interpolated closes for
    /// any whole periods skipped since the previous entry.
    ///
    /// The elapsed-period count is rounded, so ticks that arrive slightly off
    /// the period grid do not trigger spurious fills.
    pub fn add_with_gap_fill(&mut self, price: f64, time_ms: i64, period_ms: i64) {
        if self.count == 0 || period_ms <= 0 {
            self.add(price, time_ms);
            return;
        }

        let last_price = self.prices[self.pos];
        let last_time = self.times[self.pos];
        let delta_ms = time_ms - last_time;
        let elapsed = (delta_ms as f64 / period_ms as f64).round() as i64;

        if elapsed > 1 {
            let delta_price = price - last_price;
            log::info!(
                "gap of {} periods in close series, interpolating {} points",
                elapsed,
                elapsed - 1
            );
            for i in 1..elapsed {
                let fill_price = last_price + i as f64 * delta_price / elapsed as f64;
                let fill_time = last_time + i * delta_ms / elapsed;
                self.add(fill_price, fill_time);
            }
        }

        self.add(price, time_ms);
    }

    /// Simple moving average over the `window` most recent closes.
    pub fn sma(&self, window: usize) -> Result<f64, InsufficientData> {
        if window == 0 || !self.is_ready(window) {
            return Err(InsufficientData);
        }
        let mut sum = 0.0;
        for i in 0..window {
            sum += self.prices[self.wrap(self.pos as isize - i as isize)];
        }
        Ok(sum / window as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_over_exact_window() {
        let mut buf = SmaBuffer::new(10);
        buf.add(10.0, 0);
        buf.add(20.0, 1_000);
        buf.add(30.0, 2_000);

        assert_eq!(buf.sma(3).unwrap(), 20.0);
        assert_eq!(buf.sma(1).unwrap(), 30.0);
    }

    #[test]
    fn test_sma_rejects_window_beyond_history() {
        let mut buf = SmaBuffer::new(10);
        buf.add(10.0, 0);
        buf.add(20.0, 1_000);
        buf.add(30.0, 2_000);

        assert!(!buf.is_ready(4));
        assert_eq!(buf.sma(4), Err(InsufficientData));
        assert_eq!(buf.sma(0), Err(InsufficientData));
    }

    #[test]
    fn test_gap_fill_interpolates_skipped_periods() {
        // 10 at t=0, then 40 three periods later: fills 20 and 30 between.
        let period = 1_000;
        let mut buf = SmaBuffer::new(10);
        buf.add_with_gap_fill(10.0, 0, period);
        buf.add_with_gap_fill(40.0, 3 * period, period);

        assert_eq!(buf.len(), 4);
        assert_eq!(buf.sma(4).unwrap(), 25.0);
        assert_eq!(buf.sma(1).unwrap(), 40.0);
        // The two synthesized points sit on the period grid.
        assert_eq!(buf.prices, vec![10.0, 20.0, 30.0, 40.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(buf.times[1], period);
        assert_eq!(buf.times[2], 2 * period);
    }

    #[test]
    fn test_gap_fill_tolerates_jitter() {
        // 1.2 periods elapsed rounds to 1: no fill.
        let mut buf = SmaBuffer::new(10);
        buf.add_with_gap_fill(10.0, 0, 1_000);
        buf.add_with_gap_fill(20.0, 1_200, 1_000);

        assert_eq!(buf.len(), 2);
        assert_eq!(buf.sma(2).unwrap(), 15.0);
    }

    #[test]
    fn test_ring_wraps_and_overwrites_oldest() {
        let mut buf = SmaBuffer::new(3);
        for (i, price) in [1.0, 2.0, 3.0, 4.0, 5.0].iter().enumerate() {
            buf.add(*price, i as i64 * 1_000);
        }

        assert_eq!(buf.len(), 3);
        // Window covers the three most recent closes: 3, 4, 5.
        assert_eq!(buf.sma(3).unwrap(), 4.0);
        assert_eq!(buf.sma(2).unwrap(), 4.5);
    }

    #[test]
    fn test_first_add_via_gap_fill_never_interpolates() {
        let mut buf = SmaBuffer::new(5);
        buf.add_with_gap_fill(100.0, 50_000, 1_000);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.sma(1).unwrap(), 100.0);
    }
}
