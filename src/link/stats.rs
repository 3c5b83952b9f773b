//! Traffic statistics for the peripheral link
//!
//! Thread-safe counters shared by the controller (writes) and the receive
//! loop (reads). Uses lock-free atomics for all operations.

use crate::constants::RATE_UPDATE_MIN_INTERVAL_SECS;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Traffic statistics with rate calculation (fully lock-free)
pub struct Stats {
    /// Total bytes written to the peripheral
    tx_total: AtomicU64,
    /// Total bytes read from the peripheral
    rx_total: AtomicU64,
    /// Frames written
    tx_frames: AtomicU64,
    /// Addressed frames delivered
    rx_frames: AtomicU64,
    /// Unaddressed frames discarded
    dropped_frames: AtomicU64,
    /// Snapshot of tx_total at last rate calculation
    tx_snapshot: AtomicU64,
    /// Snapshot of rx_total at last rate calculation
    rx_snapshot: AtomicU64,
    /// Reference instant for time calculations
    start_time: Instant,
    /// Nanoseconds since start_time at last rate calculation
    last_calc_nanos: AtomicU64,
    /// Cached TX rate in bytes/sec (stored as f64 bits)
    tx_rate: AtomicU64,
    /// Cached RX rate in bytes/sec (stored as f64 bits)
    rx_rate: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatsSnapshot {
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub tx_frames: u64,
    pub rx_frames: u64,
    pub dropped_frames: u64,
    /// Bytes/sec
    pub tx_rate: f64,
    /// Bytes/sec
    pub rx_rate: f64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            tx_total: AtomicU64::new(0),
            rx_total: AtomicU64::new(0),
            tx_frames: AtomicU64::new(0),
            rx_frames: AtomicU64::new(0),
            dropped_frames: AtomicU64::new(0),
            tx_snapshot: AtomicU64::new(0),
            rx_snapshot: AtomicU64::new(0),
            start_time: Instant::now(),
            last_calc_nanos: AtomicU64::new(0),
            tx_rate: AtomicU64::new(0),
            rx_rate: AtomicU64::new(0),
        }
    }

    /// Record one frame written (client -> peripheral)
    #[inline]
    pub fn add_tx(&self, bytes: usize) {
        self.tx_total.fetch_add(bytes as u64, Ordering::Relaxed);
        self.tx_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one addressed frame received (peripheral -> client)
    ///
    /// `bytes` includes the terminator.
    #[inline]
    pub fn add_rx(&self, bytes: usize) {
        self.rx_total.fetch_add(bytes as u64, Ordering::Relaxed);
        self.rx_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one discarded frame
    #[inline]
    pub fn add_dropped(&self, bytes: usize) {
        self.rx_total.fetch_add(bytes as u64, Ordering::Relaxed);
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn tx_bytes(&self) -> u64 {
        self.tx_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rx_bytes(&self) -> u64 {
        self.rx_total.load(Ordering::Relaxed)
    }

    /// Update rate calculations and return (tx_bytes_s, rx_bytes_s)
    pub fn update_rates(&self) -> (f64, f64) {
        let now_nanos = self.start_time.elapsed().as_nanos() as u64;
        let last_nanos = self.last_calc_nanos.load(Ordering::Relaxed);
        let elapsed = now_nanos.saturating_sub(last_nanos) as f64 / 1_000_000_000.0;

        if elapsed < RATE_UPDATE_MIN_INTERVAL_SECS {
            return self.cached_rates();
        }

        // Try to claim the update (avoid duplicate calculations)
        if self
            .last_calc_nanos
            .compare_exchange(last_nanos, now_nanos, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            return self.cached_rates();
        }

        let tx_now = self.tx_total.load(Ordering::Relaxed);
        let rx_now = self.rx_total.load(Ordering::Relaxed);
        let tx_prev = self.tx_snapshot.swap(tx_now, Ordering::Relaxed);
        let rx_prev = self.rx_snapshot.swap(rx_now, Ordering::Relaxed);

        let tx_rate = tx_now.saturating_sub(tx_prev) as f64 / elapsed;
        let rx_rate = rx_now.saturating_sub(rx_prev) as f64 / elapsed;

        self.tx_rate.store(tx_rate.to_bits(), Ordering::Relaxed);
        self.rx_rate.store(rx_rate.to_bits(), Ordering::Relaxed);

        (tx_rate, rx_rate)
    }

    fn cached_rates(&self) -> (f64, f64) {
        let tx = f64::from_bits(self.tx_rate.load(Ordering::Relaxed));
        let rx = f64::from_bits(self.rx_rate.load(Ordering::Relaxed));
        (tx, rx)
    }

    /// Copy all counters, refreshing rates
    pub fn snapshot(&self) -> StatsSnapshot {
        let (tx_rate, rx_rate) = self.update_rates();
        StatsSnapshot {
            tx_bytes: self.tx_bytes(),
            rx_bytes: self.rx_bytes(),
            tx_frames: self.tx_frames.load(Ordering::Relaxed),
            rx_frames: self.rx_frames.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            tx_rate,
            rx_rate,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = Stats::new();
        stats.add_tx(2);
        stats.add_tx(6);
        stats.add_rx(7);
        stats.add_dropped(20);

        let snap = stats.snapshot();
        assert_eq!(snap.tx_bytes, 8);
        assert_eq!(snap.tx_frames, 2);
        assert_eq!(snap.rx_bytes, 27);
        assert_eq!(snap.rx_frames, 1);
        assert_eq!(snap.dropped_frames, 1);
    }

    #[test]
    fn test_rates_cached_within_interval() {
        let stats = Stats::new();
        let first = stats.update_rates();
        stats.add_tx(1000);
        // Called immediately again: cached values are returned
        let second = stats.update_rates();
        assert_eq!(first, second);
    }
}
