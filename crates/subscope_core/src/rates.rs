//! Throughput tracking.
//!
//! [`TrafficCounters`] holds the unbounded send/receive totals incremented
//! from many concurrent producers (publish timers, the ingestion pipeline).
//! [`RateTracker::record_tick`] is driven once per second and folds the
//! per-second deltas into a two-sample window per direction; the displayed
//! rate is the mean of that window. Two samples smooth exactly the last two
//! seconds so the display stays responsive to bursts.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

const WINDOW_SAMPLES: usize = 2;

/// Unbounded message totals, incremented by the publish and ingestion paths.
#[derive(Debug, Default)]
pub struct TrafficCounters {
    sent: AtomicU64,
    received: AtomicU64,
}

impl TrafficCounters {
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

#[derive(Debug, Default)]
struct RateWindow {
    last_total: u64,
    samples: VecDeque<u64>,
}

impl RateWindow {
    fn push(&mut self, total: u64) {
        let delta = total.saturating_sub(self.last_total);
        self.last_total = total;
        self.samples.push_back(delta);
        while self.samples.len() > WINDOW_SAMPLES {
            self.samples.pop_front();
        }
    }

    fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<u64>() as f64 / self.samples.len() as f64
    }
}

/// Sliding-window send/receive rate computation over shared counters.
#[derive(Debug)]
pub struct RateTracker {
    counters: Arc<TrafficCounters>,
    sent: RateWindow,
    received: RateWindow,
}

impl RateTracker {
    pub fn new(counters: Arc<TrafficCounters>) -> Self {
        Self {
            counters,
            sent: RateWindow::default(),
            received: RateWindow::default(),
        }
    }

    /// Fold the last second's deltas into the windows. Call once per second.
    pub fn record_tick(&mut self) {
        self.sent.push(self.counters.sent());
        self.received.push(self.counters.received());
    }

    /// Mean of the window for a direction; 0 while the window is empty.
    pub fn rate(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Sent => self.sent.mean(),
            Direction::Received => self.received.mean(),
        }
    }

    pub fn sample_count(&self, direction: Direction) -> usize {
        match direction {
            Direction::Sent => self.sent.samples.len(),
            Direction::Received => self.received.samples.len(),
        }
    }
}
