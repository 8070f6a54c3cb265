//! # Rolling bus metrics.
//!
//! Counters are monotonic for the lifetime of the bus. `average_latency` is
//! an exponential moving average of the time from enqueue to successful
//! delivery; `throughput` is successful deliveries per second since the bus
//! was created.

use std::time::Duration;

use tokio::time::Instant;

use crate::message::LaneSizes;

/// Smoothing factor of the latency moving average.
const LATENCY_ALPHA: f64 = 0.1;

/// Snapshot returned by [`MessageBus::metrics`](crate::MessageBus::metrics).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BusMetrics {
    /// Messages accepted by `publish`/`send`.
    pub published: u64,
    /// Messages rejected at publish time (validation, capacity, stopped).
    pub rejected: u64,
    /// Messages delivered successfully.
    pub delivered: u64,
    /// Delivery attempts (first tries and retries).
    pub attempts: u64,
    /// Delivery attempts that failed.
    pub failed_attempts: u64,
    /// Failed deliveries scheduled for retry.
    pub retried: u64,
    /// Messages permanently given up on.
    pub abandoned: u64,
    /// Messages dropped at dequeue time because their TTL had passed.
    pub expired: u64,
    /// Moving average of enqueue → delivery time.
    pub average_latency: Duration,
    /// Successful deliveries per second.
    pub throughput: f64,
    /// `failed_attempts / attempts` (0 when nothing was attempted).
    pub error_rate: f64,
    /// Messages waiting in priority lanes.
    pub queue_size: usize,
    /// Messages waiting for a retry.
    pub pending_retries: usize,
    /// `(queue_size + pending_retries) / max_queue_size`.
    pub queue_utilization: f64,
}

/// Snapshot returned by [`MessageBus::queue_status`](crate::MessageBus::queue_status).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    pub lanes: LaneSizes,
    pub pending_retries: usize,
    pub capacity: usize,
    pub running: bool,
}

impl QueueStatus {
    /// Queued plus pending-retry messages; this is what capacity is checked against.
    pub fn pending(&self) -> usize {
        self.lanes.total() + self.pending_retries
    }
}

#[derive(Debug)]
pub(crate) struct MetricsRecorder {
    started: Instant,
    published: u64,
    rejected: u64,
    delivered: u64,
    attempts: u64,
    failed_attempts: u64,
    retried: u64,
    abandoned: u64,
    expired: u64,
    avg_latency_secs: Option<f64>,
}

impl MetricsRecorder {
    pub(crate) fn new() -> Self {
        Self {
            started: Instant::now(),
            published: 0,
            rejected: 0,
            delivered: 0,
            attempts: 0,
            failed_attempts: 0,
            retried: 0,
            abandoned: 0,
            expired: 0,
            avg_latency_secs: None,
        }
    }

    pub(crate) fn on_published(&mut self) {
        self.published += 1;
    }

    pub(crate) fn on_rejected(&mut self) {
        self.rejected += 1;
    }

    pub(crate) fn on_expired(&mut self) {
        self.expired += 1;
    }

    pub(crate) fn on_delivered(&mut self, latency: Duration) {
        self.attempts += 1;
        self.delivered += 1;
        let sample = latency.as_secs_f64();
        self.avg_latency_secs = Some(match self.avg_latency_secs {
            None => sample,
            Some(prev) => prev + LATENCY_ALPHA * (sample - prev),
        });
    }

    pub(crate) fn on_failed(&mut self, will_retry: bool) {
        self.attempts += 1;
        self.failed_attempts += 1;
        if will_retry {
            self.retried += 1;
        } else {
            self.abandoned += 1;
        }
    }

    pub(crate) fn snapshot(
        &self,
        queue_size: usize,
        pending_retries: usize,
        capacity: usize,
    ) -> BusMetrics {
        let elapsed = self.started.elapsed().as_secs_f64();
        BusMetrics {
            published: self.published,
            rejected: self.rejected,
            delivered: self.delivered,
            attempts: self.attempts,
            failed_attempts: self.failed_attempts,
            retried: self.retried,
            abandoned: self.abandoned,
            expired: self.expired,
            average_latency: Duration::from_secs_f64(self.avg_latency_secs.unwrap_or(0.0)),
            throughput: if elapsed > 0.0 {
                self.delivered as f64 / elapsed
            } else {
                0.0
            },
            error_rate: if self.attempts > 0 {
                self.failed_attempts as f64 / self.attempts as f64
            } else {
                0.0
            },
            queue_size,
            pending_retries,
            queue_utilization: (queue_size + pending_retries) as f64 / capacity.max(1) as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_rate_and_counters() {
        let mut m = MetricsRecorder::new();
        m.on_published();
        m.on_published();
        m.on_failed(true);
        m.on_failed(false);
        m.on_delivered(Duration::from_millis(10));
        m.on_delivered(Duration::from_millis(10));

        let s = m.snapshot(3, 1, 8);
        assert_eq!(s.published, 2);
        assert_eq!(s.retried, 1);
        assert_eq!(s.abandoned, 1);
        assert_eq!(s.attempts, 4);
        assert!((s.error_rate - 0.5).abs() < f64::EPSILON);
        assert!((s.queue_utilization - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_latency_is_moving_average() {
        let mut m = MetricsRecorder::new();
        m.on_delivered(Duration::from_millis(100));
        assert_eq!(m.snapshot(0, 0, 1).average_latency, Duration::from_millis(100));

        m.on_delivered(Duration::from_millis(200));
        let avg = m.snapshot(0, 0, 1).average_latency.as_secs_f64();
        assert!((avg - 0.110).abs() < 1e-9);
    }
}
