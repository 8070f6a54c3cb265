//! Per-component performance snapshot.

use std::time::{Duration, SystemTime};

/// Performance figures a component reports about itself.
///
/// The supervisor reads these to build its system view; it never writes
/// them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceMetrics {
    /// Moving average of operation latency.
    pub response_time: Duration,
    /// Operations per second since start.
    pub throughput: f64,
    /// Failed operations / all operations, in `0.0..=1.0`.
    pub error_rate: f64,
    /// Self-reported load, in `0.0..=100.0`.
    pub resource_usage: f64,
    pub uptime: Duration,
    pub last_updated: SystemTime,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            response_time: Duration::ZERO,
            throughput: 0.0,
            error_rate: 0.0,
            resource_usage: 0.0,
            uptime: Duration::ZERO,
            last_updated: SystemTime::UNIX_EPOCH,
        }
    }
}
