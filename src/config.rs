//! # Runtime configuration.
//!
//! Provides the two value objects supplied at construction:
//! - [`MessageBusConfig`] for the [`MessageBus`](crate::MessageBus);
//! - [`LifecycleConfig`] for the [`LifecycleManager`](crate::LifecycleManager).
//!
//! Neither is persisted; both are plain `Clone` structs with public fields.
//!
//! ## Sentinel values
//! - `max_queue_size = 0` → clamped to 1
//! - `batch_size = 0` → clamped to 1
//! - `processing_interval`/`health_check_interval = 0s` → clamped to 1ms

use std::time::Duration;

use crate::policies::{BackoffPolicy, JitterPolicy};

const MIN_TICK: Duration = Duration::from_millis(1);

/// Configuration for the message bus.
///
/// ## Field semantics
/// - `max_queue_size`: Maximum number of pending messages, queued plus waiting for retry
/// - `default_ttl`: Maximum age of a message without its own `ttl`
/// - `processing_interval`: Period of the delivery loop
/// - `retry_attempts`: Retries after the first failed delivery (`0` = no retry)
/// - `retry_delay`: Base retry delay; attempt `k+1` waits `retry_delay * 2^(k-1)`
/// - `batch_size`: Maximum messages delivered per cycle
#[derive(Clone, Debug)]
pub struct MessageBusConfig {
    /// Maximum number of pending messages.
    ///
    /// `publish()` fails with [`BusError::Capacity`](crate::BusError::Capacity)
    /// once this many messages are pending.
    pub max_queue_size: usize,

    /// Time-to-live applied to messages that carry no `ttl` of their own.
    pub default_ttl: Duration,

    /// Period of the delivery loop.
    pub processing_interval: Duration,

    /// How many times a failed delivery is retried before it is abandoned.
    pub retry_attempts: u32,

    /// Base delay of the exponential retry schedule.
    pub retry_delay: Duration,

    /// Upper bound of messages dequeued per delivery cycle.
    pub batch_size: usize,

    /// Randomisation applied on top of the retry schedule.
    pub retry_jitter: JitterPolicy,
}

impl MessageBusConfig {
    /// Returns `max_queue_size` clamped to a minimum of 1.
    #[inline]
    pub fn queue_limit(&self) -> usize {
        self.max_queue_size.max(1)
    }

    /// Returns `batch_size` clamped to a minimum of 1.
    #[inline]
    pub fn batch_limit(&self) -> usize {
        self.batch_size.max(1)
    }

    /// Returns the delivery loop period clamped to at least 1ms.
    #[inline]
    pub fn tick(&self) -> Duration {
        self.processing_interval.max(MIN_TICK)
    }

    /// Builds the retry schedule: `first = retry_delay`, doubling each attempt.
    ///
    /// The cap is generous enough that the documented schedule is exact for
    /// any realistic `retry_attempts`.
    pub fn retry_backoff(&self) -> BackoffPolicy {
        let max = self
            .retry_delay
            .saturating_mul(1 << self.retry_attempts.min(16));
        BackoffPolicy {
            first: self.retry_delay,
            max,
            factor: 2.0,
            jitter: self.retry_jitter,
        }
    }
}

impl Default for MessageBusConfig {
    /// Default configuration:
    ///
    /// - `max_queue_size = 10_000`
    /// - `default_ttl = 5min`
    /// - `processing_interval = 10ms`
    /// - `retry_attempts = 3`
    /// - `retry_delay = 1s`
    /// - `batch_size = 10`
    /// - `retry_jitter = None`
    fn default() -> Self {
        Self {
            max_queue_size: 10_000,
            default_ttl: Duration::from_secs(300),
            processing_interval: Duration::from_millis(10),
            retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
            batch_size: 10,
            retry_jitter: JitterPolicy::None,
        }
    }
}

/// Configuration for the lifecycle supervisor.
///
/// ## Field semantics
/// - `health_check_interval`: Period of the health monitor
/// - `max_restart_attempts`: Global ceiling on automatic restarts per component
/// - `restart_delay`: Wait between a failure and the restart attempt
/// - `shutdown_timeout`: Deadline for one `stop()` call (and for supervisor shutdown)
/// - `startup_timeout`: Deadline for one `start()` call
#[derive(Clone, Debug)]
pub struct LifecycleConfig {
    /// Period of the health-check loop.
    pub health_check_interval: Duration,

    /// Global restart ceiling.
    ///
    /// A component restarts at most
    /// `min(component.max_restart_attempts, max_restart_attempts)` times.
    pub max_restart_attempts: u32,

    /// Delay between detecting a failure and restarting the component.
    pub restart_delay: Duration,

    /// Deadline for a component's `stop()`.
    pub shutdown_timeout: Duration,

    /// Deadline for a component's `start()`.
    pub startup_timeout: Duration,
}

impl LifecycleConfig {
    /// Returns the health-check period clamped to at least 1ms.
    #[inline]
    pub fn health_tick(&self) -> Duration {
        self.health_check_interval.max(MIN_TICK)
    }
}

impl Default for LifecycleConfig {
    /// Default configuration:
    ///
    /// - `health_check_interval = 30s`
    /// - `max_restart_attempts = 3`
    /// - `restart_delay = 5s`
    /// - `shutdown_timeout = 10s`
    /// - `startup_timeout = 30s`
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(30),
            max_restart_attempts: 3,
            restart_delay: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(10),
            startup_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_are_clamped() {
        let cfg = MessageBusConfig {
            max_queue_size: 0,
            batch_size: 0,
            processing_interval: Duration::ZERO,
            ..MessageBusConfig::default()
        };
        assert_eq!(cfg.queue_limit(), 1);
        assert_eq!(cfg.batch_limit(), 1);
        assert_eq!(cfg.tick(), Duration::from_millis(1));
    }

    #[test]
    fn test_retry_backoff_doubles_from_retry_delay() {
        let cfg = MessageBusConfig {
            retry_attempts: 4,
            retry_delay: Duration::from_millis(50),
            ..MessageBusConfig::default()
        };
        let backoff = cfg.retry_backoff();
        assert_eq!(backoff.next(0), Duration::from_millis(50));
        assert_eq!(backoff.next(1), Duration::from_millis(100));
        assert_eq!(backoff.next(2), Duration::from_millis(200));
        assert_eq!(backoff.next(3), Duration::from_millis(400));
    }
}
