//! # Bookkeeping helper for component implementations.
//!
//! [`ComponentState`] keeps what every component needs regardless of what it
//! does: its own status, heartbeat, performance figures and a [`Notifier`]
//! for lifecycle notifications. Embed it and delegate the bookkeeping
//! methods of [`Component`](crate::Component) to it.
//!
//! ## Health predicate
//! ```text
//! healthy ⇔ status == Active
//!         ∧ heartbeat age ≤ thresholds.max_heartbeat_age
//!         ∧ error_rate   ≤ thresholds.max_error_rate
//! ```
//!
//! ## Rules
//! - `response_time` is an exponential moving average (alpha 0.1).
//! - `throughput` is operations per second since the last `mark_started`.
//! - `mark_started`/`mark_stopped`/`report_error` also notify subscribers.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use tokio::sync::broadcast;
use tokio::time::Instant;

use super::config::{ComponentConfig, ComponentStatus};
use super::contract::ComponentMetadata;
use super::metrics::PerformanceMetrics;
use crate::events::{ComponentEvent, Notifier};

const RESPONSE_ALPHA: f64 = 0.1;

/// Limits used by [`ComponentState::is_healthy`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthThresholds {
    pub max_heartbeat_age: Duration,
    pub max_error_rate: f64,
}

impl Default for HealthThresholds {
    /// `max_heartbeat_age = 60s`, `max_error_rate = 0.1`.
    fn default() -> Self {
        Self {
            max_heartbeat_age: Duration::from_secs(60),
            max_error_rate: 0.1,
        }
    }
}

#[derive(Debug)]
struct Snapshot {
    status: ComponentStatus,
    started_at: Option<Instant>,
    heartbeat_at: Option<Instant>,
    heartbeat_wall: Option<SystemTime>,
    response_secs: Option<f64>,
    operations: u64,
    errors: u64,
    resource_usage: f64,
    last_updated: SystemTime,
}

/// Status, heartbeat, metrics and notifier of one component.
#[derive(Debug)]
pub struct ComponentState {
    config: ComponentConfig,
    thresholds: HealthThresholds,
    notifier: Notifier,
    inner: Mutex<Snapshot>,
}

impl ComponentState {
    pub fn new(config: ComponentConfig) -> Self {
        Self {
            config,
            thresholds: HealthThresholds::default(),
            notifier: Notifier::default(),
            inner: Mutex::new(Snapshot {
                status: ComponentStatus::Initializing,
                started_at: None,
                heartbeat_at: None,
                heartbeat_wall: None,
                response_secs: None,
                operations: 0,
                errors: 0,
                resource_usage: 0.0,
                last_updated: SystemTime::now(),
            }),
        }
    }

    pub fn with_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &ComponentConfig {
        &self.config
    }

    pub fn status(&self) -> ComponentStatus {
        self.lock().status
    }

    pub fn set_status(&self, status: ComponentStatus) {
        let mut s = self.lock();
        s.status = status;
        s.last_updated = SystemTime::now();
    }

    /// Marks the component active, resets uptime and heartbeat, notifies `Started`.
    pub fn mark_started(&self) {
        {
            let mut s = self.lock();
            let now = Instant::now();
            s.status = ComponentStatus::Active;
            s.started_at = Some(now);
            s.heartbeat_at = Some(now);
            s.heartbeat_wall = Some(SystemTime::now());
            s.last_updated = SystemTime::now();
        }
        self.notifier.publish(ComponentEvent::Started {
            id: self.config.id.clone(),
        });
    }

    /// Marks the component offline and notifies `Stopped`.
    pub fn mark_stopped(&self) {
        {
            let mut s = self.lock();
            s.status = ComponentStatus::Offline;
            s.started_at = None;
            s.last_updated = SystemTime::now();
        }
        self.notifier.publish(ComponentEvent::Stopped {
            id: self.config.id.clone(),
        });
    }

    /// Counts an error and notifies `Error`; status is left unchanged.
    pub fn report_error(&self, error: impl Into<String>) {
        let error = error.into();
        {
            let mut s = self.lock();
            s.errors += 1;
            s.operations += 1;
            s.last_updated = SystemTime::now();
        }
        tracing::debug!(component = %self.config.id, %error, "component reported error");
        self.notifier.publish(ComponentEvent::Error {
            id: self.config.id.clone(),
            error,
        });
    }

    pub fn heartbeat(&self) {
        let mut s = self.lock();
        s.heartbeat_at = Some(Instant::now());
        s.heartbeat_wall = Some(SystemTime::now());
    }

    /// Time since the last heartbeat, `None` before the first one.
    pub fn heartbeat_age(&self) -> Option<Duration> {
        self.lock().heartbeat_at.map(|t| t.elapsed())
    }

    /// Records one completed operation.
    pub fn record_operation(&self, latency: Duration, ok: bool) {
        let mut s = self.lock();
        s.operations += 1;
        if !ok {
            s.errors += 1;
        }
        let sample = latency.as_secs_f64();
        s.response_secs = Some(match s.response_secs {
            None => sample,
            Some(prev) => prev + RESPONSE_ALPHA * (sample - prev),
        });
        s.last_updated = SystemTime::now();
    }

    /// Sets the self-reported load, clamped to `0..=100`.
    pub fn set_resource_usage(&self, percent: f64) {
        let mut s = self.lock();
        s.resource_usage = if percent.is_finite() {
            percent.clamp(0.0, 100.0)
        } else {
            0.0
        };
        s.last_updated = SystemTime::now();
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        let s = self.lock();
        let uptime = s.started_at.map(|t| t.elapsed()).unwrap_or_default();
        PerformanceMetrics {
            response_time: Duration::from_secs_f64(s.response_secs.unwrap_or(0.0)),
            throughput: if uptime.is_zero() {
                0.0
            } else {
                s.operations as f64 / uptime.as_secs_f64()
            },
            error_rate: error_rate(&s),
            resource_usage: s.resource_usage,
            uptime,
            last_updated: s.last_updated,
        }
    }

    /// The default health predicate (see module docs).
    pub fn is_healthy(&self) -> bool {
        let s = self.lock();
        if s.status != ComponentStatus::Active {
            return false;
        }
        let fresh = s
            .heartbeat_at
            .is_some_and(|t| t.elapsed() <= self.thresholds.max_heartbeat_age);
        fresh && error_rate(&s) <= self.thresholds.max_error_rate
    }

    pub fn metadata(&self) -> ComponentMetadata {
        let s = self.lock();
        ComponentMetadata {
            id: self.config.id.clone(),
            name: self.config.name.clone(),
            version: self.config.version.clone(),
            capabilities: self.config.capabilities.clone(),
            status: s.status,
            last_heartbeat: s.heartbeat_wall,
            error_count: s.errors,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ComponentEvent> {
        self.notifier.subscribe()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

fn error_rate(s: &Snapshot) -> f64 {
    if s.operations == 0 {
        0.0
    } else {
        s.errors as f64 / s.operations as f64
    }
}
