//! # Health monitoring and bounded automatic restart.
//!
//! ## Event flow
//! ```text
//! ScheduledTask "health-monitor" (every health_check_interval):
//!   for each Active component whose own interval has elapsed:
//!     is_healthy()?
//!       ├─ true  ─► nothing
//!       └─ false ─► begin_failure():
//!                     status = Error, emit agent-error
//!                     spawn handle_failure():
//!                       auto_restart off          ─► stay Error
//!                       restart_count ≥ limit     ─► Offline, emit agent-failure
//!                       otherwise:
//!                         sleep(restart_delay)     (cancelled by shutdown)
//!                         restart_count += 1
//!                         stop() ─► start()
//!                           ├─ Ok  ─► Active
//!                           ├─ Err(fatal) ─► Offline, emit agent-failure
//!                           └─ Err ─► back to the budget check
//! ```
//!
//! ## Rules
//! - `limit = min(component.max_restart_attempts, lifecycle.max_restart_attempts)`.
//! - `restart_count` is never reset automatically and never exceeds `limit`.
//! - A restart whose `start()` fails with [`ComponentError::Fatal`] is not
//!   retried, whatever budget is left.
//!
//! [`ComponentError::Fatal`]: crate::ComponentError::Fatal
//! - Status is set to `Error` before the handler is spawned, so the next
//!   monitor tick skips the component; failure handling never overlaps.
//! - If someone else changed the status during `restart_delay` (manual
//!   stop, unregister), the restart is skipped.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::Instant;

use super::manager::Inner;
use crate::component::{ComponentRef, ComponentStatus};
use crate::error::LifecycleOp;
use crate::events::SystemEvent;

/// Overall system status derived from component states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthStatus {
    Healthy,
    /// Some components are in error, or fewer than 80% are active.
    Degraded,
    /// More than half of the components are in error.
    Critical,
}

impl HealthStatus {
    /// Classifies a registry of `total` components.
    ///
    /// ```
    /// use agentvisor::HealthStatus;
    ///
    /// assert_eq!(HealthStatus::evaluate(4, 2, 2), HealthStatus::Degraded);
    /// assert_eq!(HealthStatus::evaluate(3, 1, 2), HealthStatus::Critical);
    /// assert_eq!(HealthStatus::evaluate(5, 4, 0), HealthStatus::Healthy);
    /// assert_eq!(HealthStatus::evaluate(0, 0, 0), HealthStatus::Healthy);
    /// ```
    pub fn evaluate(total: usize, active: usize, errors: usize) -> Self {
        if total == 0 {
            HealthStatus::Healthy
        } else if errors * 2 > total {
            HealthStatus::Critical
        } else if errors > 0 || active * 5 < total * 4 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Critical => "critical",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health line of one component.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentHealth {
    pub id: String,
    pub name: String,
    /// Status as tracked by the supervisor.
    pub status: ComponentStatus,
    pub last_heartbeat: Option<SystemTime>,
    pub response_time: Duration,
    pub error_count: u64,
    pub resource_usage: f64,
    pub restart_count: u32,
}

/// Aggregated report returned by
/// [`LifecycleManager::system_health`](crate::LifecycleManager::system_health).
#[derive(Debug, Clone, PartialEq)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub total: usize,
    pub active: usize,
    pub errors: usize,
    /// In startup order.
    pub components: Vec<ComponentHealth>,
    pub generated_at: SystemTime,
}

/// Supervisor counters, as returned by
/// [`LifecycleManager::metrics`](crate::LifecycleManager::metrics).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LifecycleMetrics {
    pub total_components: usize,
    pub active_components: usize,
    /// Components in `error`, or offline after exhausting restarts.
    pub failed_components: usize,
    /// Automatic restarts performed since construction.
    pub total_restarts: u64,
    /// Monitor ticks that checked at least one component.
    pub health_check_cycles: u64,
    pub average_health_check_duration: Duration,
}

#[derive(Debug, Default)]
pub(super) struct HealthStats {
    pub(super) cycles: u64,
    pub(super) checks: u64,
    pub(super) total_duration: Duration,
    pub(super) restarts: u64,
}

impl HealthStats {
    pub(super) fn record_cycle(&mut self, checked: usize, took: Duration) {
        self.cycles += 1;
        self.checks += checked as u64;
        self.total_duration += took;
    }

    pub(super) fn average(&self) -> Duration {
        if self.cycles == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total_duration.as_nanos() / u128::from(self.cycles);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

impl Inner {
    /// One tick of the health monitor.
    pub(super) fn check_health(self: &Arc<Self>) {
        let started = Instant::now();
        let due: Vec<(String, ComponentRef)> = {
            let mut reg = self.registry();
            reg.values_mut()
                .filter(|i| i.status == ComponentStatus::Active)
                .filter(|i| {
                    i.last_checked.is_none_or(|t| {
                        started.saturating_duration_since(t) >= i.config.health_check_interval
                    })
                })
                .map(|i| {
                    i.last_checked = Some(started);
                    i.last_health_check = Some(SystemTime::now());
                    (i.config.id.clone(), Arc::clone(&i.component))
                })
                .collect()
        };
        if due.is_empty() {
            return;
        }

        for (id, component) in &due {
            let healthy = std::panic::catch_unwind(AssertUnwindSafe(|| component.is_healthy()))
                .unwrap_or(false);
            if healthy {
                tracing::trace!(component = %id, "health check passed");
            } else {
                self.begin_failure(id, "health check failed".to_string());
            }
        }

        self.stats().record_cycle(due.len(), started.elapsed());
    }

    /// Moves an active component to `Error` and hands it to failure handling.
    pub(super) fn begin_failure(self: &Arc<Self>, id: &str, reason: String) {
        let (name, restart_count) = {
            let mut reg = self.registry();
            let Some(inst) = reg.get_mut(id) else { return };
            if inst.status != ComponentStatus::Active {
                return;
            }
            inst.status = ComponentStatus::Error;
            (inst.config.name.clone(), inst.restart_count)
        };

        tracing::warn!(component = %id, restart_count, %reason, "component failed");
        self.emit(SystemEvent::AgentError {
            component_id: id.to_string(),
            name,
            error: reason.clone(),
            restart_count,
        });

        let me = Arc::clone(self);
        let id = id.to_string();
        tokio::spawn(async move { me.handle_failure(id, reason).await });
    }

    async fn handle_failure(self: Arc<Self>, id: String, mut reason: String) {
        loop {
            let (limit, auto_restart, name, count) = {
                let reg = self.registry();
                let Some(inst) = reg.get(&id) else { return };
                (
                    inst.config
                        .max_restart_attempts
                        .min(self.cfg.max_restart_attempts),
                    inst.config.auto_restart,
                    inst.config.name.clone(),
                    inst.restart_count,
                )
            };

            if !auto_restart {
                tracing::warn!(component = %id, "auto-restart disabled; component left in error");
                return;
            }

            if count >= limit {
                let why = "restart budget exhausted; component offline";
                self.give_up(id, name, reason, count, why);
                return;
            }

            tokio::select! {
                _ = self.token.cancelled() => return,
                _ = tokio::time::sleep(self.cfg.restart_delay) => {}
            }

            let attempt = {
                let mut reg = self.registry();
                let Some(inst) = reg.get_mut(&id) else { return };
                if inst.status != ComponentStatus::Error {
                    tracing::debug!(component = %id, status = %inst.status, "status changed; restart skipped");
                    return;
                }
                inst.restart_count += 1;
                inst.restart_count
            };
            self.stats().restarts += 1;
            tracing::info!(component = %id, attempt, limit, "restarting component");

            if let Err(e) = self.run_once(&id, LifecycleOp::Stop).await {
                tracing::warn!(component = %id, error = %e, "stop before restart failed");
            }
            match self.run_once(&id, LifecycleOp::Start).await {
                Ok(()) => {
                    tracing::info!(component = %id, attempt, "component restarted");
                    return;
                }
                Err(e) if e.is_fatal() => {
                    let why = "fatal restart error; component offline";
                    self.give_up(id, name, e.to_string(), attempt, why);
                    return;
                }
                Err(e) => reason = e.to_string(),
            }
        }
    }

    /// Parks a component offline for good and announces `agent-failure`.
    fn give_up(
        &self,
        id: String,
        name: String,
        reason: String,
        restart_count: u32,
        why: &'static str,
    ) {
        {
            let mut reg = self.registry();
            let Some(inst) = reg.get_mut(&id) else { return };
            inst.status = ComponentStatus::Offline;
            inst.started_at = None;
            inst.failed = true;
        }
        tracing::error!(component = %id, restart_count, %reason, "{why}");
        self.emit(SystemEvent::AgentFailure {
            component_id: id,
            name,
            error: reason,
            restart_count,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds() {
        // more than half in error
        assert_eq!(HealthStatus::evaluate(2, 0, 2), HealthStatus::Critical);
        // exactly half is not critical
        assert_eq!(HealthStatus::evaluate(2, 1, 1), HealthStatus::Degraded);
        // no errors but under 80% active
        assert_eq!(HealthStatus::evaluate(10, 7, 0), HealthStatus::Degraded);
        assert_eq!(HealthStatus::evaluate(10, 8, 0), HealthStatus::Healthy);
    }

    #[test]
    fn test_average_duration() {
        let mut s = HealthStats::default();
        assert_eq!(s.average(), Duration::ZERO);
        s.record_cycle(2, Duration::from_millis(4));
        s.record_cycle(1, Duration::from_millis(2));
        assert_eq!(s.average(), Duration::from_millis(3));
        assert_eq!(s.checks, 3);
    }

    #[test]
    fn test_average_past_u32_cycles() {
        let s = HealthStats {
            cycles: 1 << 32,
            total_duration: Duration::from_secs(1 << 32),
            ..HealthStats::default()
        };
        assert_eq!(s.average(), Duration::from_secs(1));
    }
}
