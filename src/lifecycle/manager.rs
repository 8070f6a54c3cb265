//! # LifecycleManager: registration, ordered start/stop, health, restart.
//!
//! [`LifecycleManager`] is a cheap-to-clone handle over one registry of
//! components. It owns the control plane: components never change their
//! supervisor-side status themselves.
//!
//! ## Status transitions
//! ```text
//! register ─► Initializing ──start ok──► Active ──stop──► ShuttingDown ──ok──► Offline
//!                  │                       │                   └──err──► Error
//!                  └──start err──► Error   └──unhealthy──► Error ──restart──► Active
//!                                                             └──budget spent / fatal──► Offline
//! ```
//!
//! ## Rules
//! - Overlapping `start_component`/`stop_component` calls for the same id
//!   share one in-flight operation and observe the same result.
//! - `start_all_components` is sequential by descending priority; a failure
//!   of a component above [`CRITICAL_PRIORITY`] aborts it.
//! - `stop_all_components` runs every stop concurrently (issued in ascending
//!   priority order) and never stops early.
//! - Stopping a component that is `Offline`, or `Initializing` with no start
//!   in flight, calls nothing and emits nothing.
//! - System events go over the bus as broadcast messages from
//!   [`SUPERVISOR_SOURCE`]. A full or stopped bus only costs the event, never
//!   the transition.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use agentvisor::{
//!     ComponentConfig, ComponentContext, ComponentRef, LifecycleConfig, LifecycleManager,
//!     MessageBus, MessageBusConfig,
//! };
//! # use async_trait::async_trait;
//! # use agentvisor::{Component, ComponentError, ComponentEvent, ComponentMetadata, ComponentState, Message, PerformanceMetrics};
//! # struct Worker(ComponentState);
//! # #[async_trait]
//! # impl Component for Worker {
//! #     fn config(&self) -> &ComponentConfig { self.0.config() }
//! #     async fn start(&self) -> Result<(), ComponentError> { self.0.mark_started(); Ok(()) }
//! #     async fn stop(&self) -> Result<(), ComponentError> { self.0.mark_stopped(); Ok(()) }
//! #     async fn process_message(&self, _: Arc<Message>) -> Result<Option<Message>, ComponentError> { Ok(None) }
//! #     fn is_healthy(&self) -> bool { self.0.is_healthy() }
//! #     fn update_heartbeat(&self) { self.0.heartbeat() }
//! #     fn metadata(&self) -> ComponentMetadata { self.0.metadata() }
//! #     fn metrics(&self) -> PerformanceMetrics { self.0.metrics() }
//! #     fn events(&self) -> tokio::sync::broadcast::Receiver<ComponentEvent> { self.0.subscribe() }
//! # }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = MessageBus::new(MessageBusConfig::default());
//! let manager = LifecycleManager::new(LifecycleConfig::default(), bus.clone());
//!
//! manager.register_component(
//!     ComponentConfig::new("worker", "Worker").with_priority(60),
//!     |cfg, _ctx: ComponentContext| Ok(Arc::new(Worker(agentvisor::ComponentState::new(cfg))) as ComponentRef),
//! )?;
//!
//! manager.start_all_components().await?;
//! assert_eq!(manager.metrics().active_components, 1);
//!
//! manager.shutdown().await;
//! bus.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::health::{ComponentHealth, HealthStats, HealthStatus, LifecycleMetrics, SystemHealth};
use super::registry::{ComponentInfo, ComponentInstance, Registry};
use super::runner::run_with_deadline;
use crate::bus::{MessageBus, SubscriptionId};
use crate::component::{
    CRITICAL_PRIORITY, ComponentConfig, ComponentContext, ComponentHandler, ComponentRef,
    ComponentStatus,
};
use crate::config::LifecycleConfig;
use crate::error::{ComponentError, LifecycleError, LifecycleOp};
use crate::events::{ComponentEvent, SystemEvent};
use crate::schedule::ScheduledTask;

/// `source` of the system events the supervisor emits.
pub const SUPERVISOR_SOURCE: &str = "lifecycle-manager";

type InFlight = Shared<BoxFuture<'static, Result<(), LifecycleError>>>;

pub(super) struct Inner {
    pub(super) cfg: LifecycleConfig,
    ctx: ComponentContext,
    registry: Mutex<Registry>,
    inflight: Mutex<HashMap<(String, LifecycleOp), InFlight>>,
    stats: Mutex<HealthStats>,
    monitor: Mutex<Option<ScheduledTask>>,
    pub(super) token: CancellationToken,
}

impl Inner {
    pub(super) fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn inflight(&self) -> MutexGuard<'_, HashMap<(String, LifecycleOp), InFlight>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn stats(&self) -> MutexGuard<'_, HealthStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bus(&self) -> &MessageBus {
        self.ctx.bus()
    }

    /// Broadcasts a system event; failures are logged only.
    pub(super) fn emit(&self, event: SystemEvent) {
        let action = event.action();
        let component = event.component_id().to_string();
        if let Err(e) = self.bus().send(event.into_message(SUPERVISOR_SOURCE)) {
            tracing::warn!(%component, event = action, error = %e, "system event dropped");
        }
    }

    /// Runs `op` for `id`, joining an identical operation already in flight.
    pub(super) async fn run_once(
        self: &Arc<Self>,
        id: &str,
        op: LifecycleOp,
    ) -> Result<(), LifecycleError> {
        let key = (id.to_string(), op);
        let fut = {
            let mut inflight = self.inflight();
            match inflight.get(&key) {
                Some(running) => {
                    tracing::debug!(component = %id, %op, "joining in-flight operation");
                    running.clone()
                }
                None => {
                    let me = Arc::clone(self);
                    let k = key.clone();
                    let fut = async move {
                        let res = match k.1 {
                            LifecycleOp::Start => me.do_start(&k.0).await,
                            LifecycleOp::Stop => me.do_stop(&k.0).await,
                        };
                        me.inflight().remove(&k);
                        res
                    }
                    .boxed()
                    .shared();
                    inflight.insert(key, fut.clone());
                    fut
                }
            }
        };
        fut.await
    }

    async fn do_start(&self, id: &str) -> Result<(), LifecycleError> {
        let not_found = || LifecycleError::NotFound { id: id.to_string() };

        let component = {
            let mut reg = self.registry();
            let deps = reg.get(id).ok_or_else(not_found)?.config.dependencies.clone();
            let missing: Vec<String> = deps
                .into_iter()
                .filter(|d| reg.get(d).is_none_or(|i| i.status != ComponentStatus::Active))
                .collect();
            if !missing.is_empty() {
                tracing::warn!(component = %id, ?missing, "starting before dependencies are active");
            }

            let inst = reg.get_mut(id).ok_or_else(not_found)?;
            if inst.status == ComponentStatus::Active {
                return Ok(());
            }
            inst.status = ComponentStatus::Initializing;
            Arc::clone(&inst.component)
        };

        tracing::info!(component = %id, "starting component");
        let res =
            run_with_deadline(id, LifecycleOp::Start, self.cfg.startup_timeout, component.start())
                .await;

        let (name, restart_count) = {
            let mut reg = self.registry();
            let inst = reg.get_mut(id).ok_or_else(not_found)?;
            if res.is_ok() {
                let now = Instant::now();
                inst.status = ComponentStatus::Active;
                inst.started_at = Some(now);
                inst.last_checked = Some(now);
                inst.failed = false;
            } else {
                inst.status = ComponentStatus::Error;
            }
            (inst.config.name.clone(), inst.restart_count)
        };

        match res {
            Ok(()) => {
                component.update_heartbeat();
                tracing::info!(component = %id, "component active");
                self.emit(SystemEvent::AgentStarted {
                    component_id: id.to_string(),
                    name,
                });
                Ok(())
            }
            Err(e) => {
                tracing::error!(component = %id, error = %e, label = e.as_label(), "component failed to start");
                self.emit(SystemEvent::AgentError {
                    component_id: id.to_string(),
                    name,
                    error: e.to_string(),
                    restart_count,
                });
                Err(e)
            }
        }
    }

    async fn do_stop(&self, id: &str) -> Result<(), LifecycleError> {
        let not_found = || LifecycleError::NotFound { id: id.to_string() };

        let starting = self
            .inflight()
            .contains_key(&(id.to_string(), LifecycleOp::Start));
        let component = {
            let mut reg = self.registry();
            let inst = reg.get_mut(id).ok_or_else(not_found)?;
            let never_started = inst.status == ComponentStatus::Initializing && !starting;
            if inst.status == ComponentStatus::Offline || never_started {
                return Ok(());
            }
            inst.status = ComponentStatus::ShuttingDown;
            Arc::clone(&inst.component)
        };

        tracing::info!(component = %id, "stopping component");
        let res =
            run_with_deadline(id, LifecycleOp::Stop, self.cfg.shutdown_timeout, component.stop())
                .await;

        let (name, restart_count) = {
            let mut reg = self.registry();
            let inst = reg.get_mut(id).ok_or_else(not_found)?;
            if res.is_ok() {
                inst.status = ComponentStatus::Offline;
                inst.started_at = None;
            } else {
                inst.status = ComponentStatus::Error;
            }
            (inst.config.name.clone(), inst.restart_count)
        };

        match res {
            Ok(()) => {
                tracing::info!(component = %id, "component offline");
                self.emit(SystemEvent::AgentStopped {
                    component_id: id.to_string(),
                    name,
                });
                Ok(())
            }
            Err(e) => {
                tracing::error!(component = %id, error = %e, label = e.as_label(), "component failed to stop");
                self.emit(SystemEvent::AgentError {
                    component_id: id.to_string(),
                    name,
                    error: e.to_string(),
                    restart_count,
                });
                Err(e)
            }
        }
    }

    /// Reacts to a component's own notification.
    fn on_component_event(&self, id: &str, event: ComponentEvent) {
        match event {
            ComponentEvent::Error { error, .. } => {
                let Some((name, restart_count)) = self
                    .registry()
                    .get(id)
                    .map(|i| (i.config.name.clone(), i.restart_count))
                else {
                    return;
                };
                tracing::warn!(component = %id, %error, "component reported error");
                self.emit(SystemEvent::AgentError {
                    component_id: id.to_string(),
                    name,
                    error,
                    restart_count,
                });
            }
            ComponentEvent::Started { .. } => {
                tracing::debug!(component = %id, "component notified started");
            }
            ComponentEvent::Stopped { .. } => {
                tracing::debug!(component = %id, "component notified stopped");
            }
        }
    }
}

/// Handle to the lifecycle supervisor.
#[derive(Clone)]
pub struct LifecycleManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("components", &self.inner.registry().len())
            .field("cancelled", &self.inner.token.is_cancelled())
            .finish()
    }
}

impl LifecycleManager {
    /// Creates the supervisor and starts its health monitor.
    ///
    /// Must be called from within a Tokio runtime. `bus` is used for
    /// component subscriptions and system events.
    pub fn new(cfg: LifecycleConfig, bus: MessageBus) -> Self {
        let inner = Arc::new(Inner {
            ctx: ComponentContext::new(bus),
            registry: Mutex::new(Registry::default()),
            inflight: Mutex::new(HashMap::new()),
            stats: Mutex::new(HealthStats::default()),
            monitor: Mutex::new(None),
            token: CancellationToken::new(),
            cfg,
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let monitor = ScheduledTask::every("health-monitor", inner.cfg.health_tick(), move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.check_health();
                }
            }
        });
        *inner.monitor.lock().unwrap_or_else(PoisonError::into_inner) = Some(monitor);

        tracing::debug!(interval = ?inner.cfg.health_tick(), "lifecycle manager started");
        Self { inner }
    }

    /// Builds a component with `factory` and registers it as `Initializing`.
    ///
    /// The component is subscribed on the bus under its id and its own
    /// notifications are followed (errors are forwarded as `agent-error`).
    pub fn register_component<F>(
        &self,
        config: ComponentConfig,
        factory: F,
    ) -> Result<(), LifecycleError>
    where
        F: FnOnce(ComponentConfig, ComponentContext) -> Result<ComponentRef, ComponentError>,
    {
        let id = config.id.clone();
        if self.inner.registry().contains(&id) {
            return Err(LifecycleError::AlreadyRegistered { id });
        }

        let component = factory(config.clone(), self.inner.ctx.clone())
            .map_err(|source| LifecycleError::Factory {
                id: id.clone(),
                source,
            })?;

        let bus = self.inner.ctx.bus();
        let subscription = bus.subscribe(
            id.clone(),
            Arc::new(ComponentHandler::new(Arc::clone(&component), bus.downgrade())),
        );
        let listener = self.spawn_listener(id.clone(), &component);

        let mut reg = self.inner.registry();
        let instance = ComponentInstance {
            seq: reg.next_seq(),
            config,
            component,
            status: ComponentStatus::Initializing,
            started_at: None,
            restart_count: 0,
            last_checked: None,
            last_health_check: None,
            failed: false,
            subscription,
            listener,
        };
        if let Err((instance, err)) = reg.insert(instance) {
            drop(reg);
            instance.detach(bus);
            return Err(err);
        }
        drop(reg);

        tracing::info!(component = %id, "component registered");
        Ok(())
    }

    fn spawn_listener(&self, id: String, component: &ComponentRef) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let token = self.inner.token.clone();
        let mut rx = component.events();

        tokio::spawn(async move {
            loop {
                let ev = tokio::select! {
                    _ = token.cancelled() => break,
                    ev = rx.recv() => ev,
                };
                match ev {
                    Ok(ev) => match weak.upgrade() {
                        Some(inner) => inner.on_component_event(&id, ev),
                        None => break,
                    },
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(component = %id, skipped = n, "component notifications lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Stops the component if it is running, then removes it.
    pub async fn unregister_component(&self, id: &str) -> Result<(), LifecycleError> {
        let status = self
            .inner
            .registry()
            .get(id)
            .map(|i| i.status)
            .ok_or_else(|| LifecycleError::NotFound { id: id.to_string() })?;

        if !matches!(status, ComponentStatus::Initializing | ComponentStatus::Offline) {
            if let Err(e) = self.stop_component(id).await {
                tracing::warn!(component = %id, error = %e, "stop before unregister failed");
            }
        }

        let removed = self.inner.registry().remove(id);
        match removed {
            Some(instance) => {
                instance.detach(self.inner.ctx.bus());
                tracing::info!(component = %id, "component unregistered");
                Ok(())
            }
            None => Err(LifecycleError::NotFound { id: id.to_string() }),
        }
    }

    /// Starts one component, bounded by `startup_timeout`.
    ///
    /// Starting an active component is a no-op.
    pub async fn start_component(&self, id: &str) -> Result<(), LifecycleError> {
        self.inner.run_once(id, LifecycleOp::Start).await
    }

    /// Stops one component, bounded by `shutdown_timeout`.
    ///
    /// Stopping an offline component, or one that was never started, is a
    /// no-op.
    pub async fn stop_component(&self, id: &str) -> Result<(), LifecycleError> {
        self.inner.run_once(id, LifecycleOp::Stop).await
    }

    /// Starts every component, highest priority first, one at a time.
    ///
    /// Returns [`LifecycleError::CriticalStartup`] as soon as a component with
    /// priority above [`CRITICAL_PRIORITY`] fails; lower-priority failures are
    /// logged and skipped.
    pub async fn start_all_components(&self) -> Result<(), LifecycleError> {
        let order = self.inner.registry().ordered(true);
        tracing::info!(count = order.len(), "starting all components");

        for (id, priority) in order {
            let Err(e) = self.start_component(&id).await else {
                continue;
            };
            if priority > CRITICAL_PRIORITY {
                tracing::error!(component = %id, priority, error = %e, "critical component failed; startup aborted");
                return Err(LifecycleError::CriticalStartup {
                    id,
                    priority,
                    source: Arc::new(e),
                });
            }
            tracing::warn!(component = %id, priority, error = %e, "component failed to start; continuing degraded");
        }
        Ok(())
    }

    /// Stops every component concurrently, lowest priority first.
    ///
    /// Returns the individual failures; one failure never prevents the
    /// others from stopping.
    pub async fn stop_all_components(&self) -> Vec<LifecycleError> {
        let order = self.inner.registry().ordered(false);
        tracing::info!(count = order.len(), "stopping all components");

        let results = join_all(order.iter().map(|(id, _)| self.stop_component(id))).await;
        let failures: Vec<LifecycleError> = results.into_iter().filter_map(Result::err).collect();
        if !failures.is_empty() {
            tracing::warn!(failed = failures.len(), "some components failed to stop");
        }
        failures
    }

    /// Aggregated health of every registered component.
    pub fn system_health(&self) -> SystemHealth {
        let rows: Vec<(ComponentStatus, u32, ComponentRef)> = self
            .inner
            .registry()
            .snapshot_refs();

        let components: Vec<ComponentHealth> = rows
            .into_iter()
            .map(|(status, restart_count, component)| {
                let meta = component.metadata();
                let perf = component.metrics();
                ComponentHealth {
                    id: meta.id,
                    name: meta.name,
                    status,
                    last_heartbeat: meta.last_heartbeat,
                    response_time: perf.response_time,
                    error_count: meta.error_count,
                    resource_usage: perf.resource_usage,
                    restart_count,
                }
            })
            .collect();

        let total = components.len();
        let active = count(&components, ComponentStatus::Active);
        let errors = count(&components, ComponentStatus::Error);
        SystemHealth {
            status: HealthStatus::evaluate(total, active, errors),
            total,
            active,
            errors,
            components,
            generated_at: std::time::SystemTime::now(),
        }
    }

    /// Copies of all registry entries, in startup order.
    pub fn agent_registry(&self) -> Vec<ComponentInfo> {
        self.inner.registry().snapshot()
    }

    /// Copy of one registry entry.
    pub fn component(&self, id: &str) -> Option<ComponentInfo> {
        self.inner.registry().get(id).map(ComponentInstance::info)
    }

    /// Supervisor counters.
    pub fn metrics(&self) -> LifecycleMetrics {
        let (total, active, failed) = {
            let reg = self.inner.registry();
            let total = reg.len();
            let active = reg
                .values()
                .filter(|i| i.status == ComponentStatus::Active)
                .count();
            let failed = reg
                .values()
                .filter(|i| i.failed || i.status == ComponentStatus::Error)
                .count();
            (total, active, failed)
        };
        let stats = self.inner.stats();
        LifecycleMetrics {
            total_components: total,
            active_components: active,
            failed_components: failed,
            total_restarts: stats.restarts,
            health_check_cycles: stats.cycles,
            average_health_check_duration: stats.average(),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.inner.cfg
    }

    /// Context handed to component factories.
    pub fn context(&self) -> &ComponentContext {
        &self.inner.ctx
    }

    /// Stops health monitoring and pending restarts, then every component.
    ///
    /// Stops run concurrently, each bounded by `shutdown_timeout`. Returns
    /// the stop failures. Components stay registered (as `Offline` or
    /// `Error`) but are detached from the bus.
    pub async fn shutdown(&self) -> Vec<LifecycleError> {
        self.inner.token.cancel();
        let monitor = self
            .inner
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(monitor) = monitor {
            monitor.shutdown().await;
        }

        let failures = self.stop_all_components().await;

        let subscriptions: Vec<SubscriptionId> = self
            .inner
            .registry()
            .values()
            .map(|i| {
                i.listener.abort();
                i.subscription
            })
            .collect();
        for sub in subscriptions {
            self.inner.ctx.bus().unsubscribe(sub);
        }
        self.inner.inflight().clear();

        tracing::info!(failed = failures.len(), "lifecycle manager stopped");
        failures
    }
}

fn count(rows: &[ComponentHealth], status: ComponentStatus) -> usize {
    rows.iter().filter(|c| c.status == status).count()
}
