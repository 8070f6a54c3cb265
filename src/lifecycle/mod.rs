//! Lifecycle supervisor.
//!
//! ## Architecture
//! ```text
//! register_component(config, factory)
//!     └─► factory(config, ComponentContext) ─► ComponentInstance (Initializing)
//!           ├─ bus.subscribe(id, ComponentHandler)     messages ─► process_message
//!           └─ listener task on component.events()     Error ─► agent-error
//!
//! start_all (priority ↓, sequential) ─► run_once(Start) ─► run_with_deadline(start())
//! stop_all  (priority ↑, concurrent) ─► run_once(Stop)  ─► run_with_deadline(stop())
//!
//! ScheduledTask "health-monitor" ─► check_health ─► begin_failure ─► handle_failure
//!                                                     (restart_delay, stop+start, budget)
//!
//! every transition ─► SystemEvent ─► bus.send (broadcast)
//! ```
//!
//! ## Contents
//! - [`LifecycleManager`] public handle (cheap to clone)
//! - [`ComponentInfo`] registry snapshots
//! - [`SystemHealth`], [`ComponentHealth`], [`HealthStatus`], [`LifecycleMetrics`] reports

mod health;
mod manager;
mod registry;
mod runner;

pub use health::{ComponentHealth, HealthStatus, LifecycleMetrics, SystemHealth};
pub use manager::{LifecycleManager, SUPERVISOR_SOURCE};
pub use registry::ComponentInfo;
