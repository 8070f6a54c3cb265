//! # agentvisor
//!
//! **Agentvisor** is the in-process communication and supervision core of a
//! multi-component application.
//!
//! It provides a priority message bus that routes typed messages between
//! independently running components, and a lifecycle supervisor that starts,
//! stops, health-checks and restarts those components within a bounded
//! budget. Everything is single-process and best-effort: no persistence, no
//! cross-process delivery, no exactly-once guarantee.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  Component   │   │  Component   │   │  Component   │
//!     │ (prio 100)   │   │  (prio 50)   │   │  (prio 10)   │
//!     └──┬───────▲───┘   └──┬───────▲───┘   └──┬───────▲───┘
//!        │ send/ │ process  │       │          │       │
//!        │publish│ _message │       │          │       │
//!        ▼       │          ▼       │          ▼       │
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  MessageBus                                                       │
//! │  - PriorityQueue (critical > high > normal > low, FIFO per lane)  │
//! │  - RetryQueue (min-heap by ready-at, exponential backoff)         │
//! │  - Subscriptions (topic → handlers), RoutingTable (rules)         │
//! │  - ScheduledTask "bus-delivery" (every processing_interval)       │
//! └──────────────────────────────▲────────────────────────────────────┘
//!                                │ SystemEvent (agent-started, agent-stopped,
//!                                │              agent-error, agent-failure)
//! ┌──────────────────────────────┴────────────────────────────────────┐
//! │  LifecycleManager                                                 │
//! │  - Registry (ComponentInstance per id)                            │
//! │  - start_all ↓ priority (sequential), stop_all ↑ priority         │
//! │  - ScheduledTask "health-monitor" ─► bounded restart ─► offline   │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Failure handling
//! ```text
//! is_healthy() == false
//!   ├─► status = Error, emit agent-error
//!   ├─► restart_count < limit ─► sleep(restart_delay) ─► stop() ─► start()
//!   │                                                     ├─ Ok  ─► Active
//!   │                                                     └─ Err ─► re-check budget
//!   └─► restart_count == limit ─► Offline, emit agent-failure (terminal)
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                            |
//! |-------------------|---------------------------------------------------------------|-----------------------------------------------|
//! | **Messages**      | Typed, serde-serialisable wire contract between components.   | [`Message`], [`Priority`], [`MessageType`]    |
//! | **Bus**           | Publish/subscribe, routing rules, retry, backpressure.        | [`MessageBus`], [`Handler`], [`RoutingRule`]  |
//! | **Components**    | Contract and bookkeeping helper for managed units.            | [`Component`], [`ComponentState`]             |
//! | **Supervision**   | Ordered start/stop, health checks, bounded restart.           | [`LifecycleManager`], [`SystemHealth`]        |
//! | **Events**        | Typed component notifications and system events.              | [`ComponentEvent`], [`SystemEvent`]           |
//! | **Errors**        | Typed errors with stable labels.                              | [`BusError`], [`LifecycleError`]              |
//! | **Configuration** | Plain value objects supplied at construction.                 | [`MessageBusConfig`], [`LifecycleConfig`]     |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use agentvisor::{ComponentError, HandlerFn, Message, MessageType, Priority, Runtime};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = Runtime::new();
//!     let bus = runtime.bus();
//!
//!     bus.subscribe("alerts", HandlerFn::arc("printer", |msg: Arc<Message>| async move {
//!         println!("[{}] {}", msg.priority(), msg.payload().action);
//!         Ok::<_, ComponentError>(())
//!     }));
//!
//!     bus.publish(
//!         "alerts",
//!         Message::new(MessageType::Event, "sensor", "overheat").with_priority(Priority::Critical),
//!     )?;
//!
//!     tokio::time::sleep(Duration::from_millis(50)).await;
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

mod bus;
mod component;
mod config;
mod error;
mod events;
mod lifecycle;
mod message;
mod policies;
mod runtime;
mod schedule;

// ---- Public re-exports ----

pub use bus::{
    BUS_SOURCE, BusMetrics, ERROR_TOPIC, Handler, HandlerFn, HandlerRef, MessageBus, QueueStatus,
    RoutePattern, RouteTarget, RoutingRule, RuleId, SubscriptionId,
};
pub use component::{
    CRITICAL_PRIORITY, Component, ComponentConfig, ComponentContext, ComponentMetadata,
    ComponentRef, ComponentState, ComponentStatus, HealthThresholds, PerformanceMetrics,
};
pub use config::{LifecycleConfig, MessageBusConfig};
pub use error::{BusError, ComponentError, DeliveryError, LifecycleError, LifecycleOp, RuntimeError};
pub use events::{ComponentEvent, Notifier, SystemEvent};
pub use lifecycle::{
    ComponentHealth, ComponentInfo, HealthStatus, LifecycleManager, LifecycleMetrics,
    SUPERVISOR_SOURCE, SystemHealth,
};
pub use message::{
    BROADCAST, LaneSizes, Message, MessageId, MessageType, Payload, Priority, PriorityQueue,
};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use runtime::{Runtime, RuntimeBuilder, wait_for_shutdown_signal};
pub use schedule::ScheduledTask;
