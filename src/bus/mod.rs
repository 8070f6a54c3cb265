//! Priority message bus.
//!
//! ## Architecture
//! ```text
//! publish(topic, msg) ─┐  validate ─► capacity check ─► PriorityQueue lane
//! send(msg) ───────────┘        (BusError returned synchronously)
//!
//! ScheduledTask "bus-delivery" (every processing_interval):
//!   ├─► promote due retries (RetryQueue, min-heap by ready-at) into their lanes
//!   └─► up to batch_size times:
//!         dequeue ─► TTL expired? ─► drop (lazy cancellation)
//!                 └► topic tag?  ─► fan-out to topic handlers
//!                    no tag      ─► route(): rules ─► broadcast | unicast targets
//!                         ├─ Ok                 ─► metrics
//!                         ├─ Err, attempts ≤ N  ─► RetryQueue (retry_delay · 2^(k-1))
//!                         └─ Err, attempts > N  ─► abandon ─► ERROR_TOPIC (direct, no queue)
//! ```
//!
//! ## Contents
//! - [`MessageBus`] public handle (cheap to clone)
//! - [`Handler`], [`HandlerFn`], [`HandlerRef`], [`SubscriptionId`] subscriber side
//! - [`RoutingRule`], [`RoutePattern`], [`RouteTarget`], [`RuleId`] routing table
//! - [`BusMetrics`], [`QueueStatus`] observability snapshots

mod delivery;
mod handler;
mod message_bus;
mod metrics;
mod retry;
mod routing;

pub use handler::{Handler, HandlerFn, HandlerRef, SubscriptionId};
pub use message_bus::{BUS_SOURCE, ERROR_TOPIC, MessageBus};
pub(crate) use message_bus::WeakBus;
pub use metrics::{BusMetrics, QueueStatus};
pub use routing::{RoutePattern, RouteTarget, RoutingRule, RuleId};
