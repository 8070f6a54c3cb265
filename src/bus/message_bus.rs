//! # MessageBus: publish/subscribe with priority lanes and backpressure.
//!
//! [`MessageBus`] is a cheap-to-clone handle; every clone talks to the same
//! queue, subscriber table and routing table. Construction spawns the
//! delivery loop (requires a Tokio runtime); [`MessageBus::shutdown`] stops
//! it.
//!
//! ## State machine
//! ```text
//! new() ──► Processing ──shutdown()──► Stopped
//! ```
//!
//! ## Rules
//! - `publish`/`send` never block; a full queue is reported as
//!   [`BusError::Capacity`], the only backpressure point of the system.
//! - Capacity counts queued **and** pending-retry messages.
//! - All read accessors return copies; callers never see internal state.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use agentvisor::{ComponentError, HandlerFn, Message, MessageBus, MessageBusConfig, MessageType};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = MessageBus::new(MessageBusConfig::default());
//!
//! let sub = bus.subscribe("jobs", HandlerFn::arc("worker", |msg: Arc<Message>| async move {
//!     println!("job: {}", msg.payload().action);
//!     Ok::<_, ComponentError>(())
//! }));
//!
//! bus.publish("jobs", Message::new(MessageType::Command, "cli", "build"))?;
//! tokio::time::sleep(std::time::Duration::from_millis(50)).await;
//!
//! assert_eq!(bus.metrics().delivered, 1);
//! assert!(bus.unsubscribe(sub));
//! bus.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use tokio::time::Instant;

use super::delivery::QueuedMessage;
use super::handler::{HandlerRef, SubscriptionId};
use super::metrics::{BusMetrics, MetricsRecorder, QueueStatus};
use super::retry::RetryQueue;
use super::routing::{RoutingRule, RoutingTable, RuleId};
use crate::config::MessageBusConfig;
use crate::error::{BusError, DeliveryError};
use crate::message::{Message, MessageId, PriorityQueue};
use crate::policies::BackoffPolicy;
use crate::schedule::ScheduledTask;

/// Topic on which abandoned deliveries are reported.
pub const ERROR_TOPIC: &str = "system.error";

/// `source` of messages the bus creates itself.
pub const BUS_SOURCE: &str = "message-bus";

/// Mutable queue state, guarded by one mutex.
pub(super) struct BusState {
    pub(super) queue: PriorityQueue<QueuedMessage>,
    pub(super) retries: RetryQueue<QueuedMessage>,
    pub(super) metrics: MetricsRecorder,
}

impl BusState {
    pub(super) fn pending(&self) -> usize {
        self.queue.len() + self.retries.len()
    }

    /// Moves due retries to the tail of their lanes, earliest first.
    pub(super) fn promote_due(&mut self, now: Instant) {
        while let Some(item) = self.retries.pop_due(now) {
            let priority = item.message.priority();
            self.queue.enqueue(item, priority);
        }
    }
}

pub(super) struct Subscription {
    pub(super) id: SubscriptionId,
    pub(super) handler: HandlerRef,
}

#[derive(Default)]
pub(super) struct Subscriptions {
    pub(super) by_topic: HashMap<String, Vec<Subscription>>,
    topic_of: HashMap<SubscriptionId, String>,
}

impl Subscriptions {
    pub(super) fn snapshot(&self, topic: &str) -> Vec<(SubscriptionId, HandlerRef)> {
        self.by_topic
            .get(topic)
            .map(|subs| {
                subs.iter()
                    .map(|s| (s.id, Arc::clone(&s.handler)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(super) fn snapshot_all(&self) -> Vec<(SubscriptionId, HandlerRef)> {
        let mut all: Vec<_> = self
            .by_topic
            .values()
            .flatten()
            .map(|s| (s.id, Arc::clone(&s.handler)))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }
}

pub(super) struct Inner {
    pub(super) cfg: MessageBusConfig,
    pub(super) backoff: BackoffPolicy,
    state: Mutex<BusState>,
    subscriptions: RwLock<Subscriptions>,
    routes: RwLock<RoutingTable>,
    next_subscription: AtomicU64,
    running: AtomicBool,
    worker: Mutex<Option<ScheduledTask>>,
}

impl Inner {
    pub(super) fn state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn subscriptions(&self) -> std::sync::RwLockReadGuard<'_, Subscriptions> {
        self.subscriptions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscriptions_mut(&self) -> std::sync::RwLockWriteGuard<'_, Subscriptions> {
        self.subscriptions.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn routes(&self) -> std::sync::RwLockReadGuard<'_, RoutingTable> {
        self.routes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn routes_mut(&self) -> std::sync::RwLockWriteGuard<'_, RoutingTable> {
        self.routes.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn enqueue(&self, topic: Option<Arc<str>>, message: Message) -> Result<MessageId, BusError> {
        if !self.is_running() {
            self.state().metrics.on_rejected();
            return Err(BusError::Stopped);
        }
        if let Err(e) = message.validate() {
            self.state().metrics.on_rejected();
            return Err(e);
        }

        let limit = self.cfg.queue_limit();
        let mut st = self.state();
        if st.pending() >= limit {
            st.metrics.on_rejected();
            drop(st);
            tracing::warn!(limit, message_id = %message.id(), "message queue full; rejecting");
            return Err(BusError::Capacity { limit });
        }

        let id = message.id();
        let priority = message.priority();
        tracing::trace!(message_id = %id, topic = ?topic, %priority, "message enqueued");
        st.queue
            .enqueue(QueuedMessage::new(Arc::new(message), topic), priority);
        st.metrics.on_published();
        Ok(id)
    }
}

/// Non-owning bus handle for objects the bus itself stores (handlers).
#[derive(Clone)]
pub(crate) struct WeakBus(Weak<Inner>);

impl WeakBus {
    pub(crate) fn upgrade(&self) -> Option<MessageBus> {
        self.0.upgrade().map(|inner| MessageBus { inner })
    }
}

/// Handle to the priority message bus.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("running", &self.inner.is_running())
            .field("pending", &self.inner.state().pending())
            .finish()
    }
}

impl MessageBus {
    /// Creates the bus and starts its delivery loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(cfg: MessageBusConfig) -> Self {
        let inner = Arc::new(Inner {
            backoff: cfg.retry_backoff(),
            state: Mutex::new(BusState {
                queue: PriorityQueue::new(),
                retries: RetryQueue::default(),
                metrics: MetricsRecorder::new(),
            }),
            subscriptions: RwLock::new(Subscriptions::default()),
            routes: RwLock::new(RoutingTable::default()),
            next_subscription: AtomicU64::new(0),
            running: AtomicBool::new(true),
            worker: Mutex::new(None),
            cfg,
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let worker = ScheduledTask::every("bus-delivery", inner.cfg.tick(), move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.process_cycle().await;
                }
            }
        });
        *inner.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(worker);

        tracing::debug!(
            max_queue_size = inner.cfg.queue_limit(),
            interval = ?inner.cfg.tick(),
            "message bus started"
        );
        Self { inner }
    }

    /// Enqueues `message` for fan-out to every handler subscribed to `topic`.
    ///
    /// Fails synchronously with [`BusError::Validation`] for malformed
    /// messages, [`BusError::Capacity`] when the queue is full and
    /// [`BusError::Stopped`] after shutdown. Delivery itself is
    /// fire-and-forget.
    pub fn publish(&self, topic: impl Into<String>, message: Message) -> Result<MessageId, BusError> {
        let topic: String = topic.into();
        self.inner.enqueue(Some(Arc::from(topic)), message)
    }

    /// Enqueues `message` without a topic; it is delivered by [`route`](Self::route).
    pub fn send(&self, message: Message) -> Result<MessageId, BusError> {
        self.inner.enqueue(None, message)
    }

    /// Registers `handler` under `topic`.
    ///
    /// Component ids are topics too: unicast routing delivers to the handlers
    /// registered under exactly the target id.
    pub fn subscribe(&self, topic: impl Into<String>, handler: HandlerRef) -> SubscriptionId {
        let topic = topic.into();
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed) + 1);

        let mut subs = self.inner.subscriptions_mut();
        subs.by_topic
            .entry(topic.clone())
            .or_default()
            .push(Subscription { id, handler });
        tracing::debug!(%topic, subscription = %id, "subscribed");
        subs.topic_of.insert(id, topic);
        id
    }

    /// Removes a subscription; empty topics are pruned.
    ///
    /// Returns `false` if the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.inner.subscriptions_mut();
        let Some(topic) = subs.topic_of.remove(&id) else {
            return false;
        };
        if let Some(list) = subs.by_topic.get_mut(&topic) {
            list.retain(|s| s.id != id);
            if list.is_empty() {
                subs.by_topic.remove(&topic);
            }
        }
        tracing::debug!(%topic, subscription = %id, "unsubscribed");
        true
    }

    /// Topics with at least one subscriber, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.inner.subscriptions().by_topic.keys().cloned().collect();
        topics.sort_unstable();
        topics
    }

    /// Number of handlers registered under `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .subscriptions()
            .by_topic
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Resolves targets for `message` and delivers to them immediately.
    ///
    /// Routing rules are applied first; without a match the message's own
    /// target is used. Returns the number of handlers invoked, or the first
    /// handler failure.
    pub async fn route(&self, message: Arc<Message>) -> Result<usize, DeliveryError> {
        self.inner.route(&message).await
    }

    /// Appends a routing rule; rules are evaluated in registration order.
    pub fn add_routing_rule(&self, rule: RoutingRule) -> RuleId {
        self.inner.routes_mut().add(rule)
    }

    /// Removes a routing rule. Returns `false` if it was not present.
    pub fn remove_routing_rule(&self, id: RuleId) -> bool {
        self.inner.routes_mut().remove(id)
    }

    /// Copy of the rule list, in evaluation order.
    pub fn routing_rules(&self) -> Vec<(RuleId, RoutingRule)> {
        self.inner.routes().list()
    }

    /// Rolling metrics snapshot.
    pub fn metrics(&self) -> BusMetrics {
        let st = self.inner.state();
        st.metrics
            .snapshot(st.queue.len(), st.retries.len(), self.inner.cfg.queue_limit())
    }

    /// Queue occupancy snapshot.
    pub fn queue_status(&self) -> QueueStatus {
        let st = self.inner.state();
        QueueStatus {
            lanes: st.queue.sizes(),
            pending_retries: st.retries.len(),
            capacity: self.inner.cfg.queue_limit(),
            running: self.inner.is_running(),
        }
    }

    /// True until [`shutdown`](Self::shutdown) is called.
    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    pub(crate) fn downgrade(&self) -> WeakBus {
        WeakBus(Arc::downgrade(&self.inner))
    }

    /// Bus configuration.
    pub fn config(&self) -> &MessageBusConfig {
        &self.inner.cfg
    }

    /// Stops the delivery loop and discards undelivered messages.
    ///
    /// Waits for an in-progress delivery cycle to finish; called from a
    /// handler, it returns without waiting and the current cycle stops after
    /// that handler. Returns the number of discarded messages. Idempotent.
    pub async fn shutdown(&self) -> usize {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return 0;
        }
        let worker = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            worker.shutdown().await;
        }

        let mut st = self.inner.state();
        let dropped = st.pending();
        st.queue.clear();
        st.retries.clear();
        drop(st);

        tracing::info!(dropped, "message bus stopped");
        dropped
    }
}
