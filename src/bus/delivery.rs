//! # Delivery loop: dequeue, expire, fan-out, retry, abandon.
//!
//! ## Event flow
//! ```text
//! process_cycle():
//!   promote due retries ─► lanes
//!   repeat batch_size times:
//!     dequeue ─► None ─► end of cycle
//!             ─► expired (now - enqueued_at > ttl) ─► drop, metrics.expired
//!             ─► deliver():
//!                  attempts += 1
//!                  topic? fan_out(topic) : route()
//!                    ├─ all handlers Ok   ─► metrics.delivered
//!                    ├─ any failed, attempts ≤ retry_attempts
//!                    │                    ─► RetryQueue at now + retry_delay·2^(attempts-1)
//!                    └─ any failed, attempts > retry_attempts
//!                                         ─► abandon ─► report on ERROR_TOPIC (direct)
//! ```
//!
//! ## Rules
//! - Handlers of one message run concurrently; each is isolated with
//!   `catch_unwind`, so a panic counts as a failure of that handler only.
//! - A fan-out fails as a whole if any handler failed; a retry re-invokes
//!   every handler (at-least-once).
//! - Retry deadlines are clamped to [`RETRY_HORIZON`] from now.
//! - The abandonment report bypasses the queue and is never retried, so
//!   failing error handlers cannot generate more errors.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;
use tokio::time::Instant;

use super::handler::{HandlerRef, SubscriptionId};
use super::message_bus::{BUS_SOURCE, ERROR_TOPIC, Inner};
use super::routing::Resolved;
use crate::error::DeliveryError;
use crate::message::{Message, MessageType, Priority};

/// Latest retry deadline; longer backoffs are parked here.
const RETRY_HORIZON: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Deadline `delay` after `now`, clamped so a huge backoff cannot overflow.
fn retry_due(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay.min(RETRY_HORIZON)).unwrap_or(now)
}

/// A message owned by the bus while it waits for delivery.
#[derive(Debug)]
pub(crate) struct QueuedMessage {
    pub(super) message: Arc<Message>,
    /// Set for `publish`ed messages; `None` means "route".
    pub(super) topic: Option<Arc<str>>,
    pub(super) enqueued_at: Instant,
    pub(super) attempts: u32,
    pub(super) last_attempt: Option<Instant>,
}

impl QueuedMessage {
    pub(super) fn new(message: Arc<Message>, topic: Option<Arc<str>>) -> Self {
        Self {
            message,
            topic,
            enqueued_at: Instant::now(),
            attempts: 0,
            last_attempt: None,
        }
    }

    fn is_expired(&self, default_ttl: Duration, now: Instant) -> bool {
        let ttl = self.message.ttl().unwrap_or(default_ttl);
        now.saturating_duration_since(self.enqueued_at) > ttl
    }
}

impl Inner {
    /// One tick of the delivery loop.
    pub(super) async fn process_cycle(&self) {
        self.state().promote_due(Instant::now());

        for _ in 0..self.cfg.batch_limit() {
            if !self.is_running() {
                break;
            }
            let next = self.state().queue.dequeue();
            let Some(item) = next else { break };

            if item.is_expired(self.cfg.default_ttl, Instant::now()) {
                self.state().metrics.on_expired();
                tracing::debug!(
                    message_id = %item.message.id(),
                    attempts = item.attempts,
                    "message expired before delivery; dropped"
                );
                continue;
            }
            self.deliver(item).await;
        }
    }

    async fn deliver(&self, mut item: QueuedMessage) {
        item.attempts += 1;
        item.last_attempt = Some(Instant::now());

        let outcome = match item.topic.as_deref() {
            Some(topic) => self.fan_out(topic, &item.message).await,
            None => self.route(&item.message).await,
        };

        let err = match outcome {
            Ok(_) => {
                let latency = Instant::now().saturating_duration_since(item.enqueued_at);
                self.state().metrics.on_delivered(latency);
                return;
            }
            Err(err) => err,
        };

        if item.attempts <= self.cfg.retry_attempts {
            let delay = self.backoff.after_attempts(item.attempts);
            tracing::warn!(
                message_id = %item.message.id(),
                attempt = item.attempts,
                ?delay,
                error = %err,
                "delivery failed; retry scheduled"
            );
            let mut st = self.state();
            st.metrics.on_failed(true);
            st.retries.schedule(item, retry_due(Instant::now(), delay));
        } else {
            self.state().metrics.on_failed(false);
            tracing::error!(
                message_id = %item.message.id(),
                attempts = item.attempts,
                age = ?item.last_attempt.map(|t| t.saturating_duration_since(item.enqueued_at)),
                error = %err,
                "delivery abandoned"
            );
            self.report_abandoned(&item, &err).await;
        }
    }

    /// Delivers to every handler subscribed to `topic`.
    pub(super) async fn fan_out(
        &self,
        topic: &str,
        message: &Arc<Message>,
    ) -> Result<usize, DeliveryError> {
        let handlers = self.subscriptions().snapshot(topic);
        if handlers.is_empty() {
            tracing::debug!(%topic, message_id = %message.id(), "no subscribers for topic");
        }
        invoke(handlers, message).await
    }

    /// Delivers according to routing rules, or the message's own target.
    pub(super) async fn route(&self, message: &Arc<Message>) -> Result<usize, DeliveryError> {
        let resolved = self.routes().resolve(message);
        let handlers = {
            let subs = self.subscriptions();
            match resolved {
                Resolved::Broadcast => subs.snapshot_all(),
                Resolved::Unicast(targets) => {
                    let mut seen = HashSet::new();
                    targets
                        .iter()
                        .flat_map(|t| subs.snapshot(t))
                        .filter(|(id, _)| seen.insert(*id))
                        .collect()
                }
            }
        };
        if handlers.is_empty() {
            tracing::debug!(
                message_id = %message.id(),
                target = message.target(),
                "no handlers for routed message"
            );
        }
        invoke(handlers, message).await
    }

    /// Fast path: straight to the error-topic handlers, no queue, no retry.
    async fn report_abandoned(&self, item: &QueuedMessage, err: &DeliveryError) {
        let original = &item.message;
        let report = Arc::new(
            Message::new(MessageType::Error, BUS_SOURCE, "delivery-failed")
                .to(ERROR_TOPIC)
                .with_priority(Priority::Critical)
                .with_correlation_id(original.id())
                .with_data(serde_json::json!({
                    "messageId": original.id(),
                    "action": original.payload().action,
                    "source": original.source(),
                    "topic": item.topic.as_deref(),
                    "attempts": item.attempts,
                    "error": err.to_string(),
                })),
        );

        let handlers = self.subscriptions().snapshot(ERROR_TOPIC);
        let failures = invoke_all(handlers, &report).await;
        if !failures.is_empty() {
            tracing::warn!(
                failed = failures.len(),
                message_id = %original.id(),
                "error-topic handlers failed; report not retried"
            );
        }
    }
}

async fn invoke(
    handlers: Vec<(SubscriptionId, HandlerRef)>,
    message: &Arc<Message>,
) -> Result<usize, DeliveryError> {
    let count = handlers.len();
    match invoke_all(handlers, message).await.into_iter().next() {
        None => Ok(count),
        Some(first) => Err(first),
    }
}

/// Runs all handlers concurrently; returns the failures.
async fn invoke_all(
    handlers: Vec<(SubscriptionId, HandlerRef)>,
    message: &Arc<Message>,
) -> Vec<DeliveryError> {
    let calls = handlers.into_iter().map(|(id, handler)| {
        let message = Arc::clone(message);
        async move {
            let res = AssertUnwindSafe(handler.handle(message)).catch_unwind().await;
            let err = match res {
                Ok(Ok(())) => return None,
                Ok(Err(e)) => DeliveryError::Handler {
                    subscription: id.get(),
                    error: e.to_string(),
                },
                Err(panic_err) => DeliveryError::Panicked {
                    subscription: id.get(),
                    info: panic_message(panic_err.as_ref()),
                },
            };
            tracing::warn!(
                subscription = %id,
                handler = handler.name(),
                label = err.as_label(),
                error = %err,
                "handler failed"
            );
            Some(err)
        }
    });
    join_all(calls).await.into_iter().flatten().collect()
}

fn panic_message(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_expiry_uses_message_ttl_then_default() {
        let msg = Arc::new(
            Message::new(MessageType::Event, "a", "x").with_ttl(Duration::from_millis(100)),
        );
        let item = QueuedMessage::new(msg, None);
        let t0 = item.enqueued_at;

        assert!(!item.is_expired(Duration::from_secs(60), t0 + Duration::from_millis(100)));
        assert!(item.is_expired(Duration::from_secs(60), t0 + Duration::from_millis(101)));

        let plain = QueuedMessage::new(Arc::new(Message::new(MessageType::Event, "a", "x")), None);
        let t0 = plain.enqueued_at;
        assert!(!plain.is_expired(Duration::from_secs(1), t0 + Duration::from_millis(999)));
        assert!(plain.is_expired(Duration::from_secs(1), t0 + Duration::from_millis(1001)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_due_clamps_huge_backoff() {
        let now = Instant::now();
        assert_eq!(retry_due(now, Duration::from_millis(5)), now + Duration::from_millis(5));
        assert_eq!(retry_due(now, Duration::MAX), now + RETRY_HORIZON);
    }

    #[test]
    fn test_panic_message_extraction() {
        let s: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(s.as_ref()), "boom");
        let s: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(s.as_ref()), "bang");
        let s: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(s.as_ref()), "unknown panic");
    }
}
