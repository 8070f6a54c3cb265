//! # Subscriber-side handler abstraction.
//!
//! [`Handler`] is what a subscription invokes on delivery. [`HandlerFn`] wraps
//! a closure `F: Fn(Arc<Message>) -> Fut`, producing a fresh future per
//! delivery. The common handle type is [`HandlerRef`].
//!
//! ## Contract
//! - Returning `Err` or panicking marks the delivery attempt as failed; the
//!   bus retries the whole fan-out with backoff.
//! - Handlers of one message run concurrently and are isolated from each
//!   other: a slow or failing handler never prevents the others from running.
//! - A message can be delivered more than once (retries re-invoke every
//!   handler), so handlers should be idempotent.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use agentvisor::{ComponentError, HandlerFn, HandlerRef, Message};
//!
//! let h: HandlerRef = HandlerFn::arc("printer", |msg: Arc<Message>| async move {
//!     println!("got {}", msg.payload().action);
//!     Ok::<_, ComponentError>(())
//! });
//! assert_eq!(h.name(), "printer");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ComponentError;
use crate::message::Message;

/// Opaque identifier returned by [`MessageBus::subscribe`](crate::MessageBus::subscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl SubscriptionId {
    /// Raw numeric value (for logs).
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Message handler registered under a topic.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Handles one delivery.
    async fn handle(&self, message: Arc<Message>) -> Result<(), ComponentError>;

    /// Human-readable name (for logs).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Shared handler handle.
pub type HandlerRef = Arc<dyn Handler>;

/// Function-backed handler.
pub struct HandlerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a new function-backed handler.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the handler and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Arc<Message>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ComponentError>> + Send + 'static,
{
    async fn handle(&self, message: Arc<Message>) -> Result<(), ComponentError> {
        (self.f)(message).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
