//! # Component contract.
//!
//! [`Component`] is the capability set the supervisor requires from every
//! managed unit. The common handle type is [`ComponentRef`], an
//! `Arc<dyn Component>` shared between the supervisor and the bus.
//!
//! Most implementations embed a [`ComponentState`](crate::ComponentState) and
//! delegate the bookkeeping methods to it, keeping only `start`, `stop` and
//! `process_message` specific.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use tokio::sync::broadcast;
//! use agentvisor::{
//!     Component, ComponentConfig, ComponentError, ComponentEvent, ComponentMetadata,
//!     ComponentState, Message, PerformanceMetrics,
//! };
//!
//! struct Echo {
//!     state: ComponentState,
//! }
//!
//! #[async_trait]
//! impl Component for Echo {
//!     fn config(&self) -> &ComponentConfig { self.state.config() }
//!
//!     async fn start(&self) -> Result<(), ComponentError> {
//!         self.state.mark_started();
//!         Ok(())
//!     }
//!
//!     async fn stop(&self) -> Result<(), ComponentError> {
//!         self.state.mark_stopped();
//!         Ok(())
//!     }
//!
//!     async fn process_message(&self, msg: Arc<Message>) -> Result<Option<Message>, ComponentError> {
//!         Ok(Some(msg.reply(self.state.config().id.clone(), msg.payload().data.clone())))
//!     }
//!
//!     fn is_healthy(&self) -> bool { self.state.is_healthy() }
//!     fn update_heartbeat(&self) { self.state.heartbeat() }
//!     fn metadata(&self) -> ComponentMetadata { self.state.metadata() }
//!     fn metrics(&self) -> PerformanceMetrics { self.state.metrics() }
//!     fn events(&self) -> broadcast::Receiver<ComponentEvent> { self.state.subscribe() }
//! }
//!
//! let echo = Echo { state: ComponentState::new(ComponentConfig::new("echo", "Echo")) };
//! assert_eq!(echo.config().id, "echo");
//! ```

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::config::{ComponentConfig, ComponentStatus};
use super::metrics::PerformanceMetrics;
use crate::error::ComponentError;
use crate::events::ComponentEvent;
use crate::message::Message;

/// Descriptive snapshot returned by [`Component::metadata`].
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentMetadata {
    pub id: String,
    pub name: String,
    pub version: String,
    pub capabilities: Vec<String>,
    /// Status as the component sees itself.
    pub status: ComponentStatus,
    pub last_heartbeat: Option<SystemTime>,
    pub error_count: u64,
}

/// # Independently lifecycle-managed unit.
///
/// `start`/`stop` are raced against the supervisor's deadlines; a future
/// that misses its deadline is dropped, so implementations must tolerate
/// cancellation at any `.await`.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    /// Configuration the component was built with.
    fn config(&self) -> &ComponentConfig;

    async fn start(&self) -> Result<(), ComponentError>;

    async fn stop(&self) -> Result<(), ComponentError>;

    /// Handles a message addressed to this component.
    ///
    /// `Ok(Some(reply))` is sent back over the bus.
    async fn process_message(
        &self,
        message: Arc<Message>,
    ) -> Result<Option<Message>, ComponentError>;

    /// Health predicate evaluated by the supervisor's monitor.
    fn is_healthy(&self) -> bool;

    /// Refreshes the liveness timestamp.
    fn update_heartbeat(&self);

    fn metadata(&self) -> ComponentMetadata;

    fn metrics(&self) -> PerformanceMetrics;

    /// Subscribes to the component's own lifecycle notifications.
    ///
    /// Dropping the receiver unsubscribes.
    fn events(&self) -> broadcast::Receiver<ComponentEvent>;
}

/// Shared component handle.
pub type ComponentRef = Arc<dyn Component>;
