//! # Runtime: explicit owner of one bus and one supervisor.
//!
//! There are no process-wide instances: whoever builds the [`Runtime`]
//! controls the lifetime of the bus and the supervisor and hands a
//! [`ComponentContext`] to every component it registers.
//!
//! ## Shutdown path
//! ```text
//! run_until_signal():
//!   start_all_components() ──Err(critical)──► shutdown() ─► Err
//!   wait_for_shutdown_signal()
//!   shutdown():
//!     lifecycle.shutdown()   monitor cancelled, stops ascending by priority
//!     bus.shutdown()         delivery loop cancelled, undelivered messages dropped
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use agentvisor::{LifecycleConfig, Runtime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), agentvisor::RuntimeError> {
//!     let runtime = Runtime::builder()
//!         .with_lifecycle_config(LifecycleConfig::default())
//!         .build();
//!
//!     // runtime.register_component(...)?;
//!
//!     runtime.run_until_signal().await
//! }
//! ```

mod builder;
mod signal;

pub use builder::RuntimeBuilder;
pub use signal::wait_for_shutdown_signal;

use crate::bus::MessageBus;
use crate::component::{ComponentConfig, ComponentContext, ComponentRef};
use crate::error::{ComponentError, LifecycleError, RuntimeError};
use crate::lifecycle::LifecycleManager;

/// One bus plus one supervisor, wired together.
#[derive(Clone, Debug)]
pub struct Runtime {
    bus: MessageBus,
    lifecycle: LifecycleManager,
}

impl Runtime {
    /// Runtime with default configuration.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new() -> Self {
        RuntimeBuilder::new().build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    /// Context handed to component factories.
    pub fn context(&self) -> &ComponentContext {
        self.lifecycle.context()
    }

    /// Shorthand for [`LifecycleManager::register_component`].
    pub fn register_component<F>(
        &self,
        config: ComponentConfig,
        factory: F,
    ) -> Result<(), LifecycleError>
    where
        F: FnOnce(ComponentConfig, ComponentContext) -> Result<ComponentRef, ComponentError>,
    {
        self.lifecycle.register_component(config, factory)
    }

    /// Starts every registered component in priority order.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        self.lifecycle.start_all_components().await
    }

    /// Stops every component, then the bus.
    ///
    /// Returns the component stop failures, which are also logged.
    pub async fn shutdown(&self) -> Vec<LifecycleError> {
        let failures = self.lifecycle.shutdown().await;
        let dropped = self.bus.shutdown().await;
        tracing::info!(
            stop_failures = failures.len(),
            dropped_messages = dropped,
            "runtime stopped"
        );
        failures
    }

    /// Starts all components, waits for a termination signal, shuts down.
    ///
    /// A critical startup failure shuts down what already started and is
    /// returned; stop failures during shutdown are only logged.
    pub async fn run_until_signal(&self) -> Result<(), RuntimeError> {
        if let Err(e) = self.start().await {
            self.shutdown().await;
            return Err(e.into());
        }

        let waited = wait_for_shutdown_signal().await;
        self.shutdown().await;
        waited.map_err(RuntimeError::from)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
