//! Error types used by the message bus, the lifecycle supervisor and components.
//!
//! This module defines five enums:
//!
//! - [`BusError`]: publish-time rejections returned synchronously to the caller.
//! - [`DeliveryError`]: a handler failed during delivery (contained inside the bus).
//! - [`ComponentError`]: errors returned by component implementations.
//! - [`LifecycleError`]: errors raised by the supervisor's control plane.
//! - [`RuntimeError`]: errors of the [`Runtime`](crate::Runtime) entry points.
//!
//! All types provide `as_label()` for logs/metrics.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// # Errors returned by [`MessageBus::publish`](crate::MessageBus::publish).
///
/// These are the only errors a publisher ever observes. Everything that goes
/// wrong after a message was accepted is handled inside the bus.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The message is malformed (empty required field, zero TTL, ...).
    #[error("invalid message: {field} {reason}")]
    Validation {
        /// Offending field name.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The queue is full; the caller must back off and retry later.
    #[error("message queue full (limit {limit})")]
    Capacity {
        /// Configured `max_queue_size`.
        limit: usize,
    },

    /// The bus was shut down and no longer accepts messages.
    #[error("message bus stopped")]
    Stopped,
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use agentvisor::BusError;
    ///
    /// let err = BusError::Capacity { limit: 10 };
    /// assert_eq!(err.as_label(), "bus_capacity");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::Validation { .. } => "bus_validation",
            BusError::Capacity { .. } => "bus_capacity",
            BusError::Stopped => "bus_stopped",
        }
    }

    /// True for the backpressure signal.
    pub fn is_capacity(&self) -> bool {
        matches!(self, BusError::Capacity { .. })
    }
}

/// # Failure of a single handler invocation.
///
/// Never surfaced to the publisher; drives the bus retry policy.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Handler returned an error.
    #[error("handler {subscription} failed: {error}")]
    Handler {
        /// Subscription that failed.
        subscription: u64,
        /// Error message returned by the handler.
        error: String,
    },

    /// Handler panicked.
    #[error("handler {subscription} panicked: {info}")]
    Panicked {
        /// Subscription that panicked.
        subscription: u64,
        /// Panic payload, when it was a string.
        info: String,
    },
}

impl DeliveryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DeliveryError::Handler { .. } => "delivery_handler_failed",
            DeliveryError::Panicked { .. } => "delivery_handler_panicked",
        }
    }
}

/// # Errors produced by component implementations.
///
/// Returned from [`Component::start`](crate::Component::start),
/// [`Component::stop`](crate::Component::stop) and
/// [`Component::process_message`](crate::Component::process_message).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComponentError {
    /// Operation failed but may succeed if retried.
    #[error("component failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable error.
    #[error("component fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },
}

impl ComponentError {
    /// Shorthand for [`ComponentError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        ComponentError::Fail {
            error: error.into(),
        }
    }

    /// Shorthand for [`ComponentError::Fatal`].
    pub fn fatal(error: impl Into<String>) -> Self {
        ComponentError::Fatal {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ComponentError::Fail { .. } => "component_failed",
            ComponentError::Fatal { .. } => "component_fatal",
        }
    }

    /// Indicates whether the error is safe to retry.
    ///
    /// ```
    /// use agentvisor::ComponentError;
    ///
    /// assert!(ComponentError::fail("busy").is_retryable());
    /// assert!(!ComponentError::fatal("corrupt").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, ComponentError::Fail { .. })
    }
}

/// Lifecycle operation kind, used in timeout errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleOp {
    Start,
    Stop,
}

impl std::fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleOp::Start => f.write_str("start"),
            LifecycleOp::Stop => f.write_str("stop"),
        }
    }
}

/// # Errors produced by the lifecycle supervisor.
///
/// `Clone` so that overlapping start/stop requests for one component can
/// share the outcome of a single in-flight operation.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// A component with the same id is already registered.
    #[error("component '{id}' already registered")]
    AlreadyRegistered {
        /// Component id.
        id: String,
    },

    /// No component with this id is registered.
    #[error("component '{id}' not found")]
    NotFound {
        /// Component id.
        id: String,
    },

    /// The factory failed to build the component.
    #[error("component '{id}' factory failed: {source}")]
    Factory {
        /// Component id.
        id: String,
        /// Factory error.
        source: ComponentError,
    },

    /// `start()` or `stop()` did not finish before its deadline.
    #[error("component '{id}' {op} timed out after {timeout:?}")]
    Timeout {
        /// Component id.
        id: String,
        /// Which operation timed out.
        op: LifecycleOp,
        /// Configured deadline.
        timeout: Duration,
    },

    /// `start()` returned an error.
    #[error("component '{id}' failed to start: {source}")]
    StartFailed {
        /// Component id.
        id: String,
        /// Component error.
        source: ComponentError,
    },

    /// `stop()` returned an error.
    #[error("component '{id}' failed to stop: {source}")]
    StopFailed {
        /// Component id.
        id: String,
        /// Component error.
        source: ComponentError,
    },

    /// A critical component (priority above the critical threshold) failed to
    /// start; system startup was aborted.
    #[error("critical component '{id}' (priority {priority}) failed to start: {source}")]
    CriticalStartup {
        /// Component id.
        id: String,
        /// Its startup priority.
        priority: i32,
        /// Underlying failure.
        source: Arc<LifecycleError>,
    },
}

impl LifecycleError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use agentvisor::{LifecycleError, LifecycleOp};
    ///
    /// let err = LifecycleError::Timeout {
    ///     id: "parser".into(),
    ///     op: LifecycleOp::Start,
    ///     timeout: Duration::from_secs(1),
    /// };
    /// assert_eq!(err.as_label(), "lifecycle_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            LifecycleError::AlreadyRegistered { .. } => "lifecycle_already_registered",
            LifecycleError::NotFound { .. } => "lifecycle_not_found",
            LifecycleError::Factory { .. } => "lifecycle_factory",
            LifecycleError::Timeout { .. } => "lifecycle_timeout",
            LifecycleError::StartFailed { .. } => "lifecycle_start_failed",
            LifecycleError::StopFailed { .. } => "lifecycle_stop_failed",
            LifecycleError::CriticalStartup { .. } => "lifecycle_critical_startup",
        }
    }

    /// True when the error came from a start/stop deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, LifecycleError::Timeout { .. })
    }

    /// True when the component reported a non-retryable error.
    ///
    /// The supervisor does not restart a component whose restart attempt
    /// fails this way.
    ///
    /// ```
    /// use agentvisor::{ComponentError, LifecycleError};
    ///
    /// let err = LifecycleError::StartFailed {
    ///     id: "db".into(),
    ///     source: ComponentError::fatal("schema mismatch"),
    /// };
    /// assert!(err.is_fatal());
    /// ```
    pub fn is_fatal(&self) -> bool {
        match self {
            LifecycleError::StartFailed { source, .. } | LifecycleError::StopFailed { source, .. } => {
                !source.is_retryable()
            }
            LifecycleError::CriticalStartup { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

/// # Errors returned by [`Runtime`](crate::Runtime) entry points.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Startup or shutdown of the supervised components failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// OS signal listeners could not be installed.
    #[error("failed to install signal handlers: {0}")]
    Signal(#[from] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Lifecycle(e) => e.as_label(),
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }
}
