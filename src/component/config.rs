//! # Static description of a managed component.
//!
//! [`ComponentConfig`] is supplied at registration and never changes
//! afterwards; [`ComponentStatus`] is the lifecycle state the supervisor
//! tracks for every registered component.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use agentvisor::ComponentConfig;
//!
//! let cfg = ComponentConfig::new("indexer", "Indexer")
//!     .with_version("2.1.0")
//!     .with_capabilities(["search", "index"])
//!     .with_dependency("store")
//!     .with_priority(95)
//!     .with_max_restart_attempts(5)
//!     .with_health_check_interval(Duration::from_secs(10));
//!
//! assert!(cfg.is_critical());
//! assert!(cfg.auto_restart);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Components with a priority above this abort system startup when they fail.
pub const CRITICAL_PRIORITY: i32 = 90;

/// Registration-time configuration of a component.
///
/// ## Field semantics
/// - `id`: Unique within the registry; also the bus topic the component receives on
/// - `priority`: Higher starts first and stops last
/// - `max_restart_attempts`: Bounded by [`LifecycleConfig::max_restart_attempts`](crate::LifecycleConfig)
/// - `health_check_interval`: Minimum time between two health checks (`0` = every supervisor tick)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentConfig {
    pub id: String,
    pub name: String,
    pub version: String,
    pub capabilities: Vec<String>,
    /// Ids of components expected to be active before this one starts.
    pub dependencies: Vec<String>,
    pub priority: i32,
    pub auto_restart: bool,
    pub max_restart_attempts: u32,
    pub health_check_interval: Duration,
}

impl ComponentConfig {
    /// Creates a config with version `1.0.0`, priority `50`, auto-restart
    /// enabled, 3 restart attempts and a 30s health-check interval.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: "1.0.0".to_string(),
            capabilities: Vec::new(),
            dependencies: Vec::new(),
            priority: 50,
            auto_restart: true,
            max_restart_attempts: 3,
            health_check_interval: Duration::from_secs(30),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities
            .extend(capabilities.into_iter().map(Into::into));
        self
    }

    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_auto_restart(mut self, enabled: bool) -> Self {
        self.auto_restart = enabled;
        self
    }

    pub fn with_max_restart_attempts(mut self, attempts: u32) -> Self {
        self.max_restart_attempts = attempts;
        self
    }

    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    /// True if a startup failure of this component aborts system startup.
    pub fn is_critical(&self) -> bool {
        self.priority > CRITICAL_PRIORITY
    }
}

/// Lifecycle state of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentStatus {
    /// Registered (or restarting), not yet started.
    #[default]
    Initializing,
    Active,
    Idle,
    Busy,
    /// Start/stop failed or a health check failed.
    Error,
    ShuttingDown,
    /// Stopped, or permanently failed after exhausting restarts.
    Offline,
}

impl ComponentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ComponentStatus::Initializing => "initializing",
            ComponentStatus::Active => "active",
            ComponentStatus::Idle => "idle",
            ComponentStatus::Busy => "busy",
            ComponentStatus::Error => "error",
            ComponentStatus::ShuttingDown => "shutting-down",
            ComponentStatus::Offline => "offline",
        }
    }
}

impl std::fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
