use crate::bus::{MessageBus, RoutingRule};
use crate::config::{LifecycleConfig, MessageBusConfig};
use crate::lifecycle::LifecycleManager;

use super::Runtime;

/// Builder for a [`Runtime`] with non-default configuration.
#[derive(Debug, Default)]
pub struct RuntimeBuilder {
    bus: MessageBusConfig,
    lifecycle: LifecycleConfig,
    rules: Vec<RoutingRule>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bus_config(mut self, cfg: MessageBusConfig) -> Self {
        self.bus = cfg;
        self
    }

    pub fn with_lifecycle_config(mut self, cfg: LifecycleConfig) -> Self {
        self.lifecycle = cfg;
        self
    }

    /// Installs a routing rule before any component is registered.
    pub fn with_routing_rule(mut self, rule: RoutingRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Creates the bus and the supervisor and starts their loops.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Runtime {
        let bus = MessageBus::new(self.bus);
        for rule in self.rules {
            bus.add_routing_rule(rule);
        }
        let lifecycle = LifecycleManager::new(self.lifecycle, bus.clone());
        Runtime { bus, lifecycle }
    }
}
