//! Explicit dependencies handed to component factories.

use crate::bus::MessageBus;

/// What a component gets from its owner at construction time.
///
/// Replaces process-wide singletons: the owner of the bus decides its
/// lifetime and passes a handle to every component it builds.
#[derive(Clone, Debug)]
pub struct ComponentContext {
    bus: MessageBus,
}

impl ComponentContext {
    pub fn new(bus: MessageBus) -> Self {
        Self { bus }
    }

    /// Handle to the shared message bus.
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }
}
