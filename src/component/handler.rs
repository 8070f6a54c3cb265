//! Bus handler that feeds messages into a component.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;

use super::contract::ComponentRef;
use crate::bus::{Handler, WeakBus};
use crate::error::ComponentError;
use crate::message::Message;

/// Subscribed under the component id; replies go back through the bus.
pub(crate) struct ComponentHandler {
    component: ComponentRef,
    bus: WeakBus,
}

impl ComponentHandler {
    pub(crate) fn new(component: ComponentRef, bus: WeakBus) -> Self {
        Self { component, bus }
    }
}

#[async_trait]
impl Handler for ComponentHandler {
    async fn handle(&self, message: Arc<Message>) -> Result<(), ComponentError> {
        let started = Instant::now();
        let reply = self.component.process_message(message).await?;
        self.component.update_heartbeat();

        if let Some(reply) = reply {
            let Some(bus) = self.bus.upgrade() else {
                return Ok(());
            };
            bus.send(reply)
                .map_err(|e| ComponentError::fail(format!("reply rejected: {e}")))?;
        }
        tracing::trace!(
            component = %self.component.config().id,
            elapsed = ?started.elapsed(),
            "message processed"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        &self.component.config().id
    }
}
