//! # Component notifications and system events.
//!
//! [`ComponentEvent`] is what a component says about itself; [`SystemEvent`]
//! is what the supervisor tells everyone else. System events travel over the
//! bus as broadcast `event` messages whose payload `data` is the serialized
//! variant, so subscribers can recover the typed value with
//! [`SystemEvent::from_message`].
//!
//! ## Example
//! ```rust
//! use agentvisor::{Message, SystemEvent};
//!
//! let ev = SystemEvent::AgentFailure {
//!     component_id: "parser".into(),
//!     name: "Parser".into(),
//!     error: "unhealthy".into(),
//!     restart_count: 3,
//! };
//! let msg: Message = ev.clone().into_message("supervisor");
//!
//! assert_eq!(msg.payload().action, "agent-failure");
//! assert!(msg.is_broadcast());
//! assert_eq!(SystemEvent::from_message(&msg), Some(ev));
//! ```

use serde::{Deserialize, Serialize};

use crate::message::{Message, MessageType, Priority};

/// Lifecycle notification emitted by a component about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentEvent {
    /// The component finished starting.
    Started { id: String },
    /// The component finished stopping.
    Stopped { id: String },
    /// The component hit an error it could not handle internally.
    Error { id: String, error: String },
}

impl ComponentEvent {
    /// Id of the component that emitted the event.
    pub fn component_id(&self) -> &str {
        match self {
            ComponentEvent::Started { id }
            | ComponentEvent::Stopped { id }
            | ComponentEvent::Error { id, .. } => id,
        }
    }
}

/// System event broadcast by the supervisor over the message bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum SystemEvent {
    /// Component reached `active`.
    AgentStarted { component_id: String, name: String },

    /// Component reached `offline` through a regular stop.
    AgentStopped { component_id: String, name: String },

    /// Component failed (start/stop error, failed health check, self-reported error).
    AgentError {
        component_id: String,
        name: String,
        error: String,
        restart_count: u32,
    },

    /// Component exhausted its restart budget and is permanently `offline`.
    AgentFailure {
        component_id: String,
        name: String,
        error: String,
        restart_count: u32,
    },
}

impl SystemEvent {
    /// Wire action name (`agent-started`, ...).
    pub fn action(&self) -> &'static str {
        match self {
            SystemEvent::AgentStarted { .. } => "agent-started",
            SystemEvent::AgentStopped { .. } => "agent-stopped",
            SystemEvent::AgentError { .. } => "agent-error",
            SystemEvent::AgentFailure { .. } => "agent-failure",
        }
    }

    pub fn component_id(&self) -> &str {
        match self {
            SystemEvent::AgentStarted { component_id, .. }
            | SystemEvent::AgentStopped { component_id, .. }
            | SystemEvent::AgentError { component_id, .. }
            | SystemEvent::AgentFailure { component_id, .. } => component_id,
        }
    }

    /// Delivery priority: failures jump every queue.
    pub fn priority(&self) -> Priority {
        match self {
            SystemEvent::AgentFailure { .. } => Priority::Critical,
            SystemEvent::AgentError { .. } => Priority::High,
            SystemEvent::AgentStarted { .. } | SystemEvent::AgentStopped { .. } => Priority::Normal,
        }
    }

    /// Wraps the event into a broadcast `event` message.
    pub fn into_message(self, source: impl Into<String>) -> Message {
        let action = self.action();
        let priority = self.priority();
        let data = serde_json::to_value(&self).unwrap_or_default();
        Message::new(MessageType::Event, source, action)
            .with_priority(priority)
            .with_data(data)
    }

    /// Recovers a system event from a bus message, if it carries one.
    pub fn from_message(message: &Message) -> Option<SystemEvent> {
        if message.kind() != MessageType::Event {
            return None;
        }
        let ev: SystemEvent = serde_json::from_value(message.payload().data.clone()).ok()?;
        (ev.action() == message.payload().action).then_some(ev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let ev = SystemEvent::AgentError {
            component_id: "store".into(),
            name: "Store".into(),
            error: "disk".into(),
            restart_count: 1,
        };
        let msg = ev.into_message("sup");
        let data = &msg.payload().data;

        assert_eq!(data["event"], "agent-error");
        assert_eq!(data["componentId"], "store");
        assert_eq!(data["restartCount"], 1);
        assert_eq!(msg.priority(), Priority::High);
    }

    #[test]
    fn test_non_event_messages_are_ignored() {
        let msg = Message::new(MessageType::Command, "x", "agent-started");
        assert_eq!(SystemEvent::from_message(&msg), None);

        let msg = Message::new(MessageType::Event, "x", "agent-started")
            .with_data(serde_json::json!({ "unrelated": true }));
        assert_eq!(SystemEvent::from_message(&msg), None);
    }
}
