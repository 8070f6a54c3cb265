//! # Message envelope exchanged between components.
//!
//! A [`Message`] is the only way components interact. It is built once with
//! the `with_*`/`to` builder methods and is read-only afterwards: the bus
//! wraps it in an `Arc` and hands every handler the same shared instance.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use agentvisor::{Message, MessageType, Priority};
//!
//! let msg = Message::new(MessageType::Command, "scanner", "analyze")
//!     .to("analyzer")
//!     .with_priority(Priority::High)
//!     .with_data(serde_json::json!({ "url": "https://example.com" }))
//!     .with_ttl(Duration::from_secs(5));
//!
//! assert_eq!(msg.target(), "analyzer");
//! assert_eq!(msg.payload().action, "analyze");
//! assert!(msg.validate().is_ok());
//! ```

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::priority::Priority;
use crate::error::BusError;

/// Target string that addresses every subscriber.
pub const BROADCAST: &str = "broadcast";

/// Unique message identifier.
pub type MessageId = Uuid;

/// Classification of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Command,
    Query,
    Event,
    Response,
    Heartbeat,
    Error,
}

impl MessageType {
    /// Lowercase name, as used on the wire and matched by routing rules.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Command => "command",
            MessageType::Query => "query",
            MessageType::Event => "event",
            MessageType::Response => "response",
            MessageType::Heartbeat => "heartbeat",
            MessageType::Error => "error",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message body: what to do, with what, plus free-form metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Action name understood by the receiver.
    pub action: String,
    /// Opaque action data.
    #[serde(default)]
    pub data: serde_json::Value,
    /// String-keyed metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Message exchanged over the [`MessageBus`](crate::MessageBus).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    id: MessageId,
    #[serde(rename = "type")]
    kind: MessageType,
    source: String,
    target: String,
    payload: Payload,
    timestamp: SystemTime,
    #[serde(default)]
    priority: Priority,
    /// Time-to-live in milliseconds (compact).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ttl_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reply_to: Option<String>,
}

impl Message {
    /// Creates a broadcast message with a fresh id, current timestamp and
    /// normal priority.
    pub fn new(kind: MessageType, source: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            source: source.into(),
            target: BROADCAST.to_string(),
            payload: Payload {
                action: action.into(),
                data: serde_json::Value::Null,
                metadata: BTreeMap::new(),
            },
            timestamp: SystemTime::now(),
            priority: Priority::Normal,
            ttl_ms: None,
            correlation_id: None,
            reply_to: None,
        }
    }

    /// Addresses the message to one component id (or [`BROADCAST`]).
    #[inline]
    pub fn to(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Sets the delivery priority.
    #[inline]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Attaches action data.
    #[inline]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.payload.data = data;
        self
    }

    /// Adds one metadata entry.
    #[inline]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.payload.metadata.insert(key.into(), value.into());
        self
    }

    /// Sets the time-to-live (stored as milliseconds).
    #[inline]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = Some(ttl.as_millis().min(u128::from(u64::MAX)) as u64);
        self
    }

    /// Correlates this message with an earlier one.
    #[inline]
    pub fn with_correlation_id(mut self, id: MessageId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Asks receivers to answer to `reply_to` instead of `source`.
    #[inline]
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Builds a `response` to this message.
    ///
    /// The response is addressed to `reply_to` (or `source`), carries this
    /// message's id as correlation id and inherits its priority.
    pub fn reply(&self, source: impl Into<String>, data: serde_json::Value) -> Message {
        let target = self.reply_to.clone().unwrap_or_else(|| self.source.clone());
        Message::new(MessageType::Response, source, self.payload.action.clone())
            .to(target)
            .with_priority(self.priority)
            .with_data(data)
            .with_correlation_id(self.id)
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// True when addressed to every subscriber.
    pub fn is_broadcast(&self) -> bool {
        self.target == BROADCAST
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Own time-to-live, if any.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_ms.map(Duration::from_millis)
    }

    pub fn correlation_id(&self) -> Option<MessageId> {
        self.correlation_id
    }

    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    /// Checks the message shape before it is accepted by the bus.
    ///
    /// Type and priority are enforced by the type system (and by serde on
    /// the wire); this checks the remaining required fields.
    pub fn validate(&self) -> Result<(), BusError> {
        if self.id.is_nil() {
            return Err(BusError::Validation {
                field: "id",
                reason: "must not be nil",
            });
        }
        if self.source.trim().is_empty() {
            return Err(BusError::Validation {
                field: "source",
                reason: "must not be empty",
            });
        }
        if self.target.trim().is_empty() {
            return Err(BusError::Validation {
                field: "target",
                reason: "must not be empty",
            });
        }
        if self.payload.action.trim().is_empty() {
            return Err(BusError::Validation {
                field: "payload.action",
                reason: "must not be empty",
            });
        }
        if self.ttl_ms == Some(0) {
            return Err(BusError::Validation {
                field: "ttl",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_broadcast_normal() {
        let msg = Message::new(MessageType::Event, "a", "ping");
        assert!(msg.is_broadcast());
        assert_eq!(msg.priority(), Priority::Normal);
        assert!(msg.ttl().is_none());
    }

    #[test]
    fn test_validation_rejects_empty_fields() {
        let err = Message::new(MessageType::Command, "", "go").validate().unwrap_err();
        assert_eq!(
            err,
            BusError::Validation {
                field: "source",
                reason: "must not be empty"
            }
        );

        let err = Message::new(MessageType::Command, "a", " ").validate().unwrap_err();
        assert_eq!(err.as_label(), "bus_validation");

        let err = Message::new(MessageType::Command, "a", "go")
            .to("")
            .validate()
            .unwrap_err();
        assert!(matches!(err, BusError::Validation { field: "target", .. }));

        let err = Message::new(MessageType::Command, "a", "go")
            .with_ttl(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(err, BusError::Validation { field: "ttl", .. }));
    }

    #[test]
    fn test_reply_is_correlated_and_addressed() {
        let req = Message::new(MessageType::Query, "ui", "status")
            .to("store")
            .with_priority(Priority::High)
            .with_reply_to("ui.responses");
        let resp = req.reply("store", serde_json::json!({ "ok": true }));

        assert_eq!(resp.kind(), MessageType::Response);
        assert_eq!(resp.target(), "ui.responses");
        assert_eq!(resp.correlation_id(), Some(req.id()));
        assert_eq!(resp.priority(), Priority::High);
        assert_eq!(resp.payload().action, "status");
    }

    #[test]
    fn test_wire_format_uses_lowercase_enums() {
        let msg = Message::new(MessageType::Heartbeat, "a", "beat")
            .with_priority(Priority::Critical)
            .with_metadata("topic", "health")
            .with_ttl(Duration::from_millis(1500));
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "heartbeat");
        assert_eq!(json["priority"], "critical");
        assert_eq!(json["ttlMs"], 1500);
        assert_eq!(json["payload"]["metadata"]["topic"], "health");

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_unknown_priority_is_rejected_on_the_wire() {
        let mut json = serde_json::to_value(Message::new(MessageType::Event, "a", "x")).unwrap();
        json["priority"] = "urgent".into();
        assert!(serde_json::from_value::<Message>(json).is_err());
    }
}
