//! Typed lifecycle events.
//!
//! This module replaces string-keyed listener maps with two enums whose
//! variants carry their own payload:
//!
//! - [`ComponentEvent`] notifications a component emits about itself
//!   (started / stopped / error), delivered through a [`Notifier`].
//! - [`SystemEvent`] events the supervisor broadcasts over the
//!   [`MessageBus`](crate::MessageBus) (`agent-started`, `agent-stopped`,
//!   `agent-error`, `agent-failure`).
//!
//! ## Quick reference
//! - **Publishers**: component implementations (via [`ComponentState`](crate::ComponentState)),
//!   the [`LifecycleManager`](crate::LifecycleManager).
//! - **Consumers**: the supervisor's per-component listener (logs and forwards
//!   errors), any bus subscriber (via [`SystemEvent::from_message`]).

mod event;
mod notifier;

pub use event::{ComponentEvent, SystemEvent};
pub use notifier::Notifier;
