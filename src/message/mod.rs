//! Message model and the priority queue that buffers it.
//!
//! ## Contents
//! - [`Message`], [`MessageType`], [`Payload`] the wire contract between components
//! - [`Priority`] the four delivery lanes
//! - [`PriorityQueue`] four FIFO lanes with strict precedence, [`LaneSizes`] per-lane counts

mod envelope;
mod priority;
mod queue;

pub use envelope::{BROADCAST, Message, MessageId, MessageType, Payload};
pub use priority::Priority;
pub use queue::{LaneSizes, PriorityQueue};
