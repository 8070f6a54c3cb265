//! # Cancellable scheduled tasks.
//!
//! Every periodic loop in the crate (bus delivery, health monitoring) runs as
//! a [`ScheduledTask`]: an explicit handle owning a [`CancellationToken`] and
//! the `JoinHandle` of the loop. Dropping a handle cancels its loop, so timers
//! cannot leak past their owner.
//!
//! - [`ScheduledTask::every`] spawns a fixed-period loop
//! - [`ScheduledTask::cancel`] requests cancellation (non-blocking)
//! - [`ScheduledTask::shutdown`] cancels and waits for the loop to exit
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

mod periodic;

pub use periodic::ScheduledTask;
