//! Retry policies for message delivery.
//!
//! ## Contents
//! - [`BackoffPolicy`] how retry delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid synchronized retries
//!
//! ## Quick wiring
//! ```text
//! MessageBusConfig { retry_delay, retry_attempts, retry_jitter }
//!      └─► MessageBusConfig::retry_backoff() ─► BackoffPolicy { first: retry_delay, factor: 2.0 }
//!           └─► bus delivery: delay before attempt k+1 = backoff.after_attempts(k)
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → first=100ms, factor=2.0, max=30s, jitter=None.
//! - `JitterPolicy::None` by default, so the schedule is exactly `retry_delay * 2^(k-1)`.

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
