//! # Fixed-period loop with an explicit cancel handle.
//!
//! ```text
//! ScheduledTask::every(name, period, tick_fn)
//!     └─► tokio::spawn(loop {
//!            select! {
//!              token.cancelled() ─► break
//!              interval.tick()   ─► tick_fn().await
//!            }
//!         })
//! ```
//!
//! ## Rules
//! - Ticks never overlap: the next tick is awaited only after `tick_fn` returns.
//! - Missed ticks are delayed, not bursted (`MissedTickBehavior::Delay`).
//! - The first tick fires one `period` after spawning.
//! - Cancellation is observed between ticks; a running tick is not interrupted.
//! - `shutdown()` from inside a tick cancels without joining its own task.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Handle to a periodic background loop.
#[derive(Debug)]
pub struct ScheduledTask {
    name: &'static str,
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Spawns `tick` every `period` until cancelled.
    ///
    /// `tick` produces a fresh future per tick, so the loop holds no state
    /// between ticks other than what the closure captures.
    pub fn every<F, Fut>(name: &'static str, period: Duration, tick: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();

        let join = tokio::spawn(async move {
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = child.cancelled() => break,
                    _ = interval.tick() => tick().await,
                }
            }
            tracing::debug!(task = name, "scheduled task exited");
        });

        Self {
            name,
            token,
            join: Some(join),
        }
    }

    /// Task name (for logs).
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Requests cancellation; the loop exits before its next tick.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once [`cancel`](Self::cancel) or [`shutdown`](Self::shutdown) was called.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True when called from inside this task's own loop (from a tick).
    pub fn is_current(&self) -> bool {
        match (&self.join, tokio::task::try_id()) {
            (Some(join), Some(id)) => join.id() == id,
            _ => false,
        }
    }

    /// Cancels the loop and waits for it to exit.
    ///
    /// A tick in progress is allowed to finish first. Called from within a
    /// tick, it only cancels: the loop exits once that tick returns.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if self.is_current() {
            tracing::debug!(task = self.name, "shutdown requested from own tick; not joining");
            return;
        }
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                tracing::warn!(task = self.name, error = %e, "scheduled task ended abnormally");
            }
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
