//! # Run one `start()`/`stop()` call against its deadline.
//!
//! ```text
//! Ok(())            ─► Ok(())
//! Err(e)            ─► StartFailed / StopFailed { source: e }
//! deadline elapsed  ─► future dropped ─► Timeout { op, timeout }
//! ```
//!
//! ## Rules
//! - A zero deadline disables the timeout.
//! - On timeout the component future is dropped, which cancels it at its
//!   current suspension point; a late result is never observed.

use std::future::Future;
use std::time::Duration;

use tokio::time;

use crate::error::{ComponentError, LifecycleError, LifecycleOp};

pub(crate) async fn run_with_deadline<F>(
    id: &str,
    op: LifecycleOp,
    deadline: Duration,
    fut: F,
) -> Result<(), LifecycleError>
where
    F: Future<Output = Result<(), ComponentError>>,
{
    let res = if deadline.is_zero() {
        fut.await
    } else {
        match time::timeout(deadline, fut).await {
            Ok(r) => r,
            Err(_elapsed) => {
                tracing::warn!(component = %id, %op, timeout = ?deadline, "lifecycle call timed out");
                return Err(LifecycleError::Timeout {
                    id: id.to_string(),
                    op,
                    timeout: deadline,
                });
            }
        }
    };

    res.map_err(|source| match op {
        LifecycleOp::Start => LifecycleError::StartFailed {
            id: id.to_string(),
            source,
        },
        LifecycleOp::Stop => LifecycleError::StopFailed {
            id: id.to_string(),
            source,
        },
    })
}
