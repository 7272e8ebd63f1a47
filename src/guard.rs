//! Deadline and panic isolation for handler invocations.
//!
//! Handlers run on their own Tokio task so a panic surfaces as a
//! [`JoinError`](tokio::task::JoinError) instead of unwinding into the
//! dispatcher. On deadline expiry the task is aborted.

use std::any::Any;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Why a guarded handler did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    /// The handler returned an error.
    #[error("{0}")]
    Failed(String),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// The handler did not finish before the deadline.
    #[error("handler timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),

    /// The handler task was cancelled by the runtime.
    #[error("handler task cancelled")]
    Cancelled,
}

/// Run `task` on a fresh Tokio task, bounded by `deadline`.
pub async fn run_guarded<T, F>(deadline: Duration, task: F) -> Result<T, GuardError>
where
    T: Send + 'static,
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    let mut handle = tokio::spawn(task);
    match tokio::time::timeout(deadline, &mut handle).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(err))) => Err(GuardError::Failed(format!("{err:#}"))),
        Ok(Err(join_err)) if join_err.is_panic() => {
            Err(GuardError::Panicked(panic_message(join_err.into_panic())))
        }
        Ok(Err(_)) => Err(GuardError::Cancelled),
        Err(_) => {
            handle.abort();
            warn!(
                deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                "handler deadline expired"
            );
            Err(GuardError::TimedOut(deadline))
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_owned();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_owned()
}
