//! Run one slow remote wait while watching for cancellation

use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Exactly one of these is reported per task.
#[derive(Debug)]
pub enum TaskOutcome {
    Completed,
    Failed(anyhow::Error),
    Cancelled,
}

impl TaskOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskOutcome::Cancelled)
    }
}

/// Run `work` on its own task and race it against `cancel`.
///
/// `work` receives a child token. When the build is cancelled the child is
/// cancelled too, so the work can stop waiting on the remote side; it is not
/// aborted. Cancellation wins over completion: if `cancel` fired by the time
/// the race is decided, the outcome is [`TaskOutcome::Cancelled`] even when
/// the work also finished or failed.
pub async fn run_interruptible<F, Fut>(cancel: &CancellationToken, work: F) -> TaskOutcome
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    if cancel.is_cancelled() {
        return TaskOutcome::Cancelled;
    }

    let child = cancel.child_token();
    let handle = tokio::spawn(work(child.clone()));

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!("task interrupted, signalling remote wait to stop");
            child.cancel();
            TaskOutcome::Cancelled
        }
        joined = handle => {
            if cancel.is_cancelled() {
                return TaskOutcome::Cancelled;
            }
            match joined {
                Ok(Ok(())) => TaskOutcome::Completed,
                Ok(Err(e)) => TaskOutcome::Failed(e),
                Err(e) => TaskOutcome::Failed(anyhow::anyhow!("task panicked: {}", e)),
            }
        }
    }
}
