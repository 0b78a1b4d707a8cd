//! Waiting on long-running provider operations

use bakeflow_cloud::{CloudClients, CloudError, OperationClient, PendingOperation};
use bakeflow_step::{CancellationToken, Poller, StateBag, StepAction, TaskOutcome, halt};
use bakeflow_step::run_interruptible;
use std::sync::Arc;

/// Provider clients plus the polling cadence every step shares.
#[derive(Debug, Clone)]
pub struct Remote {
    pub clients: CloudClients,
    pub poller: Poller,
}

impl Remote {
    pub fn new(clients: CloudClients, poller: Poller) -> Self {
        Self { clients, poller }
    }

    /// Wait for `operation` while watching `cancel`.
    pub async fn wait(&self, cancel: &CancellationToken, operation: PendingOperation) -> TaskOutcome {
        let operations = self.clients.operations.clone();
        let poller = self.poller;
        run_interruptible(cancel, move |token| async move {
            tokio::select! {
                result = complete(operations, poller, &operation) => result,
                _ = token.cancelled() => {
                    tracing::debug!("stopped waiting for {}", operation.description);
                    Ok(())
                }
            }
        })
        .await
    }

    /// Wait for `operation` without a cancellation path. Used by cleanups,
    /// which run after the build token may already be cancelled.
    pub async fn complete(&self, operation: &PendingOperation) -> anyhow::Result<()> {
        complete(self.clients.operations.clone(), self.poller, operation).await
    }
}

async fn complete(
    operations: Arc<dyn OperationClient>,
    poller: Poller,
    operation: &PendingOperation,
) -> anyhow::Result<()> {
    if operation.is_completed() {
        return Ok(());
    }

    let status = poller.poll(|| operations.status(operation)).await?;
    if status.state.is_success() {
        tracing::debug!("{} succeeded", operation.description);
        Ok(())
    } else {
        Err(CloudError::OperationFailed {
            operation: operation.description.clone(),
            state: status.state,
            error: status.error,
        }
        .into())
    }
}

/// Map a finished wait onto the step verdict. `Completed` becomes
/// `Continue`.
pub fn verdict(state: &mut StateBag, outcome: TaskOutcome) -> StepAction {
    match outcome {
        TaskOutcome::Completed => StepAction::Continue,
        TaskOutcome::Failed(e) => halt(state, e),
        TaskOutcome::Cancelled => StepAction::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCloud;
    use bakeflow_cloud::{OperationState, OperationStatus, PollKind};
    use std::time::Duration;

    fn pending() -> PendingOperation {
        PendingOperation::new("delete disk 'bkos1'", PollKind::AsyncOperation("op".into()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_polls_until_terminal() {
        let cloud = FakeCloud::new();
        cloud.script_status(vec![
            OperationStatus::new(OperationState::InProgress("Running".into())),
            OperationStatus::succeeded(),
        ]);
        let remote = cloud.remote();

        remote.complete(&pending()).await.unwrap();
        assert_eq!(cloud.status_checks(), 2);
    }

    #[tokio::test]
    async fn test_completed_operation_is_not_polled() {
        let cloud = FakeCloud::new();
        let remote = cloud.remote();

        remote
            .complete(&PendingOperation::completed("create group"))
            .await
            .unwrap();
        assert_eq!(cloud.status_checks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_state_carries_error_document() {
        let cloud = FakeCloud::new();
        cloud.script_status(vec![OperationStatus::failed(
            bakeflow_cloud::ErrorResponse::new("DiskInUse", "disk is attached"),
        )]);
        let remote = cloud.remote();

        let err = remote.complete(&pending()).await.unwrap_err();
        let cloud_err = err.downcast_ref::<CloudError>().unwrap();
        assert_eq!(cloud_err.error_response().unwrap().code, "DiskInUse");
        assert!(err.to_string().contains("delete disk 'bkos1'"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_observes_cancellation() {
        let cloud = FakeCloud::new();
        cloud.script_status(vec![OperationStatus::new(OperationState::InProgress(
            "Running".into(),
        ))]);
        let remote = Remote::new(cloud.clients(), Poller::new(Duration::from_secs(60)));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let outcome = remote.wait(&cancel, pending()).await;
        assert!(outcome.is_cancelled());
    }
}
