use crate::keys::{COMPUTE_NAME, RESOURCE_GROUP_NAME};
use crate::remote::{Remote, verdict};
use async_trait::async_trait;
use bakeflow_step::{CancellationToken, StateBag, Step, StepAction, halt};

/// Stop and deallocate the build VM before it is captured.
pub struct PowerOffCompute {
    remote: Remote,
}

impl PowerOffCompute {
    pub fn new(remote: Remote) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl Step for PowerOffCompute {
    fn name(&self) -> &str {
        "power-off-compute"
    }

    fn reads(&self) -> &[&'static str] {
        const READS: &[&str] = &[RESOURCE_GROUP_NAME.name(), COMPUTE_NAME.name()];
        READS
    }

    async fn run(&self, cancel: &CancellationToken, state: &mut StateBag) -> StepAction {
        let resource_group = state.get(RESOURCE_GROUP_NAME).clone();
        let name = state.get(COMPUTE_NAME).clone();

        tracing::info!("Powering off machine '{}'", name);
        let operation = match self
            .remote
            .clients
            .compute
            .begin_power_off(&resource_group, &name)
            .await
        {
            Ok(operation) => operation,
            Err(e) => return halt(state, e),
        };

        verdict(state, self.remote.wait(cancel, operation).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCloud;
    use bakeflow_cloud::{OperationState, OperationStatus};

    fn state() -> StateBag {
        let mut state = StateBag::new();
        state.put(RESOURCE_GROUP_NAME, "rg".to_string());
        state.put(COMPUTE_NAME, "bkvm1".to_string());
        state
    }

    #[tokio::test]
    async fn test_waits_for_deallocation() {
        let cloud = FakeCloud::new();
        cloud.script_status(vec![
            OperationStatus::new(OperationState::InProgress("Deallocating".into())),
            OperationStatus::succeeded(),
        ]);
        let mut state = state();

        let action = PowerOffCompute::new(cloud.remote())
            .run(&CancellationToken::new(), &mut state)
            .await;

        assert_eq!(action, StepAction::Continue);
        assert_eq!(cloud.status_checks(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cloud = FakeCloud::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut state = state();

        let action = PowerOffCompute::new(cloud.remote()).run(&cancel, &mut state).await;

        assert_eq!(action, StepAction::Cancelled);
        assert_eq!(cloud.status_checks(), 0);
    }
}
