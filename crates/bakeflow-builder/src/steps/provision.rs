use crate::keys::{GUEST_CREDENTIAL_FILE, HOST};
use crate::provisioner::{ProvisionTarget, Provisioner};
use crate::remote::verdict;
use async_trait::async_trait;
use bakeflow_config::OsType;
use bakeflow_step::{CancellationToken, StateBag, Step, StepAction, run_interruptible};
use std::sync::Arc;

/// Hand the reachable guest to the provisioner.
pub struct Provision {
    provisioner: Arc<dyn Provisioner>,
    user_name: String,
    os_type: OsType,
}

impl Provision {
    pub fn new(provisioner: Arc<dyn Provisioner>, user_name: impl Into<String>, os_type: OsType) -> Self {
        Self {
            provisioner,
            user_name: user_name.into(),
            os_type,
        }
    }
}

#[async_trait]
impl Step for Provision {
    fn name(&self) -> &str {
        "provision"
    }

    fn reads(&self) -> &[&'static str] {
        const READS: &[&str] = &[HOST.name()];
        READS
    }

    async fn run(&self, cancel: &CancellationToken, state: &mut StateBag) -> StepAction {
        let target = ProvisionTarget {
            host: state.get(HOST).clone(),
            user_name: self.user_name.clone(),
            os_type: self.os_type,
            credential_file: state.get_opt(GUEST_CREDENTIAL_FILE).cloned(),
        };

        tracing::info!("Provisioning {} guest at {}", self.os_type, target.host);
        let provisioner = self.provisioner.clone();
        let outcome =
            run_interruptible(cancel, move |token| async move { provisioner.provision(token, target).await })
                .await;
        verdict(state, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        targets: Mutex<Vec<ProvisionTarget>>,
        fail: bool,
    }

    #[async_trait]
    impl Provisioner for Recorder {
        async fn provision(&self, _cancel: CancellationToken, target: ProvisionTarget) -> anyhow::Result<()> {
            self.targets.lock().unwrap().push(target);
            if self.fail {
                anyhow::bail!("guest unreachable");
            }
            Ok(())
        }
    }

    struct Slow;

    #[async_trait]
    impl Provisioner for Slow {
        async fn provision(&self, cancel: CancellationToken, _target: ProvisionTarget) -> anyhow::Result<()> {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(3600)) => Ok(()),
                _ = cancel.cancelled() => anyhow::bail!("stopped"),
            }
        }
    }

    fn state() -> StateBag {
        let mut state = StateBag::new();
        state.put(HOST, "52.0.0.10".to_string());
        state
    }

    #[tokio::test]
    async fn test_passes_host_to_provisioner() {
        let recorder = Arc::new(Recorder::default());
        let step = Provision::new(recorder.clone(), "bakeflow", OsType::Linux);
        let mut state = state();

        assert_eq!(step.run(&CancellationToken::new(), &mut state).await, StepAction::Continue);

        let targets = recorder.targets.lock().unwrap();
        assert_eq!(targets[0].host, "52.0.0.10");
        assert_eq!(targets[0].user_name, "bakeflow");
        assert!(targets[0].credential_file.is_none());
    }

    #[tokio::test]
    async fn test_provisioner_failure_halts() {
        let recorder = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let step = Provision::new(recorder, "bakeflow", OsType::Linux);
        let mut state = state();

        assert_eq!(step.run(&CancellationToken::new(), &mut state).await, StepAction::Halt);
        assert!(
            state
                .get(bakeflow_step::ERROR)
                .to_string()
                .contains("guest unreachable")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_provisioning() {
        let step = Provision::new(Arc::new(Slow), "bakeflow", OsType::Windows);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let mut state = state();
        assert_eq!(step.run(&cancel, &mut state).await, StepAction::Cancelled);
    }
}
