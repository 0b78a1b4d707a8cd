use crate::keys::RESOURCE_GROUP_NAME;
use crate::remote::Remote;
use crate::template::DeploymentFactory;
use async_trait::async_trait;
use bakeflow_step::{CancellationToken, StateBag, StateKey, Step, StepAction, halt};

/// Ask the provider to validate a deployment before anything is created.
pub struct ValidateTemplate {
    remote: Remote,
    deployment_name: StateKey<String>,
    factory: DeploymentFactory,
    reads: [&'static str; 2],
}

impl ValidateTemplate {
    pub fn new(remote: Remote, deployment_name: StateKey<String>, factory: DeploymentFactory) -> Self {
        Self {
            remote,
            deployment_name,
            factory,
            reads: [RESOURCE_GROUP_NAME.name(), deployment_name.name()],
        }
    }
}

#[async_trait]
impl Step for ValidateTemplate {
    fn name(&self) -> &str {
        "validate-template"
    }

    fn reads(&self) -> &[&'static str] {
        &self.reads
    }

    async fn run(&self, _cancel: &CancellationToken, state: &mut StateBag) -> StepAction {
        let resource_group = state.get(RESOURCE_GROUP_NAME).clone();
        let deployment = state.get(self.deployment_name).clone();

        let spec = match (self.factory)(state) {
            Ok(spec) => spec,
            Err(e) => return halt(state, e.context("failed to build the deployment document")),
        };

        tracing::info!("Validating deployment template '{}'", deployment);
        match self
            .remote
            .clients
            .deployments
            .validate(&resource_group, &deployment, &spec)
            .await
        {
            Ok(()) => StepAction::Continue,
            Err(e) => halt(state, e),
        }
    }
}
