use crate::keys::{
    DEPLOYMENT_NAME, DEPLOYMENT_RESOURCES_DELETED, IS_EXISTING_RESOURCE_GROUP,
    KEY_VAULT_DEPLOYMENT_NAME, RESOURCE_GROUP_DELETED, RESOURCE_GROUP_NAME,
};
use crate::remote::{Remote, verdict};
use crate::steps::deploy_template::delete_deployment_resources;
use async_trait::async_trait;
use bakeflow_step::{CancellationToken, StateBag, Step, StepAction, halt};

/// Tear down the build infrastructure once the image is captured.
///
/// A pipeline-owned group is deleted as a whole. In an existing group only
/// the resources created by the deployments are removed. Either way the
/// matching flag is set so the earlier steps' cleanups do not repeat the
/// work.
pub struct DeleteResourceGroup {
    remote: Remote,
}

impl DeleteResourceGroup {
    pub fn new(remote: Remote) -> Self {
        Self { remote }
    }

    async fn delete_deployments(&self, state: &StateBag) -> anyhow::Result<()> {
        let resource_group = state.get(RESOURCE_GROUP_NAME);
        let mut deployments = vec![state.get(DEPLOYMENT_NAME)];
        if let Some(key_vault) = state.get_opt(KEY_VAULT_DEPLOYMENT_NAME) {
            deployments.push(key_vault);
        }
        for deployment in deployments {
            tracing::info!(
                "Removing resources of deployment '{}' from resource group '{}'",
                deployment,
                resource_group
            );
            delete_deployment_resources(&self.remote, resource_group, deployment).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Step for DeleteResourceGroup {
    fn name(&self) -> &str {
        "delete-resource-group"
    }

    fn reads(&self) -> &[&'static str] {
        const READS: &[&str] = &[
            RESOURCE_GROUP_NAME.name(),
            DEPLOYMENT_NAME.name(),
            IS_EXISTING_RESOURCE_GROUP.name(),
        ];
        READS
    }

    async fn run(&self, cancel: &CancellationToken, state: &mut StateBag) -> StepAction {
        if state.flag(IS_EXISTING_RESOURCE_GROUP) {
            if let Err(e) = self.delete_deployments(state).await {
                return halt(state, e);
            }
            state.put(DEPLOYMENT_RESOURCES_DELETED, true);
            return StepAction::Continue;
        }

        let resource_group = state.get(RESOURCE_GROUP_NAME).clone();
        tracing::info!("Deleting resource group '{}'", resource_group);
        let operation = match self
            .remote
            .clients
            .resource_groups
            .begin_delete(&resource_group)
            .await
        {
            Ok(operation) => operation,
            Err(e) => return halt(state, e),
        };

        let action = verdict(state, self.remote.wait(cancel, operation).await);
        if action == StepAction::Continue {
            state.put(RESOURCE_GROUP_DELETED, true);
        }
        action
    }
}
