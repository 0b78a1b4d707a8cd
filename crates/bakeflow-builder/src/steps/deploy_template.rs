use crate::keys::{
    DEPLOYMENT_RESOURCES_DELETED, IS_EXISTING_RESOURCE_GROUP, RESOURCE_GROUP_DELETED,
    RESOURCE_GROUP_NAME,
};
use crate::remote::{Remote, verdict};
use crate::steps::delete_disks::LeftoverDisks;
use crate::template::DeploymentFactory;
use async_trait::async_trait;
use bakeflow_cloud::DeploymentOperation;
use bakeflow_step::{CancellationToken, MultiError, StateBag, StateKey, Step, StepAction, halt};

const VIRTUAL_MACHINE_TYPE: &str = "Microsoft.Compute/virtualMachines";

/// Submit a deployment and wait for it to finish.
///
/// Inside a pipeline-owned group the group deletion removes the deployed
/// resources, so the cleanup only deletes them itself when building in an
/// existing group: the resources the deployment created, then the
/// deployment record.
///
/// The deployment of the build VM also releases the VM's disks that no disk
/// step got to, looked up before the VM goes away.
pub struct DeployTemplate {
    remote: Remote,
    deployment_name: StateKey<String>,
    factory: DeploymentFactory,
    reads: [&'static str; 2],
    vm_disks: bool,
}

impl DeployTemplate {
    pub fn new(remote: Remote, deployment_name: StateKey<String>, factory: DeploymentFactory) -> Self {
        Self {
            remote,
            deployment_name,
            factory,
            reads: [RESOURCE_GROUP_NAME.name(), deployment_name.name()],
            vm_disks: false,
        }
    }

    /// Also delete the build VM's leftover disks on cleanup.
    pub fn with_vm_disks(mut self) -> Self {
        self.vm_disks = true;
        self
    }
}

#[async_trait]
impl Step for DeployTemplate {
    fn name(&self) -> &str {
        "deploy-template"
    }

    fn reads(&self) -> &[&'static str] {
        &self.reads
    }

    async fn run(&self, cancel: &CancellationToken, state: &mut StateBag) -> StepAction {
        let resource_group = state.get(RESOURCE_GROUP_NAME).clone();
        let deployment = state.get(self.deployment_name).clone();

        let spec = match (self.factory)(state) {
            Ok(spec) => spec,
            Err(e) => return halt(state, e.context("failed to build the deployment document")),
        };

        tracing::info!("Deploying deployment template '{}'", deployment);
        let operation = match self
            .remote
            .clients
            .deployments
            .begin_create(&resource_group, &deployment, &spec)
            .await
        {
            Ok(operation) => operation,
            Err(e) => return halt(state, e),
        };

        let outcome = self.remote.wait(cancel, operation).await;
        verdict(state, outcome)
    }

    async fn cleanup(&self, state: &mut StateBag) -> anyhow::Result<()> {
        let mut errors = MultiError::new();
        let leftovers = if self.vm_disks {
            LeftoverDisks::find(&self.remote, state)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!("Failed to look up the machine's disks: {:#}", e);
                    errors.push(e);
                    LeftoverDisks::default()
                })
        } else {
            LeftoverDisks::default()
        };

        if state.flag(IS_EXISTING_RESOURCE_GROUP) {
            if !state.flag(DEPLOYMENT_RESOURCES_DELETED) {
                let resource_group = state.get(RESOURCE_GROUP_NAME).clone();
                let deployment = state.get(self.deployment_name).clone();
                if let Err(e) =
                    delete_deployment_resources(&self.remote, &resource_group, &deployment).await
                {
                    errors.push(e);
                }
            }
        } else if !leftovers.is_empty() && !state.flag(RESOURCE_GROUP_DELETED) {
            // a VHD stays leased while the VM holds it
            if let Some(vm_id) = &leftovers.vm_id {
                if let Err(e) = delete_virtual_machine(&self.remote, vm_id).await {
                    tracing::warn!("Failed to delete '{}': {:#}", vm_id, e);
                    errors.push(e);
                }
            }
        }

        if !leftovers.is_empty() {
            if let Err(e) = leftovers.delete(&self.remote, state).await {
                errors.push(e);
            }
        }
        errors.into_result()
    }
}

async fn delete_virtual_machine(remote: &Remote, vm_id: &str) -> anyhow::Result<()> {
    tracing::info!("Deleting {} '{}'", VIRTUAL_MACHINE_TYPE, vm_id);
    let operation = remote
        .clients
        .resources
        .begin_delete_by_id(vm_id, VIRTUAL_MACHINE_TYPE)
        .await?;
    remote.complete(&operation).await
}

/// Delete what a deployment created, virtual machine first, then the
/// deployment record itself.
///
/// Every resource is attempted even when an earlier one fails. A deployment
/// the provider no longer knows counts as already cleaned up.
pub async fn delete_deployment_resources(
    remote: &Remote,
    resource_group: &str,
    deployment: &str,
) -> anyhow::Result<()> {
    let operations = match remote
        .clients
        .deployments
        .list_operations(resource_group, deployment)
        .await
    {
        Ok(operations) => operations,
        Err(e) if e.is_not_found() => {
            tracing::debug!("Deployment '{}' not found, nothing to delete", deployment);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let mut errors = MultiError::new();
    for (id, resource_type) in deletion_order(&operations) {
        tracing::info!("Deleting {} '{}'", resource_type, id);
        let result = async {
            let operation = remote
                .clients
                .resources
                .begin_delete_by_id(id, resource_type)
                .await?;
            remote.complete(&operation).await
        }
        .await;
        if let Err(e) = result {
            tracing::warn!("Failed to delete '{}': {:#}", id, e);
            errors.push(e);
        }
    }

    let result = async {
        let operation = remote
            .clients
            .deployments
            .begin_delete(resource_group, deployment)
            .await?;
        remote.complete(&operation).await
    }
    .await;
    if let Err(e) = result {
        errors.push(e);
    }

    errors.into_result()
}

/// Resources created by the deployment, virtual machines first so that the
/// disks and network interfaces they hold are released.
fn deletion_order(operations: &[DeploymentOperation]) -> Vec<(&str, &str)> {
    let mut targets: Vec<(&str, &str)> = operations
        .iter()
        .filter(|op| op.is_create())
        .filter_map(|op| op.target_resource.as_ref())
        .map(|target| (target.id.as_str(), target.resource_type.as_str()))
        .collect();
    targets.sort_by_key(|(_, resource_type)| !resource_type.eq_ignore_ascii_case(VIRTUAL_MACHINE_TYPE));
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{
        ADDITIONAL_DISKS_DELETED, COMPUTE_NAME, DEPLOYMENT_NAME, IS_MANAGED_IMAGE, OS_DISK_DELETED,
    };
    use crate::testing::{FakeCloud, create_operation, managed_vm, vhd_vm};
    use bakeflow_cloud::{DeploymentSpec, ErrorResponse, OperationStatus};
    use bakeflow_step::ERROR;
    use std::sync::Arc;

    fn state(existing: bool) -> StateBag {
        let mut state = StateBag::new();
        state.put(RESOURCE_GROUP_NAME, "rg".to_string());
        state.put(DEPLOYMENT_NAME, "bkdp1".to_string());
        state.put(IS_EXISTING_RESOURCE_GROUP, existing);
        state
    }

    fn step(cloud: &FakeCloud) -> DeployTemplate {
        let factory: DeploymentFactory = Arc::new(|_| {
            Ok(DeploymentSpec::new(
                serde_json::json!({"resources": []}),
                serde_json::json!({}),
            ))
        });
        DeployTemplate::new(cloud.remote(), DEPLOYMENT_NAME, factory)
    }

    #[tokio::test]
    async fn test_deploys_and_waits() {
        let cloud = FakeCloud::new();
        let mut state = state(false);

        let action = step(&cloud).run(&CancellationToken::new(), &mut state).await;

        assert_eq!(action, StepAction::Continue);
        assert_eq!(cloud.calls(), vec!["deploy rg bkdp1", "status"]);
    }

    #[tokio::test]
    async fn test_failed_deployment_halts_with_nested_error() {
        let cloud = FakeCloud::new();
        cloud.script_status(vec![OperationStatus::failed(ErrorResponse::new(
            "DeploymentFailed",
            "At least one resource deployment operation failed.",
        ))]);
        let mut state = state(false);

        let action = step(&cloud).run(&CancellationToken::new(), &mut state).await;

        assert_eq!(action, StepAction::Halt);
        assert!(state.get(ERROR).to_string().contains("DeploymentFailed"));
    }

    #[tokio::test]
    async fn test_cleanup_in_owned_group_is_noop() {
        let cloud = FakeCloud::new();
        cloud.set_deployment_operations(vec![create_operation(VIRTUAL_MACHINE_TYPE, "bkvm1")]);
        let mut state = state(false);

        step(&cloud).cleanup(&mut state).await.unwrap();
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_in_existing_group_deletes_vm_first() {
        let cloud = FakeCloud::new();
        cloud.set_deployment_operations(vec![
            create_operation("Microsoft.Network/publicIPAddresses", "bkip1"),
            create_operation("Microsoft.Network/networkInterfaces", "bkni1"),
            create_operation(VIRTUAL_MACHINE_TYPE, "bkvm1"),
        ]);
        let mut state = state(true);

        step(&cloud).cleanup(&mut state).await.unwrap();

        let deletes = cloud.calls_to("delete_resource");
        assert_eq!(deletes.len(), 3);
        assert!(deletes[0].ends_with("/bkvm1"));
        assert!(deletes[1].ends_with("/bkip1"));
        let calls = cloud.calls();
        let record = calls.iter().position(|c| c == "delete_deployment rg bkdp1").unwrap();
        let last_resource = calls.iter().rposition(|c| c.starts_with("delete_resource")).unwrap();
        assert!(record > last_resource);
    }

    #[tokio::test]
    async fn test_cleanup_continues_past_failures() {
        let cloud = FakeCloud::new();
        cloud.set_deployment_operations(vec![
            create_operation(VIRTUAL_MACHINE_TYPE, "bkvm1"),
            create_operation("Microsoft.Network/networkInterfaces", "bkni1"),
        ]);
        cloud.fail_on("delete_resource");
        let mut state = state(true);

        let err = step(&cloud).cleanup(&mut state).await.unwrap_err();

        assert!(err.to_string().contains("2 errors"));
        assert_eq!(cloud.calls_to("delete_resource").len(), 2);
        assert_eq!(cloud.calls_to("delete_deployment").len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_skipped_after_teardown() {
        let cloud = FakeCloud::new();
        let mut state = state(true);
        state.put(DEPLOYMENT_RESOURCES_DELETED, true);

        step(&cloud).cleanup(&mut state).await.unwrap();
        assert!(cloud.calls().is_empty());
    }

    fn vm_state(managed: bool, existing: bool) -> StateBag {
        let mut state = state(existing);
        state.put(COMPUTE_NAME, "bkvm1".to_string());
        state.put(IS_MANAGED_IMAGE, managed);
        state
    }

    #[tokio::test]
    async fn test_cleanup_releases_vhd_blobs_after_the_vm() {
        let cloud = FakeCloud::new();
        cloud.set_vm(vhd_vm());
        let mut state = vm_state(false, false);

        step(&cloud).with_vm_disks().cleanup(&mut state).await.unwrap();

        let calls = cloud.calls();
        assert_eq!(calls[0], "get_vm rg bkvm1");
        let vm = calls
            .iter()
            .position(|c| c.starts_with("delete_resource Microsoft.Compute/virtualMachines"))
            .unwrap();
        let first_blob = calls.iter().position(|c| c.starts_with("delete_blob")).unwrap();
        assert!(vm < first_blob);
        assert_eq!(
            cloud.calls_to("delete_blob"),
            vec!["delete_blob images bkos1.vhd", "delete_blob images bkos1-data0.vhd"]
        );
        assert!(state.flag(OS_DISK_DELETED));
    }

    #[tokio::test]
    async fn test_cleanup_in_existing_group_deletes_managed_os_disk() {
        let cloud = FakeCloud::new();
        cloud.set_vm(managed_vm());
        cloud.set_deployment_operations(vec![create_operation(VIRTUAL_MACHINE_TYPE, "bkvm1")]);
        let mut state = vm_state(true, true);

        step(&cloud).with_vm_disks().cleanup(&mut state).await.unwrap();

        let calls = cloud.calls();
        let record = calls.iter().position(|c| c == "delete_deployment rg bkdp1").unwrap();
        let disk = calls.iter().position(|c| c == "delete_disk rg bkos1").unwrap();
        assert!(record < disk);
        assert_eq!(cloud.calls_to("delete_resource").len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_leaves_disks_another_step_deleted() {
        let cloud = FakeCloud::new();
        cloud.set_vm(vhd_vm());
        let mut state = vm_state(false, false);
        state.put(OS_DISK_DELETED, true);
        state.put(ADDITIONAL_DISKS_DELETED, true);

        step(&cloud).with_vm_disks().cleanup(&mut state).await.unwrap();
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_without_vm_deletes_nothing() {
        let cloud = FakeCloud::new();
        let mut state = vm_state(false, false);

        step(&cloud).with_vm_disks().cleanup(&mut state).await.unwrap();
        assert_eq!(cloud.calls(), vec!["get_vm rg bkvm1"]);
    }
}
