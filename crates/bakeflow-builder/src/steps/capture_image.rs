use crate::keys::{
    CAPTURE_PARAMETERS, CAPTURE_TEMPLATE, COMPUTE_NAME, IS_MANAGED_IMAGE, MANAGED_IMAGE_ID,
    MANAGED_IMAGE_LOCATION, MANAGED_IMAGE_NAME, MANAGED_IMAGE_RESOURCE_GROUP, RESOURCE_GROUP_NAME,
    TAGS, VIRTUAL_MACHINE_ID,
};
use crate::remote::{Remote, verdict};
use async_trait::async_trait;
use bakeflow_cloud::{ManagedImageSpec, PendingOperation};
use bakeflow_step::{CancellationToken, StateBag, Step, StepAction, TaskOutcome, halt};

/// Generalize the VM and turn it into an image.
///
/// Generalization cannot be undone: once it has run, the VM can only be
/// captured or deleted. The output is either a managed image or, for VHD
/// builds, a capture into the storage account whose template is kept in
/// state for the artifact.
pub struct CaptureImage {
    remote: Remote,
    zone_resilient: bool,
}

impl CaptureImage {
    pub fn new(remote: Remote, zone_resilient: bool) -> Self {
        Self {
            remote,
            zone_resilient,
        }
    }

    async fn begin_managed(&self, state: &StateBag) -> bakeflow_cloud::Result<(PendingOperation, String)> {
        let resource_group = state.get(MANAGED_IMAGE_RESOURCE_GROUP);
        let name = state.get(MANAGED_IMAGE_NAME);
        let spec = ManagedImageSpec {
            location: state.get(MANAGED_IMAGE_LOCATION).clone(),
            source_vm_id: state.get(VIRTUAL_MACHINE_ID).clone(),
            zone_resilient: self.zone_resilient,
            tags: state.get(TAGS).clone(),
        };

        tracing::info!(
            "Capturing image as managed image '{}' in resource group '{}'",
            name,
            resource_group
        );
        let operation = self
            .remote
            .clients
            .compute
            .begin_create_image(resource_group, name, &spec)
            .await?;
        let id = format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/images/{}",
            self.remote.clients.subscription_id, resource_group, name
        );
        Ok((operation, id))
    }
}

#[async_trait]
impl Step for CaptureImage {
    fn name(&self) -> &str {
        "capture-image"
    }

    fn reads(&self) -> &[&'static str] {
        const READS: &[&str] = &[
            RESOURCE_GROUP_NAME.name(),
            COMPUTE_NAME.name(),
            IS_MANAGED_IMAGE.name(),
            VIRTUAL_MACHINE_ID.name(),
        ];
        READS
    }

    /// One of the two, depending on the output kind
    fn writes(&self) -> &[&'static str] {
        const WRITES: &[&str] = &[MANAGED_IMAGE_ID.name(), CAPTURE_TEMPLATE.name()];
        WRITES
    }

    async fn run(&self, cancel: &CancellationToken, state: &mut StateBag) -> StepAction {
        let resource_group = state.get(RESOURCE_GROUP_NAME).clone();
        let name = state.get(COMPUTE_NAME).clone();

        tracing::info!("Generalizing machine '{}'", name);
        if let Err(e) = self
            .remote
            .clients
            .compute
            .generalize(&resource_group, &name)
            .await
        {
            return halt(state, e);
        }

        if state.flag(IS_MANAGED_IMAGE) {
            let (operation, id) = match self.begin_managed(state).await {
                Ok(started) => started,
                Err(e) => return halt(state, e),
            };
            let action = verdict(state, self.remote.wait(cancel, operation).await);
            if action == StepAction::Continue {
                tracing::info!("Managed image '{}' created", id);
                state.put(MANAGED_IMAGE_ID, id);
            }
            return action;
        }

        let Some(parameters) = state.get_opt(CAPTURE_PARAMETERS).cloned() else {
            return halt(state, anyhow::anyhow!("no capture destination was configured"));
        };
        tracing::info!(
            "Capturing image into container '{}' with prefix '{}'",
            parameters.destination_container_name,
            parameters.vhd_prefix
        );
        let operation = match self
            .remote
            .clients
            .compute
            .begin_capture(&resource_group, &name, &parameters)
            .await
        {
            Ok(operation) => operation,
            Err(e) => return halt(state, e),
        };

        match self.remote.wait(cancel, operation.clone()).await {
            TaskOutcome::Completed => {}
            other => return verdict(state, other),
        }

        match self.remote.clients.capture_template(&operation).await {
            Ok(Some(template)) if template.os_disk_image_uri().is_some() => {
                state.put(CAPTURE_TEMPLATE, template);
                StepAction::Continue
            }
            Ok(_) => halt(
                state,
                anyhow::anyhow!("the capture operation did not return a template"),
            ),
            Err(e) => halt(state, e.context("failed to read the capture template")),
        }
    }
}
