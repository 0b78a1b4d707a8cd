use crate::error::BuildError;
use crate::keys::{
    ADDITIONAL_DISKS, ADDITIONAL_DISKS_DELETED, COMPUTE_NAME, IS_EXISTING_RESOURCE_GROUP,
    IS_MANAGED_IMAGE, OS_DISK, OS_DISK_DELETED, RESOURCE_GROUP_NAME, VIRTUAL_MACHINE_ID,
};
use crate::remote::{Remote, verdict};
use async_trait::async_trait;
use bakeflow_step::{CancellationToken, MultiError, StateBag, Step, StepAction, TaskOutcome, halt};
use reqwest::Url;

/// Where a disk lives, as far as deleting it is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DiskTarget {
    Blob { container: String, blob: String },
    Managed { resource_group: String, name: String },
}

impl DiskTarget {
    /// A managed disk is deleted by name from the build resource group; a
    /// VHD is addressed by container and blob path taken from its URL.
    fn parse(disk: &str, managed: bool, resource_group: &str) -> Result<Self, BuildError> {
        if managed {
            let name = disk.rsplit('/').next().unwrap_or_default();
            if name.is_empty() {
                return Err(BuildError::InvalidBlobUrl(disk.to_string()));
            }
            return Ok(DiskTarget::Managed {
                resource_group: resource_group.to_string(),
                name: name.to_string(),
            });
        }

        let url = Url::parse(disk).map_err(|_| BuildError::InvalidBlobUrl(disk.to_string()))?;
        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.collect())
            .unwrap_or_default();
        match segments.split_first() {
            Some((container, rest)) if !container.is_empty() && !rest.is_empty() => {
                Ok(DiskTarget::Blob {
                    container: container.to_string(),
                    blob: rest.join("/"),
                })
            }
            _ => Err(BuildError::InvalidBlobUrl(disk.to_string())),
        }
    }
}

impl std::fmt::Display for DiskTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiskTarget::Blob { container, blob } => write!(f, "blob '{}/{}'", container, blob),
            DiskTarget::Managed {
                resource_group,
                name,
            } => write!(f, "managed disk '{}' in '{}'", name, resource_group),
        }
    }
}

/// Managed disks in a pipeline-owned group go away with the group.
fn skipped(state: &StateBag) -> bool {
    state.flag(IS_MANAGED_IMAGE) && !state.flag(IS_EXISTING_RESOURCE_GROUP)
}

fn targets(state: &StateBag, disks: &[String]) -> Result<Vec<DiskTarget>, BuildError> {
    let managed = state.flag(IS_MANAGED_IMAGE);
    let resource_group = state
        .get_opt(RESOURCE_GROUP_NAME)
        .map(String::as_str)
        .unwrap_or_default();
    disks
        .iter()
        .map(|disk| DiskTarget::parse(disk, managed, resource_group))
        .collect()
}

async fn delete(remote: &Remote, cancel: Option<&CancellationToken>, target: &DiskTarget) -> TaskOutcome {
    tracing::info!("Deleting {}", target);
    let operation = match target {
        DiskTarget::Blob { container, blob } => {
            return match remote.clients.storage.delete_blob(container, blob).await {
                Ok(()) => TaskOutcome::Completed,
                Err(e) => TaskOutcome::Failed(e.into()),
            };
        }
        DiskTarget::Managed {
            resource_group,
            name,
        } => remote.clients.compute.begin_delete_disk(resource_group, name).await,
    };
    let operation = match operation {
        Ok(operation) => operation,
        Err(e) => return TaskOutcome::Failed(e.into()),
    };
    match cancel {
        Some(cancel) => remote.wait(cancel, operation).await,
        None => match remote.complete(&operation).await {
            Ok(()) => TaskOutcome::Completed,
            Err(e) => TaskOutcome::Failed(e),
        },
    }
}

/// Delete every disk in order, stopping at the first failure.
async fn delete_all(
    remote: &Remote,
    cancel: &CancellationToken,
    state: &mut StateBag,
    disks: &[String],
) -> StepAction {
    let targets = match targets(state, disks) {
        Ok(targets) => targets,
        Err(e) => return halt(state, e),
    };
    for target in &targets {
        let action = verdict(state, delete(remote, Some(cancel), target).await);
        if action != StepAction::Continue {
            return action;
        }
    }
    StepAction::Continue
}

/// Best-effort retry used by the cleanups: every disk is attempted and all
/// failures are reported together.
async fn retry_all(remote: &Remote, state: &StateBag, disks: &[String]) -> anyhow::Result<()> {
    let mut errors = MultiError::new();
    for disk in disks {
        let target = match targets(state, std::slice::from_ref(disk)) {
            Ok(mut parsed) => parsed.remove(0),
            Err(e) => {
                errors.push(e);
                continue;
            }
        };
        if let TaskOutcome::Failed(e) = delete(remote, None, &target).await {
            tracing::warn!("Failed to delete {}: {:#}", target, e);
            errors.push(e);
        }
    }
    errors.into_result()
}

/// Disks of the build VM that no step has deleted yet.
///
/// Found from state when the disk lookup step ran, otherwise by asking the
/// provider for the VM. VHD blobs live outside every resource group and
/// managed disks in a kept group are not part of the deployment, so both
/// have to be removed explicitly when the build stops early.
#[derive(Debug, Default)]
pub(crate) struct LeftoverDisks {
    pub(crate) vm_id: Option<String>,
    os_disk: Option<String>,
    additional: Vec<String>,
}

impl LeftoverDisks {
    pub(crate) async fn find(remote: &Remote, state: &StateBag) -> anyhow::Result<Self> {
        let want_os = !state.flag(OS_DISK_DELETED);
        let want_additional = !state.flag(ADDITIONAL_DISKS_DELETED);
        if skipped(state) || !(want_os || want_additional) {
            return Ok(Self::default());
        }

        if let Some(os_disk) = state.get_opt(OS_DISK) {
            return Ok(Self {
                vm_id: state.get_opt(VIRTUAL_MACHINE_ID).cloned(),
                os_disk: want_os.then(|| os_disk.clone()),
                additional: match state.get_opt(ADDITIONAL_DISKS) {
                    Some(disks) if want_additional => disks.clone(),
                    _ => Vec::new(),
                },
            });
        }

        let (Some(resource_group), Some(name)) =
            (state.get_opt(RESOURCE_GROUP_NAME), state.get_opt(COMPUTE_NAME))
        else {
            return Ok(Self::default());
        };
        let vm = match remote
            .clients
            .compute
            .get_virtual_machine(resource_group, name)
            .await
        {
            Ok(vm) => vm,
            Err(e) if e.is_not_found() => {
                tracing::debug!("Virtual machine '{}' was never created", name);
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            os_disk: vm
                .os_disk
                .location()
                .filter(|_| want_os)
                .map(str::to_string),
            additional: vm
                .data_disks
                .iter()
                .filter(|_| want_additional)
                .filter_map(|d| d.location().map(str::to_string))
                .collect(),
            vm_id: Some(vm.id),
        })
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.os_disk.is_none() && self.additional.is_empty()
    }

    /// Delete what is left, recording each kind as deleted once it is gone.
    pub(crate) async fn delete(self, remote: &Remote, state: &mut StateBag) -> anyhow::Result<()> {
        let mut errors = MultiError::new();
        if let Some(disk) = self.os_disk {
            match retry_all(remote, state, &[disk]).await {
                Ok(()) => state.put(OS_DISK_DELETED, true),
                Err(e) => errors.push(e),
            }
        }
        if !self.additional.is_empty() {
            match retry_all(remote, state, &self.additional).await {
                Ok(()) => state.put(ADDITIONAL_DISKS_DELETED, true),
                Err(e) => errors.push(e),
            }
        }
        errors.into_result()
    }
}

/// Delete the VM's OS disk once the image no longer needs it.
pub struct DeleteOsDisk {
    remote: Remote,
}

impl DeleteOsDisk {
    pub fn new(remote: Remote) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl Step for DeleteOsDisk {
    fn name(&self) -> &str {
        "delete-os-disk"
    }

    fn reads(&self) -> &[&'static str] {
        const READS: &[&str] = &[
            OS_DISK.name(),
            IS_MANAGED_IMAGE.name(),
            IS_EXISTING_RESOURCE_GROUP.name(),
        ];
        READS
    }

    async fn run(&self, cancel: &CancellationToken, state: &mut StateBag) -> StepAction {
        if skipped(state) {
            tracing::info!("OS disk is removed with the resource group, skipping");
            return StepAction::Continue;
        }
        let disk = state.get(OS_DISK).clone();
        let action = delete_all(&self.remote, cancel, state, std::slice::from_ref(&disk)).await;
        if action == StepAction::Continue {
            state.put(OS_DISK_DELETED, true);
        }
        action
    }

    async fn cleanup(&self, state: &mut StateBag) -> anyhow::Result<()> {
        if skipped(state) || state.flag(OS_DISK_DELETED) {
            return Ok(());
        }
        let Some(disk) = state.get_opt(OS_DISK).cloned() else {
            return Ok(());
        };
        retry_all(&self.remote, state, &[disk]).await?;
        state.put(OS_DISK_DELETED, true);
        Ok(())
    }
}

/// Delete the VM's data disks.
pub struct DeleteAdditionalDisks {
    remote: Remote,
}

impl DeleteAdditionalDisks {
    pub fn new(remote: Remote) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl Step for DeleteAdditionalDisks {
    fn name(&self) -> &str {
        "delete-additional-disks"
    }

    fn reads(&self) -> &[&'static str] {
        const READS: &[&str] = &[
            ADDITIONAL_DISKS.name(),
            IS_MANAGED_IMAGE.name(),
            IS_EXISTING_RESOURCE_GROUP.name(),
        ];
        READS
    }

    async fn run(&self, cancel: &CancellationToken, state: &mut StateBag) -> StepAction {
        if skipped(state) {
            tracing::info!("Additional disks are removed with the resource group, skipping");
            return StepAction::Continue;
        }
        let disks = state.get(ADDITIONAL_DISKS).clone();
        if disks.is_empty() {
            return StepAction::Continue;
        }
        let action = delete_all(&self.remote, cancel, state, &disks).await;
        if action == StepAction::Continue {
            state.put(ADDITIONAL_DISKS_DELETED, true);
        }
        action
    }

    async fn cleanup(&self, state: &mut StateBag) -> anyhow::Result<()> {
        if skipped(state) || state.flag(ADDITIONAL_DISKS_DELETED) {
            return Ok(());
        }
        let disks = match state.get_opt(ADDITIONAL_DISKS) {
            Some(disks) if !disks.is_empty() => disks.clone(),
            _ => return Ok(()),
        };
        retry_all(&self.remote, state, &disks).await?;
        state.put(ADDITIONAL_DISKS_DELETED, true);
        Ok(())
    }
}
