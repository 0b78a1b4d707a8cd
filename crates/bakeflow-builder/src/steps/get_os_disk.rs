use crate::keys::{ADDITIONAL_DISKS, COMPUTE_NAME, OS_DISK, RESOURCE_GROUP_NAME, VIRTUAL_MACHINE_ID};
use crate::remote::Remote;
use async_trait::async_trait;
use bakeflow_step::{CancellationToken, StateBag, Step, StepAction, halt};

/// Record where the VM's disks live so they can be snapshotted and deleted.
pub struct GetOsDisk {
    remote: Remote,
}

impl GetOsDisk {
    pub fn new(remote: Remote) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl Step for GetOsDisk {
    fn name(&self) -> &str {
        "get-os-disk"
    }

    fn reads(&self) -> &[&'static str] {
        const READS: &[&str] = &[RESOURCE_GROUP_NAME.name(), COMPUTE_NAME.name()];
        READS
    }

    fn writes(&self) -> &[&'static str] {
        const WRITES: &[&str] = &[
            OS_DISK.name(),
            ADDITIONAL_DISKS.name(),
            VIRTUAL_MACHINE_ID.name(),
        ];
        WRITES
    }

    async fn run(&self, _cancel: &CancellationToken, state: &mut StateBag) -> StepAction {
        let resource_group = state.get(RESOURCE_GROUP_NAME).clone();
        let name = state.get(COMPUTE_NAME).clone();

        tracing::info!("Querying the machine's properties");
        let vm = match self
            .remote
            .clients
            .compute
            .get_virtual_machine(&resource_group, &name)
            .await
        {
            Ok(vm) => vm,
            Err(e) => return halt(state, e),
        };

        let Some(os_disk) = vm.os_disk.location().map(str::to_string) else {
            return halt(
                state,
                anyhow::anyhow!("virtual machine '{}' reports no OS disk", name),
            );
        };
        let additional: Vec<String> = vm
            .data_disks
            .iter()
            .filter_map(|d| d.location().map(str::to_string))
            .collect();

        tracing::info!(" -> OS disk: {}", os_disk);
        for disk in &additional {
            tracing::info!(" -> additional disk: {}", disk);
        }

        state.put(OS_DISK, os_disk);
        state.put(ADDITIONAL_DISKS, additional);
        state.put(VIRTUAL_MACHINE_ID, vm.id);
        StepAction::Continue
    }
}
