use crate::keys::{LOCATION, MANAGED_IMAGE_RESOURCE_GROUP, OS_DISK, SNAPSHOT_ID, TAGS};
use crate::remote::{Remote, verdict};
use async_trait::async_trait;
use bakeflow_cloud::SnapshotSpec;
use bakeflow_step::{CancellationToken, StateBag, Step, StepAction, halt};

/// Snapshot the managed OS disk next to the managed image. Does nothing
/// unless a snapshot name is configured.
pub struct SnapshotOsDisk {
    remote: Remote,
    snapshot_name: Option<String>,
}

impl SnapshotOsDisk {
    pub fn new(remote: Remote, snapshot_name: Option<String>) -> Self {
        Self {
            remote,
            snapshot_name,
        }
    }
}

#[async_trait]
impl Step for SnapshotOsDisk {
    fn name(&self) -> &str {
        "snapshot-os-disk"
    }

    fn reads(&self) -> &[&'static str] {
        const READS: &[&str] = &[
            OS_DISK.name(),
            LOCATION.name(),
            MANAGED_IMAGE_RESOURCE_GROUP.name(),
            TAGS.name(),
        ];
        if self.snapshot_name.is_some() { READS } else { &[] }
    }

    fn writes(&self) -> &[&'static str] {
        const WRITES: &[&str] = &[SNAPSHOT_ID.name()];
        if self.snapshot_name.is_some() { WRITES } else { &[] }
    }

    async fn run(&self, cancel: &CancellationToken, state: &mut StateBag) -> StepAction {
        let Some(snapshot_name) = &self.snapshot_name else {
            return StepAction::Continue;
        };
        let resource_group = state.get(MANAGED_IMAGE_RESOURCE_GROUP).clone();
        let spec = SnapshotSpec {
            location: state.get(LOCATION).clone(),
            source_resource_id: state.get(OS_DISK).clone(),
            tags: state.get(TAGS).clone(),
        };

        tracing::info!(
            "Snapshotting OS disk into '{}' in resource group '{}'",
            snapshot_name,
            resource_group
        );
        let operation = match self
            .remote
            .clients
            .compute
            .begin_create_snapshot(&resource_group, snapshot_name, &spec)
            .await
        {
            Ok(operation) => operation,
            Err(e) => return halt(state, e),
        };

        let action = verdict(state, self.remote.wait(cancel, operation).await);
        if action == StepAction::Continue {
            state.put(
                SNAPSHOT_ID,
                format!(
                    "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/snapshots/{}",
                    self.remote.clients.subscription_id, resource_group, snapshot_name
                ),
            );
        }
        action
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCloud;
    use bakeflow_cloud::Tags;

    fn state() -> StateBag {
        let mut state = StateBag::new();
        state.put(
            OS_DISK,
            "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Compute/disks/bkos1"
                .to_string(),
        );
        state.put(LOCATION, "westus".to_string());
        state.put(MANAGED_IMAGE_RESOURCE_GROUP, "images".to_string());
        state.put(TAGS, Tags::new());
        state
    }

    #[tokio::test]
    async fn test_disabled_is_a_noop() {
        let cloud = FakeCloud::new();
        let step = SnapshotOsDisk::new(cloud.remote(), None);
        let mut state = StateBag::new();

        assert_eq!(step.run(&CancellationToken::new(), &mut state).await, StepAction::Continue);
        assert!(cloud.calls().is_empty());
        assert!(step.reads().is_empty());
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn test_creates_snapshot_from_os_disk() {
        let cloud = FakeCloud::new();
        let step = SnapshotOsDisk::new(cloud.remote(), Some("golden-os".into()));
        let mut state = state();

        assert_eq!(step.run(&CancellationToken::new(), &mut state).await, StepAction::Continue);
        assert_eq!(
            cloud.calls_to("create_snapshot"),
            vec![
                "create_snapshot images golden-os /subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Compute/disks/bkos1"
            ]
        );
        assert_eq!(
            state.get(SNAPSHOT_ID),
            "/subscriptions/sub-1/resourceGroups/images/providers/Microsoft.Compute/snapshots/golden-os"
        );
    }

    #[tokio::test]
    async fn test_failure_halts() {
        let cloud = FakeCloud::new();
        cloud.fail_on("create_snapshot");
        let step = SnapshotOsDisk::new(cloud.remote(), Some("golden-os".into()));
        let mut state = state();

        assert_eq!(step.run(&CancellationToken::new(), &mut state).await, StepAction::Halt);
        assert!(!state.contains(SNAPSHOT_ID));
    }
}
