use crate::error::BuildError;
use crate::keys::{
    IS_EXISTING_RESOURCE_GROUP, IS_RESOURCE_GROUP_CREATED, LOCATION, RESOURCE_GROUP_DELETED,
    RESOURCE_GROUP_NAME, TAGS,
};
use crate::remote::Remote;
use async_trait::async_trait;
use bakeflow_step::{CancellationToken, StateBag, Step, StepAction, halt};

/// Make sure the build resource group exists, creating it when absent.
///
/// A group that already exists is never modified and never deleted by this
/// step. When the configuration declared an existing group
/// (`IS_EXISTING_RESOURCE_GROUP` already set) it must be there.
pub struct CreateResourceGroup {
    remote: Remote,
}

impl CreateResourceGroup {
    pub fn new(remote: Remote) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl Step for CreateResourceGroup {
    fn name(&self) -> &str {
        "create-resource-group"
    }

    fn reads(&self) -> &[&'static str] {
        const READS: &[&str] = &[RESOURCE_GROUP_NAME.name(), TAGS.name()];
        READS
    }

    fn writes(&self) -> &[&'static str] {
        const WRITES: &[&str] = &[
            LOCATION.name(),
            IS_RESOURCE_GROUP_CREATED.name(),
            IS_EXISTING_RESOURCE_GROUP.name(),
        ];
        WRITES
    }

    async fn run(&self, _cancel: &CancellationToken, state: &mut StateBag) -> StepAction {
        let name = state.get(RESOURCE_GROUP_NAME).clone();
        let groups = &self.remote.clients.resource_groups;

        let exists = match groups.exists(&name).await {
            Ok(exists) => exists,
            Err(e) => return halt(state, e),
        };

        if exists {
            tracing::info!("Using existing resource group '{}'", name);
            let location = match groups.location(&name).await {
                Ok(location) => location,
                Err(e) => return halt(state, e),
            };
            state.put(LOCATION, location);
            state.put(IS_RESOURCE_GROUP_CREATED, false);
            state.put(IS_EXISTING_RESOURCE_GROUP, true);
            return StepAction::Continue;
        }

        if state.flag(IS_EXISTING_RESOURCE_GROUP) {
            return halt(state, BuildError::ResourceGroupNotFound(name));
        }

        let Some(location) = state.get_opt(LOCATION).cloned() else {
            return halt(
                state,
                BuildError::InvalidConfig(format!(
                    "no location to create resource group '{}' in",
                    name
                )),
            );
        };

        tracing::info!("Creating resource group '{}' in {}", name, location);
        let tags = state.get(TAGS).clone();
        if let Err(e) = groups.create_or_update(&name, &location, &tags).await {
            return halt(state, e);
        }

        state.put(IS_RESOURCE_GROUP_CREATED, true);
        state.put(IS_EXISTING_RESOURCE_GROUP, false);
        StepAction::Continue
    }

    async fn cleanup(&self, state: &mut StateBag) -> anyhow::Result<()> {
        if !state.flag(IS_RESOURCE_GROUP_CREATED) || state.flag(RESOURCE_GROUP_DELETED) {
            return Ok(());
        }
        let name = state.get(RESOURCE_GROUP_NAME).clone();

        tracing::info!("Deleting resource group '{}'", name);
        let operation = self.remote.clients.resource_groups.begin_delete(&name).await?;
        self.remote.complete(&operation).await?;
        state.put(RESOURCE_GROUP_DELETED, true);
        tracing::info!("Resource group '{}' has been deleted", name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCloud;
    use bakeflow_cloud::Tags;
    use bakeflow_step::ERROR;

    fn state() -> StateBag {
        let mut state = StateBag::new();
        state.put(RESOURCE_GROUP_NAME, "bakeflow-Resource-Group-abc".to_string());
        state.put(LOCATION, "westus".to_string());
        state.put(TAGS, Tags::new());
        state
    }

    #[tokio::test]
    async fn test_creates_missing_group() {
        let cloud = FakeCloud::new();
        let step = CreateResourceGroup::new(cloud.remote());
        let mut state = state();

        let action = step.run(&CancellationToken::new(), &mut state).await;

        assert_eq!(action, StepAction::Continue);
        assert!(state.flag(IS_RESOURCE_GROUP_CREATED));
        assert!(!state.flag(IS_EXISTING_RESOURCE_GROUP));
        assert_eq!(
            cloud.calls_to("create_group"),
            vec!["create_group bakeflow-Resource-Group-abc westus"]
        );
    }

    #[tokio::test]
    async fn test_second_run_does_not_create_again() {
        let cloud = FakeCloud::new();
        let step = CreateResourceGroup::new(cloud.remote());

        let mut first = state();
        step.run(&CancellationToken::new(), &mut first).await;
        let mut second = state();
        let action = step.run(&CancellationToken::new(), &mut second).await;

        assert_eq!(action, StepAction::Continue);
        assert!(!second.flag(IS_RESOURCE_GROUP_CREATED));
        assert!(second.flag(IS_EXISTING_RESOURCE_GROUP));
        assert_eq!(cloud.calls_to("create_group").len(), 1);
    }

    #[tokio::test]
    async fn test_existing_group_supplies_location() {
        let cloud = FakeCloud::new().with_group("build-rg", "eastus");
        let step = CreateResourceGroup::new(cloud.remote());
        let mut state = StateBag::new();
        state.put(RESOURCE_GROUP_NAME, "build-rg".to_string());
        state.put(TAGS, Tags::new());
        state.put(IS_EXISTING_RESOURCE_GROUP, true);

        let action = step.run(&CancellationToken::new(), &mut state).await;

        assert_eq!(action, StepAction::Continue);
        assert_eq!(state.get(LOCATION), "eastus");
        step.cleanup(&mut state).await.unwrap();
        assert!(cloud.calls_to("delete_group").is_empty());
    }

    #[tokio::test]
    async fn test_declared_existing_group_must_exist() {
        let cloud = FakeCloud::new();
        let step = CreateResourceGroup::new(cloud.remote());
        let mut state = state();
        state.put(IS_EXISTING_RESOURCE_GROUP, true);

        let action = step.run(&CancellationToken::new(), &mut state).await;

        assert_eq!(action, StepAction::Halt);
        assert!(state.get(ERROR).to_string().contains("Cannot locate the resource group"));
        assert!(cloud.calls_to("create_group").is_empty());
    }

    #[tokio::test]
    async fn test_existence_check_failure_halts() {
        let cloud = FakeCloud::new();
        cloud.fail_on("group_exists");
        let step = CreateResourceGroup::new(cloud.remote());
        let mut state = state();

        assert_eq!(step.run(&CancellationToken::new(), &mut state).await, StepAction::Halt);
        assert!(state.contains(ERROR));
    }

    #[tokio::test]
    async fn test_cleanup_deletes_created_group_once() {
        let cloud = FakeCloud::new();
        let step = CreateResourceGroup::new(cloud.remote());
        let mut state = state();
        step.run(&CancellationToken::new(), &mut state).await;

        step.cleanup(&mut state).await.unwrap();
        step.cleanup(&mut state).await.unwrap();

        assert_eq!(
            cloud.calls_to("delete_group"),
            vec!["delete_group bakeflow-Resource-Group-abc"]
        );
    }
}
