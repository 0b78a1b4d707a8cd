use crate::keys::{GALLERY_IMAGE_VERSION_ID, MANAGED_IMAGE_ID, MANAGED_IMAGE_LOCATION, TAGS};
use crate::remote::{Remote, verdict};
use async_trait::async_trait;
use bakeflow_cloud::GalleryImageVersionSpec;
use bakeflow_config::GalleryDestination;
use bakeflow_config::build::normalize_replication_regions;
use bakeflow_step::{CancellationToken, StateBag, Step, StepAction, halt};

/// Publish the managed image as a new version of a shared gallery image.
/// Does nothing unless a gallery destination is configured.
pub struct PublishToGallery {
    remote: Remote,
    destination: Option<GalleryDestination>,
}

impl PublishToGallery {
    pub fn new(remote: Remote, destination: Option<GalleryDestination>) -> Self {
        Self {
            remote,
            destination,
        }
    }
}

#[async_trait]
impl Step for PublishToGallery {
    fn name(&self) -> &str {
        "publish-to-gallery"
    }

    fn reads(&self) -> &[&'static str] {
        const READS: &[&str] = &[MANAGED_IMAGE_ID.name(), MANAGED_IMAGE_LOCATION.name()];
        if self.destination.is_some() { READS } else { &[] }
    }

    fn writes(&self) -> &[&'static str] {
        const WRITES: &[&str] = &[GALLERY_IMAGE_VERSION_ID.name()];
        if self.destination.is_some() { WRITES } else { &[] }
    }

    async fn run(&self, cancel: &CancellationToken, state: &mut StateBag) -> StepAction {
        let Some(destination) = &self.destination else {
            return StepAction::Continue;
        };

        match self
            .remote
            .clients
            .compute
            .gallery_image_exists(
                &destination.resource_group,
                &destination.gallery_name,
                &destination.image_name,
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                return halt(
                    state,
                    anyhow::anyhow!(
                        "gallery image '{}' does not exist in gallery '{}' (resource group '{}')",
                        destination.image_name,
                        destination.gallery_name,
                        destination.resource_group
                    ),
                );
            }
            Err(e) => return halt(state, e),
        }

        let location = state.get(MANAGED_IMAGE_LOCATION).clone();
        let spec = GalleryImageVersionSpec {
            resource_group: destination.resource_group.clone(),
            gallery_name: destination.gallery_name.clone(),
            image_name: destination.image_name.clone(),
            version: destination.image_version.clone(),
            replication_regions: normalize_replication_regions(
                &location,
                &destination.replication_regions,
            ),
            location,
            source_image_id: state.get(MANAGED_IMAGE_ID).clone(),
            tags: state.get_opt(TAGS).cloned().unwrap_or_default(),
        };

        tracing::info!(
            "Publishing version '{}' of '{}/{}' to regions {}",
            spec.version,
            spec.gallery_name,
            spec.image_name,
            spec.replication_regions.join(", ")
        );
        let operation = match self
            .remote
            .clients
            .compute
            .begin_create_gallery_image_version(&spec)
            .await
        {
            Ok(operation) => operation,
            Err(e) => return halt(state, e),
        };

        let action = verdict(state, self.remote.wait(cancel, operation).await);
        if action == StepAction::Continue {
            state.put(
                GALLERY_IMAGE_VERSION_ID,
                spec.id(&self.remote.clients.subscription_id),
            );
        }
        action
    }
}
