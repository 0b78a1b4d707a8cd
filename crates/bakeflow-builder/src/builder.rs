//! The build driver
//!
//! Checks what can be checked before touching anything, seeds the state bag,
//! assembles the step list for the target OS and runs it. The runner always
//! unwinds; the driver then turns the final state into an artifact or an
//! error.

use crate::artifact::{Artifact, ManagedImageArtifact, VhdArtifact};
use crate::error::{BuildError, Result};
use crate::keys::{
    ADMIN_PASSWORD, CAPTURE_PARAMETERS, CAPTURE_TEMPLATE, COMPUTE_NAME, DEPLOYMENT_NAME,
    GALLERY_IMAGE_VERSION_ID, IS_EXISTING_RESOURCE_GROUP, IS_MANAGED_IMAGE, KEY_VAULT_DEPLOYMENT_NAME,
    KEY_VAULT_NAME, LOCATION, MANAGED_IMAGE_ID, MANAGED_IMAGE_LOCATION, MANAGED_IMAGE_NAME,
    MANAGED_IMAGE_RESOURCE_GROUP, NIC_NAME, PUBLIC_IP_NAME, RESOURCE_GROUP_NAME, SNAPSHOT_ID, TAGS,
};
use crate::provisioner::{CommandProvisioner, Provisioner};
use crate::remote::Remote;
use crate::resolver::ResourceResolver;
use crate::steps::{
    CaptureImage, CreateResourceGroup, DeleteAdditionalDisks, DeleteOsDisk, DeleteResourceGroup,
    DeployTemplate, EndpointType, GetCertificate, GetIpAddress, GetOsDisk, PowerOffCompute,
    Provision, PublishToGallery, SaveGuestCredential, SnapshotOsDisk, ValidateTemplate,
};
use crate::template::TemplateFactory;
use bakeflow_cloud::{CaptureParameters, CloudClients};
use bakeflow_config::{BuildConfig, OsType, TempNames};
use bakeflow_step::{
    CANCELLED, CancellationToken, ERROR, HALTED, Poller, Runner, StateBag, Step,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Facts learned about the managed image destination before the run.
struct ManagedDestination {
    resource_group: String,
    name: String,
    location: String,
}

pub struct Builder {
    config: BuildConfig,
    clients: CloudClients,
    provisioner: Arc<dyn Provisioner>,
    credential_dir: PathBuf,
}

impl Builder {
    /// A builder that provisions with the configured shell commands and
    /// keeps the guest credential in the system temp directory.
    pub fn new(config: BuildConfig, clients: CloudClients) -> Self {
        let provisioner = Arc::new(CommandProvisioner::new(config.communicator.provision.clone()));
        Self {
            config,
            clients,
            provisioner,
            credential_dir: std::env::temp_dir(),
        }
    }

    pub fn with_provisioner(mut self, provisioner: Arc<dyn Provisioner>) -> Self {
        self.provisioner = provisioner;
        self
    }

    pub fn with_credential_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.credential_dir = dir.into();
        self
    }

    /// Run one build to completion.
    ///
    /// Cancelling `cancel` stops the pipeline at the next suspension point;
    /// the temporary resources are still cleaned up before this returns.
    pub async fn run(&self, cancel: CancellationToken) -> Result<Artifact> {
        self.config.validate()?;
        let environment = self.config.cloud_environment()?;

        let network = ResourceResolver::new(self.clients.network.as_ref())
            .resolve(&self.config)
            .await?;
        if let Some(target) = &network {
            tracing::info!(
                "Building in virtual network '{}' (resource group '{}', subnet '{}')",
                target.virtual_network,
                target.resource_group,
                target.subnet
            );
        }

        let managed = self.managed_destination().await?;
        let certificate = self.read_certificate().await?;

        let names = TempNames::generate();
        tracing::info!("Build resources use the suffix '{}'", names.suffix);

        let factory = TemplateFactory::new(
            self.config.clone(),
            names.clone(),
            environment,
            network,
            certificate,
        );
        let remote = Remote::new(
            self.clients.clone(),
            Poller::new(self.config.polling_interval()),
        );

        let mut state = self.initial_state(&names, managed.as_ref());
        let runner = Runner::with_cancellation(self.steps(&remote, &factory), cancel);
        runner.validate(&state).map_err(anyhow::Error::from)?;

        let report = runner.run(&mut state).await;
        tracing::debug!(
            "Pipeline finished as {} after {} ms",
            report.state,
            report.duration_ms
        );
        for failure in report.cleanup.failures() {
            tracing::warn!(
                "Resources of step '{}' may need manual removal: {}",
                failure.step,
                failure.error.as_deref().unwrap_or("unknown error")
            );
        }

        if let Some(error) = state.remove(ERROR) {
            return Err(match error.downcast::<BuildError>() {
                Ok(build) => build,
                Err(other) => BuildError::Step(other),
            });
        }
        if state.flag(CANCELLED) {
            return Err(BuildError::Cancelled);
        }
        if state.flag(HALTED) {
            return Err(BuildError::Halted);
        }

        self.artifact(&state, managed).await
    }

    /// Locate the managed image group and make sure the image name is free.
    async fn managed_destination(&self) -> Result<Option<ManagedDestination>> {
        let (Some(resource_group), Some(name)) = (
            self.config.managed_image_resource_group_name.as_deref(),
            self.config.managed_image_name.as_deref(),
        ) else {
            return Ok(None);
        };

        let location = self
            .clients
            .resource_groups
            .location(resource_group)
            .await
            .map_err(|e| {
                tracing::debug!("Managed image group lookup failed: {}", e);
                BuildError::ManagedImageResourceGroupNotFound(resource_group.to_string())
            })?;

        if self.clients.compute.image_exists(resource_group, name).await? {
            return Err(BuildError::ManagedImageExists {
                name: name.to_string(),
                resource_group: resource_group.to_string(),
            });
        }

        Ok(Some(ManagedDestination {
            resource_group: resource_group.to_string(),
            name: name.to_string(),
            location,
        }))
    }

    /// The WinRM certificate, base64 PKCS#12, for Windows builds.
    async fn read_certificate(&self) -> Result<Option<String>> {
        if self.config.os_type() != OsType::Windows {
            return Ok(None);
        }
        let Some(path) = self.config.communicator.winrm_certificate_file.as_deref() else {
            return Err(BuildError::InvalidConfig(
                "a Windows build needs communicator.winrm_certificate_file".into(),
            ));
        };
        let content = tokio::fs::read_to_string(path).await?;
        Ok(Some(content.trim().to_string()))
    }

    fn initial_state(&self, names: &TempNames, managed: Option<&ManagedDestination>) -> StateBag {
        let config = &self.config;
        let mut state = StateBag::new();

        state.put(COMPUTE_NAME, names.compute_name.clone());
        state.put(DEPLOYMENT_NAME, names.deployment_name.clone());
        state.put(KEY_VAULT_NAME, names.key_vault_name.clone());
        state.put(NIC_NAME, names.nic_name.clone());
        state.put(PUBLIC_IP_NAME, names.public_ip_name.clone());
        if config.os_type() == OsType::Windows {
            state.put(KEY_VAULT_DEPLOYMENT_NAME, names.key_vault_deployment_name.clone());
        }
        state.put(
            ADMIN_PASSWORD,
            config
                .communicator
                .password
                .clone()
                .unwrap_or_else(|| names.admin_password.clone()),
        );
        state.put(TAGS, config.azure_tags.clone());
        if let Some(location) = &config.location {
            state.put(LOCATION, location.clone());
        }

        state.put(
            IS_EXISTING_RESOURCE_GROUP,
            config.build_resource_group_name.is_some(),
        );
        let resource_group = config
            .build_resource_group_name
            .clone()
            .or_else(|| config.temp_resource_group_name.clone())
            .unwrap_or_else(|| names.resource_group_name.clone());
        state.put(RESOURCE_GROUP_NAME, resource_group);

        state.put(IS_MANAGED_IMAGE, managed.is_some());
        match managed {
            Some(destination) => {
                state.put(MANAGED_IMAGE_RESOURCE_GROUP, destination.resource_group.clone());
                state.put(MANAGED_IMAGE_NAME, destination.name.clone());
                state.put(MANAGED_IMAGE_LOCATION, destination.location.clone());
            }
            None => state.put(
                CAPTURE_PARAMETERS,
                CaptureParameters {
                    vhd_prefix: config.capture_name_prefix.clone().unwrap_or_default(),
                    destination_container_name: config
                        .capture_container_name
                        .clone()
                        .unwrap_or_default(),
                    overwrite_vhds: false,
                },
            ),
        }

        state
    }

    fn steps(&self, remote: &Remote, factory: &TemplateFactory) -> Vec<Box<dyn Step>> {
        let config = &self.config;
        let os_type = config.os_type();
        let endpoint = EndpointType::from_config(config);
        tracing::debug!("Guest is reached through the {}", endpoint);

        let mut steps: Vec<Box<dyn Step>> = vec![Box::new(CreateResourceGroup::new(remote.clone()))];

        if os_type == OsType::Windows {
            steps.push(Box::new(ValidateTemplate::new(
                remote.clone(),
                KEY_VAULT_DEPLOYMENT_NAME,
                factory.key_vault(),
            )));
            steps.push(Box::new(DeployTemplate::new(
                remote.clone(),
                KEY_VAULT_DEPLOYMENT_NAME,
                factory.key_vault(),
            )));
            steps.push(Box::new(GetCertificate::new(remote.clone())));
        }

        steps.push(Box::new(ValidateTemplate::new(
            remote.clone(),
            DEPLOYMENT_NAME,
            factory.virtual_machine(),
        )));
        steps.push(Box::new(
            DeployTemplate::new(remote.clone(), DEPLOYMENT_NAME, factory.virtual_machine())
                .with_vm_disks(),
        ));
        steps.push(Box::new(GetIpAddress::new(remote.clone(), endpoint)));

        if os_type == OsType::Windows {
            steps.push(Box::new(SaveGuestCredential::new(self.credential_dir.clone())));
        }
        steps.push(Box::new(Provision::new(
            self.provisioner.clone(),
            config.user_name(),
            os_type,
        )));

        steps.push(Box::new(GetOsDisk::new(remote.clone())));
        steps.push(Box::new(PowerOffCompute::new(remote.clone())));
        steps.push(Box::new(SnapshotOsDisk::new(
            remote.clone(),
            config.managed_image_os_disk_snapshot_name.clone(),
        )));
        steps.push(Box::new(CaptureImage::new(
            remote.clone(),
            config.managed_image_zone_resilient,
        )));
        steps.push(Box::new(PublishToGallery::new(
            remote.clone(),
            config.shared_image_gallery_destination.clone(),
        )));
        steps.push(Box::new(DeleteResourceGroup::new(remote.clone())));
        steps.push(Box::new(DeleteOsDisk::new(remote.clone())));
        steps.push(Box::new(DeleteAdditionalDisks::new(remote.clone())));

        steps
    }

    async fn artifact(&self, state: &StateBag, managed: Option<ManagedDestination>) -> Result<Artifact> {
        if let Some(destination) = managed {
            return Ok(Artifact::ManagedImage(ManagedImageArtifact {
                id: state.get(MANAGED_IMAGE_ID).clone(),
                resource_group: destination.resource_group,
                name: destination.name,
                location: destination.location,
                os_disk_snapshot: state.get_opt(SNAPSHOT_ID).cloned(),
                gallery_image_version_id: state.get_opt(GALLERY_IMAGE_VERSION_ID).cloned(),
            }));
        }

        let template = state
            .get_opt(CAPTURE_TEMPLATE)
            .ok_or_else(|| anyhow::anyhow!("the build finished without a capture template"))?;
        let location = state.get_opt(LOCATION).map(String::as_str).unwrap_or_default();
        let artifact =
            VhdArtifact::from_template(template, location, self.clients.storage.as_ref()).await?;
        Ok(Artifact::Vhd(artifact))
    }
}
