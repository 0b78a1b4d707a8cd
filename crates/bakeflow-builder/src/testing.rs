//! In-memory provider used by the step and builder tests

use async_trait::async_trait;
use bakeflow_cloud::{
    AuthStatus, CaptureParameters, CloudClients, CloudError, CloudProvider, ComputeClient,
    DeploymentClient, DeploymentOperation, DeploymentSpec, DiskReference, GalleryImageVersionSpec,
    KeyVaultClient, ManagedImageSpec, NetworkClient, OperationClient, OperationStatus,
    PendingOperation, PollKind, ResourceClient, ResourceGroupClient, Result, SnapshotSpec,
    StorageClient, Tags, TargetResource, VirtualMachine, VirtualNetworkSummary,
};
use bakeflow_step::Poller;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::remote::Remote;

#[derive(Default)]
struct Inner {
    calls: Vec<String>,
    failing: HashSet<&'static str>,
    groups: BTreeMap<String, String>,
    statuses: VecDeque<OperationStatus>,
    status_checks: usize,
    vm: Option<VirtualMachine>,
    networks: Vec<VirtualNetworkSummary>,
    deployment_operations: Vec<DeploymentOperation>,
    capture_output: Option<serde_json::Value>,
    images: BTreeSet<(String, String)>,
    gallery_images: BTreeSet<(String, String, String)>,
}

/// Records every call and answers from canned data.
///
/// Long-running writes return an async handle; status checks pop the
/// scripted statuses and repeat the last one once the script runs out
/// (success when nothing was scripted).
#[derive(Clone, Default)]
pub struct FakeCloud {
    inner: Arc<Mutex<Inner>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn clients(&self) -> CloudClients {
        CloudClients::from_provider(Arc::new(self.clone()))
    }

    pub fn remote(&self) -> Remote {
        Remote::new(self.clients(), Poller::new(Duration::from_millis(10)))
    }

    pub fn with_group(self, name: &str, location: &str) -> Self {
        self.lock().groups.insert(name.to_string(), location.to_string());
        self
    }

    /// Make every call of `method` fail with a 500.
    pub fn fail_on(&self, method: &'static str) {
        self.lock().failing.insert(method);
    }

    pub fn script_status(&self, statuses: Vec<OperationStatus>) {
        self.lock().statuses = statuses.into();
    }

    pub fn set_vm(&self, vm: VirtualMachine) {
        self.lock().vm = Some(vm);
    }

    pub fn set_networks(&self, networks: Vec<VirtualNetworkSummary>) {
        self.lock().networks = networks;
    }

    pub fn set_deployment_operations(&self, operations: Vec<DeploymentOperation>) {
        self.lock().deployment_operations = operations;
    }

    pub fn set_capture_output(&self, output: serde_json::Value) {
        self.lock().capture_output = Some(output);
    }

    pub fn add_image(&self, resource_group: &str, name: &str) {
        self.lock()
            .images
            .insert((resource_group.to_string(), name.to_string()));
    }

    pub fn add_gallery_image(&self, resource_group: &str, gallery: &str, image: &str) {
        self.lock().gallery_images.insert((
            resource_group.to_string(),
            gallery.to_string(),
            image.to_string(),
        ));
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Calls whose method name is `method`
    pub fn calls_to(&self, method: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.split(' ').next() == Some(method))
            .collect()
    }

    pub fn status_checks(&self) -> usize {
        self.lock().status_checks
    }

    fn record(&self, method: &'static str, args: &[&str]) -> Result<()> {
        let mut inner = self.lock();
        let mut call = method.to_string();
        for arg in args {
            call.push(' ');
            call.push_str(arg);
        }
        inner.calls.push(call);
        if inner.failing.contains(method) {
            return Err(CloudError::Api {
                status: 500,
                message: format!("{} failed", method),
                response: None,
            });
        }
        Ok(())
    }

    fn pending(&self, description: String) -> PendingOperation {
        PendingOperation::new(description, PollKind::AsyncOperation("fake://operation".into()))
    }
}

pub fn vhd_vm() -> VirtualMachine {
    VirtualMachine {
        id: "/subscriptions/sub-1/resourceGroups/bakeflow-rg/providers/Microsoft.Compute/virtualMachines/bkvm1".into(),
        name: "bkvm1".into(),
        location: "westus".into(),
        os_disk: DiskReference::vhd("https://bakeimages.blob.core.windows.net/images/bkos1.vhd"),
        data_disks: vec![DiskReference::vhd(
            "https://bakeimages.blob.core.windows.net/images/bkos1-data0.vhd",
        )],
    }
}

pub fn managed_vm() -> VirtualMachine {
    VirtualMachine {
        id: "/subscriptions/sub-1/resourceGroups/bakeflow-rg/providers/Microsoft.Compute/virtualMachines/bkvm1".into(),
        name: "bkvm1".into(),
        location: "westus".into(),
        os_disk: DiskReference::managed(
            "/subscriptions/sub-1/resourceGroups/bakeflow-rg/providers/Microsoft.Compute/disks/bkos1",
        ),
        data_disks: Vec::new(),
    }
}

pub fn create_operation(resource_type: &str, name: &str) -> DeploymentOperation {
    DeploymentOperation {
        operation_id: format!("op-{}", name),
        provisioning_operation: "Create".into(),
        provisioning_state: "Succeeded".into(),
        target_resource: Some(TargetResource {
            id: format!(
                "/subscriptions/sub-1/resourceGroups/bakeflow-rg/providers/{}/{}",
                resource_type, name
            ),
            resource_type: resource_type.into(),
            resource_name: name.into(),
        }),
    }
}

#[async_trait]
impl OperationClient for FakeCloud {
    async fn status(&self, _operation: &PendingOperation) -> Result<OperationStatus> {
        self.record("status", &[])?;
        let mut inner = self.lock();
        inner.status_checks += 1;
        let status = if inner.statuses.len() > 1 {
            inner.statuses.pop_front()
        } else {
            inner.statuses.front().cloned()
        };
        Ok(status.unwrap_or_else(OperationStatus::succeeded))
    }

    async fn output(&self, _operation: &PendingOperation) -> Result<Option<serde_json::Value>> {
        self.record("output", &[])?;
        Ok(self.lock().capture_output.clone())
    }
}

#[async_trait]
impl ResourceGroupClient for FakeCloud {
    async fn exists(&self, name: &str) -> Result<bool> {
        self.record("group_exists", &[name])?;
        Ok(self.lock().groups.contains_key(name))
    }

    async fn create_or_update(&self, name: &str, location: &str, _tags: &Tags) -> Result<()> {
        self.record("create_group", &[name, location])?;
        self.lock()
            .groups
            .insert(name.to_string(), location.to_string());
        Ok(())
    }

    async fn location(&self, name: &str) -> Result<String> {
        self.record("group_location", &[name])?;
        self.lock()
            .groups
            .get(name)
            .cloned()
            .ok_or_else(|| CloudError::ResourceNotFound(name.to_string()))
    }

    async fn begin_delete(&self, name: &str) -> Result<PendingOperation> {
        self.record("delete_group", &[name])?;
        self.lock().groups.remove(name);
        Ok(self.pending(format!("delete resource group '{}'", name)))
    }
}

#[async_trait]
impl DeploymentClient for FakeCloud {
    async fn validate(&self, resource_group: &str, deployment: &str, _spec: &DeploymentSpec) -> Result<()> {
        self.record("validate", &[resource_group, deployment])
    }

    async fn begin_create(
        &self,
        resource_group: &str,
        deployment: &str,
        _spec: &DeploymentSpec,
    ) -> Result<PendingOperation> {
        self.record("deploy", &[resource_group, deployment])?;
        Ok(self.pending(format!("deployment '{}'", deployment)))
    }

    async fn list_operations(
        &self,
        resource_group: &str,
        deployment: &str,
    ) -> Result<Vec<DeploymentOperation>> {
        self.record("list_operations", &[resource_group, deployment])?;
        Ok(self.lock().deployment_operations.clone())
    }

    async fn begin_delete(&self, resource_group: &str, deployment: &str) -> Result<PendingOperation> {
        self.record("delete_deployment", &[resource_group, deployment])?;
        Ok(self.pending(format!("delete deployment '{}'", deployment)))
    }
}

#[async_trait]
impl ResourceClient for FakeCloud {
    async fn begin_delete_by_id(&self, resource_id: &str, resource_type: &str) -> Result<PendingOperation> {
        self.record("delete_resource", &[resource_type, resource_id])?;
        Ok(self.pending(format!("delete '{}'", resource_id)))
    }
}

#[async_trait]
impl ComputeClient for FakeCloud {
    async fn get_virtual_machine(&self, resource_group: &str, name: &str) -> Result<VirtualMachine> {
        self.record("get_vm", &[resource_group, name])?;
        self.lock()
            .vm
            .clone()
            .ok_or_else(|| CloudError::ResourceNotFound(name.to_string()))
    }

    async fn begin_power_off(&self, resource_group: &str, name: &str) -> Result<PendingOperation> {
        self.record("power_off", &[resource_group, name])?;
        Ok(self.pending(format!("deallocate '{}'", name)))
    }

    async fn generalize(&self, resource_group: &str, name: &str) -> Result<()> {
        self.record("generalize", &[resource_group, name])
    }

    async fn begin_capture(
        &self,
        resource_group: &str,
        name: &str,
        parameters: &CaptureParameters,
    ) -> Result<PendingOperation> {
        self.record(
            "capture",
            &[resource_group, name, &parameters.destination_container_name],
        )?;
        Ok(self.pending(format!("capture '{}'", name)))
    }

    async fn image_exists(&self, resource_group: &str, name: &str) -> Result<bool> {
        self.record("image_exists", &[resource_group, name])?;
        Ok(self
            .lock()
            .images
            .contains(&(resource_group.to_string(), name.to_string())))
    }

    async fn begin_create_image(
        &self,
        resource_group: &str,
        name: &str,
        spec: &ManagedImageSpec,
    ) -> Result<PendingOperation> {
        self.record("create_image", &[resource_group, name, &spec.location])?;
        Ok(self.pending(format!("create image '{}'", name)))
    }

    async fn begin_delete_disk(&self, resource_group: &str, name: &str) -> Result<PendingOperation> {
        self.record("delete_disk", &[resource_group, name])?;
        Ok(self.pending(format!("delete disk '{}'", name)))
    }

    async fn begin_create_snapshot(
        &self,
        resource_group: &str,
        name: &str,
        spec: &SnapshotSpec,
    ) -> Result<PendingOperation> {
        self.record(
            "create_snapshot",
            &[resource_group, name, &spec.source_resource_id],
        )?;
        Ok(self.pending(format!("create snapshot '{}'", name)))
    }

    async fn gallery_image_exists(&self, resource_group: &str, gallery: &str, image: &str) -> Result<bool> {
        self.record("gallery_image_exists", &[resource_group, gallery, image])?;
        Ok(self.lock().gallery_images.contains(&(
            resource_group.to_string(),
            gallery.to_string(),
            image.to_string(),
        )))
    }

    async fn begin_create_gallery_image_version(
        &self,
        spec: &GalleryImageVersionSpec,
    ) -> Result<PendingOperation> {
        let regions = spec.replication_regions.join(",");
        self.record(
            "publish",
            &[&spec.gallery_name, &spec.image_name, &spec.version, &regions],
        )?;
        Ok(self.pending(format!("publish version '{}'", spec.version)))
    }
}

#[async_trait]
impl NetworkClient for FakeCloud {
    async fn list_virtual_networks(&self) -> Result<Vec<VirtualNetworkSummary>> {
        self.record("list_networks", &[])?;
        Ok(self.lock().networks.clone())
    }

    async fn public_ip_address(&self, resource_group: &str, name: &str) -> Result<String> {
        self.record("public_ip", &[resource_group, name])?;
        Ok("52.0.0.10".to_string())
    }

    async fn nic_private_ip_address(&self, resource_group: &str, nic: &str) -> Result<String> {
        self.record("private_ip", &[resource_group, nic])?;
        Ok("10.0.0.4".to_string())
    }
}

#[async_trait]
impl StorageClient for FakeCloud {
    async fn delete_blob(&self, container: &str, blob: &str) -> Result<()> {
        self.record("delete_blob", &[container, blob])
    }

    async fn read_only_url(&self, blob_uri: &str, expiry: DateTime<Utc>) -> Result<String> {
        self.record("read_only_url", &[blob_uri])?;
        Ok(format!("{}?se={}&sp=r", blob_uri, expiry.format("%Y-%m-%d")))
    }
}

#[async_trait]
impl KeyVaultClient for FakeCloud {
    async fn secret_url(&self, resource_group: &str, vault: &str, secret: &str) -> Result<String> {
        self.record("secret_url", &[resource_group, vault, secret])?;
        Ok(format!("https://{}.vault.azure.net/secrets/{}/1", vault, secret))
    }
}

#[async_trait]
impl CloudProvider for FakeCloud {
    fn name(&self) -> &str {
        "fake"
    }

    fn subscription_id(&self) -> &str {
        "sub-1"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        Ok(AuthStatus::ok("fake subscription"))
    }
}
