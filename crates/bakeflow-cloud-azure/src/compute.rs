//! Compute resources: virtual machines, images, disks, snapshots, galleries

use crate::api_version;
use crate::error::Result;
use crate::provider::AzureProvider;
use async_trait::async_trait;
use bakeflow_cloud::{
    CaptureParameters, ComputeClient, DiskReference, GalleryImageVersionSpec, ManagedImageSpec,
    PendingOperation, SnapshotSpec, VirtualMachine,
};
use reqwest::Method;
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiVirtualMachine {
    id: String,
    name: String,
    location: String,
    properties: ApiVmProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiVmProperties {
    storage_profile: ApiStorageProfile,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiStorageProfile {
    os_disk: ApiDisk,
    #[serde(default)]
    data_disks: Vec<ApiDisk>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiDisk {
    #[serde(default)]
    lun: Option<i32>,
    managed_disk: Option<ApiManagedDisk>,
    vhd: Option<ApiVhd>,
}

#[derive(Deserialize)]
struct ApiManagedDisk {
    id: Option<String>,
}

#[derive(Deserialize)]
struct ApiVhd {
    uri: String,
}

impl From<ApiDisk> for DiskReference {
    fn from(disk: ApiDisk) -> Self {
        DiskReference {
            managed_disk_id: disk.managed_disk.and_then(|m| m.id),
            vhd_uri: disk.vhd.map(|v| v.uri),
        }
    }
}

pub(crate) fn parse_virtual_machine(body: &str) -> Result<VirtualMachine> {
    let vm: ApiVirtualMachine = serde_json::from_str(body)?;
    let mut data_disks = vm.properties.storage_profile.data_disks;
    data_disks.sort_by_key(|d| d.lun.unwrap_or_default());

    Ok(VirtualMachine {
        id: vm.id,
        name: vm.name,
        location: vm.location,
        os_disk: vm.properties.storage_profile.os_disk.into(),
        data_disks: data_disks.into_iter().map(DiskReference::from).collect(),
    })
}

impl AzureProvider {
    fn compute_path(&self, resource_group: &str, rest: &str) -> String {
        format!(
            "{}/{}",
            self.provider_path(resource_group, "Microsoft.Compute"),
            rest
        )
    }

    fn vm_path(&self, resource_group: &str, name: &str) -> String {
        self.compute_path(resource_group, &format!("virtualMachines/{}", name))
    }

    async fn vm_action(
        &self,
        resource_group: &str,
        name: &str,
        action: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<PendingOperation> {
        self.client
            .begin(
                Method::POST,
                &format!("{}/{}", self.vm_path(resource_group, name), action),
                api_version::COMPUTE,
                body,
                format!("{} virtual machine '{}'", action, name),
            )
            .await
    }
}

#[async_trait]
impl ComputeClient for AzureProvider {
    async fn get_virtual_machine(
        &self,
        resource_group: &str,
        name: &str,
    ) -> bakeflow_cloud::Result<VirtualMachine> {
        let url = self
            .client
            .url(&self.vm_path(resource_group, name), api_version::COMPUTE);
        let (_, _, text) = self.client.send(Method::GET, &url, None, &[]).await?;
        Ok(parse_virtual_machine(&text)?)
    }

    async fn begin_power_off(
        &self,
        resource_group: &str,
        name: &str,
    ) -> bakeflow_cloud::Result<PendingOperation> {
        Ok(self.vm_action(resource_group, name, "deallocate", None).await?)
    }

    async fn generalize(&self, resource_group: &str, name: &str) -> bakeflow_cloud::Result<()> {
        let url = self.client.url(
            &format!("{}/generalize", self.vm_path(resource_group, name)),
            api_version::COMPUTE,
        );
        self.client.send(Method::POST, &url, None, &[]).await?;
        Ok(())
    }

    async fn begin_capture(
        &self,
        resource_group: &str,
        name: &str,
        parameters: &CaptureParameters,
    ) -> bakeflow_cloud::Result<PendingOperation> {
        let body = serde_json::to_value(parameters)?;
        Ok(self
            .vm_action(resource_group, name, "capture", Some(&body))
            .await?)
    }

    async fn image_exists(&self, resource_group: &str, name: &str) -> bakeflow_cloud::Result<bool> {
        let image: Option<serde_json::Value> = self
            .client
            .get_optional(
                &self.compute_path(resource_group, &format!("images/{}", name)),
                api_version::COMPUTE,
            )
            .await?;
        Ok(image.is_some())
    }

    async fn begin_create_image(
        &self,
        resource_group: &str,
        name: &str,
        spec: &ManagedImageSpec,
    ) -> bakeflow_cloud::Result<PendingOperation> {
        let body = serde_json::json!({
            "location": spec.location,
            "tags": spec.tags,
            "properties": {
                "sourceVirtualMachine": { "id": spec.source_vm_id },
                "storageProfile": { "zoneResilient": spec.zone_resilient },
            }
        });
        Ok(self
            .client
            .begin(
                Method::PUT,
                &self.compute_path(resource_group, &format!("images/{}", name)),
                api_version::COMPUTE,
                Some(&body),
                format!("create managed image '{}'", name),
            )
            .await?)
    }

    async fn begin_delete_disk(
        &self,
        resource_group: &str,
        name: &str,
    ) -> bakeflow_cloud::Result<PendingOperation> {
        Ok(self
            .client
            .begin(
                Method::DELETE,
                &self.compute_path(resource_group, &format!("disks/{}", name)),
                api_version::DISKS,
                None,
                format!("delete disk '{}'", name),
            )
            .await?)
    }

    async fn begin_create_snapshot(
        &self,
        resource_group: &str,
        name: &str,
        spec: &SnapshotSpec,
    ) -> bakeflow_cloud::Result<PendingOperation> {
        let body = serde_json::json!({
            "location": spec.location,
            "tags": spec.tags,
            "properties": {
                "creationData": {
                    "createOption": "Copy",
                    "sourceResourceId": spec.source_resource_id,
                },
                "incremental": false,
            }
        });
        Ok(self
            .client
            .begin(
                Method::PUT,
                &self.compute_path(resource_group, &format!("snapshots/{}", name)),
                api_version::DISKS,
                Some(&body),
                format!("create snapshot '{}'", name),
            )
            .await?)
    }

    async fn gallery_image_exists(
        &self,
        resource_group: &str,
        gallery: &str,
        image: &str,
    ) -> bakeflow_cloud::Result<bool> {
        let found: Option<serde_json::Value> = self
            .client
            .get_optional(
                &self.compute_path(
                    resource_group,
                    &format!("galleries/{}/images/{}", gallery, image),
                ),
                api_version::GALLERIES,
            )
            .await?;
        Ok(found.is_some())
    }

    async fn begin_create_gallery_image_version(
        &self,
        spec: &GalleryImageVersionSpec,
    ) -> bakeflow_cloud::Result<PendingOperation> {
        let target_regions: Vec<serde_json::Value> = spec
            .replication_regions
            .iter()
            .map(|region| serde_json::json!({ "name": region }))
            .collect();
        let body = serde_json::json!({
            "location": spec.location,
            "tags": spec.tags,
            "properties": {
                "publishingProfile": { "targetRegions": target_regions },
                "storageProfile": { "source": { "id": spec.source_image_id } },
            }
        });
        Ok(self
            .client
            .begin(
                Method::PUT,
                &self.compute_path(
                    &spec.resource_group,
                    &format!(
                        "galleries/{}/images/{}/versions/{}",
                        spec.gallery_name, spec.image_name, spec.version
                    ),
                ),
                api_version::GALLERIES,
                Some(&body),
                format!(
                    "publish {}/{} version {}",
                    spec.gallery_name, spec.image_name, spec.version
                ),
            )
            .await?)
    }
}
