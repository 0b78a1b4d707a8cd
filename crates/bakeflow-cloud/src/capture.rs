//! Capture operation output
//!
//! Capturing an unmanaged VM produces an async operation whose
//! `properties.output` is a deployment template that recreates the VM from
//! the captured VHDs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The finished capture operation as returned by the operation endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOperation {
    #[serde(default)]
    pub operation_id: String,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub start_time: Option<String>,

    #[serde(default)]
    pub end_time: Option<String>,

    #[serde(default)]
    pub properties: Option<CaptureOperationProperties>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureOperationProperties {
    #[serde(default)]
    pub output: Option<CaptureTemplate>,
}

impl CaptureOperation {
    pub fn template(&self) -> Option<&CaptureTemplate> {
        self.properties.as_ref().and_then(|p| p.output.as_ref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureTemplate {
    #[serde(rename = "$schema", default)]
    pub schema: String,

    #[serde(default)]
    pub content_version: String,

    #[serde(default)]
    pub parameters: BTreeMap<String, CaptureParameter>,

    #[serde(default)]
    pub resources: Vec<CaptureResource>,
}

impl CaptureTemplate {
    /// Parse the template either from a bare template document or from a
    /// whole capture operation body.
    pub fn from_value(value: serde_json::Value) -> serde_json::Result<Self> {
        if value.get("properties").is_some() || value.get("operationId").is_some() {
            let operation: CaptureOperation = serde_json::from_value(value)?;
            return Ok(operation.template().cloned().unwrap_or_default());
        }
        serde_json::from_value(value)
    }

    fn virtual_machine(&self) -> Option<&CaptureResource> {
        self.resources
            .iter()
            .find(|r| r.resource_type.eq_ignore_ascii_case("Microsoft.Compute/virtualMachines"))
            .or_else(|| self.resources.first())
    }

    /// URI of the captured OS disk image
    pub fn os_disk_image_uri(&self) -> Option<&str> {
        self.virtual_machine()
            .and_then(|vm| vm.properties.storage_profile.os_disk.as_ref())
            .and_then(|disk| disk.image.as_ref())
            .map(|image| image.uri.as_str())
    }

    /// URIs of captured data disk images, in LUN order
    pub fn data_disk_image_uris(&self) -> Vec<&str> {
        let Some(vm) = self.virtual_machine() else {
            return Vec::new();
        };
        let mut disks: Vec<&CaptureDisk> = vm.properties.storage_profile.data_disks.iter().collect();
        disks.sort_by_key(|d| d.lun.unwrap_or_default());
        disks
            .into_iter()
            .filter_map(|d| d.image.as_ref().map(|image| image.uri.as_str()))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureParameter {
    #[serde(rename = "type", default)]
    pub parameter_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResource {
    #[serde(default)]
    pub api_version: String,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "type", default)]
    pub resource_type: String,

    #[serde(default)]
    pub location: String,

    #[serde(default)]
    pub properties: CaptureProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureProperties {
    #[serde(default)]
    pub hardware_profile: Option<HardwareProfile>,

    #[serde(default)]
    pub storage_profile: StorageProfile,

    #[serde(default)]
    pub os_profile: Option<OsProfile>,

    #[serde(default)]
    pub network_profile: Option<NetworkProfile>,

    #[serde(default)]
    pub provisioning_state: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareProfile {
    #[serde(default)]
    pub vm_size: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProfile {
    #[serde(default)]
    pub os_disk: Option<CaptureDisk>,

    #[serde(default)]
    pub data_disks: Vec<CaptureDisk>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureDisk {
    #[serde(default)]
    pub os_type: Option<String>,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub create_option: String,

    #[serde(default)]
    pub image: Option<CaptureUri>,

    #[serde(default)]
    pub vhd: Option<CaptureUri>,

    #[serde(default)]
    pub caching: Option<String>,

    #[serde(default)]
    pub lun: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureUri {
    pub uri: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsProfile {
    #[serde(default)]
    pub computer_name: String,

    #[serde(default)]
    pub admin_username: String,

    #[serde(default)]
    pub admin_password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterfaceReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterfaceReference {
    pub id: String,
}
