//! Resource model exchanged with the provider

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resource tags, ordered for stable request bodies
pub type Tags = BTreeMap<String, String>;

/// A deployment request: template plus parameter values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    pub template: serde_json::Value,

    /// Parameters in `{"name": {"value": ...}}` form
    pub parameters: serde_json::Value,
}

impl DeploymentSpec {
    pub fn new(template: serde_json::Value, parameters: serde_json::Value) -> Self {
        Self {
            template,
            parameters,
        }
    }

    /// Request body for the deployments endpoint, always incremental
    pub fn to_request_body(&self) -> serde_json::Value {
        serde_json::json!({
            "properties": {
                "mode": "Incremental",
                "template": self.template,
                "parameters": self.parameters,
            }
        })
    }
}

/// One entry from a deployment's operation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentOperation {
    pub operation_id: String,
    pub provisioning_operation: String,
    pub provisioning_state: String,
    pub target_resource: Option<TargetResource>,
}

impl DeploymentOperation {
    /// Whether this operation created the resource it targets
    pub fn is_create(&self) -> bool {
        self.provisioning_operation.eq_ignore_ascii_case("Create")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetResource {
    pub id: String,
    pub resource_type: String,
    pub resource_name: String,
}

/// A reference to a disk attached to a VM: either a managed disk id or an
/// unmanaged VHD blob URI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskReference {
    pub managed_disk_id: Option<String>,
    pub vhd_uri: Option<String>,
}

impl DiskReference {
    pub fn managed(id: impl Into<String>) -> Self {
        Self {
            managed_disk_id: Some(id.into()),
            vhd_uri: None,
        }
    }

    pub fn vhd(uri: impl Into<String>) -> Self {
        Self {
            managed_disk_id: None,
            vhd_uri: Some(uri.into()),
        }
    }

    /// Managed disk id if present, VHD URI otherwise
    pub fn location(&self) -> Option<&str> {
        self.managed_disk_id.as_deref().or(self.vhd_uri.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachine {
    pub id: String,
    pub name: String,
    pub location: String,
    pub os_disk: DiskReference,
    pub data_disks: Vec<DiskReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualNetworkSummary {
    pub name: String,
    pub resource_group: String,
    pub subnets: Vec<String>,
}

/// Parameters of a VM capture into a storage container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureParameters {
    pub vhd_prefix: String,
    pub destination_container_name: String,
    pub overwrite_vhds: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedImageSpec {
    pub location: String,
    pub source_vm_id: String,
    pub zone_resilient: bool,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSpec {
    pub location: String,
    /// Managed disk to snapshot
    pub source_resource_id: String,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryImageVersionSpec {
    pub resource_group: String,
    pub gallery_name: String,
    pub image_name: String,
    pub version: String,
    pub location: String,
    pub replication_regions: Vec<String>,
    pub source_image_id: String,
    pub tags: Tags,
}

impl GalleryImageVersionSpec {
    pub fn id(&self, subscription_id: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/galleries/{}/images/{}/versions/{}",
            subscription_id, self.resource_group, self.gallery_name, self.image_name, self.version
        )
    }
}
