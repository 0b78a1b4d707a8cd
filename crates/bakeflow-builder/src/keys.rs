//! Typed state keys shared by the build steps

use bakeflow_cloud::{CaptureParameters, CaptureTemplate, Tags};
use bakeflow_step::StateKey;
use std::path::PathBuf;

// Names chosen before the pipeline starts
pub const COMPUTE_NAME: StateKey<String> = StateKey::new("compute_name");
pub const RESOURCE_GROUP_NAME: StateKey<String> = StateKey::new("resource_group_name");
pub const DEPLOYMENT_NAME: StateKey<String> = StateKey::new("deployment_name");
pub const KEY_VAULT_NAME: StateKey<String> = StateKey::new("key_vault_name");
pub const KEY_VAULT_DEPLOYMENT_NAME: StateKey<String> =
    StateKey::new("key_vault_deployment_name");
pub const NIC_NAME: StateKey<String> = StateKey::new("nic_name");
pub const PUBLIC_IP_NAME: StateKey<String> = StateKey::new("public_ip_name");
pub const ADMIN_PASSWORD: StateKey<String> = StateKey::new("admin_password");
pub const TAGS: StateKey<Tags> = StateKey::new("tags");

/// Build location; written by the resource group step when building in an
/// existing group
pub const LOCATION: StateKey<String> = StateKey::new("location");

// Ownership
pub const IS_MANAGED_IMAGE: StateKey<bool> = StateKey::new("is_managed_image");
pub const IS_EXISTING_RESOURCE_GROUP: StateKey<bool> = StateKey::new("is_existing_resource_group");
pub const IS_RESOURCE_GROUP_CREATED: StateKey<bool> = StateKey::new("is_resource_group_created");
pub const RESOURCE_GROUP_DELETED: StateKey<bool> = StateKey::new("resource_group_deleted");
pub const DEPLOYMENT_RESOURCES_DELETED: StateKey<bool> =
    StateKey::new("deployment_resources_deleted");

// Output destination
pub const MANAGED_IMAGE_RESOURCE_GROUP: StateKey<String> =
    StateKey::new("managed_image_resource_group");
pub const MANAGED_IMAGE_NAME: StateKey<String> = StateKey::new("managed_image_name");
pub const MANAGED_IMAGE_LOCATION: StateKey<String> = StateKey::new("managed_image_location");
pub const CAPTURE_PARAMETERS: StateKey<CaptureParameters> = StateKey::new("capture_parameters");

// Discovered while running
pub const CERTIFICATE_URL: StateKey<String> = StateKey::new("certificate_url");
pub const HOST: StateKey<String> = StateKey::new("host");
pub const GUEST_CREDENTIAL_FILE: StateKey<PathBuf> = StateKey::new("guest_credential_file");
pub const VIRTUAL_MACHINE_ID: StateKey<String> = StateKey::new("virtual_machine_id");

/// VHD blob URL or managed disk id of the OS disk
pub const OS_DISK: StateKey<String> = StateKey::new("os_disk");
pub const ADDITIONAL_DISKS: StateKey<Vec<String>> = StateKey::new("additional_disks");
pub const OS_DISK_DELETED: StateKey<bool> = StateKey::new("os_disk_deleted");
pub const ADDITIONAL_DISKS_DELETED: StateKey<bool> = StateKey::new("additional_disks_deleted");

// Results
pub const CAPTURE_TEMPLATE: StateKey<CaptureTemplate> = StateKey::new("capture_template");
pub const MANAGED_IMAGE_ID: StateKey<String> = StateKey::new("managed_image_id");
pub const SNAPSHOT_ID: StateKey<String> = StateKey::new("snapshot_id");
pub const GALLERY_IMAGE_VERSION_ID: StateKey<String> = StateKey::new("gallery_image_version_id");
