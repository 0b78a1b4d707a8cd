//! Build configuration model, defaults and validation

use crate::environment::CloudEnvironment;
use crate::error::{ConfigError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

pub const DEFAULT_VM_SIZE: &str = "Standard_A1";
pub const DEFAULT_IMAGE_VERSION: &str = "latest";
pub const DEFAULT_CLOUD_ENVIRONMENT_NAME: &str = "Public";
pub const DEFAULT_USER_NAME: &str = "bakeflow";
pub const DEFAULT_POLLING_INTERVAL_SECS: u64 = 15;

const MAX_TAGS: usize = 15;
const MAX_TAG_NAME_LEN: usize = 512;
const MAX_TAG_VALUE_LEN: usize = 256;

static CAPTURE_CONTAINER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9\-]{2,62}$").expect("valid regex"));
static CAPTURE_NAME_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_\-\.]{0,23}$").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OsType {
    Linux,
    Windows,
}

impl std::fmt::Display for OsType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OsType::Linux => write!(f, "Linux"),
            OsType::Windows => write!(f, "Windows"),
        }
    }
}

/// Where the guest is reached from and how it is configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunicatorConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssh_private_key_file: Option<String>,

    /// Base64-encoded PKCS#12 bundle installed as the WinRM listener
    /// certificate on Windows guests
    pub winrm_certificate_file: Option<String>,

    /// Commands run on the build machine once the guest is reachable; they
    /// see the guest host in `BAKEFLOW_HOST`.
    pub provision: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryDestination {
    pub resource_group: String,
    pub gallery_name: String,
    pub image_name: String,
    pub image_version: String,
    #[serde(default)]
    pub replication_regions: Vec<String>,
}

/// Everything a build needs, as written in `bakeflow.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub subscription_id: String,
    /// Directory tenant and principal granted access to the temporary key
    /// vault (Windows builds only)
    pub tenant_id: Option<String>,
    pub object_id: Option<String>,
    pub cloud_environment_name: Option<String>,

    // Source image
    pub image_publisher: Option<String>,
    pub image_offer: Option<String>,
    pub image_sku: Option<String>,
    pub image_version: Option<String>,
    pub image_url: Option<String>,

    // Compute
    pub location: Option<String>,
    pub vm_size: Option<String>,
    pub os_type: Option<OsType>,
    pub azure_tags: BTreeMap<String, String>,

    /// Build inside this existing group instead of a temporary one
    pub build_resource_group_name: Option<String>,
    pub temp_resource_group_name: Option<String>,

    // Unmanaged VHD output
    pub storage_account: Option<String>,
    pub resource_group_name: Option<String>,
    pub capture_container_name: Option<String>,
    pub capture_name_prefix: Option<String>,

    // Managed image output
    pub managed_image_resource_group_name: Option<String>,
    pub managed_image_name: Option<String>,
    pub managed_image_storage_account_type: Option<String>,
    pub managed_image_os_disk_snapshot_name: Option<String>,
    pub managed_image_zone_resilient: bool,
    pub shared_image_gallery_destination: Option<GalleryDestination>,

    // Network
    pub virtual_network_name: Option<String>,
    pub virtual_network_subnet_name: Option<String>,
    pub virtual_network_resource_group_name: Option<String>,
    pub private_virtual_network_with_public_ip: bool,

    pub communicator: CommunicatorConfig,

    pub polling_interval_secs: Option<u64>,
}

impl BuildConfig {
    pub fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn from_json(content: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Fill unset fields with their defaults.
    pub fn apply_defaults(&mut self) {
        if self.vm_size.is_none() {
            self.vm_size = Some(DEFAULT_VM_SIZE.to_string());
        }
        if self.image_url.is_none() && self.image_version.is_none() {
            self.image_version = Some(DEFAULT_IMAGE_VERSION.to_string());
        }
        if self.cloud_environment_name.is_none() {
            self.cloud_environment_name = Some(DEFAULT_CLOUD_ENVIRONMENT_NAME.to_string());
        }
        if self.communicator.username.is_none() {
            self.communicator.username = Some(DEFAULT_USER_NAME.to_string());
        }
        if self.polling_interval_secs.is_none() {
            self.polling_interval_secs = Some(DEFAULT_POLLING_INTERVAL_SECS);
        }
        if let Some(gallery) = self.shared_image_gallery_destination.as_mut() {
            let location = self.location.as_deref().unwrap_or_default();
            gallery.replication_regions =
                normalize_replication_regions(location, &gallery.replication_regions);
        }
    }

    /// Check the whole configuration and report every problem at once.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.subscription_id.is_empty() {
            problems.push("A subscription_id must be specified".to_string());
        }

        if let Some(name) = &self.cloud_environment_name {
            if let Err(e) = CloudEnvironment::from_name(name) {
                problems.push(e.to_string());
            }
        }

        if self.os_type.is_none() {
            problems.push("An os_type must be specified".to_string());
        }

        self.check_image_source(&mut problems);
        self.check_location(&mut problems);
        self.check_output(&mut problems);
        self.check_network(&mut problems);
        self.check_tags(&mut problems);
        self.check_windows(&mut problems);

        if self.polling_interval_secs == Some(0) {
            problems.push("polling_interval_secs must be greater than zero".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    fn check_windows(&self, problems: &mut Vec<String>) {
        if self.os_type != Some(OsType::Windows) {
            return;
        }
        if self.tenant_id.is_none() {
            problems.push("A tenant_id must be specified for Windows builds".to_string());
        }
        if self.object_id.is_none() {
            problems.push("An object_id must be specified for Windows builds".to_string());
        }
        if self.communicator.winrm_certificate_file.is_none() {
            problems.push(
                "A communicator.winrm_certificate_file must be specified for Windows builds"
                    .to_string(),
            );
        }
    }

    fn check_image_source(&self, problems: &mut Vec<String>) {
        if self.image_url.is_none() {
            if self.image_publisher.is_none() {
                problems.push("An image_publisher must be specified".to_string());
            }
            if self.image_offer.is_none() {
                problems.push("An image_offer must be specified".to_string());
            }
            if self.image_sku.is_none() {
                problems.push("An image_sku must be specified".to_string());
            }
        } else if self.image_publisher.is_some()
            || self.image_offer.is_some()
            || self.image_sku.is_some()
            || self.image_version.is_some()
        {
            problems.push(
                "An image_url must not be specified if image_publisher, image_offer, image_sku, or image_version is specified"
                    .to_string(),
            );
        }
    }

    fn check_location(&self, problems: &mut Vec<String>) {
        match (&self.location, &self.build_resource_group_name) {
            (None, None) => problems.push("A location must be specified".to_string()),
            (Some(_), Some(_)) => problems.push(
                "Specify either a location to create the resource group in or an existing build_resource_group_name, but not both"
                    .to_string(),
            ),
            _ => {}
        }
        if self.build_resource_group_name.is_some() && self.temp_resource_group_name.is_some() {
            problems.push(
                "The settings build_resource_group_name and temp_resource_group_name cannot both be defined"
                    .to_string(),
            );
        }
    }

    fn check_output(&self, problems: &mut Vec<String>) {
        let vhd_fields = self.storage_account.is_some()
            || self.resource_group_name.is_some()
            || self.capture_container_name.is_some()
            || self.capture_name_prefix.is_some();

        if self.is_managed_image() {
            if vhd_fields {
                problems.push(
                    "Specify either a VHD (storage_account, resource_group_name, capture_container_name, capture_name_prefix) or a managed image (managed_image_resource_group_name and managed_image_name), but not both"
                        .to_string(),
                );
            }
            if self.managed_image_name.is_none() {
                problems.push("A managed_image_name must be specified".to_string());
            }
            if self.managed_image_resource_group_name.is_none() {
                problems.push("A managed_image_resource_group_name must be specified".to_string());
            }
        } else {
            if self.storage_account.is_none() {
                problems.push("A storage_account must be specified".to_string());
            }
            if self.resource_group_name.is_none() {
                problems.push("A resource_group_name must be specified".to_string());
            }
            self.check_capture_names(problems);

            if self.managed_image_os_disk_snapshot_name.is_some() {
                problems.push(
                    "managed_image_os_disk_snapshot_name requires a managed image destination"
                        .to_string(),
                );
            }
            if self.shared_image_gallery_destination.is_some() {
                problems.push(
                    "A shared_image_gallery_destination requires a managed image destination"
                        .to_string(),
                );
            }
        }

        if let Some(gallery) = &self.shared_image_gallery_destination {
            for (field, value) in [
                ("resource_group", &gallery.resource_group),
                ("gallery_name", &gallery.gallery_name),
                ("image_name", &gallery.image_name),
                ("image_version", &gallery.image_version),
            ] {
                if value.is_empty() {
                    problems.push(format!(
                        "shared_image_gallery_destination.{} must be specified",
                        field
                    ));
                }
            }
        }
    }

    fn check_capture_names(&self, problems: &mut Vec<String>) {
        match self.capture_container_name.as_deref() {
            None => problems.push("A capture_container_name must be specified".to_string()),
            Some(name) => {
                if !CAPTURE_CONTAINER_NAME.is_match(name) {
                    problems.push(format!(
                        "A capture_container_name must satisfy the regular expression {:?}.",
                        CAPTURE_CONTAINER_NAME.as_str()
                    ));
                }
                if name.ends_with('-') {
                    problems.push(
                        "A capture_container_name must not end with a hyphen, e.g. '-'.".to_string(),
                    );
                }
                if name.contains("--") {
                    problems.push(
                        "A capture_container_name must not contain consecutive hyphens, e.g. '--'."
                            .to_string(),
                    );
                }
            }
        }

        match self.capture_name_prefix.as_deref() {
            None => problems.push("A capture_name_prefix must be specified".to_string()),
            Some(prefix) => {
                if !CAPTURE_NAME_PREFIX.is_match(prefix) {
                    problems.push(format!(
                        "A capture_name_prefix must satisfy the regular expression {:?}.",
                        CAPTURE_NAME_PREFIX.as_str()
                    ));
                }
                if prefix.ends_with('-') || prefix.ends_with('.') {
                    problems
                        .push("A capture_name_prefix must not end with a hyphen or period.".to_string());
                }
            }
        }
    }

    fn check_network(&self, problems: &mut Vec<String>) {
        if self.virtual_network_name.is_none() {
            if self.virtual_network_resource_group_name.is_some() {
                problems.push(
                    "If virtual_network_resource_group_name is specified, so must virtual_network_name"
                        .to_string(),
                );
            }
            if self.virtual_network_subnet_name.is_some() {
                problems.push(
                    "If virtual_network_subnet_name is specified, so must virtual_network_name"
                        .to_string(),
                );
            }
            if self.private_virtual_network_with_public_ip {
                problems.push(
                    "If private_virtual_network_with_public_ip is set, so must virtual_network_name"
                        .to_string(),
                );
            }
        }
    }

    fn check_tags(&self, problems: &mut Vec<String>) {
        if self.azure_tags.len() > MAX_TAGS {
            problems.push(format!(
                "a max of {} tags are supported, but {} were provided",
                MAX_TAGS,
                self.azure_tags.len()
            ));
        }
        for (name, value) in &self.azure_tags {
            if name.len() > MAX_TAG_NAME_LEN {
                problems.push(format!(
                    "the tag name {:?} exceeds ({}) the {} character limit",
                    name,
                    name.len(),
                    MAX_TAG_NAME_LEN
                ));
            }
            if value.len() > MAX_TAG_VALUE_LEN {
                problems.push(format!(
                    "the tag value {:?} exceeds ({}) the {} character limit",
                    value,
                    value.len(),
                    MAX_TAG_VALUE_LEN
                ));
            }
        }
    }

    /// Output is a managed image rather than a VHD in a storage account.
    pub fn is_managed_image(&self) -> bool {
        self.managed_image_name.is_some() || self.managed_image_resource_group_name.is_some()
    }

    pub fn os_type(&self) -> OsType {
        self.os_type.unwrap_or(OsType::Linux)
    }

    pub fn cloud_environment(&self) -> Result<CloudEnvironment> {
        CloudEnvironment::from_name(
            self.cloud_environment_name
                .as_deref()
                .unwrap_or(DEFAULT_CLOUD_ENVIRONMENT_NAME),
        )
    }

    pub fn vm_size(&self) -> &str {
        self.vm_size.as_deref().unwrap_or(DEFAULT_VM_SIZE)
    }

    pub fn user_name(&self) -> &str {
        self.communicator.username.as_deref().unwrap_or(DEFAULT_USER_NAME)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(
            self.polling_interval_secs
                .unwrap_or(DEFAULT_POLLING_INTERVAL_SECS),
        )
    }

    /// The network is given by name only and must be looked up.
    pub fn needs_network_resolution(&self) -> bool {
        self.virtual_network_name.is_some()
            && (self.virtual_network_resource_group_name.is_none()
                || self.virtual_network_subnet_name.is_none())
    }
}

/// Trim, lower-case and de-duplicate replication regions, always including
/// the build location.
pub fn normalize_replication_regions(location: &str, regions: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    let location = normalize_region(location);
    if !location.is_empty() {
        normalized.push(location);
    }
    for region in regions {
        let region = normalize_region(region);
        if !region.is_empty() && !normalized.contains(&region) {
            normalized.push(region);
        }
    }
    normalized
}

fn normalize_region(region: &str) -> String {
    region
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}
