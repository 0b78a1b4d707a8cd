//! What a successful build leaves behind

use crate::error::Result;
use bakeflow_cloud::{CaptureTemplate, StorageClient};
use chrono::{DateTime, Months, Utc};
use serde::Serialize;
use std::fmt;

/// A data disk image with its read-only download URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdditionalDisk {
    pub uri: String,
    pub uri_read_only_sas: String,
}

/// Image captured as VHD blobs in the storage account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VhdArtifact {
    pub storage_account_location: String,
    pub os_disk_uri: String,
    pub os_disk_uri_read_only_sas: String,
    pub template_uri: String,
    pub template_uri_read_only_sas: String,
    pub additional_disks: Vec<AdditionalDisk>,
}

impl VhdArtifact {
    /// Build the artifact from a capture template. Every URL gets a
    /// read-only signature valid for one month.
    pub async fn from_template(
        template: &CaptureTemplate,
        location: &str,
        storage: &dyn StorageClient,
    ) -> Result<Self> {
        let os_disk_uri = template
            .os_disk_image_uri()
            .ok_or_else(|| anyhow::anyhow!("capture template has no OS disk image"))?
            .to_string();
        let template_uri = template_uri(&os_disk_uri);
        let expiry = sas_expiry(Utc::now())?;

        let os_disk_uri_read_only_sas = storage.read_only_url(&os_disk_uri, expiry).await?;
        let template_uri_read_only_sas = storage.read_only_url(&template_uri, expiry).await?;

        let mut additional_disks = Vec::new();
        for uri in template.data_disk_image_uris() {
            additional_disks.push(AdditionalDisk {
                uri: uri.to_string(),
                uri_read_only_sas: storage.read_only_url(uri, expiry).await?,
            });
        }

        Ok(Self {
            storage_account_location: location.to_string(),
            os_disk_uri,
            os_disk_uri_read_only_sas,
            template_uri,
            template_uri_read_only_sas,
            additional_disks,
        })
    }
}

/// The capture writes the VM template next to the OS disk:
/// `<prefix>-osDisk.<id>.vhd` becomes `<prefix>-vmTemplate.<id>.json`.
/// Only the blob name is rewritten; anything else is returned unchanged.
fn template_uri(os_disk_uri: &str) -> String {
    let (dir, name) = match os_disk_uri.rsplit_once('/') {
        Some((dir, name)) => (Some(dir), name),
        None => (None, os_disk_uri),
    };
    let mut parts: Vec<&str> = name.split('.').collect();
    if parts.len() < 3 {
        return os_disk_uri.to_string();
    }
    let Some(prefix) = parts[0].strip_suffix("-osDisk") else {
        return os_disk_uri.to_string();
    };
    let stem = format!("{}-vmTemplate", prefix);
    parts[0] = &stem;
    let last = parts.len() - 1;
    parts[last] = "json";

    let name = parts.join(".");
    match dir {
        Some(dir) => format!("{}/{}", dir, name),
        None => name,
    }
}

fn sas_expiry(now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    now.checked_add_months(Months::new(1))
        .ok_or_else(|| anyhow::anyhow!("cannot compute an expiry one month after {}", now).into())
}

/// Image captured as a managed image, optionally with a snapshot of the OS
/// disk and a shared gallery version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedImageArtifact {
    pub resource_group: String,
    pub name: String,
    pub location: String,
    pub id: String,
    pub os_disk_snapshot: Option<String>,
    pub gallery_image_version_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    Vhd(VhdArtifact),
    ManagedImage(ManagedImageArtifact),
}

impl Artifact {
    /// Identifier of the primary image
    pub fn id(&self) -> &str {
        match self {
            Artifact::Vhd(vhd) => &vhd.os_disk_uri,
            Artifact::ManagedImage(image) => &image.id,
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::Vhd(vhd) => {
                writeln!(f, "Storage account location: {}", vhd.storage_account_location)?;
                writeln!(f, "OS disk: {}", vhd.os_disk_uri)?;
                writeln!(f, "OS disk (read-only SAS): {}", vhd.os_disk_uri_read_only_sas)?;
                writeln!(f, "Template: {}", vhd.template_uri)?;
                write!(f, "Template (read-only SAS): {}", vhd.template_uri_read_only_sas)?;
                if !vhd.additional_disks.is_empty() {
                    write!(f, "\nAdditional disks: {}", vhd.additional_disks.len())?;
                    for (i, disk) in vhd.additional_disks.iter().enumerate() {
                        write!(f, "\n  [{}] {}", i, disk.uri)?;
                        write!(f, "\n  [{}] read-only SAS: {}", i, disk.uri_read_only_sas)?;
                    }
                }
                Ok(())
            }
            Artifact::ManagedImage(image) => {
                writeln!(f, "Managed image resource group: {}", image.resource_group)?;
                writeln!(f, "Managed image name: {}", image.name)?;
                writeln!(f, "Managed image id: {}", image.id)?;
                write!(f, "Managed image location: {}", image.location)?;
                if let Some(snapshot) = &image.os_disk_snapshot {
                    write!(f, "\nOS disk snapshot: {}", snapshot)?;
                }
                if let Some(version) = &image.gallery_image_version_id {
                    write!(f, "\nShared image gallery version: {}", version)?;
                }
                Ok(())
            }
        }
    }
}
