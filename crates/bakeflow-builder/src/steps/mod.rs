//! Build steps
//!
//! One module per step. Each step binds its collaborators at construction
//! and talks to the rest of the pipeline only through the state bag.

mod capture_image;
mod create_resource_group;
mod delete_disks;
mod delete_resource_group;
mod deploy_template;
mod get_certificate;
mod get_ip_address;
mod get_os_disk;
mod power_off;
mod provision;
mod publish_to_gallery;
mod save_guest_credential;
mod snapshot;
mod validate_template;

pub use capture_image::CaptureImage;
pub use create_resource_group::CreateResourceGroup;
pub use delete_disks::{DeleteAdditionalDisks, DeleteOsDisk};
pub use delete_resource_group::DeleteResourceGroup;
pub use deploy_template::{DeployTemplate, delete_deployment_resources};
pub use get_certificate::GetCertificate;
pub use get_ip_address::{EndpointType, GetIpAddress};
pub use get_os_disk::GetOsDisk;
pub use power_off::PowerOffCompute;
pub use provision::Provision;
pub use publish_to_gallery::PublishToGallery;
pub use save_guest_credential::SaveGuestCredential;
pub use snapshot::SnapshotOsDisk;
pub use validate_template::ValidateTemplate;
