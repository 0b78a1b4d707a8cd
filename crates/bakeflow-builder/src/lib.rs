//! bakeflow image builder
//!
//! This crate assembles the image pipeline on top of the step engine:
//! typed state keys, the concrete build steps, virtual network resolution,
//! deployment documents for the build VM, guest provisioning and the
//! [`Builder`] driver that turns a configuration into an [`Artifact`].

pub mod artifact;
pub mod builder;
pub mod error;
pub mod keys;
pub mod provisioner;
pub mod remote;
pub mod resolver;
pub mod steps;
pub mod template;

#[cfg(test)]
mod testing;

pub use artifact::{AdditionalDisk, Artifact, ManagedImageArtifact, VhdArtifact};
pub use builder::Builder;
pub use error::{BuildError, Result};
pub use provisioner::{CommandProvisioner, ProvisionTarget, Provisioner};
pub use remote::Remote;
pub use resolver::{NetworkTarget, ResourceResolver};
pub use template::{DeploymentFactory, TemplateFactory};
