//! Resource Manager resource identifiers

use crate::error::{CloudError, Result};
use std::fmt;
use std::str::FromStr;

/// A parsed `/subscriptions/{sub}/resourceGroups/{rg}/providers/{ns}/{type}/{name}` id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    pub subscription_id: String,
    pub resource_group: String,
    pub provider: String,
    /// Full type, including parent types (`virtualNetworks/subnets`)
    pub resource_type: String,
    pub name: String,
    raw: String,
}

impl ResourceId {
    /// `Microsoft.Compute/disks` style type used for api-version lookup
    pub fn qualified_type(&self) -> String {
        format!("{}/{}", self.provider, self.resource_type)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for ResourceId {
    type Err = CloudError;

    fn from_str(id: &str) -> Result<Self> {
        let malformed = || CloudError::MalformedResourceId(id.to_string());
        let segments: Vec<&str> = id.trim_matches('/').split('/').collect();

        // subscriptions/{s}/resourceGroups/{rg}/providers/{ns}/{type}/{name}[/{type}/{name}]...
        if segments.len() < 8 || segments.len() % 2 != 0 {
            return Err(malformed());
        }
        if !segments[0].eq_ignore_ascii_case("subscriptions")
            || !segments[2].eq_ignore_ascii_case("resourceGroups")
            || !segments[4].eq_ignore_ascii_case("providers")
        {
            return Err(malformed());
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(malformed());
        }

        let types: Vec<&str> = segments[6..].iter().step_by(2).copied().collect();
        let name = segments[segments.len() - 1];

        Ok(Self {
            subscription_id: segments[1].to_string(),
            resource_group: segments[3].to_string(),
            provider: segments[5].to_string(),
            resource_type: types.join("/"),
            name: name.to_string(),
            raw: format!("/{}", segments.join("/")),
        })
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
