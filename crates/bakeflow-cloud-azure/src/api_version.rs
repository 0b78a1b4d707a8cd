//! api-version per resource type

pub const SUBSCRIPTIONS: &str = "2022-12-01";
pub const RESOURCES: &str = "2021-04-01";
pub const COMPUTE: &str = "2023-03-01";
pub const DISKS: &str = "2023-04-02";
pub const GALLERIES: &str = "2022-03-03";
pub const NETWORK: &str = "2023-04-01";
pub const STORAGE: &str = "2023-01-01";
pub const KEY_VAULT: &str = "2023-02-01";

/// Version used to delete or read a resource of the given
/// `Namespace/type` (case-insensitive).
pub fn for_resource_type(resource_type: &str) -> &'static str {
    let lower = resource_type.to_ascii_lowercase();
    let (namespace, kind) = lower.split_once('/').unwrap_or((lower.as_str(), ""));

    match namespace {
        "microsoft.compute" => {
            if kind.starts_with("disks") || kind.starts_with("snapshots") {
                DISKS
            } else if kind.starts_with("galleries") {
                GALLERIES
            } else {
                COMPUTE
            }
        }
        "microsoft.network" => NETWORK,
        "microsoft.storage" => STORAGE,
        "microsoft.keyvault" => KEY_VAULT,
        _ => RESOURCES,
    }
}
