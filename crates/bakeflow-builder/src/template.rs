//! Deployment documents for the build VM and the WinRM key vault
//!
//! Documents are produced lazily from the state bag because some inputs
//! (the location of an existing build group, the certificate URL) are only
//! known once earlier steps have run.

use crate::keys::{ADMIN_PASSWORD, CERTIFICATE_URL, KEY_VAULT_NAME, LOCATION, TAGS};
use crate::resolver::NetworkTarget;
use crate::steps::EndpointType;
use anyhow::Context;
use base64::Engine;
use bakeflow_cloud::DeploymentSpec;
use bakeflow_config::{BuildConfig, CloudEnvironment, OsType, TempNames};
use bakeflow_step::StateBag;
use serde_json::{Value, json};
use std::sync::Arc;

/// Builds a deployment document from the current state.
pub type DeploymentFactory =
    Arc<dyn Fn(&StateBag) -> anyhow::Result<DeploymentSpec> + Send + Sync>;

/// Name of the key vault secret holding the WinRM certificate
pub const KEY_VAULT_SECRET_NAME: &str = "bakeflowKeyVaultSecret";

const SCHEMA: &str =
    "https://schema.management.azure.com/schemas/2015-01-01/deploymentTemplate.json#";
const DEFAULT_OS_DISK_STORAGE_TYPE: &str = "Standard_LRS";

#[derive(Debug, Clone)]
pub struct TemplateFactory {
    config: BuildConfig,
    names: TempNames,
    environment: CloudEnvironment,
    network: Option<NetworkTarget>,
    /// Base64 PKCS#12 bundle for Windows guests
    certificate: Option<String>,
}

impl TemplateFactory {
    pub fn new(
        config: BuildConfig,
        names: TempNames,
        environment: CloudEnvironment,
        network: Option<NetworkTarget>,
        certificate: Option<String>,
    ) -> Self {
        Self {
            config,
            names,
            environment,
            network,
            certificate,
        }
    }

    pub fn virtual_machine(&self) -> DeploymentFactory {
        let factory = self.clone();
        Arc::new(move |state| factory.virtual_machine_spec(state))
    }

    pub fn key_vault(&self) -> DeploymentFactory {
        let factory = self.clone();
        Arc::new(move |state| factory.key_vault_spec(state))
    }

    pub fn virtual_machine_spec(&self, state: &StateBag) -> anyhow::Result<DeploymentSpec> {
        let location = state
            .get_opt(LOCATION)
            .context("the build location is not known yet")?;
        let password = state
            .get_opt(ADMIN_PASSWORD)
            .context("no admin password was generated")?;
        let tags = state.get_opt(TAGS).cloned().unwrap_or_default();
        let endpoint = EndpointType::from_config(&self.config);

        let mut resources = Vec::new();
        if endpoint.has_public_ip() {
            resources.push(json!({
                "apiVersion": "2022-07-01",
                "type": "Microsoft.Network/publicIPAddresses",
                "name": "[parameters('publicIPAddressName')]",
                "location": location,
                "tags": tags,
                "properties": { "publicIPAllocationMethod": "Dynamic" }
            }));
        }
        if self.network.is_none() {
            resources.push(json!({
                "apiVersion": "2022-07-01",
                "type": "Microsoft.Network/virtualNetworks",
                "name": "[parameters('virtualNetworkName')]",
                "location": location,
                "tags": tags,
                "properties": {
                    "addressSpace": { "addressPrefixes": ["10.0.0.0/16"] },
                    "subnets": [{
                        "name": "[parameters('subnetName')]",
                        "properties": { "addressPrefix": "10.0.0.0/24" }
                    }]
                }
            }));
        }
        resources.push(self.network_interface(location, &tags, endpoint));
        resources.push(self.vm_resource(location, &tags, state)?);

        let (virtual_network, subnet) = match &self.network {
            Some(target) => (target.virtual_network.as_str(), target.subnet.as_str()),
            None => (
                self.names.virtual_network_name.as_str(),
                self.names.subnet_name.as_str(),
            ),
        };

        let template = json!({
            "$schema": SCHEMA,
            "contentVersion": "1.0.0.0",
            "parameters": string_parameters(&[
                "adminUsername",
                "adminPassword",
                "vmSize",
                "vmName",
                "nicName",
                "publicIPAddressName",
                "osDiskName",
                "virtualNetworkName",
                "subnetName",
            ]),
            "resources": resources,
        });

        let parameters = parameter_values(&[
            ("adminUsername", self.config.user_name()),
            ("adminPassword", password.as_str()),
            ("vmSize", self.config.vm_size()),
            ("vmName", self.names.compute_name.as_str()),
            ("nicName", self.names.nic_name.as_str()),
            ("publicIPAddressName", self.names.public_ip_name.as_str()),
            ("osDiskName", self.names.os_disk_name.as_str()),
            ("virtualNetworkName", virtual_network),
            ("subnetName", subnet),
        ]);

        Ok(DeploymentSpec::new(template, parameters))
    }

    fn subnet_reference(&self) -> String {
        match &self.network {
            Some(target) => format!(
                "[resourceId('{}', 'Microsoft.Network/virtualNetworks/subnets', parameters('virtualNetworkName'), parameters('subnetName'))]",
                target.resource_group
            ),
            None => "[resourceId('Microsoft.Network/virtualNetworks/subnets', parameters('virtualNetworkName'), parameters('subnetName'))]".to_string(),
        }
    }

    fn network_interface(&self, location: &str, tags: &bakeflow_cloud::Tags, endpoint: EndpointType) -> Value {
        let mut depends_on = Vec::new();
        let mut ip_configuration = json!({
            "privateIPAllocationMethod": "Dynamic",
            "subnet": { "id": self.subnet_reference() }
        });
        if endpoint.has_public_ip() {
            depends_on.push(
                "[concat('Microsoft.Network/publicIPAddresses/', parameters('publicIPAddressName'))]",
            );
            ip_configuration["publicIPAddress"] = json!({
                "id": "[resourceId('Microsoft.Network/publicIPAddresses', parameters('publicIPAddressName'))]"
            });
        }
        if self.network.is_none() {
            depends_on.push(
                "[concat('Microsoft.Network/virtualNetworks/', parameters('virtualNetworkName'))]",
            );
        }

        json!({
            "apiVersion": "2022-07-01",
            "type": "Microsoft.Network/networkInterfaces",
            "name": "[parameters('nicName')]",
            "location": location,
            "tags": tags,
            "dependsOn": depends_on,
            "properties": {
                "ipConfigurations": [{
                    "name": "ipconfig",
                    "properties": ip_configuration
                }]
            }
        })
    }

    fn vm_resource(&self, location: &str, tags: &bakeflow_cloud::Tags, state: &StateBag) -> anyhow::Result<Value> {
        let mut os_profile = json!({
            "computerName": "[parameters('vmName')]",
            "adminUsername": "[parameters('adminUsername')]",
            "adminPassword": "[parameters('adminPassword')]",
        });

        match self.config.os_type() {
            OsType::Linux => {
                os_profile["linuxConfiguration"] = json!({ "disablePasswordAuthentication": false });
            }
            OsType::Windows => {
                let certificate_url = state
                    .get_opt(CERTIFICATE_URL)
                    .context("the WinRM certificate URL is not known yet")?;
                let vault = state
                    .get_opt(KEY_VAULT_NAME)
                    .context("no key vault name was generated")?;
                os_profile["secrets"] = json!([{
                    "sourceVault": {
                        "id": format!("[resourceId(resourceGroup().name, 'Microsoft.KeyVault/vaults', '{}')]", vault)
                    },
                    "vaultCertificates": [{
                        "certificateUrl": certificate_url,
                        "certificateStore": "My"
                    }]
                }]);
                os_profile["windowsConfiguration"] = json!({
                    "provisionVMAgent": true,
                    "winRM": {
                        "listeners": [{ "protocol": "https", "certificateUrl": certificate_url }]
                    }
                });
            }
        }

        let mut os_disk = json!({
            "name": "[parameters('osDiskName')]",
            "osType": self.config.os_type().to_string(),
            "createOption": "FromImage",
            "caching": "ReadWrite",
        });
        if self.config.is_managed_image() {
            os_disk["managedDisk"] = json!({
                "storageAccountType": self
                    .config
                    .managed_image_storage_account_type
                    .as_deref()
                    .unwrap_or(DEFAULT_OS_DISK_STORAGE_TYPE)
            });
        } else {
            let account = self
                .config
                .storage_account
                .as_deref()
                .context("a VHD build needs a storage account")?;
            os_disk["vhd"] = json!({
                "uri": format!(
                    "{}images/{}.vhd",
                    self.environment.blob_endpoint(account),
                    self.names.os_disk_name
                )
            });
        }

        let mut storage_profile = json!({ "osDisk": os_disk });
        match &self.config.image_url {
            Some(url) => {
                storage_profile["osDisk"]["image"] = json!({ "uri": url });
            }
            None => {
                storage_profile["imageReference"] = json!({
                    "publisher": self.config.image_publisher,
                    "offer": self.config.image_offer,
                    "sku": self.config.image_sku,
                    "version": self.config.image_version,
                });
            }
        }

        Ok(json!({
            "apiVersion": "2022-11-01",
            "type": "Microsoft.Compute/virtualMachines",
            "name": "[parameters('vmName')]",
            "location": location,
            "tags": tags,
            "dependsOn": [
                "[concat('Microsoft.Network/networkInterfaces/', parameters('nicName'))]"
            ],
            "properties": {
                "hardwareProfile": { "vmSize": "[parameters('vmSize')]" },
                "osProfile": os_profile,
                "storageProfile": storage_profile,
                "networkProfile": {
                    "networkInterfaces": [{
                        "id": "[resourceId('Microsoft.Network/networkInterfaces', parameters('nicName'))]"
                    }]
                },
                "diagnosticsProfile": { "bootDiagnostics": { "enabled": false } }
            }
        }))
    }

    pub fn key_vault_spec(&self, state: &StateBag) -> anyhow::Result<DeploymentSpec> {
        let location = state
            .get_opt(LOCATION)
            .context("the build location is not known yet")?;
        let vault = state
            .get_opt(KEY_VAULT_NAME)
            .context("no key vault name was generated")?;
        let tags = state.get_opt(TAGS).cloned().unwrap_or_default();
        let certificate = self
            .certificate
            .as_deref()
            .context("a Windows build needs a WinRM certificate")?;
        let tenant_id = self
            .config
            .tenant_id
            .as_deref()
            .context("a Windows build needs a tenant_id")?;
        let object_id = self
            .config
            .object_id
            .as_deref()
            .context("a Windows build needs an object_id")?;

        let template = json!({
            "$schema": SCHEMA,
            "contentVersion": "1.0.0.0",
            "parameters": string_parameters(&[
                "keyVaultName",
                "keyVaultSecretName",
                "keyVaultSecretValue",
                "objectId",
                "tenantId",
            ]),
            "resources": [{
                "apiVersion": "2022-07-01",
                "type": "Microsoft.KeyVault/vaults",
                "name": "[parameters('keyVaultName')]",
                "location": location,
                "tags": tags,
                "properties": {
                    "enabledForDeployment": true,
                    "enabledForTemplateDeployment": true,
                    "tenantId": "[parameters('tenantId')]",
                    "accessPolicies": [{
                        "objectId": "[parameters('objectId')]",
                        "tenantId": "[parameters('tenantId')]",
                        "permissions": {
                            "keys": ["all"],
                            "secrets": ["all"]
                        }
                    }],
                    "sku": { "name": "standard", "family": "A" }
                },
                "resources": [{
                    "apiVersion": "2022-07-01",
                    "type": "secrets",
                    "name": "[parameters('keyVaultSecretName')]",
                    "dependsOn": [
                        "[concat('Microsoft.KeyVault/vaults/', parameters('keyVaultName'))]"
                    ],
                    "properties": { "value": "[parameters('keyVaultSecretValue')]" }
                }]
            }]
        });

        let secret = certificate_secret(certificate, &self.names.certificate_password);
        let parameters = parameter_values(&[
            ("keyVaultName", vault.as_str()),
            ("keyVaultSecretName", KEY_VAULT_SECRET_NAME),
            ("keyVaultSecretValue", secret.as_str()),
            ("objectId", object_id),
            ("tenantId", tenant_id),
        ]);

        Ok(DeploymentSpec::new(template, parameters))
    }
}

/// Key vault secret format expected by the guest agent when installing a
/// certificate.
fn certificate_secret(pfx_base64: &str, password: &str) -> String {
    let document = json!({
        "data": pfx_base64.trim(),
        "dataType": "pfx",
        "password": password,
    });
    base64::engine::general_purpose::STANDARD.encode(document.to_string())
}

fn string_parameters(names: &[&str]) -> Value {
    let mut parameters = serde_json::Map::new();
    for name in names {
        parameters.insert(name.to_string(), json!({ "type": "string" }));
    }
    Value::Object(parameters)
}

fn parameter_values(values: &[(&str, &str)]) -> Value {
    let mut parameters = serde_json::Map::new();
    for (name, value) in values {
        parameters.insert(name.to_string(), json!({ "value": value }));
    }
    Value::Object(parameters)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux_vhd() -> BuildConfig {
        let mut config = BuildConfig {
            subscription_id: "sub-1".into(),
            os_type: Some(OsType::Linux),
            image_publisher: Some("Canonical".into()),
            image_offer: Some("UbuntuServer".into()),
            image_sku: Some("16.04-LTS".into()),
            location: Some("westus".into()),
            storage_account: Some("bakeimages".into()),
            resource_group_name: Some("images".into()),
            capture_container_name: Some("images".into()),
            capture_name_prefix: Some("bake".into()),
            ..Default::default()
        };
        config.apply_defaults();
        config
    }

    fn factory(config: BuildConfig, network: Option<NetworkTarget>) -> TemplateFactory {
        let environment = config.cloud_environment().unwrap();
        TemplateFactory::new(config, TempNames::generate(), environment, network, None)
    }

    fn state() -> StateBag {
        let mut state = StateBag::new();
        state.put(LOCATION, "westus".to_string());
        state.put(ADMIN_PASSWORD, "Secret123".to_string());
        state
    }

    fn resource<'a>(spec: &'a DeploymentSpec, resource_type: &str) -> Option<&'a Value> {
        spec.template["resources"]
            .as_array()
            .unwrap()
            .iter()
            .find(|r| r["type"] == resource_type)
    }

    #[test]
    fn test_vhd_os_disk_lands_in_storage_account() {
        let factory = factory(linux_vhd(), None);
        let spec = factory.virtual_machine_spec(&state()).unwrap();

        let vm = resource(&spec, "Microsoft.Compute/virtualMachines").unwrap();
        let uri = vm["properties"]["storageProfile"]["osDisk"]["vhd"]["uri"]
            .as_str()
            .unwrap();
        assert!(uri.starts_with("https://bakeimages.blob.core.windows.net/images/bkos"));
        assert!(uri.ends_with(".vhd"));
        assert_eq!(
            vm["properties"]["storageProfile"]["imageReference"]["offer"],
            "UbuntuServer"
        );
        assert_eq!(spec.parameters["adminPassword"]["value"], "Secret123");
    }

    #[test]
    fn test_new_network_and_public_ip_by_default() {
        let spec = factory(linux_vhd(), None).virtual_machine_spec(&state()).unwrap();

        assert!(resource(&spec, "Microsoft.Network/virtualNetworks").is_some());
        assert!(resource(&spec, "Microsoft.Network/publicIPAddresses").is_some());
    }

    #[test]
    fn test_existing_private_network() {
        let mut config = linux_vhd();
        config.virtual_network_name = Some("shared".into());
        let target = NetworkTarget {
            virtual_network: "shared".into(),
            resource_group: "net-rg".into(),
            subnet: "build".into(),
        };
        let spec = factory(config, Some(target)).virtual_machine_spec(&state()).unwrap();

        assert!(resource(&spec, "Microsoft.Network/virtualNetworks").is_none());
        assert!(resource(&spec, "Microsoft.Network/publicIPAddresses").is_none());
        let nic = resource(&spec, "Microsoft.Network/networkInterfaces").unwrap();
        let subnet = nic["properties"]["ipConfigurations"][0]["properties"]["subnet"]["id"]
            .as_str()
            .unwrap();
        assert!(subnet.contains("'net-rg'"));
        assert_eq!(spec.parameters["subnetName"]["value"], "build");
    }

    #[test]
    fn test_managed_os_disk_uses_storage_type() {
        let mut config = linux_vhd();
        config.storage_account = None;
        config.resource_group_name = None;
        config.capture_container_name = None;
        config.capture_name_prefix = None;
        config.managed_image_name = Some("golden".into());
        config.managed_image_resource_group_name = Some("images".into());
        config.managed_image_storage_account_type = Some("Premium_LRS".into());

        let spec = factory(config, None).virtual_machine_spec(&state()).unwrap();
        let vm = resource(&spec, "Microsoft.Compute/virtualMachines").unwrap();
        assert_eq!(
            vm["properties"]["storageProfile"]["osDisk"]["managedDisk"]["storageAccountType"],
            "Premium_LRS"
        );
    }

    #[test]
    fn test_windows_needs_certificate_url() {
        let mut config = linux_vhd();
        config.os_type = Some(OsType::Windows);
        let factory = factory(config, None);

        let mut state = state();
        assert!(factory.virtual_machine_spec(&state).is_err());

        state.put(KEY_VAULT_NAME, "bkkv1".to_string());
        state.put(
            CERTIFICATE_URL,
            "https://bkkv1.vault.azure.net/secrets/bakeflowKeyVaultSecret/1".to_string(),
        );
        let spec = factory.virtual_machine_spec(&state).unwrap();
        let vm = resource(&spec, "Microsoft.Compute/virtualMachines").unwrap();
        assert_eq!(
            vm["properties"]["osProfile"]["windowsConfiguration"]["winRM"]["listeners"][0]["protocol"],
            "https"
        );
    }

    #[test]
    fn test_key_vault_secret_wraps_certificate() {
        let mut config = linux_vhd();
        config.os_type = Some(OsType::Windows);
        config.tenant_id = Some("tenant".into());
        config.object_id = Some("object".into());
        let environment = config.cloud_environment().unwrap();
        let factory = TemplateFactory::new(
            config,
            TempNames::generate(),
            environment,
            None,
            Some("UEZYREFUQQ==\n".into()),
        );

        let mut state = state();
        state.put(KEY_VAULT_NAME, "bkkv1".to_string());
        let spec = factory.key_vault_spec(&state).unwrap();

        let secret = spec.parameters["keyVaultSecretValue"]["value"].as_str().unwrap();
        let decoded = base64::engine::general_purpose::STANDARD.decode(secret).unwrap();
        let document: Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(document["data"], "UEZYREFUQQ==");
        assert_eq!(document["dataType"], "pfx");
        assert_eq!(spec.parameters["keyVaultSecretName"]["value"], KEY_VAULT_SECRET_NAME);
    }
}
