use crate::keys::{CERTIFICATE_URL, KEY_VAULT_NAME, RESOURCE_GROUP_NAME};
use crate::remote::Remote;
use crate::template::KEY_VAULT_SECRET_NAME;
use async_trait::async_trait;
use bakeflow_step::{CancellationToken, StateBag, Step, StepAction, halt};

/// Look up the versioned URL of the WinRM certificate stored in the
/// temporary key vault.
pub struct GetCertificate {
    remote: Remote,
}

impl GetCertificate {
    pub fn new(remote: Remote) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl Step for GetCertificate {
    fn name(&self) -> &str {
        "get-certificate"
    }

    fn reads(&self) -> &[&'static str] {
        const READS: &[&str] = &[RESOURCE_GROUP_NAME.name(), KEY_VAULT_NAME.name()];
        READS
    }

    fn writes(&self) -> &[&'static str] {
        const WRITES: &[&str] = &[CERTIFICATE_URL.name()];
        WRITES
    }

    async fn run(&self, _cancel: &CancellationToken, state: &mut StateBag) -> StepAction {
        let resource_group = state.get(RESOURCE_GROUP_NAME).clone();
        let vault = state.get(KEY_VAULT_NAME).clone();

        tracing::info!("Getting the certificate's URL from key vault '{}'", vault);
        match self
            .remote
            .clients
            .key_vault
            .secret_url(&resource_group, &vault, KEY_VAULT_SECRET_NAME)
            .await
        {
            Ok(url) => {
                tracing::debug!("Certificate URL: {}", url);
                state.put(CERTIFICATE_URL, url);
                StepAction::Continue
            }
            Err(e) => halt(state, e),
        }
    }
}
