use crate::keys::{ADMIN_PASSWORD, COMPUTE_NAME, GUEST_CREDENTIAL_FILE};
use async_trait::async_trait;
use bakeflow_step::{CancellationToken, StateBag, Step, StepAction, halt};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Hand the temporary admin password to the provisioning phase through a
/// file only the current user can read. The file is removed on cleanup.
pub struct SaveGuestCredential {
    directory: PathBuf,
}

impl SaveGuestCredential {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

async fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await?;
    }
    file.write_all(contents.as_bytes()).await?;
    file.flush().await
}

#[async_trait]
impl Step for SaveGuestCredential {
    fn name(&self) -> &str {
        "save-guest-credential"
    }

    fn reads(&self) -> &[&'static str] {
        const READS: &[&str] = &[COMPUTE_NAME.name(), ADMIN_PASSWORD.name()];
        READS
    }

    fn writes(&self) -> &[&'static str] {
        const WRITES: &[&str] = &[GUEST_CREDENTIAL_FILE.name()];
        WRITES
    }

    async fn run(&self, _cancel: &CancellationToken, state: &mut StateBag) -> StepAction {
        let path = self
            .directory
            .join(format!("{}.credential", state.get(COMPUTE_NAME)));
        let password = state.get(ADMIN_PASSWORD).clone();

        if let Err(e) = write_private(&path, &password).await {
            return halt(
                state,
                anyhow::Error::new(e)
                    .context(format!("failed to write {}", path.display())),
            );
        }

        tracing::debug!("Guest credential saved to {}", path.display());
        state.put(GUEST_CREDENTIAL_FILE, path);
        StepAction::Continue
    }

    async fn cleanup(&self, state: &mut StateBag) -> anyhow::Result<()> {
        let Some(path) = state.remove(GUEST_CREDENTIAL_FILE) else {
            return Ok(());
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e).context(format!("failed to remove {}", path.display()))),
        }
    }
}
