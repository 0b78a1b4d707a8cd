//! Guest provisioning collaborators

use async_trait::async_trait;
use bakeflow_config::OsType;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Environment variables handed to provisioning commands
pub const HOST_ENV: &str = "BAKEFLOW_HOST";
pub const USER_ENV: &str = "BAKEFLOW_USER";
pub const OS_TYPE_ENV: &str = "BAKEFLOW_OS_TYPE";
pub const CREDENTIAL_FILE_ENV: &str = "BAKEFLOW_CREDENTIAL_FILE";

/// The reachable guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionTarget {
    pub host: String,
    pub user_name: String,
    pub os_type: OsType,
    /// Mode-0600 file holding the guest password, when one was saved
    pub credential_file: Option<PathBuf>,
}

/// Configures the guest once it is reachable.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self, cancel: CancellationToken, target: ProvisionTarget) -> anyhow::Result<()>;
}

/// Runs shell commands on the build machine, one after another.
pub struct CommandProvisioner {
    commands: Vec<String>,
}

impl CommandProvisioner {
    pub fn new(commands: Vec<String>) -> Self {
        Self { commands }
    }

    fn command(&self, line: &str, target: &ProvisionTarget) -> Command {
        let mut command = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(line);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(line);
            c
        };
        command
            .env(HOST_ENV, &target.host)
            .env(USER_ENV, &target.user_name)
            .env(OS_TYPE_ENV, target.os_type.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(file) = &target.credential_file {
            command.env(CREDENTIAL_FILE_ENV, file);
        }
        command
    }
}

#[async_trait]
impl Provisioner for CommandProvisioner {
    async fn provision(&self, cancel: CancellationToken, target: ProvisionTarget) -> anyhow::Result<()> {
        for line in &self.commands {
            tracing::info!("Provisioning with: {}", line);
            let mut child = self.command(line, &target).spawn()?;

            let status = tokio::select! {
                status = child.wait() => status?,
                _ = cancel.cancelled() => {
                    child.kill().await?;
                    anyhow::bail!("provisioning interrupted");
                }
            };

            if !status.success() {
                anyhow::bail!("provisioning command `{}` failed with {}", line, status);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ProvisionTarget {
        ProvisionTarget {
            host: "10.0.0.4".into(),
            user_name: "bakeflow".into(),
            os_type: OsType::Linux,
            credential_file: None,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_commands_see_host() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("host");
        let provisioner = CommandProvisioner::new(vec![format!(
            "printf %s \"$BAKEFLOW_HOST\" > {}",
            out.display()
        )]);

        provisioner
            .provision(CancellationToken::new(), target())
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(out).unwrap(), "10.0.0.4");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_stops_the_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let provisioner = CommandProvisioner::new(vec![
            "exit 3".into(),
            format!("touch {}", marker.display()),
        ]);

        let err = provisioner
            .provision(CancellationToken::new(), target())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exit 3"));
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation_kills_command() {
        let provisioner = CommandProvisioner::new(vec!["sleep 30".into()]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = provisioner.provision(cancel, target()).await.unwrap_err();
        assert!(err.to_string().contains("interrupted"));
    }
}
