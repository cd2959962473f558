use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::types::ContainerId;
use crate::{ContainerRuntime, Error, Result, RuntimeName};

/// Drives `docker`/`podman` through their command-line interface.
pub struct CliRuntime {
    name: RuntimeName,
    program: String,
}

impl CliRuntime {
    pub fn new(name: RuntimeName, program: impl Into<String>) -> Self {
        Self {
            name,
            program: program.into(),
        }
    }

    async fn exec(&self, subcommand: &'static str, args: &[&str]) -> Result<Output> {
        debug!(program = %self.program, subcommand, ?args, "runtime: exec");

        let output = Command::new(&self.program)
            .arg(subcommand)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| Error::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(Error::Command {
                runtime: self.name,
                subcommand,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    async fn run(&self, image: &str, args: &[&str]) -> Result<ContainerId> {
        let mut full = vec!["-d", "--rm", image];
        full.extend_from_slice(args);

        let output = self.exec("run", &full).await?;
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(Error::EmptyOutput {
                runtime: self.name,
                subcommand: "run",
            });
        }

        info!(runtime = %self.name, container_id = %id, image, "runtime: container started");
        Ok(ContainerId(id))
    }

    async fn logs(&self, id: &ContainerId) -> Result<String> {
        let output = self.exec("logs", &[id.0.as_str()]).await?;
        // The runtime replays the container's stdout and stderr separately.
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }

    async fn stop(&self, id: &ContainerId) -> Result<()> {
        self.exec("stop", &[id.0.as_str()]).await?;
        info!(runtime = %self.name, container_id = %id, "runtime: container stopped");
        Ok(())
    }

    fn name(&self) -> RuntimeName {
        self.name
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_passes_detached_auto_remove_flags() {
        // `echo` stands in for the runtime and prints its own argv.
        let runtime = CliRuntime::new(RuntimeName::Docker, "echo");
        let id = runtime.run("ubuntu-tmate", &["tmate", "-F"]).await.unwrap();
        assert_eq!(id.0, "run -d --rm ubuntu-tmate tmate -F");
    }

    #[tokio::test]
    async fn logs_reads_runtime_output() {
        let runtime = CliRuntime::new(RuntimeName::Docker, "echo");
        let logs = runtime.logs(&ContainerId("c1".into())).await.unwrap();
        assert_eq!(logs.trim(), "logs c1");
    }

    #[tokio::test]
    async fn non_zero_exit_is_command_error() {
        let runtime = CliRuntime::new(RuntimeName::Podman, "false");
        assert_eq!(runtime.name(), RuntimeName::Podman);
        let err = runtime.stop(&ContainerId("c1".into())).await.unwrap_err();
        match err {
            Error::Command {
                runtime,
                subcommand,
                code,
                ..
            } => {
                assert_eq!(runtime, RuntimeName::Podman);
                assert_eq!(subcommand, "stop");
                assert_eq!(code, Some(1));
            }
            other => panic!("expected command error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let runtime = CliRuntime::new(RuntimeName::Docker, "/nonexistent/runtime-bin");
        let err = runtime.logs(&ContainerId("c1".into())).await.unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
        assert!(err.diagnostic().is_none());
    }

    #[test]
    fn image_names_parse() {
        use crate::types::OsImage;
        assert_eq!("debian-tmate".parse::<OsImage>().unwrap(), OsImage::Debian);
        assert!("alpine".parse::<OsImage>().is_err());
    }
}
