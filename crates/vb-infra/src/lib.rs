pub mod cli;
pub mod types;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use types::ContainerId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{runtime} {subcommand} exited with {code:?}: {stderr}")]
    Command {
        runtime: RuntimeName,
        subcommand: &'static str,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{runtime} {subcommand} produced no output")]
    EmptyOutput {
        runtime: RuntimeName,
        subcommand: &'static str,
    },

    #[error("unknown container runtime: {0}")]
    UnknownRuntime(String),

    #[error("unknown image: {0}")]
    UnknownImage(String),
}

impl Error {
    /// Raw diagnostic text from the runtime, if the failure came from it.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::Command { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Supported container runtimes. Both speak the same CLI dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeName {
    Docker,
    Podman,
}

impl RuntimeName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

impl fmt::Display for RuntimeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            other => Err(Error::UnknownRuntime(other.to_string())),
        }
    }
}

/// Backend-agnostic interface to the container runtime.
///
/// Containers are detached and auto-removed; the runtime, not the caller,
/// owns their cleanup once stopped.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Start a detached, auto-removing container running `args` in `image`.
    async fn run(&self, image: &str, args: &[&str]) -> Result<ContainerId>;

    /// Full log output of a container so far.
    async fn logs(&self, id: &ContainerId) -> Result<String>;

    /// Stop a running container.
    async fn stop(&self, id: &ContainerId) -> Result<()>;

    /// Runtime identifier.
    fn name(&self) -> RuntimeName;
}

/// Build the runtime selected by `CONTAINER_RUNTIME` (default: `docker`).
///
/// `CONTAINER_RUNTIME_BIN` overrides the executable, otherwise it is looked
/// up on `PATH` by runtime name.
pub fn build_runtime() -> Result<Arc<dyn ContainerRuntime>> {
    dotenvy::dotenv().ok();

    let name: RuntimeName = std::env::var("CONTAINER_RUNTIME")
        .unwrap_or_else(|_| "docker".into())
        .parse()?;
    let program =
        std::env::var("CONTAINER_RUNTIME_BIN").unwrap_or_else(|_| name.as_str().to_string());

    tracing::info!(runtime = %name, %program, "registered container runtime");
    Ok(Arc::new(cli::CliRuntime::new(name, program)))
}
