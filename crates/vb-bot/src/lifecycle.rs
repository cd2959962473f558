use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use discord_api::CreateMessage;
use tokio::time::Instant;
use tracing::{info, warn};
use vb_infra::ContainerRuntime;
use vb_infra::types::{ContainerId, OsImage};
use vb_store::DocumentStore;
use vb_store::models::{Deployment, UserEntitlement, VpsInstance, VpsStatus};

use crate::config::AppConfig;
use crate::embeds;
use crate::error::CommandError;
use crate::extract::{SSH_MARKER, find_connection_line};
use crate::notify::Notifier;

/// Command run inside every VPS container: tmate in the foreground.
const DAEMON_ARGS: &[&str] = &["tmate", "-F"];

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub admin_id: String,
    /// Token a log line must contain to count as the connection line.
    pub host_token: String,
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
}

impl LifecycleSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            admin_id: config.admin_id.clone(),
            host_token: config.host_ip.clone(),
            ready_timeout: config.deploy_ready_timeout,
            poll_interval: config.deploy_poll_interval,
        }
    }
}

/// Outcome of a successful deploy.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub vps_id: String,
    pub image: OsImage,
    pub container_id: ContainerId,
    pub connection_string: String,
}

/// Slot grants and the VPS state machine
/// (`available -> running -> stopped`), over an injected store, container
/// runtime and notifier.
pub struct LifecycleManager {
    store: Arc<dyn DocumentStore>,
    runtime: Arc<dyn ContainerRuntime>,
    notifier: Arc<dyn Notifier>,
    settings: LifecycleSettings,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        runtime: Arc<dyn ContainerRuntime>,
        notifier: Arc<dyn Notifier>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            store,
            runtime,
            notifier,
            settings,
        }
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        user_id == self.settings.admin_id
    }

    pub fn require_admin(&self, caller: &str) -> Result<(), CommandError> {
        if self.is_admin(caller) {
            Ok(())
        } else {
            Err(CommandError::Unauthorized)
        }
    }

    // ── Slots ────────────────────────────────────────────────────────

    /// Overwrite `target`'s slot count. Admin only.
    pub async fn grant_slots(
        &self,
        caller: &str,
        target: &str,
        count: u32,
    ) -> Result<(), CommandError> {
        self.require_admin(caller)?;
        UserEntitlement::set_slots(self.store.as_ref(), target, count).await?;
        info!(caller, target, count, "granted vps slots");
        Ok(())
    }

    pub async fn slot_count(&self, user_id: &str) -> Result<u32, CommandError> {
        Ok(UserEntitlement::slots_for(self.store.as_ref(), user_id).await?)
    }

    /// Id of the first `available` instance owned by `user_id`.
    pub async fn find_available_instance(
        &self,
        user_id: &str,
    ) -> Result<Option<String>, CommandError> {
        let vps = VpsInstance::find_available_for_owner(self.store.as_ref(), user_id).await?;
        Ok(vps.map(|v| v.id))
    }

    // ── Deploy ───────────────────────────────────────────────────────

    /// Start a container for an `available` instance and record it as
    /// running. On any failure after the container started, the container
    /// is stopped again and the record is left untouched.
    pub async fn deploy(&self, vps_id: &str, image: OsImage) -> Result<ConnectionInfo, CommandError> {
        let vps = VpsInstance::get(self.store.as_ref(), vps_id)
            .await?
            .ok_or_else(|| CommandError::NotFound(vps_id.to_string()))?;

        if vps.status != VpsStatus::Available {
            return Err(CommandError::NotAvailable {
                id: vps.id,
                status: vps.status,
            });
        }

        let container_id = self.runtime.run(image.as_str(), DAEMON_ARGS).await?;
        info!(
            vps_id,
            runtime = %self.runtime.name(),
            image = %image,
            container_id = %container_id,
            "container started"
        );

        let connection_string = match self.await_connection_string(&container_id).await {
            Ok(line) => line,
            Err(e) => {
                self.abandon(vps_id, &container_id).await;
                return Err(e);
            }
        };

        let deployment = Deployment {
            container_id: &container_id.0,
            image: image.as_str(),
            connection_string: &connection_string,
            deployed_at: Utc::now(),
        };
        if let Err(e) = VpsInstance::mark_running(self.store.as_ref(), vps_id, &deployment).await {
            self.abandon(vps_id, &container_id).await;
            return Err(e.into());
        }

        info!(vps_id, container_id = %container_id, "vps running");
        Ok(ConnectionInfo {
            vps_id: vps_id.to_string(),
            image,
            container_id,
            connection_string,
        })
    }

    /// Poll the container's logs until the connection line shows up or the
    /// readiness deadline passes. The first poll happens immediately.
    async fn await_connection_string(&self, container_id: &ContainerId) -> Result<String, CommandError> {
        // A timeout too large to represent means "no deadline".
        let deadline = Instant::now().checked_add(self.settings.ready_timeout);
        loop {
            let logs = self.runtime.logs(container_id).await?;
            if let Some(line) = find_connection_line(&logs, SSH_MARKER, &self.settings.host_token) {
                return Ok(line.to_string());
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(CommandError::Extraction {
                    container_id: container_id.0.clone(),
                });
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    async fn abandon(&self, vps_id: &str, container_id: &ContainerId) {
        if let Err(e) = self.runtime.stop(container_id).await {
            warn!(vps_id, container_id = %container_id, error = %e, "failed to stop abandoned container");
        }
    }

    // ── Stop ─────────────────────────────────────────────────────────

    /// Stop the requester's running instance. The record only moves to
    /// `stopped` once the runtime confirms the stop.
    pub async fn stop(&self, requester: &str, vps_id: &str) -> Result<(), CommandError> {
        let vps = VpsInstance::get(self.store.as_ref(), vps_id)
            .await?
            .filter(|v| v.is_owned_by(requester))
            .ok_or(CommandError::NotOwnerOrNotFound)?;

        let container_id = vps
            .container_id
            .map(ContainerId)
            .ok_or_else(|| CommandError::NotRunning(vps_id.to_string()))?;

        if let Err(e) = self.runtime.stop(&container_id).await {
            warn!(vps_id, container_id = %container_id, error = %e, "stop failed");
            return Err(e.into());
        }

        VpsInstance::mark_stopped(self.store.as_ref(), vps_id).await?;
        info!(vps_id, requester, "vps stopped");
        Ok(())
    }

    // ── Reassign ─────────────────────────────────────────────────────

    /// Hand an instance to `target`. Admin only. Ownership changes only
    /// after the recipient has been told about it.
    pub async fn reassign(&self, caller: &str, vps_id: &str, target: &str) -> Result<(), CommandError> {
        self.require_admin(caller)?;

        let vps = VpsInstance::get(self.store.as_ref(), vps_id)
            .await?
            .ok_or_else(|| CommandError::NotFound(vps_id.to_string()))?;

        let embed = embeds::received(&vps.id, vps.image.as_deref(), vps.connection_string.as_deref());
        self.notifier
            .direct_message(target, &CreateMessage::embed(embed))
            .await?;

        VpsInstance::set_owner(self.store.as_ref(), vps_id, target).await?;
        info!(vps_id, target, "vps reassigned");
        Ok(())
    }
}
