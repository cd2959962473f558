//! In-process fakes for the container runtime and chat delivery.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use discord_api::CreateMessage;
use ed25519_dalek::{Signer, SigningKey};
use vb_infra::types::ContainerId;
use vb_infra::{ContainerRuntime, Error, RuntimeName};
use vb_store::{DocumentStore, MemoryStore};

use crate::auth::SignatureVerifier;
use crate::config::AppConfig;
use crate::lifecycle::{LifecycleManager, LifecycleSettings};
use crate::notify::{Notifier, NotifyError};
use crate::state::AppState;

pub const ADMIN: &str = "1000";
pub const GUILD: &str = "500";
pub const HOST: &str = "203.0.113.5";

const SEED: [u8; 32] = [7u8; 32];

#[derive(Clone)]
pub struct FakeRuntime {
    container_id: String,
    logs: Arc<Mutex<VecDeque<String>>>,
    run_error: Option<String>,
    fail_stop: bool,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeRuntime {
    pub fn new(container_id: &str, logs: &str) -> Self {
        Self::with_log_sequence(container_id, &[logs])
    }

    /// Successive `logs` calls walk the sequence and then repeat its last entry.
    pub fn with_log_sequence(container_id: &str, logs: &[&str]) -> Self {
        Self {
            container_id: container_id.into(),
            logs: Arc::new(Mutex::new(logs.iter().map(|s| s.to_string()).collect())),
            run_error: None,
            fail_stop: false,
            calls: Arc::default(),
        }
    }

    pub fn failing_run(mut self, stderr: &str) -> Self {
        self.run_error = Some(stderr.into());
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn failure(subcommand: &'static str, stderr: &str) -> Error {
        Error::Command {
            runtime: RuntimeName::Docker,
            subcommand,
            code: Some(1),
            stderr: stderr.into(),
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn run(&self, image: &str, args: &[&str]) -> vb_infra::Result<ContainerId> {
        self.record(format!("run {image} {}", args.join(" ")));
        match &self.run_error {
            Some(stderr) => Err(Self::failure("run", stderr)),
            None => Ok(ContainerId(self.container_id.clone())),
        }
    }

    async fn logs(&self, id: &ContainerId) -> vb_infra::Result<String> {
        self.record(format!("logs {id}"));
        let mut logs = self.logs.lock().unwrap();
        let current = if logs.len() > 1 {
            logs.pop_front()
        } else {
            logs.front().cloned()
        };
        Ok(current.unwrap_or_default())
    }

    async fn stop(&self, id: &ContainerId) -> vb_infra::Result<()> {
        self.record(format!("stop {id}"));
        if self.fail_stop {
            return Err(Self::failure("stop", "Error response from daemon: No such container"));
        }
        Ok(())
    }

    fn name(&self) -> RuntimeName {
        RuntimeName::Docker
    }
}

pub type Sent = (String, CreateMessage);

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    refuse_dms: bool,
    dms: Arc<Mutex<Vec<Sent>>>,
    followups: Arc<Mutex<Vec<Sent>>>,
}

impl RecordingNotifier {
    pub fn refusing() -> Self {
        Self {
            refuse_dms: true,
            ..Default::default()
        }
    }

    pub fn dms(&self) -> Vec<Sent> {
        self.dms.lock().unwrap().clone()
    }

    pub fn followups(&self) -> Vec<Sent> {
        self.followups.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn direct_message(&self, user_id: &str, msg: &CreateMessage) -> Result<(), NotifyError> {
        if self.refuse_dms {
            return Err(NotifyError::Refused);
        }
        self.dms.lock().unwrap().push((user_id.into(), msg.clone()));
        Ok(())
    }

    async fn followup(&self, interaction_token: &str, msg: &CreateMessage) -> Result<(), NotifyError> {
        self.followups
            .lock()
            .unwrap()
            .push((interaction_token.into(), msg.clone()));
        Ok(())
    }
}

/// Zero timeout: a deploy reads the logs exactly once.
pub fn settings(host: &str) -> LifecycleSettings {
    LifecycleSettings {
        admin_id: ADMIN.into(),
        host_token: host.into(),
        ready_timeout: Duration::ZERO,
        poll_interval: Duration::ZERO,
    }
}

pub fn manager(
    store: Arc<MemoryStore>,
    runtime: FakeRuntime,
    notifier: RecordingNotifier,
) -> LifecycleManager {
    LifecycleManager::new(store, Arc::new(runtime), Arc::new(notifier), settings(HOST))
}

pub fn signing_key() -> SigningKey {
    SigningKey::from_bytes(&SEED)
}

/// Hex signature over `timestamp || body`, as the platform sends it.
pub fn sign(timestamp: &str, body: &[u8]) -> String {
    let mut message = timestamp.as_bytes().to_vec();
    message.extend_from_slice(body);
    hex::encode(signing_key().sign(&message).to_bytes())
}

pub fn config(host: &str) -> AppConfig {
    AppConfig {
        discord_token: "token".into(),
        application_id: "app".into(),
        public_key: hex::encode(signing_key().verifying_key().to_bytes()),
        guild_id: GUILD.into(),
        admin_id: ADMIN.into(),
        host_ip: host.into(),
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        deploy_ready_timeout: Duration::ZERO,
        deploy_poll_interval: Duration::ZERO,
    }
}

pub fn state_with_host(
    store: Arc<MemoryStore>,
    runtime: FakeRuntime,
    notifier: RecordingNotifier,
    host: &str,
) -> AppState {
    let config = config(host);
    let store: Arc<dyn DocumentStore> = store;
    let notifier: Arc<dyn Notifier> = Arc::new(notifier);
    let lifecycle = LifecycleManager::new(
        store,
        Arc::new(runtime),
        notifier.clone(),
        LifecycleSettings::from_config(&config),
    );

    AppState {
        lifecycle: Arc::new(lifecycle),
        notifier,
        verifier: SignatureVerifier::from_hex(&config.public_key).unwrap(),
        config,
    }
}

pub fn state(store: Arc<MemoryStore>, runtime: FakeRuntime, notifier: RecordingNotifier) -> AppState {
    state_with_host(store, runtime, notifier, HOST)
}
