use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub discord_token: String,
    pub application_id: String,
    /// Hex-encoded Ed25519 key used to verify interaction signatures.
    pub public_key: String,
    pub guild_id: String,
    pub admin_id: String,
    /// Host address that must appear in a tmate connection line.
    pub host_ip: String,
    pub listen_addr: SocketAddr,
    pub deploy_ready_timeout: Duration,
    pub deploy_poll_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            discord_token: required("DISCORD_TOKEN")?,
            application_id: required("DISCORD_APPLICATION_ID")?,
            public_key: required("DISCORD_PUBLIC_KEY")?,
            guild_id: required("GUILD_ID")?,
            admin_id: required("ADMIN_ID")?,
            host_ip: required("HOST_IP")?,
            listen_addr: parsed("LISTEN_ADDR", "0.0.0.0:8080")?,
            deploy_ready_timeout: ready_timeout(parsed("DEPLOY_READY_TIMEOUT_SECS", "30")?)?,
            deploy_poll_interval: Duration::from_millis(parsed("DEPLOY_POLL_INTERVAL_MS", "1000")?),
        })
    }
}

/// Upper bound on how long a deploy waits for its connection line.
const MAX_READY_TIMEOUT_SECS: u64 = 3600;

fn ready_timeout(secs: u64) -> Result<Duration, ConfigError> {
    if secs > MAX_READY_TIMEOUT_SECS {
        return Err(ConfigError::Invalid {
            name: "DEPLOY_READY_TIMEOUT_SECS",
            value: secs.to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parsed<T: FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = env::var(name).unwrap_or_else(|_| default.into());
    value
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}
