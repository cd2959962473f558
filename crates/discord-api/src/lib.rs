//! Typed Rust client for the Discord HTTP API.
//!
//! Covers the subset needed by an interactions-endpoint bot:
//! guild command registration, DM channels, channel messages and
//! interaction follow-ups. Gateway (websocket) events are out of scope.

mod types;

pub use types::*;
use types::{ApiErrorBody, CreateDmRequest};

const BASE_URL: &str = "https://discord.com/api/v10";

/// Discord error code for "Cannot send messages to this user".
pub const CANNOT_MESSAGE_USER: u32 = 50007;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("discord api request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("discord api {endpoint} returned {status}: {body}")]
    Api {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
}

impl Error {
    /// The JSON error `code` from an API error body, if there is one.
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::Api { body, .. } => serde_json::from_str::<ApiErrorBody>(body)
                .ok()
                .map(|b| b.code),
            Self::Request(_) => None,
        }
    }

    /// True when the recipient does not accept DMs from the bot.
    pub fn is_dm_refused(&self) -> bool {
        match self {
            Self::Api { status, .. } => {
                *status == reqwest::StatusCode::FORBIDDEN
                    || self.code() == Some(CANNOT_MESSAGE_USER)
            }
            Self::Request(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for the Discord REST API, authenticated as a bot.
#[derive(Clone)]
pub struct DiscordClient {
    token: String,
    http: reqwest::Client,
}

impl DiscordClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{BASE_URL}{path}")
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.token)
    }

    async fn check(resp: reqwest::Response, endpoint: &'static str) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                endpoint,
                status,
                body,
            });
        }
        Ok(resp)
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Replace every command registered on a guild with `commands`.
    pub async fn bulk_overwrite_guild_commands(
        &self,
        application_id: &str,
        guild_id: &str,
        commands: &[CommandDefinition],
    ) -> Result<()> {
        let resp = self
            .http
            .put(self.url(&format!(
                "/applications/{application_id}/guilds/{guild_id}/commands"
            )))
            .header("Authorization", self.auth())
            .json(commands)
            .send()
            .await?;

        Self::check(resp, "bulk overwrite guild commands").await?;
        Ok(())
    }

    // ── Messages ────────────────────────────────────────────────────

    /// Open (or reuse) the DM channel with a user.
    pub async fn create_dm(&self, recipient_id: &str) -> Result<Channel> {
        let resp = self
            .http
            .post(self.url("/users/@me/channels"))
            .header("Authorization", self.auth())
            .json(&CreateDmRequest { recipient_id })
            .send()
            .await?;

        Self::check(resp, "create dm")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    pub async fn create_message(&self, channel_id: &str, msg: &CreateMessage) -> Result<Message> {
        let resp = self
            .http
            .post(self.url(&format!("/channels/{channel_id}/messages")))
            .header("Authorization", self.auth())
            .json(msg)
            .send()
            .await?;

        Self::check(resp, "create message")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    // ── Interactions ────────────────────────────────────────────────

    /// Post a follow-up to an interaction. Interaction webhooks are
    /// authenticated by the token in the path, not the bot token.
    pub async fn create_followup(
        &self,
        application_id: &str,
        interaction_token: &str,
        msg: &CreateMessage,
    ) -> Result<()> {
        let resp = self
            .http
            .post(self.url(&format!("/webhooks/{application_id}/{interaction_token}")))
            .json(msg)
            .send()
            .await?;

        Self::check(resp, "create followup").await?;
        Ok(())
    }
}
