use async_trait::async_trait;
use discord_api::{CreateMessage, DiscordClient};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("recipient does not accept direct messages")]
    Refused,

    #[error("discord error: {0}")]
    Discord(#[from] discord_api::Error),
}

/// Outbound chat delivery: direct messages and interaction follow-ups.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn direct_message(&self, user_id: &str, msg: &CreateMessage) -> Result<(), NotifyError>;

    async fn followup(&self, interaction_token: &str, msg: &CreateMessage)
    -> Result<(), NotifyError>;
}

pub struct DiscordNotifier {
    client: DiscordClient,
    application_id: String,
}

impl DiscordNotifier {
    pub fn new(client: DiscordClient, application_id: impl Into<String>) -> Self {
        Self {
            client,
            application_id: application_id.into(),
        }
    }
}

fn classify(e: discord_api::Error) -> NotifyError {
    if e.is_dm_refused() {
        NotifyError::Refused
    } else {
        NotifyError::Discord(e)
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn direct_message(&self, user_id: &str, msg: &CreateMessage) -> Result<(), NotifyError> {
        let channel = self.client.create_dm(user_id).await.map_err(classify)?;
        self.client
            .create_message(&channel.id, msg)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn followup(
        &self,
        interaction_token: &str,
        msg: &CreateMessage,
    ) -> Result<(), NotifyError> {
        self.client
            .create_followup(&self.application_id, interaction_token, msg)
            .await?;
        Ok(())
    }
}
