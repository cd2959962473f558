use discord_api::InteractionResponse;

use super::{CommandContext, error_reply, reply};
use crate::error::CommandError;
use crate::state::AppState;

/// `/create user slots`: overwrite a user's slot count.
pub async fn create(state: &AppState, ctx: &CommandContext) -> InteractionResponse {
    match grant(state, ctx).await {
        Ok((target, count)) => reply(format!("Successfully granted {count} VPS slots to <@{target}>.")),
        Err(e) => error_reply(state, ctx, &e),
    }
}

async fn grant(state: &AppState, ctx: &CommandContext) -> Result<(String, u32), CommandError> {
    state.lifecycle.require_admin(&ctx.user_id)?;

    let target = ctx.user("user")?;
    let count = u32::try_from(ctx.integer("slots")?)
        .map_err(|_| CommandError::InvalidInput("Slot count must be zero or more.".into()))?;

    state.lifecycle.grant_slots(&ctx.user_id, &target, count).await?;
    Ok((target, count))
}

/// `/resources`: the invoker's slot count.
pub async fn resources(state: &AppState, ctx: &CommandContext) -> InteractionResponse {
    match state.lifecycle.slot_count(&ctx.user_id).await {
        Ok(n) => reply(format!("You have **{n}** available VPS slots.")),
        Err(e) => error_reply(state, ctx, &e),
    }
}
