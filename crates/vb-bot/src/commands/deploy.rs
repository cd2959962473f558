use discord_api::{CreateMessage, InteractionResponse};
use tracing::{info, warn};
use vb_infra::types::OsImage;

use super::{CommandContext, error_reply, follow_up, follow_up_error};
use crate::embeds;
use crate::lifecycle::ConnectionInfo;
use crate::state::AppState;

/// `/deploy`: bring up the invoker's first available instance.
pub fn deploy(state: &AppState, ctx: CommandContext) -> InteractionResponse {
    let state = state.clone();
    tokio::spawn(async move { run_deploy(&state, &ctx).await });
    InteractionResponse::deferred(true)
}

pub async fn run_deploy(state: &AppState, ctx: &CommandContext) {
    let vps_id = match state.lifecycle.find_available_instance(&ctx.user_id).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            let msg = "You have no available VPS slots. Use `/resources` to check your status.";
            follow_up(state, ctx, CreateMessage::text(msg)).await;
            return;
        }
        Err(e) => return follow_up_error(state, ctx, &e).await,
    };

    deploy_and_deliver(state, ctx, &vps_id, OsImage::Ubuntu).await;
}

/// `/deploy-ubuntu` and `/deploy-debian`: deploy a named instance. Admin only.
pub fn deploy_image(state: &AppState, ctx: CommandContext, image: OsImage) -> InteractionResponse {
    if let Err(e) = state.lifecycle.require_admin(&ctx.user_id) {
        return error_reply(state, &ctx, &e);
    }
    let vps_id = match ctx.vps_id() {
        Ok(id) => id,
        Err(e) => return error_reply(state, &ctx, &e),
    };

    let state = state.clone();
    tokio::spawn(async move { deploy_and_deliver(&state, &ctx, &vps_id, image).await });
    InteractionResponse::deferred(true)
}

pub async fn deploy_and_deliver(state: &AppState, ctx: &CommandContext, vps_id: &str, image: OsImage) {
    match state.lifecycle.deploy(vps_id, image).await {
        Ok(info) => deliver(state, ctx, &info).await,
        Err(e) => follow_up_error(state, ctx, &e).await,
    }
}

/// DM the connection details to the invoker. If the DM is refused the
/// details go into the ephemeral follow-up instead.
async fn deliver(state: &AppState, ctx: &CommandContext, info: &ConnectionInfo) {
    let embed = embeds::deployed(&info.vps_id, info.image.as_str(), &info.connection_string);

    match state
        .notifier
        .direct_message(&ctx.user_id, &CreateMessage::embed(embed.clone()))
        .await
    {
        Ok(()) => {
            info!(
                user_id = %ctx.user_id,
                vps_id = %info.vps_id,
                container_id = %info.container_id,
                "connection details delivered"
            );
            let msg = format!("VPS `{}` is ready. Check your DMs for details!", info.vps_id);
            follow_up(state, ctx, CreateMessage::text(msg)).await;
        }
        Err(e) => {
            warn!(
                user_id = %ctx.user_id,
                vps_id = %info.vps_id,
                container_id = %info.container_id,
                error = %e,
                "could not DM connection details"
            );
            let msg = CreateMessage {
                content: Some("I couldn't DM you, so here are your connection details:".into()),
                embeds: vec![embed],
                flags: None,
            };
            follow_up(state, ctx, msg).await;
        }
    }
}
