//! Commands that are registered but not backed by any behavior yet.

use discord_api::InteractionResponse;

use super::{CommandContext, error_reply, reply};
use crate::state::AppState;

pub fn not_implemented() -> InteractionResponse {
    reply("This command is not yet fully implemented. Please wait for an update.")
}

pub fn node(state: &AppState, ctx: &CommandContext) -> InteractionResponse {
    match state.lifecycle.require_admin(&ctx.user_id) {
        Ok(()) => reply("This is a placeholder for a more advanced node management system."),
        Err(e) => error_reply(state, ctx, &e),
    }
}

pub fn shared_ipv4(state: &AppState, ctx: &CommandContext) -> InteractionResponse {
    match state.lifecycle.require_admin(&ctx.user_id) {
        Ok(()) => reply("This is a placeholder for network configuration and shared IPs."),
        Err(e) => error_reply(state, ctx, &e),
    }
}
