pub mod deploy;
pub mod placeholder;
pub mod slots;
pub mod vps;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use discord_api::{
    CommandDataOption, CommandDefinition, CommandOption, CommandOptionType, CreateMessage,
    Interaction, InteractionResponse, InteractionType,
};
use tracing::{info, warn};

use crate::auth::verify_signature;
use crate::error::{ApiError, CommandError};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let signed = Router::new()
        .route("/interactions", post(handle_interaction))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            verify_signature,
        ));

    Router::new()
        .merge(signed)
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}

/// Entry point for every signed interaction.
pub async fn handle_interaction(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<InteractionResponse>, ApiError> {
    let interaction: Interaction = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("malformed interaction: {e}")))?;

    match interaction.interaction_type() {
        InteractionType::Ping => return Ok(Json(InteractionResponse::pong())),
        InteractionType::ApplicationCommand => {}
        InteractionType::Other(kind) => {
            return Err(ApiError::BadRequest(format!("unsupported interaction type {kind}")));
        }
    }

    if interaction.guild_id.as_deref() != Some(state.config.guild_id.as_str()) {
        return Ok(Json(reply(
            "This bot only accepts commands in its home server.",
        )));
    }

    let user_id = interaction
        .invoker()
        .map(|u| u.id.clone())
        .ok_or_else(|| ApiError::BadRequest("interaction has no invoking user".into()))?;
    let data = interaction
        .data
        .ok_or_else(|| ApiError::BadRequest("command interaction without data".into()))?;

    info!(command = %data.name, user_id = %user_id, "command invoked");

    let ctx = CommandContext {
        user_id,
        token: interaction.token,
        options: data.options,
    };
    Ok(Json(dispatch(&state, &data.name, ctx).await))
}

async fn dispatch(state: &AppState, name: &str, ctx: CommandContext) -> InteractionResponse {
    match name {
        "create" => slots::create(state, &ctx).await,
        "resources" => slots::resources(state, &ctx).await,
        "deploy" => deploy::deploy(state, ctx),
        "deploy-ubuntu" => deploy::deploy_image(state, ctx, vb_infra::types::OsImage::Ubuntu),
        "deploy-debian" => deploy::deploy_image(state, ctx, vb_infra::types::OsImage::Debian),
        "stop" => vps::stop(state, ctx),
        "sendvps" => vps::sendvps(state, ctx),
        "start" | "restart" | "reinstall" => placeholder::not_implemented(),
        "node" | "nodedim" => placeholder::node(state, &ctx),
        "sharedipv4" => placeholder::shared_ipv4(state, &ctx),
        other => {
            warn!(command = other, "unknown command");
            reply("Unknown command.")
        }
    }
}

/// Invoker and arguments of one command invocation.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub user_id: String,
    /// Interaction token, used for follow-up messages.
    pub token: String,
    pub options: Vec<CommandDataOption>,
}

impl CommandContext {
    fn option(&self, name: &str) -> Result<&serde_json::Value, CommandError> {
        self.options
            .iter()
            .find(|o| o.name == name)
            .and_then(|o| o.value.as_ref())
            .ok_or_else(|| CommandError::InvalidInput(format!("Missing option `{name}`.")))
    }

    pub fn string(&self, name: &str) -> Result<String, CommandError> {
        self.option(name)?
            .as_str()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CommandError::InvalidInput(format!("Option `{name}` must be text.")))
    }

    pub fn integer(&self, name: &str) -> Result<i64, CommandError> {
        self.option(name)?
            .as_i64()
            .ok_or_else(|| CommandError::InvalidInput(format!("Option `{name}` must be a whole number.")))
    }

    /// The `vps_id` option, restricted to a single plain document id.
    pub fn vps_id(&self) -> Result<String, CommandError> {
        let id = self.string("vps_id")?;
        let plain = id != "." && id != ".." && !id.contains(['/', '?', '#']);
        if plain {
            Ok(id)
        } else {
            Err(CommandError::InvalidInput(format!("`{id}` is not a valid VPS ID.")))
        }
    }

    /// User options arrive as snowflake strings.
    pub fn user(&self, name: &str) -> Result<String, CommandError> {
        self.option(name)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CommandError::InvalidInput(format!("Option `{name}` must be a user.")))
    }
}

/// Immediate ephemeral text reply.
pub fn reply(content: impl Into<String>) -> InteractionResponse {
    InteractionResponse::message(CreateMessage::text(content).ephemeral())
}

pub fn error_reply(state: &AppState, ctx: &CommandContext, err: &CommandError) -> InteractionResponse {
    log_failure(ctx, err);
    reply(err.user_message(state.lifecycle.is_admin(&ctx.user_id)))
}

/// Post an ephemeral follow-up to a deferred interaction.
pub async fn follow_up(state: &AppState, ctx: &CommandContext, msg: CreateMessage) {
    if let Err(e) = state.notifier.followup(&ctx.token, &msg.ephemeral()).await {
        warn!(user_id = %ctx.user_id, error = %e, "failed to send follow-up");
    }
}

pub async fn follow_up_error(state: &AppState, ctx: &CommandContext, err: &CommandError) {
    log_failure(ctx, err);
    let text = err.user_message(state.lifecycle.is_admin(&ctx.user_id));
    follow_up(state, ctx, CreateMessage::text(text)).await;
}

fn log_failure(ctx: &CommandContext, err: &CommandError) {
    if err.is_internal() {
        warn!(user_id = %ctx.user_id, error = %err, "command failed");
    } else {
        info!(user_id = %ctx.user_id, error = %err, "command rejected");
    }
}

fn option(kind: CommandOptionType, name: &str, description: &str) -> CommandOption {
    CommandOption {
        kind,
        name: name.into(),
        description: description.into(),
        required: true,
    }
}

fn command(name: &str, description: &str, options: Vec<CommandOption>) -> CommandDefinition {
    CommandDefinition {
        name: name.into(),
        description: description.into(),
        options,
    }
}

/// Every slash command, for guild registration at startup.
pub fn definitions() -> Vec<CommandDefinition> {
    use CommandOptionType as Opt;

    let vps_id = || option(Opt::String, "vps_id", "The ID of the VPS");

    vec![
        command(
            "create",
            "Grant VPS slots to a user (admin only)",
            vec![
                option(Opt::User, "user", "The user to grant slots to"),
                option(Opt::Integer, "slots", "Number of VPS slots"),
            ],
        ),
        command("deploy", "Deploy one of your available VPS slots", vec![]),
        command("deploy-ubuntu", "Deploy an Ubuntu VPS (admin only)", vec![vps_id()]),
        command("deploy-debian", "Deploy a Debian VPS (admin only)", vec![vps_id()]),
        command("start", "Start a stopped VPS", vec![vps_id()]),
        command("stop", "Stop a running VPS", vec![vps_id()]),
        command("restart", "Restart a VPS", vec![vps_id()]),
        command("reinstall", "Reinstall a VPS", vec![vps_id()]),
        command("resources", "Show your available VPS slots", vec![]),
        command(
            "sendvps",
            "Send a VPS to another user (admin only)",
            vec![vps_id(), option(Opt::User, "user", "The recipient")],
        ),
        command("node", "Show node status (admin only)", vec![]),
        command("nodedim", "Show node dimensions (admin only)", vec![]),
        command("sharedipv4", "Show shared IPv4 configuration (admin only)", vec![]),
    ]
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;
    use vb_store::MemoryStore;

    use super::*;
    use crate::testing::{self, FakeRuntime, GUILD, RecordingNotifier, sign};

    fn app() -> Router {
        let state = testing::state(
            Arc::new(MemoryStore::new()),
            FakeRuntime::new("c1", ""),
            RecordingNotifier::default(),
        );
        router(state)
    }

    fn signed_request(body: &str) -> Request<Body> {
        let timestamp = "1700000000";
        Request::builder()
            .method("POST")
            .uri("/interactions")
            .header("content-type", "application/json")
            .header("x-signature-timestamp", timestamp)
            .header("x-signature-ed25519", sign(timestamp, body.as_bytes()))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn command_payload(guild: &str, name: &str) -> String {
        serde_json::json!({
            "id": "1",
            "application_id": "app",
            "type": 2,
            "token": "tok",
            "guild_id": guild,
            "member": { "user": { "id": "42" } },
            "data": { "name": name, "options": [] },
        })
        .to_string()
    }

    #[tokio::test]
    async fn ping_gets_pong() {
        let body = r#"{"id":"1","application_id":"app","type":1,"token":"tok"}"#;
        let resp = app().oneshot(signed_request(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await, serde_json::json!({ "type": 1 }));
    }

    #[tokio::test]
    async fn unsigned_request_is_rejected() {
        let req = Request::builder()
            .method("POST")
            .uri("/interactions")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"type":1}"#))
            .unwrap();
        let resp = app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn bad_signature_is_rejected() {
        let mut req = signed_request(r#"{"id":"1","application_id":"app","type":1,"token":"tok"}"#);
        req.headers_mut()
            .insert("x-signature-timestamp", "1700000001".parse().unwrap());
        let resp = app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_payload_is_bad_request() {
        let resp = app().oneshot(signed_request(r#"{"type":"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_needs_no_signature() {
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn resources_command_over_http() {
        let resp = app()
            .oneshot(signed_request(&command_payload(GUILD, "resources")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["type"], 4);
        assert_eq!(body["data"]["content"], "You have **0** available VPS slots.");
        assert_eq!(body["data"]["flags"], 64);
    }

    #[tokio::test]
    async fn other_guilds_are_refused() {
        let resp = app()
            .oneshot(signed_request(&command_payload("999", "resources")))
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert!(body["data"]["content"].as_str().unwrap().contains("home server"));
    }

    #[test]
    fn options_parse_by_type() {
        let ctx = CommandContext {
            user_id: "42".into(),
            token: "tok".into(),
            options: vec![
                CommandDataOption {
                    name: "slots".into(),
                    kind: 4,
                    value: Some(serde_json::json!(3)),
                },
                CommandDataOption {
                    name: "user".into(),
                    kind: 6,
                    value: Some(serde_json::json!("77")),
                },
            ],
        };
        assert_eq!(ctx.integer("slots").unwrap(), 3);
        assert_eq!(ctx.user("user").unwrap(), "77");
        assert!(matches!(ctx.string("vps_id"), Err(CommandError::InvalidInput(_))));
        assert!(matches!(ctx.integer("user"), Err(CommandError::InvalidInput(_))));
    }

    #[test]
    fn vps_id_rejects_path_like_values() {
        let with_id = |id: &str| CommandContext {
            user_id: "42".into(),
            token: "tok".into(),
            options: vec![CommandDataOption {
                name: "vps_id".into(),
                kind: 3,
                value: Some(serde_json::json!(id)),
            }],
        };

        assert_eq!(with_id(" v1 ").vps_id().unwrap(), "v1");
        for bad in ["../users/1000", "..", ".", "abc#x", "a?b=c", "vps/v1", "  "] {
            assert!(
                matches!(with_id(bad).vps_id(), Err(CommandError::InvalidInput(_))),
                "{bad:?} accepted"
            );
        }
    }

    #[tokio::test]
    async fn stop_with_path_like_id_never_touches_the_store() {
        let notifier = RecordingNotifier::default();
        let runtime = FakeRuntime::new("c1", "");
        let state = testing::state(Arc::new(MemoryStore::new()), runtime.clone(), notifier.clone());
        let ctx = CommandContext {
            user_id: "42".into(),
            token: "tok".into(),
            options: vec![CommandDataOption {
                name: "vps_id".into(),
                kind: 3,
                value: Some(serde_json::json!("../users/1000")),
            }],
        };

        let resp = vps::stop(&state, ctx);
        assert_eq!(resp.kind, 4);
        assert_eq!(
            resp.data.and_then(|d| d.content).as_deref(),
            Some("`../users/1000` is not a valid VPS ID.")
        );
        assert!(runtime.calls().is_empty());
        assert!(notifier.followups().is_empty());
    }

    #[test]
    fn every_command_is_registered() {
        let names: Vec<_> = definitions().into_iter().map(|d| d.name).collect();
        for name in [
            "create", "deploy", "deploy-ubuntu", "deploy-debian", "start", "stop", "restart",
            "reinstall", "resources", "sendvps", "node", "nodedim", "sharedipv4",
        ] {
            assert!(names.iter().any(|n| n == name), "{name} not registered");
        }
    }
}
