use discord_api::{CreateMessage, InteractionResponse};

use super::{CommandContext, error_reply, follow_up, follow_up_error};
use crate::state::AppState;

/// `/stop vps_id`
pub fn stop(state: &AppState, ctx: CommandContext) -> InteractionResponse {
    let vps_id = match ctx.vps_id() {
        Ok(id) => id,
        Err(e) => return error_reply(state, &ctx, &e),
    };

    let state = state.clone();
    tokio::spawn(async move { run_stop(&state, &ctx, &vps_id).await });
    InteractionResponse::deferred(true)
}

pub async fn run_stop(state: &AppState, ctx: &CommandContext, vps_id: &str) {
    match state.lifecycle.stop(&ctx.user_id, vps_id).await {
        Ok(()) => {
            let msg = format!("VPS `{vps_id}` has been stopped successfully.");
            follow_up(state, ctx, CreateMessage::text(msg)).await;
        }
        Err(e) => follow_up_error(state, ctx, &e).await,
    }
}

/// `/sendvps vps_id user`: reassign an instance. Admin only.
pub fn sendvps(state: &AppState, ctx: CommandContext) -> InteractionResponse {
    let args = state
        .lifecycle
        .require_admin(&ctx.user_id)
        .and_then(|()| Ok((ctx.vps_id()?, ctx.user("user")?)));
    let (vps_id, target) = match args {
        Ok(args) => args,
        Err(e) => return error_reply(state, &ctx, &e),
    };

    let state = state.clone();
    tokio::spawn(async move { run_sendvps(&state, &ctx, &vps_id, &target).await });
    InteractionResponse::deferred(true)
}

pub async fn run_sendvps(state: &AppState, ctx: &CommandContext, vps_id: &str, target: &str) {
    match state.lifecycle.reassign(&ctx.user_id, vps_id, target).await {
        Ok(()) => {
            let msg = format!("VPS `{vps_id}` has been sent to <@{target}>.");
            follow_up(state, ctx, CreateMessage::text(msg)).await;
        }
        Err(e) => follow_up_error(state, ctx, &e).await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use vb_infra::types::OsImage;
    use vb_store::MemoryStore;
    use vb_store::models::{VpsInstance, VpsStatus};

    use super::*;
    use crate::testing::{self, ADMIN, FakeRuntime, HOST, RecordingNotifier};

    fn ctx(user_id: &str) -> CommandContext {
        CommandContext {
            user_id: user_id.into(),
            token: "tok".into(),
            options: vec![],
        }
    }

    fn last_followup(notifier: &RecordingNotifier) -> String {
        notifier
            .followups()
            .last()
            .and_then(|(_, m)| m.content.clone())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn failed_stop_is_reported_and_instance_stays_running() {
        let store = Arc::new(MemoryStore::new());
        let vps = VpsInstance::insert_available(&*store, Some("42"), None).await.unwrap();
        let notifier = RecordingNotifier::default();
        let state = testing::state(
            store.clone(),
            FakeRuntime::new("c1", &format!("ssh a@{HOST}")).failing_stop(),
            notifier.clone(),
        );
        state.lifecycle.deploy(&vps.id, OsImage::Ubuntu).await.unwrap();

        run_stop(&state, &ctx("42"), &vps.id).await;

        assert!(last_followup(&notifier).contains("container runtime reported an error"));
        let stored = VpsInstance::get(&*store, &vps.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VpsStatus::Running);
    }

    #[tokio::test]
    async fn admin_sees_runtime_diagnostics() {
        let store = Arc::new(MemoryStore::new());
        let vps = VpsInstance::insert_available(&*store, Some(ADMIN), None).await.unwrap();
        let notifier = RecordingNotifier::default();
        let state = testing::state(
            store,
            FakeRuntime::new("c1", &format!("ssh a@{HOST}")).failing_stop(),
            notifier.clone(),
        );
        state.lifecycle.deploy(&vps.id, OsImage::Ubuntu).await.unwrap();

        run_stop(&state, &ctx(ADMIN), &vps.id).await;

        assert!(last_followup(&notifier).contains("No such container"));
    }

    #[tokio::test]
    async fn sendvps_reports_refused_dm() {
        let store = Arc::new(MemoryStore::new());
        let vps = VpsInstance::insert_available(&*store, Some("42"), None).await.unwrap();
        let notifier = RecordingNotifier::refusing();
        let state = testing::state(store.clone(), FakeRuntime::new("c1", ""), notifier.clone());

        run_sendvps(&state, &ctx(ADMIN), &vps.id, "77").await;

        assert_eq!(
            last_followup(&notifier),
            "Could not DM the user. They may have DMs disabled."
        );
        let stored = VpsInstance::get(&*store, &vps.id).await.unwrap().unwrap();
        assert_eq!(stored.owner_id.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn sendvps_by_non_admin_replies_immediately() {
        let notifier = RecordingNotifier::default();
        let state = testing::state(Arc::new(MemoryStore::new()), FakeRuntime::new("c1", ""), notifier.clone());

        let resp = sendvps(&state, ctx("42"));
        assert_eq!(resp.kind, 4);
        assert!(notifier.dms().is_empty());
    }
}
