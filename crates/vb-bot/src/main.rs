mod auth;
mod commands;
mod config;
mod embeds;
mod error;
mod extract;
mod lifecycle;
mod notify;
mod state;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use discord_api::DiscordClient;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::auth::SignatureVerifier;
use crate::config::AppConfig;
use crate::lifecycle::{LifecycleManager, LifecycleSettings};
use crate::notify::{DiscordNotifier, Notifier};
use crate::state::AppState;

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env().expect("invalid configuration");
    let verifier =
        SignatureVerifier::from_hex(&config.public_key).expect("invalid DISCORD_PUBLIC_KEY");

    // Document store and container runtime
    let store = vb_store::build_store()
        .await
        .expect("failed to open document store");
    tracing::info!(backend = %store.backend(), "document store ready");

    let runtime = vb_infra::build_runtime().expect("failed to build container runtime");

    let discord = DiscordClient::new(config.discord_token.clone());
    let notifier: Arc<dyn Notifier> = Arc::new(DiscordNotifier::new(
        discord.clone(),
        config.application_id.clone(),
    ));

    let lifecycle = LifecycleManager::new(
        store,
        runtime,
        notifier.clone(),
        LifecycleSettings::from_config(&config),
    );

    // Slash commands are scoped to the home guild so updates apply at once.
    match discord
        .bulk_overwrite_guild_commands(
            &config.application_id,
            &config.guild_id,
            &commands::definitions(),
        )
        .await
    {
        Ok(()) => tracing::info!(guild_id = %config.guild_id, "slash commands synced"),
        Err(e) => tracing::error!(error = %e, "failed to sync slash commands"),
    }

    let state = AppState {
        lifecycle: Arc::new(lifecycle),
        notifier,
        verifier,
        config: config.clone(),
    };

    let app = commands::router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .expect("failed to bind listener");

    tracing::info!(addr = %config.listen_addr, "listening for interactions");

    axum::serve(listener, app).await.expect("server error");
}
