mod blacklist;
mod commands;
mod config;
mod error;
mod event;
mod helpers;
mod moderation;
mod state;
mod tools;
mod traits;

use clap::Parser;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{debug, error, info, warn};

use crate::blacklist::{BlacklistStore, BLACKLIST_DB_FILE};
use crate::config::{Args, Config};
use crate::error::AppError;
use crate::event::parse_event;
use crate::state::State;
use crate::tools::ToolRegistry;
use crate::traits::OneBotApi;

const MAX_BACKOFF_SECS: u64 = 60;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("groupwarden=info")),
        )
        .init();

    let args = Args::parse();
    let tools = ToolRegistry::new();

    if args.print_tools {
        match serde_json::to_string_pretty(&tools.schemas()) {
            Ok(json) => println!("{json}"),
            Err(e) => error!("Failed to serialize tool schemas: {e}"),
        }
        return;
    }

    let config = match Config::from_args(&args) {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            std::process::exit(2);
        }
    };

    let store = match BlacklistStore::open(config.data_dir.join(BLACKLIST_DB_FILE)) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to open blacklist store in {}: {e}", config.data_dir.display());
            std::process::exit(1);
        }
    };

    let platform = OneBotApi {
        http: Client::new(),
        api_url: config.api_url.clone(),
        access_token: config.access_token.clone(),
    };

    info!(
        store = %store.path().display(),
        mute_policy = ?config.mute_policy,
        max_unauthorized_mute_secs = config.max_unauthorized_mute_secs,
        admins = config.admins.len(),
        "groupwarden starting"
    );
    info!("Registered tools: {}", tools.names().join(", "));

    let state = Arc::new(State {
        config,
        store,
        platform: Box::new(platform),
        tools,
    });

    let mut backoff = 1u64;
    loop {
        match connect_and_listen(&state).await {
            Ok(()) => {
                info!("WebSocket closed cleanly, reconnecting...");
                backoff = 1;
            }
            Err(e) => {
                error!("WebSocket error: {e}, reconnecting in {backoff}s...");
            }
        }
        tokio::time::sleep(std::time::Duration::from_secs(backoff)).await;
        backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
    }
}

async fn connect_and_listen(state: &Arc<State>) -> Result<(), AppError> {
    let mut request = state.config.ws_url.as_str().into_client_request()?;
    if let Some(ref token) = state.config.access_token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| AppError::Config(format!("Invalid access token: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    info!("Connecting to {}", state.config.ws_url);

    let (ws, _) = tokio_tungstenite::connect_async(request).await?;
    info!("WebSocket connected");

    let (_, mut read) = ws.split();

    while let Some(msg) = read.next().await {
        let msg = msg?;
        if !msg.is_text() {
            continue;
        }
        let text = msg.into_text()?;

        let payload: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to parse event: {e}");
                continue;
            }
        };
        let Some(event) = parse_event(&payload, &state.config.admins) else {
            debug!("Skipping non-message event");
            continue;
        };

        let state = Arc::clone(state);
        tokio::spawn(async move {
            commands::handle_event(&state, event).await;
        });
    }

    Ok(())
}
