mod config;
mod routes;
mod speech;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use spellingbee_core::assistant::{AssistantClient, AssistantSettings};
use spellingbee_core::store::{FailoverStore, MemoryStore, SessionStore, SqliteStore};
use spellingbee_core::turn::TurnEngine;

use crate::config::Config;
use crate::routes::AppState;
use crate::speech::{ScribeClient, Transcriber};

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load gateway configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Configuration loaded. Starting spelling-bee gateway...");

    // --- 3. Session Store ---
    // The durable store is preferred; if it cannot be opened the gateway
    // keeps running on the in-memory fallback (sessions then live only as
    // long as the process).
    let store: Arc<dyn SessionStore> =
        match SqliteStore::open(&config.session_db_path, config.session_ttl) {
            Ok(sqlite) => {
                tracing::info!("session store: {}", config.session_db_path.display());
                Arc::new(FailoverStore::new(sqlite, MemoryStore::new()))
            }
            Err(e) => {
                tracing::warn!(
                    "could not open session database ({e}), falling back to in-memory sessions"
                );
                Arc::new(MemoryStore::new())
            }
        };

    // --- 4. Collaborator Clients ---
    let assistant = Arc::new(AssistantClient::new(AssistantSettings {
        text_base_url: config.text_base_url.clone(),
        text_model: config.text_model.clone(),
        vision_base_url: config.vision_base_url.clone(),
        vision_model: config.vision_model.clone(),
        api_key: config.chat_api_key.clone(),
        timeout: config.llm_timeout,
        max_words: config.max_words,
    }));

    let transcriber: Option<Arc<dyn Transcriber>> = match &config.asr_api_key {
        Some(key) => Some(Arc::new(ScribeClient::new(
            config.asr_base_url.clone(),
            key.clone(),
            config.asr_timeout,
        ))),
        None => {
            tracing::info!("no ASR key configured; audio uploads disabled");
            None
        }
    };

    // --- 5. Serve ---
    let state = Arc::new(AppState {
        store,
        assistant,
        transcriber,
        engine: TurnEngine::new(config.retry_budget),
    });
    let app = routes::router(state);

    tracing::info!("listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
