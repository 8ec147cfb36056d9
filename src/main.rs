//! CodeSprint · AI Coding Interview Backend
//!
//! - Axum HTTP + WebSocket API driving interview sessions
//! - OpenAI-backed prompt flows (problem, discussion, hints, assessment, grading, speech)
//! - Remote code execution through a Piston-compatible runner
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT               : u16 (default 3000)
//!   OPENAI_API_KEY     : enables the interview flows if present
//!   OPENAI_BASE_URL    : default "https://api.openai.com/v1"
//!   OPENAI_MODEL       : default "gpt-4o-mini"
//!   OPENAI_TTS_MODEL   : default "gpt-4o-mini-tts"
//!   OPENAI_TTS_VOICE   : default "alloy"
//!   EXECUTION_API_URL  : runner endpoint, overrides the config file
//!   EXECUTION_DISABLED : "1"/"true" turns code execution off
//!   AGENT_CONFIG_PATH  : path to TOML config (prompts + execution)
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod openai;
mod flows;
mod execution;
mod session;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared state: session store, flow executor, execution backend.
  let state = Arc::new(AppState::new());

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "codesprint_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "codesprint_backend", error = %e, "Failed to listen for shutdown signal");
    return;
  }
  info!(target: "codesprint_backend", "Shutdown signal received");
}
