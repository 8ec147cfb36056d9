//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.
//!
//! A socket drives at most one session at a time: `new_session`, `resume` or
//! `restore` binds it, every other session message acts on the bound one.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::error::AppError;
use crate::logic;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "codesprint_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "codesprint_backend", "WebSocket connected");
  let mut current: Option<String> = None;
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "codesprint_backend", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state, &mut current).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e), retryable: false },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e), "retryable": false }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "codesprint_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "codesprint_backend", session = ?current, "WebSocket disconnected");
}

fn error_msg(e: AppError) -> ServerWsMessage {
  ServerWsMessage::Error { retryable: e.retryable(), message: e.to_string() }
}

#[instrument(level = "info", skip(state, current))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState, current: &mut Option<String>) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => return ServerWsMessage::Pong,

    ClientWsMessage::NewSession => {
      let (session_id, snap) = logic::new_session(state).await;
      *current = Some(session_id.clone());
      return ServerWsMessage::Session { session_id, state: snap };
    }

    ClientWsMessage::Resume { session_id } => {
      return match logic::snapshot(state, &session_id).await {
        Ok(snap) => {
          info!(target: "session", id = %session_id, "WS session resumed");
          *current = Some(session_id.clone());
          ServerWsMessage::Session { session_id, state: snap }
        }
        Err(e) => error_msg(e),
      };
    }

    ClientWsMessage::Restore { record } => {
      let (session_id, snap) = logic::restore(state, &record).await;
      *current = Some(session_id.clone());
      return ServerWsMessage::Session { session_id, state: snap };
    }

    _ => {}
  }

  let Some(id) = current.clone() else {
    return ServerWsMessage::Error {
      message: "No session bound to this socket; send new_session, resume or restore first.".into(),
      retryable: false,
    };
  };

  let result = match msg {
    ClientWsMessage::Start { config } => logic::start(state, &id, config)
      .await
      .map(|snap| ServerWsMessage::Session { session_id: id.clone(), state: snap }),

    ClientWsMessage::Discuss { question } => logic::discuss(state, &id, &question)
      .await
      .map(|(index, turn)| ServerWsMessage::Turn { index, turn }),

    ClientWsMessage::BeginCoding => logic::begin_coding(state, &id)
      .await
      .map(|snap| ServerWsMessage::Session { session_id: id.clone(), state: snap }),

    ClientWsMessage::EditCode { code } => logic::edit_code(state, &id, code).await.map(|_| ServerWsMessage::Ok),

    ClientWsMessage::Hint => logic::hint(state, &id).await.map(|text| {
      info!(target: "session", %id, "WS hint served");
      ServerWsMessage::Hint { text }
    }),

    ClientWsMessage::Run { stdin } => logic::run_session_code(state, &id, &stdin)
      .await
      .map(|output| ServerWsMessage::RunResult { output }),

    ClientWsMessage::SubmitCode => logic::submit_code(state, &id)
      .await
      .map(|questions| ServerWsMessage::Questions { questions }),

    ClientWsMessage::SubmitAnswers { answers } => logic::submit_answers(state, &id, answers)
      .await
      .map(|(_, review)| ServerWsMessage::Review { review }),

    ClientWsMessage::Review => logic::review(state, &id).await.map(|review| ServerWsMessage::Review { review }),

    ClientWsMessage::Reset => logic::reset(state, &id)
      .await
      .map(|snap| ServerWsMessage::Session { session_id: id.clone(), state: snap }),

    ClientWsMessage::Record => logic::record(state, &id).await.map(|record| ServerWsMessage::Record { record }),

    ClientWsMessage::State => logic::snapshot(state, &id)
      .await
      .map(|snap| ServerWsMessage::Session { session_id: id.clone(), state: snap }),

    ClientWsMessage::Ping
    | ClientWsMessage::NewSession
    | ClientWsMessage::Resume { .. }
    | ClientWsMessage::Restore { .. } => Ok(ServerWsMessage::Ok),
  };

  result.unwrap_or_else(error_msg)
}
