//! Error types for flows, the session state machine and the HTTP surface.
//!
//! Every variant is recoverable: the caller keeps its phase and may retry.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;

use crate::session::Phase;

/// Failure of a structured completion call.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
  /// Transport, HTTP status or undecodable body from the completion service.
  #[error("completion failed: {0}")]
  Completion(String),
  /// Model answered, but not in the shape the operation promises.
  #[error("unexpected output shape: {0}")]
  Shape(String),
  /// Model answered with an empty value for a required field.
  #[error("empty {0}")]
  Empty(&'static str),
  #[error("no completion service configured")]
  Unavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
  #[error("generation failed: {0}")]
  Generation(String),
  #[error("invalid model output: {0}")]
  Shape(String),
  #[error("action not allowed in phase {phase:?}: {action}")]
  InvalidPhase { phase: Phase, action: &'static str },
  #[error("missing prerequisite: {0}")]
  Prerequisite(&'static str),
  #[error("time is up")]
  TimeUp,
  #[error("{0}")]
  Validation(String),
  #[error("no discussion turn #{0}")]
  UnknownTurn(usize),
  #[error("audio already attached to turn #{0}")]
  AudioAttached(usize),
  #[error("session was reset since this was requested")]
  Superseded,
}

impl From<FlowError> for SessionError {
  fn from(e: FlowError) -> Self {
    match e {
      FlowError::Shape(msg) => SessionError::Shape(msg),
      other => SessionError::Generation(other.to_string()),
    }
  }
}

/// Errors returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
  #[error("unknown session: {0}")]
  SessionNotFound(String),
  #[error(transparent)]
  Session(#[from] SessionError),
}

impl AppError {
  fn status(&self) -> StatusCode {
    match self {
      AppError::SessionNotFound(_) => StatusCode::NOT_FOUND,
      AppError::Session(e) => match e {
        SessionError::Generation(_) | SessionError::Shape(_) => StatusCode::BAD_GATEWAY,
        SessionError::InvalidPhase { .. }
        | SessionError::TimeUp
        | SessionError::AudioAttached(_)
        | SessionError::Superseded => {
          StatusCode::CONFLICT
        }
        SessionError::Prerequisite(_) => StatusCode::PRECONDITION_FAILED,
        SessionError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SessionError::UnknownTurn(_) => StatusCode::NOT_FOUND,
      },
    }
  }

  /// Whether re-invoking the same action may succeed.
  pub fn retryable(&self) -> bool {
    matches!(self, AppError::Session(SessionError::Generation(_) | SessionError::Shape(_)))
  }
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let status = self.status();
    let body = Json(json!({
      "error": self.to_string(),
      "retryable": self.retryable(),
    }));
    (status, body).into_response()
  }
}
