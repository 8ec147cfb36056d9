//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;
use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument};

use crate::domain::SessionConfig;
use crate::error::AppError;
use crate::logic;
use crate::protocol::*;
use crate::session::SessionRecord;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, llm: state.flows.is_enabled() })
}

#[instrument(level = "info", skip(state))]
pub async fn http_create_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let (session_id, snap) = logic::new_session(&state).await;
  (StatusCode::CREATED, Json(SessionOut { session_id, state: snap }))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<SessionOut>, AppError> {
  let snap = logic::snapshot(&state, &id).await?;
  Ok(Json(SessionOut { session_id: id, state: snap }))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_delete_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
  logic::delete(&state, &id).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[instrument(level = "info", skip(state, body), fields(%id, job_role = %body.job_role, company = %body.company))]
pub async fn http_start(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<SessionConfig>,
) -> Result<Json<SessionOut>, AppError> {
  let snap = logic::start(&state, &id, body).await?;
  info!(target: "session", %id, "HTTP session started");
  Ok(Json(SessionOut { session_id: id, state: snap }))
}

#[instrument(level = "info", skip(state, body), fields(%id, question_len = body.question.len()))]
pub async fn http_discuss(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<DiscussIn>,
) -> Result<Json<TurnOut>, AppError> {
  let (index, turn) = logic::discuss(&state, &id, &body.question).await?;
  Ok(Json(TurnOut { index, turn }))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_begin_coding(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<SessionOut>, AppError> {
  let snap = logic::begin_coding(&state, &id).await?;
  Ok(Json(SessionOut { session_id: id, state: snap }))
}

#[instrument(level = "info", skip(state, body), fields(%id, code_len = body.code.len()))]
pub async fn http_put_code(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<CodeIn>,
) -> Result<StatusCode, AppError> {
  logic::edit_code(&state, &id, body.code).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_hint(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<HintOut>, AppError> {
  let hint = logic::hint(&state, &id).await?;
  info!(target: "session", %id, "HTTP hint served");
  Ok(Json(HintOut { hint }))
}

#[instrument(level = "info", skip(state, body), fields(%id))]
pub async fn http_run_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  body: Option<Json<RunIn>>,
) -> Result<Json<RunOut>, AppError> {
  let stdin = body.map(|Json(b)| b.stdin).unwrap_or_default();
  let output = logic::run_session_code(&state, &id, &stdin).await?;
  Ok(Json(RunOut { output }))
}

#[instrument(level = "info", skip(state, body), fields(language = body.language.as_str(), code_len = body.code.len()))]
pub async fn http_run(
  State(state): State<Arc<AppState>>,
  Json(body): Json<RunCodeIn>,
) -> impl IntoResponse {
  let output = logic::run_code(&state, &body.code, body.language, &body.stdin).await;
  Json(RunOut { output })
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_submit_code(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<QuestionsOut>, AppError> {
  let questions = logic::submit_code(&state, &id).await?;
  Ok(Json(QuestionsOut { questions }))
}

#[instrument(level = "info", skip(state, body), fields(%id, answers = body.answers.len()))]
pub async fn http_submit_answers(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<AnswersIn>,
) -> Result<Json<GradeOut>, AppError> {
  let (grade, review) = logic::submit_answers(&state, &id, body.answers).await?;
  info!(target: "session", %id, score = grade.overall_score, "HTTP answers graded");
  Ok(Json(GradeOut { grade, review }))
}

/// JSON by default; `?format=text` returns the rendered review page.
#[instrument(level = "info", skip(state), fields(%id, format = ?q.format))]
pub async fn http_review(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Query(q): Query<ReviewQuery>,
) -> Result<Response, AppError> {
  let view = logic::review(&state, &id).await?;
  if q.format.as_deref() == Some("text") {
    return Ok(view.render().into_response());
  }
  Ok(Json(view).into_response())
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_reset(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<SessionOut>, AppError> {
  let snap = logic::reset(&state, &id).await?;
  Ok(Json(SessionOut { session_id: id, state: snap }))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_record(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<RecordOut>, AppError> {
  let record = logic::record(&state, &id).await?;
  Ok(Json(RecordOut { record }))
}

/// Accepts the flat record as a query string (the way pages hand it over).
#[instrument(level = "info", skip(state, record), fields(keys = record.len()))]
pub async fn http_restore(
  State(state): State<Arc<AppState>>,
  Query(record): Query<SessionRecord>,
) -> impl IntoResponse {
  let (session_id, snap) = logic::restore(&state, &record).await;
  (StatusCode::CREATED, Json(SessionOut { session_id, state: snap }))
}
