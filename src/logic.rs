//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Creating, resuming, restoring and resetting sessions
//!   - Driving session transitions (start, discussion, coding, assessment, grading)
//!   - Hints and code runs during the coding phase
//!   - Kicking off background work (countdown, speech) after a transition

use tracing::{info, instrument};

use crate::domain::{AssessmentQuestions, DiscussionTurn, GradeResult, Language, SessionConfig};
use crate::error::{AppError, SessionError};
use crate::session::{Phase, ReviewView, Session, SessionRecord, SessionSnapshot};
use crate::state::{AppState, SessionHandle};

async fn handle(state: &AppState, id: &str) -> Result<SessionHandle, AppError> {
  state.get_session(id).await.ok_or_else(|| AppError::SessionNotFound(id.to_string()))
}

#[instrument(level = "info", skip(state))]
pub async fn new_session(state: &AppState) -> (String, SessionSnapshot) {
  let (id, h) = state.insert_session(Session::new()).await;
  let snap = h.lock().await.snapshot();
  (id, snap)
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn snapshot(state: &AppState, id: &str) -> Result<SessionSnapshot, AppError> {
  let h = handle(state, id).await?;
  let snap = h.lock().await.snapshot();
  Ok(snap)
}

/// Setup → Discussing.
#[instrument(level = "info", skip(state, config), fields(%id, language = config.language.as_str()))]
pub async fn start(state: &AppState, id: &str, config: SessionConfig) -> Result<SessionSnapshot, AppError> {
  let h = handle(state, id).await?;
  let mut s = h.lock().await;
  s.start(&state.flows, config).await?;
  Ok(s.snapshot())
}

/// Record a discussion turn; the spoken answer follows in the background.
#[instrument(level = "info", skip(state, question), fields(%id, question_len = question.len()))]
pub async fn discuss(state: &AppState, id: &str, question: &str) -> Result<(usize, DiscussionTurn), AppError> {
  let h = handle(state, id).await?;
  let (index, turn, generation) = {
    let mut s = h.lock().await;
    let index = s.discuss(&state.flows, question).await?;
    (index, s.turns()[index].clone(), s.generation())
  };
  state.spawn_speech(id.to_string(), &h, generation, index, turn.answer.clone());
  Ok((index, turn))
}

/// Discussing → Coding; starts the countdown when the session has a time limit.
#[instrument(level = "info", skip(state), fields(%id))]
pub async fn begin_coding(state: &AppState, id: &str) -> Result<SessionSnapshot, AppError> {
  let h = handle(state, id).await?;
  let mut s = h.lock().await;
  s.begin_coding()?;
  if s.countdown().is_some() {
    state.spawn_countdown(id.to_string(), &h, s.epoch());
  }
  Ok(s.snapshot())
}

#[instrument(level = "info", skip(state, code), fields(%id, code_len = code.len()))]
pub async fn edit_code(state: &AppState, id: &str, code: String) -> Result<(), AppError> {
  let h = handle(state, id).await?;
  h.lock().await.edit_code(code)?;
  Ok(())
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn hint(state: &AppState, id: &str) -> Result<String, AppError> {
  let h = handle(state, id).await?;
  let s = h.lock().await;
  let hint = s.hint(&state.flows).await?;
  Ok(hint)
}

/// Run the session's current code. Allowed in any phase that has a buffer.
#[instrument(level = "info", skip(state, stdin), fields(%id, stdin_len = stdin.len()))]
pub async fn run_session_code(state: &AppState, id: &str, stdin: &str) -> Result<String, AppError> {
  let h = handle(state, id).await?;
  let code = h.lock().await.code().cloned();
  let Some(code) = code else {
    return Err(SessionError::Prerequisite("code buffer").into());
  };
  Ok(run_code(state, &code.source, code.language, stdin).await)
}

#[instrument(level = "info", skip(state, source, stdin), fields(language = language.as_str(), source_len = source.len()))]
pub async fn run_code(state: &AppState, source: &str, language: Language, stdin: &str) -> String {
  state.runner.execute(source, language, stdin).await
}

/// Coding → AwaitingAssessment.
#[instrument(level = "info", skip(state), fields(%id))]
pub async fn submit_code(state: &AppState, id: &str) -> Result<AssessmentQuestions, AppError> {
  let h = handle(state, id).await?;
  let mut s = h.lock().await;
  let questions = s.submit_code(&state.flows).await?.clone();
  Ok(questions)
}

/// AwaitingAssessment → Reviewed.
#[instrument(level = "info", skip(state, answers), fields(%id, answers = answers.len()))]
pub async fn submit_answers(state: &AppState, id: &str, answers: Vec<String>) -> Result<(GradeResult, ReviewView), AppError> {
  let h = handle(state, id).await?;
  let mut s = h.lock().await;
  let grade = s.submit_answers(&state.flows, answers).await?.clone();
  let review = ReviewView::from_grade(&grade);
  info!(target: "session", %id, score = grade.overall_score, "Review ready");
  Ok((grade, review))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn review(state: &AppState, id: &str) -> Result<ReviewView, AppError> {
  let h = handle(state, id).await?;
  let view = h.lock().await.review()?;
  Ok(view)
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn record(state: &AppState, id: &str) -> Result<SessionRecord, AppError> {
  let h = handle(state, id).await?;
  let record = h.lock().await.to_record();
  Ok(record)
}

/// Rebuild a session from its flat record under a new id.
#[instrument(level = "info", skip(state, record), fields(keys = record.len()))]
pub async fn restore(state: &AppState, record: &SessionRecord) -> (String, SessionSnapshot) {
  let session = Session::restore(record);
  let (id, h) = state.insert_session(session).await;
  let s = h.lock().await;
  if s.phase() == Phase::Coding && s.countdown().is_some_and(|c| !c.expired()) {
    state.spawn_countdown(id.clone(), &h, s.epoch());
  }
  info!(target: "session", %id, phase = s.phase().as_str(), "Session restored from record");
  (id, s.snapshot())
}

/// New problem: back to setup with everything discarded.
#[instrument(level = "info", skip(state), fields(%id))]
pub async fn reset(state: &AppState, id: &str) -> Result<SessionSnapshot, AppError> {
  let h = handle(state, id).await?;
  let mut s = h.lock().await;
  s.reset();
  Ok(s.snapshot())
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn delete(state: &AppState, id: &str) -> Result<(), AppError> {
  if state.remove_session(id).await {
    Ok(())
  } else {
    Err(AppError::SessionNotFound(id.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use serde_json::json;

  use super::*;
  use crate::config::Prompts;
  use crate::domain::Difficulty;
  use crate::execution::testing::CannedRunner;
  use crate::flows::{testing::ScriptedLlm, CompletionService, FlowExecutor};

  fn setup(reply: &str) -> (AppState, Arc<ScriptedLlm>, Arc<CannedRunner>) {
    let llm = ScriptedLlm::new();
    let runner = Arc::new(CannedRunner { reply: reply.into(), ..Default::default() });
    let svc: Arc<dyn CompletionService> = llm.clone();
    let state = AppState::with_parts(FlowExecutor::new(Some(svc), Prompts::default()), runner.clone());
    (state, llm, runner)
  }

  fn config() -> SessionConfig {
    SessionConfig {
      job_role: "Backend Engineer".into(),
      company: "Acme".into(),
      language: Language::Python,
      difficulty: Difficulty::Medium,
      time_limit_minutes: 0,
    }
  }

  #[tokio::test]
  async fn unknown_session_is_reported() {
    let (state, _, _) = setup("");
    assert!(matches!(snapshot(&state, "nope").await, Err(AppError::SessionNotFound(_))));
    assert!(matches!(delete(&state, "nope").await, Err(AppError::SessionNotFound(_))));
  }

  #[tokio::test]
  async fn run_uses_session_buffer_and_stdin() {
    let (state, llm, runner) = setup("hello\n");
    let (id, _) = new_session(&state).await;
    let err = run_session_code(&state, &id, "").await.unwrap_err();
    assert!(matches!(err, AppError::Session(SessionError::Prerequisite(_))));

    llm.push(json!({ "problemStatement": "p" }));
    start(&state, &id, config()).await.unwrap();
    // Execution does not depend on the phase.
    let out = run_session_code(&state, &id, "3 4").await.unwrap();
    assert_eq!(out, "hello\n");
    let seen = runner.seen.lock().unwrap();
    assert_eq!(seen[0].1, Language::Python);
    assert_eq!(seen[0].2, "3 4");
    assert!(seen[0].0.contains("def solution"));
  }

  #[tokio::test]
  async fn end_to_end_through_review_and_record() {
    let (state, llm, _) = setup("");
    let (id, snap) = new_session(&state).await;
    assert_eq!(snap.phase, Phase::Setup);

    llm.push(json!({ "problemStatement": "Merge intervals." }));
    start(&state, &id, config()).await.unwrap();
    llm.push(json!({ "answer": "Sort first?" }));
    let (index, turn) = discuss(&state, &id, "I'll sort by start").await.unwrap();
    assert_eq!(index, 0);
    assert_eq!(turn.answer, "Sort first?");
    begin_coding(&state, &id).await.unwrap();
    edit_code(&state, &id, "def merge(xs): return xs".into()).await.unwrap();
    llm.push(json!({ "questions": ["a?", "b?", "c?"] }));
    let qs = submit_code(&state, &id).await.unwrap();
    assert_eq!(qs.as_slice()[2], "c?");
    llm.push(json!({
      "efficiencyFeedback": "n log n", "correctnessFeedback": "ok", "styleFeedback": "fine", "overallScore": 7
    }));
    let (grade, view) = submit_answers(&state, &id, vec!["1".into(), "2".into(), "3".into()]).await.unwrap();
    assert_eq!(grade.overall_score, 7.0);
    assert_eq!(view, review(&state, &id).await.unwrap());

    let rec = record(&state, &id).await.unwrap();
    let (new_id, snap) = restore(&state, &rec).await;
    assert_ne!(new_id, id);
    assert_eq!(snap.phase, Phase::Reviewed);
    assert_eq!(snap.review, Some(view));

    let snap = reset(&state, &id).await.unwrap();
    assert_eq!(snap.phase, Phase::Setup);
    assert!(snap.turns.is_empty());
  }
}
