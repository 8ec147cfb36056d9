//! Interview session state machine.
//!
//! `Setup → Discussing → Coding → AwaitingAssessment → Reviewed`
//!
//! A `Session` owns all mutable interview state (code buffer, discussion turns,
//! countdown). Transitions that need the model go through `FlowExecutor`; a
//! failed call leaves the phase untouched so the same action can be retried.
//! The whole session can be flattened into a `SessionRecord` (string keys and
//! values) and rebuilt from it without any other storage.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::domain::{
  AssessmentAnswers, AssessmentQuestions, CodeBuffer, Difficulty, DiscussionTurn, GradeResult, Language,
  Problem, SessionConfig, MAX_SCORE, MIN_SCORE,
};
use crate::error::SessionError;
use crate::flows::{FlowExecutor, GradeInput};
use crate::util::format_clock;

pub const NO_FEEDBACK: &str = "No feedback provided.";

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  Setup,
  Discussing,
  Coding,
  AwaitingAssessment,
  Reviewed,
}

impl Phase {
  pub fn as_str(&self) -> &'static str {
    match self {
      Phase::Setup => "setup",
      Phase::Discussing => "discussing",
      Phase::Coding => "coding",
      Phase::AwaitingAssessment => "awaiting_assessment",
      Phase::Reviewed => "reviewed",
    }
  }

  fn parse(s: &str) -> Option<Self> {
    match s {
      "setup" => Some(Phase::Setup),
      "discussing" => Some(Phase::Discussing),
      "coding" => Some(Phase::Coding),
      "awaiting_assessment" => Some(Phase::AwaitingAssessment),
      "reviewed" => Some(Phase::Reviewed),
      _ => None,
    }
  }
}

/// Coding-phase time limit, one tick per second.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Countdown {
  total: u64,
  left: u64,
}

impl Countdown {
  /// `None` when there is no limit.
  pub fn from_minutes(minutes: u32) -> Option<Self> {
    if minutes == 0 {
      return None;
    }
    let total = u64::from(minutes) * 60;
    Some(Self { total, left: total })
  }

  /// Decrement once; returns the seconds left.
  pub fn tick(&mut self) -> u64 {
    self.left = self.left.saturating_sub(1);
    self.left
  }

  pub fn left(&self) -> u64 {
    self.left
  }

  pub fn expired(&self) -> bool {
    self.left == 0
  }
}

/// Immutable inputs every phase after setup works from.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct SessionContext {
  pub config: SessionConfig,
  pub problem: Problem,
}

/// Review page content, fully determined by a `GradeResult`.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
  pub efficiency: String,
  pub correctness: String,
  pub style: String,
  pub score: f32,
  pub insights: Option<String>,
}

impl ReviewView {
  pub fn from_grade(g: &GradeResult) -> Self {
    let or_default = |s: &str| {
      if s.trim().is_empty() { NO_FEEDBACK.to_string() } else { s.to_string() }
    };
    Self {
      efficiency: or_default(&g.efficiency_feedback),
      correctness: or_default(&g.correctness_feedback),
      style: or_default(&g.style_feedback),
      score: g.overall_score,
      insights: g.insights.clone().filter(|s| !s.trim().is_empty()),
    }
  }

  pub fn render(&self) -> String {
    let mut out = format!(
      "Overall Score: {}/10\n\nEfficiency:\n{}\n\nCorrectness:\n{}\n\nStyle:\n{}\n",
      self.score, self.efficiency, self.correctness, self.style
    );
    if let Some(i) = &self.insights {
      out.push_str(&format!("\nKey Insights:\n{}\n", i));
    }
    out
  }
}

/// Read-only view of a session for API responses.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
  pub phase: Phase,
  pub config: Option<SessionConfig>,
  pub problem: Option<String>,
  pub has_discussed: bool,
  pub turns: Vec<DiscussionTurn>,
  pub code: Option<CodeBuffer>,
  pub time_left: Option<u64>,
  pub clock: Option<String>,
  pub time_up: bool,
  pub questions: Option<AssessmentQuestions>,
  pub review: Option<ReviewView>,
}

#[derive(Debug)]
pub struct Session {
  phase: Phase,
  context: Option<Arc<SessionContext>>,
  has_discussed: bool,
  turns: Vec<DiscussionTurn>,
  code: Option<CodeBuffer>,
  countdown: Option<Countdown>,
  questions: Option<AssessmentQuestions>,
  answers: Option<AssessmentAnswers>,
  grade: Option<GradeResult>,
  /// Discussion transcript carried over from a record that had no structured turns.
  restored_qna: Option<String>,
  /// Bumped each time coding starts, so a stale countdown task can tell it is stale.
  epoch: u64,
  /// Bumped on reset; background speech for an earlier interview is discarded.
  generation: u64,
}

impl Default for Session {
  fn default() -> Self {
    Self::new()
  }
}

impl Session {
  pub fn new() -> Self {
    Self {
      phase: Phase::Setup,
      context: None,
      has_discussed: false,
      turns: Vec::new(),
      code: None,
      countdown: None,
      questions: None,
      answers: None,
      grade: None,
      restored_qna: None,
      epoch: 0,
      generation: 0,
    }
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  #[cfg(test)]
  pub fn context(&self) -> Option<&Arc<SessionContext>> {
    self.context.as_ref()
  }

  #[cfg(test)]
  pub fn has_discussed(&self) -> bool {
    self.has_discussed
  }

  pub fn turns(&self) -> &[DiscussionTurn] {
    &self.turns
  }

  pub fn code(&self) -> Option<&CodeBuffer> {
    self.code.as_ref()
  }

  pub fn countdown(&self) -> Option<&Countdown> {
    self.countdown.as_ref()
  }

  #[cfg(test)]
  pub fn questions(&self) -> Option<&AssessmentQuestions> {
    self.questions.as_ref()
  }

  /// True once the coding countdown has hit zero.
  pub fn time_up(&self) -> bool {
    self.countdown.as_ref().is_some_and(Countdown::expired)
  }

  fn require(&self, phase: Phase, action: &'static str) -> Result<(), SessionError> {
    if self.phase != phase {
      return Err(SessionError::InvalidPhase { phase: self.phase, action });
    }
    Ok(())
  }

  fn ctx(&self) -> Result<Arc<SessionContext>, SessionError> {
    self.context.clone().ok_or(SessionError::Prerequisite("problem"))
  }

  fn source(&self) -> &str {
    self.code.as_ref().map(|c| c.source.as_str()).unwrap_or_default()
  }

  /// Setup → Discussing. Generates the problem for `config`.
  #[instrument(level = "info", skip(self, flows, config), fields(language = config.language.as_str(), difficulty = config.difficulty.as_str()))]
  pub async fn start(&mut self, flows: &FlowExecutor, config: SessionConfig) -> Result<(), SessionError> {
    self.require(Phase::Setup, "start")?;
    config.validate()?;

    let out = flows
      .generate_problem(&config.job_role, &config.company, config.language.as_str(), config.difficulty.as_str())
      .await?;

    info!(target: "session", problem_len = out.problem_statement.len(), "Problem generated; entering discussion");
    self.code = Some(CodeBuffer::starter(config.language));
    self.context = Some(Arc::new(SessionContext { config, problem: Problem { statement: out.problem_statement } }));
    self.phase = Phase::Discussing;
    Ok(())
  }

  /// Ask the interviewer something. Returns the index of the appended turn.
  #[instrument(level = "info", skip(self, flows, question), fields(phase = ?self.phase, question_len = question.len()))]
  pub async fn discuss(&mut self, flows: &FlowExecutor, question: &str) -> Result<usize, SessionError> {
    match self.phase {
      Phase::Discussing => {}
      Phase::Coding if self.time_up() => return Err(SessionError::TimeUp),
      Phase::Coding => {}
      phase => return Err(SessionError::InvalidPhase { phase, action: "discuss" }),
    }
    let question = question.trim();
    if question.is_empty() {
      return Err(SessionError::Validation("question is empty".into()));
    }
    let ctx = self.ctx()?;

    let out = flows.answer_question(&ctx.problem.statement, self.source(), question).await?;

    self.turns.push(DiscussionTurn { question: question.to_string(), answer: out.answer, audio: None });
    if self.phase == Phase::Discussing {
      self.has_discussed = true;
    }
    let index = self.turns.len() - 1;
    info!(target: "session", turn = index, "Discussion turn recorded");
    Ok(index)
  }

  /// Second stage of a turn: attach synthesized audio. Only once per turn, and
  /// only for turns of the interview identified by `generation`.
  pub fn attach_audio(&mut self, generation: u64, index: usize, media: String) -> Result<(), SessionError> {
    if generation != self.generation {
      return Err(SessionError::Superseded);
    }
    let turn = self.turns.get_mut(index).ok_or(SessionError::UnknownTurn(index))?;
    if turn.audio.is_some() {
      return Err(SessionError::AudioAttached(index));
    }
    turn.audio = Some(media);
    Ok(())
  }

  /// Discussing → Coding, once at least one turn completed.
  pub fn begin_coding(&mut self) -> Result<(), SessionError> {
    self.require(Phase::Discussing, "begin_coding")?;
    if !self.has_discussed {
      return Err(SessionError::Prerequisite("discuss your approach at least once"));
    }
    let ctx = self.ctx()?;
    self.countdown = Countdown::from_minutes(ctx.config.time_limit_minutes);
    self.phase = Phase::Coding;
    self.epoch += 1;
    info!(target: "session", time_limit = ctx.config.time_limit_minutes, "Coding phase started");
    Ok(())
  }

  pub fn edit_code(&mut self, source: String) -> Result<(), SessionError> {
    self.require(Phase::Coding, "edit_code")?;
    if self.time_up() {
      return Err(SessionError::TimeUp);
    }
    let language = self.ctx()?.config.language;
    self.code = Some(CodeBuffer { source, language });
    Ok(())
  }

  /// Advisory hint for the current code; no state change.
  #[instrument(level = "info", skip(self, flows))]
  pub async fn hint(&self, flows: &FlowExecutor) -> Result<String, SessionError> {
    self.require(Phase::Coding, "hint")?;
    if self.time_up() {
      return Err(SessionError::TimeUp);
    }
    let ctx = self.ctx()?;
    let out = flows.hint(&ctx.problem.statement, self.source()).await?;
    Ok(out.hint)
  }

  pub fn epoch(&self) -> u64 {
    self.epoch
  }

  pub fn generation(&self) -> u64 {
    self.generation
  }

  /// `tick` on behalf of the countdown started at `epoch`; `None` once that coding run is over.
  pub fn tick_epoch(&mut self, epoch: u64) -> Option<u64> {
    if epoch != self.epoch {
      return None;
    }
    self.tick()
  }

  /// One countdown step. Only counts while coding; returns seconds left.
  pub fn tick(&mut self) -> Option<u64> {
    if self.phase != Phase::Coding {
      return None;
    }
    let cd = self.countdown.as_mut()?;
    if cd.expired() {
      return Some(0);
    }
    let left = cd.tick();
    if left == 0 {
      warn!(target: "session", "Time is up; hints, questions and edits are now disabled");
    }
    Some(left)
  }

  /// Coding → AwaitingAssessment. Generates the three follow-up questions.
  #[instrument(level = "info", skip(self, flows))]
  pub async fn submit_code(&mut self, flows: &FlowExecutor) -> Result<&AssessmentQuestions, SessionError> {
    self.require(Phase::Coding, "submit_code")?;
    if self.code.as_ref().map_or(true, CodeBuffer::is_blank) {
      return Err(SessionError::Prerequisite("non-empty code"));
    }
    let ctx = self.ctx()?;
    let out = flows.generate_assessment_questions(&ctx.problem.statement, self.source()).await?;
    let questions = AssessmentQuestions::try_from(out.questions)?;

    self.phase = Phase::AwaitingAssessment;
    info!(target: "session", "Assessment questions generated");
    Ok(&*self.questions.insert(questions))
  }

  /// AwaitingAssessment → Reviewed. Grades code, discussion and answers.
  #[instrument(level = "info", skip(self, flows, answers))]
  pub async fn submit_answers(&mut self, flows: &FlowExecutor, answers: Vec<String>) -> Result<&GradeResult, SessionError> {
    self.require(Phase::AwaitingAssessment, "submit_answers")?;
    let answers = AssessmentAnswers::try_from(answers)?;
    let questions = self.questions.as_ref().ok_or(SessionError::Prerequisite("assessment questions"))?;
    let ctx = self.ctx()?;

    let discussion = self.discussion();
    let assessment = assessment_transcript(questions, &answers);
    let input = GradeInput {
      code: self.source(),
      problem_description: &ctx.problem.statement,
      job_role: Some(&ctx.config.job_role),
      company: Some(&ctx.config.company),
      language: Some(ctx.config.language.as_str()),
      difficulty: Some(ctx.config.difficulty.as_str()),
      question_and_answers: Some(&discussion),
      assessment_data: Some(&assessment),
    };
    let out = flows.grade_solution(&input).await?;

    let grade = GradeResult {
      efficiency_feedback: out.efficiency_feedback,
      correctness_feedback: out.correctness_feedback,
      style_feedback: out.style_feedback,
      overall_score: out.overall_score,
      insights: out.insights.filter(|s| !s.trim().is_empty()),
    };
    info!(target: "session", score = grade.overall_score, "Solution graded");
    self.answers = Some(answers);
    self.phase = Phase::Reviewed;
    Ok(&*self.grade.insert(grade))
  }

  /// Full discussion transcript: any carried-over text first, then live turns.
  pub fn discussion(&self) -> String {
    let live = discussion_transcript(&self.turns);
    match &self.restored_qna {
      Some(qna) if live.is_empty() => qna.clone(),
      Some(qna) => format!("{}\n\n{}", qna, live),
      None => live,
    }
  }

  pub fn review(&self) -> Result<ReviewView, SessionError> {
    self.require(Phase::Reviewed, "review")?;
    let grade = self.grade.as_ref().ok_or(SessionError::Prerequisite("grade"))?;
    Ok(ReviewView::from_grade(grade))
  }

  /// Start over: back to setup with everything discarded.
  pub fn reset(&mut self) {
    let (epoch, generation) = (self.epoch, self.generation);
    *self = Session::new();
    self.epoch = epoch;
    self.generation = generation + 1;
  }

  pub fn snapshot(&self) -> SessionSnapshot {
    SessionSnapshot {
      phase: self.phase,
      config: self.context.as_ref().map(|c| c.config.clone()),
      problem: self.context.as_ref().map(|c| c.problem.statement.clone()),
      has_discussed: self.has_discussed,
      turns: self.turns.clone(),
      code: self.code.clone(),
      time_left: self.countdown.as_ref().map(Countdown::left),
      clock: self.countdown.as_ref().map(|c| format_clock(c.left())),
      time_up: self.time_up(),
      questions: self.questions.clone(),
      review: self.grade.as_ref().map(ReviewView::from_grade),
    }
  }
}

/// `User Question / AI Answer` pairs separated by blank lines.
pub fn discussion_transcript(turns: &[DiscussionTurn]) -> String {
  turns
    .iter()
    .map(|t| format!("User Question: {}\nAI Answer: {}", t.question, t.answer))
    .collect::<Vec<_>>()
    .join("\n\n")
}

/// `Question / Answer` pairs separated by blank lines.
pub fn assessment_transcript(questions: &AssessmentQuestions, answers: &AssessmentAnswers) -> String {
  questions
    .as_slice()
    .iter()
    .zip(answers.as_slice())
    .map(|(q, a)| format!("Question: {}\nAnswer: {}", q, a))
    .collect::<Vec<_>>()
    .join("\n\n")
}

// --- Flat record ---

/// Flat key/value form of a session, e.g. for query strings.
pub type SessionRecord = BTreeMap<String, String>;

impl Session {
  pub fn to_record(&self) -> SessionRecord {
    let mut r = SessionRecord::new();
    r.insert("phase".into(), self.phase.as_str().into());
    let Some(ctx) = &self.context else {
      return r;
    };
    let mut put = |k: &str, v: String| {
      r.insert(k.to_string(), v);
    };
    put("jobRole", ctx.config.job_role.clone());
    put("company", ctx.config.company.clone());
    put("language", ctx.config.language.as_str().into());
    put("difficulty", ctx.config.difficulty.as_str().into());
    put("timeLimit", ctx.config.time_limit_minutes.to_string());
    put("problem", ctx.problem.statement.clone());
    if let Some(code) = &self.code {
      put("code", code.source.clone());
    }
    let qna = self.discussion();
    if !qna.is_empty() {
      put("qna", qna);
    }
    // Structured turns only when they are the whole discussion.
    if self.restored_qna.is_none() && !self.turns.is_empty() {
      put("turns", serde_json::to_string(&self.turns).unwrap_or_default());
    }
    if let Some(cd) = &self.countdown {
      put("timeLeft", cd.left().to_string());
    }
    if let Some(q) = &self.questions {
      put("questions", serde_json::to_string(q).unwrap_or_default());
    }
    if let Some(a) = &self.answers {
      put("answers", serde_json::to_string(a).unwrap_or_default());
    }
    if let Some(g) = &self.grade {
      put("efficiency", g.efficiency_feedback.clone());
      put("correctness", g.correctness_feedback.clone());
      put("style", g.style_feedback.clone());
      put("score", g.overall_score.to_string());
      if let Some(i) = &g.insights {
        put("insights", i.clone());
      }
    }
    r
  }

  /// Rebuild the furthest phase the record supports. Anything missing the
  /// upstream state of its phase comes back as a fresh `Setup` session.
  pub fn restore(record: &SessionRecord) -> Session {
    match Self::try_restore(record) {
      Some(s) => s,
      None => {
        warn!(target: "session", "Session record lacks upstream state; starting over at setup");
        Session::new()
      }
    }
  }

  fn try_restore(r: &SessionRecord) -> Option<Session> {
    let get = |k: &str| r.get(k).map(String::as_str).filter(|v| !v.trim().is_empty());

    let explicit = get("phase").and_then(Phase::parse);
    if explicit == Some(Phase::Setup) {
      return Some(Session::new());
    }

    let config = SessionConfig {
      job_role: get("jobRole")?.to_string(),
      company: get("company")?.to_string(),
      language: Language::parse(get("language")?)?,
      difficulty: get("difficulty").and_then(Difficulty::parse).unwrap_or_default(),
      time_limit_minutes: get("timeLimit").and_then(|v| v.parse().ok()).unwrap_or(0),
    };
    let problem = Problem { statement: get("problem")?.to_string() };

    let turns: Option<Vec<DiscussionTurn>> = get("turns").and_then(|v| serde_json::from_str(v).ok());
    let restored_qna = match &turns {
      Some(_) => None,
      None => get("qna").map(str::to_string),
    };
    let turns = turns.unwrap_or_default();
    let questions = get("questions")
      .map(|v| serde_json::from_str::<Vec<String>>(v).ok().and_then(|q| AssessmentQuestions::try_from(q).ok()));
    let grade = get("score").map(|s| {
      s.parse::<f32>().ok().filter(|s| (MIN_SCORE..=MAX_SCORE).contains(s)).map(|score| GradeResult {
        efficiency_feedback: get("efficiency").unwrap_or_default().to_string(),
        correctness_feedback: get("correctness").unwrap_or_default().to_string(),
        style_feedback: get("style").unwrap_or_default().to_string(),
        overall_score: score,
        insights: get("insights").map(str::to_string),
      })
    });

    let phase = explicit.unwrap_or(match (&grade, &questions) {
      (Some(_), _) => Phase::Reviewed,
      (None, Some(_)) => Phase::AwaitingAssessment,
      (None, None) => Phase::Discussing,
    });

    let code = CodeBuffer {
      source: get("code").map(str::to_string).unwrap_or_else(|| config.language.starter_code().to_string()),
      language: config.language,
    };

    let mut s = Session::new();
    s.has_discussed = !turns.is_empty() || restored_qna.is_some();
    s.turns = turns;
    s.restored_qna = restored_qna;
    s.code = Some(code);
    s.phase = phase;

    match phase {
      Phase::Setup | Phase::Discussing => {}
      Phase::Coding => {
        if !s.has_discussed {
          return None;
        }
        s.countdown = Countdown::from_minutes(config.time_limit_minutes).map(|mut cd| {
          if let Some(left) = get("timeLeft").and_then(|v| v.parse::<u64>().ok()) {
            cd.left = left.min(cd.total);
          }
          cd
        });
      }
      Phase::AwaitingAssessment | Phase::Reviewed => {
        if s.code.as_ref().map_or(true, CodeBuffer::is_blank) {
          return None;
        }
        s.questions = Some(questions.flatten()?);
        s.answers = get("answers")
          .and_then(|v| serde_json::from_str::<Vec<String>>(v).ok())
          .and_then(|a| AssessmentAnswers::try_from(a).ok());
        if phase == Phase::Reviewed {
          s.grade = Some(grade.flatten()?);
        }
      }
    }
    s.context = Some(Arc::new(SessionContext { config, problem }));
    Some(s)
  }
}
