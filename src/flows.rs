//! Prompt flows: one generic structured completion operation, specialised per task.
//!
//! A flow is a template plus typed input/output records. The executor renders
//! the template with the input's fields, asks the completion service for a JSON
//! object, decodes it into the output record and runs the flow's shape checks.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::Prompts;
use crate::domain::{ASSESSMENT_QUESTION_COUNT, MAX_SCORE, MIN_SCORE};
use crate::error::FlowError;
use crate::util::fill_template;

/// Question substituted when the candidate asks for a hint.
pub const HINT_QUESTION: &str = "I am stuck, please provide a hint.";

/// Hosted language model behind the flows. Any provider with JSON-mode
/// completions can stand in.
#[async_trait]
pub trait CompletionService: Send + Sync {
  async fn complete_json(&self, operation: &str, system: &str, user: &str) -> Result<serde_json::Value, FlowError>;
  async fn synthesize_speech(&self, text: &str) -> Result<Vec<u8>, FlowError>;
}

pub trait Flow {
  const NAME: &'static str;
  type Input<'a>: Serialize + Sync;
  type Output: DeserializeOwned;

  fn template(prompts: &Prompts) -> &str;

  fn validate(_out: &Self::Output) -> Result<(), FlowError> {
    Ok(())
  }
}

// --- Flow records ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateProblemInput<'a> {
  pub job_role: &'a str,
  pub company: &'a str,
  pub language: &'a str,
  pub difficulty: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateProblemOutput {
  pub problem_statement: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionInput<'a> {
  pub problem_description: &'a str,
  pub user_code: &'a str,
  pub user_question: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct AnswerOutput {
  pub answer: String,
}

#[derive(Debug, Deserialize)]
pub struct HintOutput {
  pub hint: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentInput<'a> {
  pub problem_description: &'a str,
  pub user_code: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct AssessmentOutput {
  pub questions: Vec<String>,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GradeInput<'a> {
  pub code: &'a str,
  pub problem_description: &'a str,
  pub job_role: Option<&'a str>,
  pub company: Option<&'a str>,
  pub language: Option<&'a str>,
  pub difficulty: Option<&'a str>,
  pub question_and_answers: Option<&'a str>,
  pub assessment_data: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeOutput {
  pub efficiency_feedback: String,
  pub correctness_feedback: String,
  pub style_feedback: String,
  pub overall_score: f32,
  #[serde(default)]
  pub insights: Option<String>,
}

// --- Flow definitions ---

pub struct GenerateProblem;

impl Flow for GenerateProblem {
  const NAME: &'static str = "generate_problem";
  type Input<'a> = GenerateProblemInput<'a>;
  type Output = GenerateProblemOutput;

  fn template(prompts: &Prompts) -> &str { &prompts.generate_problem }

  fn validate(out: &Self::Output) -> Result<(), FlowError> {
    if out.problem_statement.trim().is_empty() {
      return Err(FlowError::Empty("problem statement"));
    }
    Ok(())
  }
}

pub struct AnswerQuestion;

impl Flow for AnswerQuestion {
  const NAME: &'static str = "answer_question";
  type Input<'a> = QuestionInput<'a>;
  type Output = AnswerOutput;

  fn template(prompts: &Prompts) -> &str { &prompts.answer_question }

  fn validate(out: &Self::Output) -> Result<(), FlowError> {
    if out.answer.trim().is_empty() {
      return Err(FlowError::Empty("answer"));
    }
    Ok(())
  }
}

pub struct Hint;

impl Flow for Hint {
  const NAME: &'static str = "hint";
  type Input<'a> = QuestionInput<'a>;
  type Output = HintOutput;

  fn template(prompts: &Prompts) -> &str { &prompts.hint }

  fn validate(out: &Self::Output) -> Result<(), FlowError> {
    if out.hint.trim().is_empty() {
      return Err(FlowError::Empty("hint"));
    }
    Ok(())
  }
}

pub struct AssessmentQuestionsFlow;

impl Flow for AssessmentQuestionsFlow {
  const NAME: &'static str = "generate_assessment_questions";
  type Input<'a> = AssessmentInput<'a>;
  type Output = AssessmentOutput;

  fn template(prompts: &Prompts) -> &str { &prompts.assessment_questions }

  fn validate(out: &Self::Output) -> Result<(), FlowError> {
    if out.questions.len() != ASSESSMENT_QUESTION_COUNT {
      return Err(FlowError::Shape(format!(
        "expected {} questions, got {}",
        ASSESSMENT_QUESTION_COUNT,
        out.questions.len()
      )));
    }
    if out.questions.iter().any(|q| q.trim().is_empty()) {
      return Err(FlowError::Empty("assessment question"));
    }
    Ok(())
  }
}

pub struct GradeSolution;

impl Flow for GradeSolution {
  const NAME: &'static str = "grade_solution";
  type Input<'a> = GradeInput<'a>;
  type Output = GradeOutput;

  fn template(prompts: &Prompts) -> &str { &prompts.grade_solution }

  fn validate(out: &Self::Output) -> Result<(), FlowError> {
    let s = out.overall_score;
    if !s.is_finite() || !(MIN_SCORE..=MAX_SCORE).contains(&s) {
      return Err(FlowError::Shape(format!("overallScore {} outside [1, 10]", s)));
    }
    Ok(())
  }
}

/// Runs flows against the configured completion service.
#[derive(Clone)]
pub struct FlowExecutor {
  llm: Option<Arc<dyn CompletionService>>,
  prompts: Arc<Prompts>,
}

impl FlowExecutor {
  pub fn new(llm: Option<Arc<dyn CompletionService>>, prompts: Prompts) -> Self {
    Self { llm, prompts: Arc::new(prompts) }
  }

  pub fn is_enabled(&self) -> bool {
    self.llm.is_some()
  }

  /// The generic structured completion operation.
  #[instrument(level = "info", skip_all, fields(flow = F::NAME))]
  pub async fn run<F: Flow>(&self, input: &F::Input<'_>) -> Result<F::Output, FlowError> {
    let llm = self.llm.as_ref().ok_or(FlowError::Unavailable)?;
    let user = render(F::template(&self.prompts), input)?;
    debug!(target: "session", flow = F::NAME, prompt_len = user.len(), "Rendered flow prompt");

    let raw = llm.complete_json(F::NAME, &self.prompts.json_system, &user).await?;
    let out: F::Output = serde_json::from_value(raw)
      .map_err(|e| FlowError::Shape(format!("{}: {}", F::NAME, e)))?;
    F::validate(&out)?;
    Ok(out)
  }

  pub async fn generate_problem(
    &self,
    job_role: &str,
    company: &str,
    language: &str,
    difficulty: &str,
  ) -> Result<GenerateProblemOutput, FlowError> {
    let input = GenerateProblemInput { job_role, company, language, difficulty };
    self.run::<GenerateProblem>(&input).await
  }

  pub async fn answer_question(
    &self,
    problem_description: &str,
    user_code: &str,
    user_question: &str,
  ) -> Result<AnswerOutput, FlowError> {
    let input = QuestionInput { problem_description, user_code, user_question };
    self.run::<AnswerQuestion>(&input).await
  }

  pub async fn hint(&self, problem_description: &str, user_code: &str) -> Result<HintOutput, FlowError> {
    let input = QuestionInput { problem_description, user_code, user_question: HINT_QUESTION };
    self.run::<Hint>(&input).await
  }

  pub async fn generate_assessment_questions(
    &self,
    problem_description: &str,
    user_code: &str,
  ) -> Result<AssessmentOutput, FlowError> {
    let input = AssessmentInput { problem_description, user_code };
    self.run::<AssessmentQuestionsFlow>(&input).await
  }

  pub async fn grade_solution(&self, input: &GradeInput<'_>) -> Result<GradeOutput, FlowError> {
    self.run::<GradeSolution>(input).await
  }

  /// Text to speech as a `data:` URI. Failures only cost the audio.
  #[instrument(level = "info", skip(self, text), fields(text_len = text.len()))]
  pub async fn speak(&self, text: &str) -> Option<String> {
    let llm = self.llm.as_ref()?;
    match llm.synthesize_speech(text).await {
      Ok(wav) => Some(format!("data:audio/wav;base64,{}", STANDARD.encode(wav))),
      Err(e) => {
        warn!(target: "session", error = %e, "Speech synthesis failed; turn stays text-only");
        None
      }
    }
  }
}

/// Interpolate a template with the top-level fields of a serialized record.
/// Absent optional fields render as empty strings.
fn render<I: Serialize + ?Sized>(template: &str, input: &I) -> Result<String, FlowError> {
  let value = serde_json::to_value(input).map_err(|e| FlowError::Shape(e.to_string()))?;
  let obj = value
    .as_object()
    .ok_or_else(|| FlowError::Shape("flow input must be a record".into()))?;
  let fields: Vec<(String, String)> = obj
    .iter()
    .map(|(k, v)| {
      let s = match v {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
      };
      (k.clone(), s)
    })
    .collect();
  let pairs: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
  Ok(fill_template(template, &pairs))
}


#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::testing::{executor, ScriptedLlm};
  use super::*;

  #[tokio::test]
  async fn hint_substitutes_fixed_question() {
    let llm = ScriptedLlm::new();
    llm.push(json!({ "hint": "Think about duplicates." }));
    let out = executor(&llm).hint("Two sum", "def f(): pass").await.unwrap();
    assert_eq!(out.hint, "Think about duplicates.");
    let prompt = llm.last_prompt();
    assert!(prompt.contains(HINT_QUESTION));
    assert!(prompt.contains("Two sum"));
    assert_eq!(llm.operations(), vec!["hint".to_string()]);
  }

  #[tokio::test]
  async fn empty_problem_is_generation_failure() {
    let llm = ScriptedLlm::new();
    llm.push(json!({ "problemStatement": "   " }));
    let err = executor(&llm).generate_problem("SRE", "Acme", "go", "easy").await.unwrap_err();
    assert!(matches!(err, FlowError::Empty("problem statement")));
  }

  #[tokio::test]
  async fn assessment_requires_exactly_three() {
    let llm = ScriptedLlm::new();
    llm.push(json!({ "questions": ["a", "b"] }));
    llm.push(json!({ "questions": ["a", "b", "c", "d"] }));
    llm.push(json!({ "questions": ["a", "b", "c"] }));
    let ex = executor(&llm);
    assert!(matches!(ex.generate_assessment_questions("p", "c").await, Err(FlowError::Shape(_))));
    assert!(matches!(ex.generate_assessment_questions("p", "c").await, Err(FlowError::Shape(_))));
    assert_eq!(ex.generate_assessment_questions("p", "c").await.unwrap().questions.len(), 3);
  }

  #[tokio::test]
  async fn grade_rejects_out_of_range_scores() {
    let llm = ScriptedLlm::new();
    for score in [0.0, 11.0] {
      llm.push(json!({
        "efficiencyFeedback": "e", "correctnessFeedback": "c", "styleFeedback": "s", "overallScore": score
      }));
    }
    llm.push(json!({ "efficiencyFeedback": "e", "correctnessFeedback": "c", "styleFeedback": "s" }));
    let ex = executor(&llm);
    let input = GradeInput { code: "x", problem_description: "p", ..Default::default() };
    for _ in 0..3 {
      assert!(matches!(ex.grade_solution(&input).await, Err(FlowError::Shape(_))));
    }
  }

  #[tokio::test]
  async fn grade_renders_missing_optionals_as_empty() {
    let llm = ScriptedLlm::new();
    llm.push(json!({
      "efficiencyFeedback": "O(n)", "correctnessFeedback": "ok", "styleFeedback": "clean",
      "overallScore": 8, "insights": "hash map"
    }));
    let input = GradeInput { code: "print(1)", problem_description: "p", language: Some("python"), ..Default::default() };
    let out = executor(&llm).grade_solution(&input).await.unwrap();
    assert_eq!(out.overall_score, 8.0);
    assert_eq!(out.insights.as_deref(), Some("hash map"));
    let prompt = llm.last_prompt();
    assert!(prompt.contains("Code Solution (python)"));
    assert!(prompt.contains("Job Role: \n"));
    assert!(!prompt.contains("{jobRole}"));
  }

  #[tokio::test]
  async fn candidate_text_with_braces_reaches_the_prompt_verbatim() {
    let llm = ScriptedLlm::new();
    llm.push(json!({
      "efficiencyFeedback": "e", "correctnessFeedback": "c", "styleFeedback": "s", "overallScore": 6
    }));
    let code = "print(f\"{language} at {company}\")";
    let answers = "Question: Why?\nAnswer: see {code}";
    let input = GradeInput {
      code,
      problem_description: "p",
      language: Some("python"),
      company: Some("Acme"),
      assessment_data: Some(answers),
      ..Default::default()
    };
    executor(&llm).grade_solution(&input).await.unwrap();
    let prompt = llm.last_prompt();
    assert!(prompt.contains(code), "{}", prompt);
    assert!(prompt.contains(answers));
    assert!(prompt.contains("Code Solution (python)"));
  }

  #[tokio::test]
  async fn completion_failure_is_reported() {
    let llm = ScriptedLlm::new();
    llm.push_err(FlowError::Completion("HTTP 503".into()));
    let err = executor(&llm).answer_question("p", "c", "q").await.unwrap_err();
    assert!(matches!(err, FlowError::Completion(_)));
  }

  #[tokio::test]
  async fn malformed_output_is_shape_error() {
    let llm = ScriptedLlm::new();
    llm.push(json!({ "reply": "wrong field" }));
    let err = executor(&llm).answer_question("p", "c", "q").await.unwrap_err();
    assert!(matches!(err, FlowError::Shape(_)));
  }

  #[tokio::test]
  async fn disabled_executor_reports_unavailable() {
    let ex = FlowExecutor::new(None, Prompts::default());
    assert!(!ex.is_enabled());
    assert!(matches!(ex.hint("p", "c").await, Err(FlowError::Unavailable)));
    assert_eq!(ex.speak("hello").await, None);
  }

  #[tokio::test]
  async fn speak_encodes_data_uri_and_swallows_errors() {
    let llm = ScriptedLlm::new();
    let ex = executor(&llm);
    assert_eq!(ex.speak("hi").await, None);
    *llm.speech.lock().unwrap() = Some(b"RIFF".to_vec());
    assert_eq!(ex.speak("hi").await.as_deref(), Some("data:audio/wav;base64,UklGRg=="));
  }
}
