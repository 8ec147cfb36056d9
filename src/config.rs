//! Loading agent configuration (prompt templates + execution settings) from TOML.
//!
//! See `AgentConfig`, `Prompts` and `ExecutionCfg` for the expected schema.
//! Templates use `{field}` placeholders named after the flow input fields.

use serde::Deserialize;
use tracing::{error, info};

pub const DEFAULT_EXECUTION_URL: &str = "https://emkc.org/api/v2/piston/execute";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub execution: ExecutionCfg,
}

/// Remote runner settings. Environment variables win over the TOML values.
#[derive(Clone, Debug, Deserialize)]
pub struct ExecutionCfg {
  #[serde(default = "default_execution_url")]
  pub url: String,
  #[serde(default)]
  pub disabled: bool,
  #[serde(default = "default_execution_timeout")]
  pub timeout_secs: u64,
}

fn default_execution_url() -> String { DEFAULT_EXECUTION_URL.into() }
fn default_execution_timeout() -> u64 { 30 }

impl Default for ExecutionCfg {
  fn default() -> Self {
    Self { url: default_execution_url(), disabled: false, timeout_secs: default_execution_timeout() }
  }
}

impl ExecutionCfg {
  pub fn with_env_overrides(mut self) -> Self {
    if let Ok(url) = std::env::var("EXECUTION_API_URL") {
      self.url = url;
    }
    if let Ok(v) = std::env::var("EXECUTION_DISABLED") {
      self.disabled = matches!(v.as_str(), "1" | "true" | "yes");
    }
    self
  }
}

/// Prompt templates, one pair (system + user) per flow.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  /// Shared system prompt; every flow answers with a JSON object.
  pub json_system: String,
  pub generate_problem: String,
  pub answer_question: String,
  pub hint: String,
  pub assessment_questions: String,
  pub grade_solution: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      json_system: "You are part of a mock coding-interview platform. Respond ONLY with a strict JSON object matching the requested fields.".into(),
      generate_problem: "You are a coding problem generator that tailors problems to specific job roles and companies.\n\
Generate a coding problem that is appropriate for a candidate interviewing for the following job role at the following company.\n\
The problem should be suitable for the specified programming language and difficulty level.\n\n\
Job Role: {jobRole}\nCompany: {company}\nLanguage: {language}\nDifficulty: {difficulty}\n\n\
The problem should be technically challenging but solvable within 45-60 minutes.\n\
Provide only the problem statement itself, without introductory text.\n\
Return JSON: {\"problemStatement\": string}".into(),
      answer_question: "You are an expert coding tutor acting as an interviewer in a mock coding interview.\n\
The candidate explains their approach before and while writing code. Guide them towards a good solution without giving away the answer.\n\n\
Problem: {problemDescription}\n\nThe candidate says:\n{userQuestion}\n\nTheir current code:\n{userCode}\n\n\
If the approach is sound, affirm it and prompt them to consider edge cases, alternative data structures or performance.\n\
If it has flaws, ask probing questions so they find the issues themselves. Never provide the solution code. Be encouraging and concise.\n\
Return JSON: {\"answer\": string}".into(),
      hint: "You are an expert coding tutor. A student is working on the following problem:\n\n\
Problem Description: {problemDescription}\n\nThe student has written the following code:\n{userCode}\n\n\
The student asks: {userQuestion}\n\n\
Provide a context-aware hint specific to their code that helps them debug or improve the current approach without giving away the solution. Do not include code. Be concise.\n\
Return JSON: {\"hint\": string}".into(),
      assessment_questions: "You are an expert software engineer conducting a coding interview and evaluating how well the candidate understands their own solution.\n\n\
Problem Description:\n{problemDescription}\n\nCandidate's Code Solution:\n{userCode}\n\n\
Generate three follow-up questions directly about this code, probing:\n\
1. Time and space complexity.\n2. Edge cases or failure points in the logic.\n3. Alternative approaches, data structures or trade-offs.\n\
Do not ask generic questions.\n\
Return JSON: {\"questions\": [string, string, string]} with exactly three questions.".into(),
      grade_solution: "You are an expert software engineer specializing in code review and grading.\n\n\
Problem Description: {problemDescription}\nCode Solution ({language}):\n```\n{code}\n```\n\
Job Role: {jobRole}\nCompany: {company}\nDifficulty: {difficulty}\n\n\
Initial discussion transcript:\n{questionAndAnswers}\n\n\
Assessment questions and the candidate's answers (weigh these heavily, they reveal depth of understanding):\n{assessmentData}\n\n\
Give concise, constructive feedback on efficiency, correctness and style, an overall score between 1 and 10, and key insights about the approach.\n\
Return JSON: {\"efficiencyFeedback\": string, \"correctnessFeedback\": string, \"styleFeedback\": string, \"overallScore\": number, \"insights\": string}".into(),
    }
  }
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AgentConfig>(&s) {
      Ok(cfg) => {
        info!(target: "codesprint_backend", %path, "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "codesprint_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "codesprint_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
