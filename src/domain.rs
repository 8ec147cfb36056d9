//! Domain models: session configuration, problem, discussion turns, code buffer,
//! assessment questions/answers and the grade result.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Programming languages a candidate can interview in.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Language {
  Javascript,
  Typescript,
  Python,
  Java,
  #[serde(rename = "c++", alias = "cpp")]
  Cpp,
  C,
  Csharp,
}

impl Language {
  /// Name used in prompts and in the flat session record.
  pub fn as_str(&self) -> &'static str {
    match self {
      Language::Javascript => "javascript",
      Language::Typescript => "typescript",
      Language::Python => "python",
      Language::Java => "java",
      Language::Cpp => "c++",
      Language::C => "c",
      Language::Csharp => "csharp",
    }
  }

  /// Runtime identifier understood by the remote runner.
  pub fn runtime(&self) -> &'static str {
    match self {
      Language::Cpp => "cpp",
      other => other.as_str(),
    }
  }

  /// Source file name, following each toolchain's convention.
  pub fn file_name(&self) -> &'static str {
    match self {
      Language::Javascript => "main.js",
      Language::Typescript => "main.ts",
      Language::Python => "main.py",
      Language::Java => "Main.java",
      Language::Cpp => "main.cpp",
      Language::C => "main.c",
      Language::Csharp => "main.cs",
    }
  }

  /// Initial contents of the code buffer.
  pub fn starter_code(&self) -> &'static str {
    match self {
      Language::Javascript => "// Write your JavaScript solution here\nfunction solution() {\n    // Your code here\n}",
      Language::Typescript => "// Write your TypeScript solution here\nfunction solution(): any {\n    // Your code here\n}",
      Language::Python => "# Write your Python solution here\ndef solution():\n    # Your code here\n    pass",
      Language::Java => "// Write your Java solution here\npublic class Solution {\n    public static void main(String[] args) {\n        // Your code here\n    }\n}",
      Language::Cpp => "// Write your C++ solution here\n#include <iostream>\n\nint main() {\n    // Your code here\n    return 0;\n}",
      Language::C => "// Write your C solution here\n#include <stdio.h>\n\nint main() {\n    // Your code here\n    return 0;\n}",
      Language::Csharp => "// Write your C# solution here\nusing System;\n\nclass Program {\n    static void Main() {\n        // Your code here\n    }\n}",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_lowercase().as_str() {
      "javascript" | "js" => Some(Language::Javascript),
      "typescript" | "ts" => Some(Language::Typescript),
      "python" | "py" => Some(Language::Python),
      "java" => Some(Language::Java),
      "c++" | "cpp" => Some(Language::Cpp),
      "c" => Some(Language::C),
      "csharp" | "c#" => Some(Language::Csharp),
      _ => None,
    }
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
  Easy,
  #[default]
  Medium,
  Hard,
}

impl Difficulty {
  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_lowercase().as_str() {
      "easy" => Some(Difficulty::Easy),
      "medium" => Some(Difficulty::Medium),
      "hard" => Some(Difficulty::Hard),
      _ => None,
    }
  }
}

/// Collected at setup; immutable afterwards.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
  pub job_role: String,
  pub company: String,
  pub language: Language,
  #[serde(default)]
  pub difficulty: Difficulty,
  #[serde(default)]
  pub time_limit_minutes: u32,
}

const MIN_FIELD_CHARS: usize = 2;

impl SessionConfig {
  pub fn validate(&self) -> Result<(), SessionError> {
    if self.job_role.trim().chars().count() < MIN_FIELD_CHARS {
      return Err(SessionError::Validation("Job role must be at least 2 characters.".into()));
    }
    if self.company.trim().chars().count() < MIN_FIELD_CHARS {
      return Err(SessionError::Validation("Company name must be at least 2 characters.".into()));
    }
    Ok(())
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Problem {
  pub statement: String,
}

/// One question/answer exchange. `audio` is filled in a second stage, once.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscussionTurn {
  pub question: String,
  pub answer: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub audio: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeBuffer {
  pub source: String,
  pub language: Language,
}

impl CodeBuffer {
  pub fn starter(language: Language) -> Self {
    Self { source: language.starter_code().to_string(), language }
  }

  pub fn is_blank(&self) -> bool {
    self.source.trim().is_empty()
  }
}

pub const ASSESSMENT_QUESTION_COUNT: usize = 3;

/// Exactly three follow-up questions about the submitted code.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct AssessmentQuestions([String; ASSESSMENT_QUESTION_COUNT]);

impl AssessmentQuestions {
  pub fn as_slice(&self) -> &[String] {
    &self.0
  }
}

impl TryFrom<Vec<String>> for AssessmentQuestions {
  type Error = SessionError;

  fn try_from(v: Vec<String>) -> Result<Self, Self::Error> {
    if v.iter().any(|q| q.trim().is_empty()) {
      return Err(SessionError::Shape("assessment question is empty".into()));
    }
    let n = v.len();
    let arr: [String; ASSESSMENT_QUESTION_COUNT] = v
      .try_into()
      .map_err(|_| SessionError::Shape(format!("expected {} assessment questions, got {}", ASSESSMENT_QUESTION_COUNT, n)))?;
    Ok(Self(arr))
  }
}

/// Candidate answers, one per assessment question; none may be blank.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct AssessmentAnswers([String; ASSESSMENT_QUESTION_COUNT]);

impl AssessmentAnswers {
  pub fn as_slice(&self) -> &[String] {
    &self.0
  }
}

impl TryFrom<Vec<String>> for AssessmentAnswers {
  type Error = SessionError;

  fn try_from(v: Vec<String>) -> Result<Self, Self::Error> {
    if v.len() != ASSESSMENT_QUESTION_COUNT {
      return Err(SessionError::Validation(format!(
        "expected {} answers, got {}",
        ASSESSMENT_QUESTION_COUNT,
        v.len()
      )));
    }
    if let Some(i) = v.iter().position(|a| a.trim().is_empty()) {
      return Err(SessionError::Validation(format!("answer {} is empty", i + 1)));
    }
    let arr: [String; ASSESSMENT_QUESTION_COUNT] = v
      .try_into()
      .map_err(|_| SessionError::Validation("answers must be exactly three".into()))?;
    Ok(Self(arr))
  }
}

pub const MIN_SCORE: f32 = 1.0;
pub const MAX_SCORE: f32 = 10.0;

/// Terminal artifact of a session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GradeResult {
  pub efficiency_feedback: String,
  pub correctness_feedback: String,
  pub style_feedback: String,
  pub overall_score: f32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub insights: Option<String>,
}
