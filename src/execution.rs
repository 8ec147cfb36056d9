//! Code execution adapter.
//!
//! Candidate code never runs inside this process. A backend either forwards
//! source + stdin to a sandboxed remote multi-language runner (Piston-compatible
//! API) or refuses politely when execution is disabled. Every outcome, including
//! transport failures, is reported as display text.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::ExecutionCfg;
use crate::domain::Language;

pub const NO_CODE: &str = "No code to execute";
pub const NO_OUTPUT: &str = "Code executed successfully (no output)";
pub const DISABLED: &str = "Code execution is disabled on this server";

#[async_trait]
pub trait ExecutionBackend: Send + Sync {
  /// Run `source` with `stdin`; the result is always text to show the candidate.
  async fn execute(&self, source: &str, language: Language, stdin: &str) -> String;
}

/// Build the backend described by the configuration.
pub fn backend_from_config(cfg: &ExecutionCfg) -> Box<dyn ExecutionBackend> {
  if cfg.disabled {
    info!(target: "codesprint_backend", "Code execution disabled");
    return Box::new(Disabled);
  }
  match RemoteRunner::new(&cfg.url, Duration::from_secs(cfg.timeout_secs)) {
    Ok(r) => {
      info!(target: "codesprint_backend", url = %cfg.url, "Remote code runner enabled");
      Box::new(r)
    }
    Err(e) => {
      error!(target: "codesprint_backend", error = %e, "Failed to build HTTP client; code execution disabled");
      Box::new(Disabled)
    }
  }
}

pub struct Disabled;

#[async_trait]
impl ExecutionBackend for Disabled {
  async fn execute(&self, source: &str, _language: Language, _stdin: &str) -> String {
    if source.trim().is_empty() {
      return NO_CODE.into();
    }
    DISABLED.into()
  }
}

#[derive(Clone)]
pub struct RemoteRunner {
  client: reqwest::Client,
  url: String,
}

impl RemoteRunner {
  pub fn new(url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self { client, url: url.to_string() })
  }

  async fn submit(&self, req: &RunRequest<'_>) -> Result<RunResponse, String> {
    let res = self.client.post(&self.url)
      .header(USER_AGENT, "codesprint-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_runner_error(&body).unwrap_or(body);
      return Err(format!("runner HTTP {}: {}", status, msg));
    }
    res.json::<RunResponse>().await.map_err(|e| e.to_string())
  }
}

#[async_trait]
impl ExecutionBackend for RemoteRunner {
  #[instrument(level = "info", skip(self, source, stdin), fields(language = language.runtime(), source_len = source.len(), stdin_len = stdin.len()))]
  async fn execute(&self, source: &str, language: Language, stdin: &str) -> String {
    if source.trim().is_empty() {
      return NO_CODE.into();
    }
    let req = RunRequest::new(source, language, stdin);
    let start = std::time::Instant::now();
    match self.submit(&req).await {
      Ok(resp) => {
        info!(elapsed = ?start.elapsed(), "Run finished");
        interpret(&resp)
      }
      Err(e) => {
        error!(elapsed = ?start.elapsed(), error = %e, "Run failed");
        format!("Execution Error: {}", e)
      }
    }
  }
}

// --- Runner DTOs ---

#[derive(Debug, Serialize)]
pub struct RunRequest<'a> {
  pub language: &'static str,
  pub version: &'static str,
  pub files: Vec<RunFile<'a>>,
  pub stdin: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RunFile<'a> {
  pub name: &'static str,
  pub content: &'a str,
}

impl<'a> RunRequest<'a> {
  pub fn new(source: &'a str, language: Language, stdin: &'a str) -> Self {
    Self {
      language: language.runtime(),
      version: "*",
      files: vec![RunFile { name: language.file_name(), content: source }],
      stdin,
    }
  }
}

#[derive(Debug, Default, Deserialize)]
pub struct RunResponse {
  #[serde(default)]
  pub run: Option<StageOutput>,
  #[serde(default)]
  pub compile: Option<StageOutput>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StageOutput {
  #[serde(default)]
  pub stdout: Option<String>,
  #[serde(default)]
  pub stderr: Option<String>,
}

fn non_empty(s: &Option<String>) -> Option<&str> {
  s.as_deref().filter(|s| !s.is_empty())
}

/// Reduce a runner response to the text shown to the candidate.
/// Precedence: run stdout, run stderr, compile stderr, then a success note.
pub fn interpret(resp: &RunResponse) -> String {
  let run = resp.run.as_ref();
  if let Some(out) = run.and_then(|r| non_empty(&r.stdout)) {
    return out.to_string();
  }
  if let Some(err) = run.and_then(|r| non_empty(&r.stderr)) {
    return format!("Error: {}", err);
  }
  if let Some(err) = resp.compile.as_ref().and_then(|c| non_empty(&c.stderr)) {
    return format!("Compilation Error: {}", err);
  }
  NO_OUTPUT.into()
}

fn extract_runner_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct E { message: String }
  serde_json::from_str::<E>(body).ok().map(|e| e.message)
}

#[cfg(test)]
pub mod testing {
  use std::sync::Mutex;

  use super::*;

  /// Echoes a canned reply and records what was submitted.
  #[derive(Default)]
  pub struct CannedRunner {
    pub reply: String,
    pub seen: Mutex<Vec<(String, Language, String)>>,
  }

  #[async_trait]
  impl ExecutionBackend for CannedRunner {
    async fn execute(&self, source: &str, language: Language, stdin: &str) -> String {
      self.seen.lock().unwrap().push((source.to_string(), language, stdin.to_string()));
      self.reply.clone()
    }
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use serde_json::json;

  use super::*;

  fn parse(v: serde_json::Value) -> RunResponse {
    serde_json::from_value(v).unwrap()
  }

  #[test]
  fn stdout_passes_through_verbatim() {
    let r = parse(json!({ "run": { "stdout": "hello\n", "stderr": "", "code": 0 } }));
    assert_eq!(interpret(&r), "hello\n");
  }

  #[test]
  fn runtime_error_is_prefixed() {
    let r = parse(json!({ "run": { "stdout": "", "stderr": "ZeroDivisionError" } }));
    assert_eq!(interpret(&r), "Error: ZeroDivisionError");
  }

  #[test]
  fn compile_error_is_prefixed() {
    let r = parse(json!({
      "compile": { "stdout": "", "stderr": "main.cpp:1: error: expected ';'" },
      "run": { "stdout": "", "stderr": "" }
    }));
    assert_eq!(interpret(&r), "Compilation Error: main.cpp:1: error: expected ';'");

    let r = parse(json!({ "compile": { "stderr": "Main.java:3: error" } }));
    assert!(interpret(&r).starts_with("Compilation Error:"));
  }

  #[test]
  fn silent_run_reports_success() {
    assert_eq!(interpret(&parse(json!({ "run": { "stdout": "" } }))), NO_OUTPUT);
    assert_eq!(interpret(&parse(json!({}))), NO_OUTPUT);
  }

  #[test]
  fn request_uses_language_conventions() {
    let req = RunRequest::new("print('hello')", Language::Python, "");
    let v = serde_json::to_value(&req).unwrap();
    assert_eq!(v, json!({
      "language": "python",
      "version": "*",
      "files": [{ "name": "main.py", "content": "print('hello')" }],
      "stdin": ""
    }));
    let req = RunRequest::new("int main(){}", Language::Cpp, "1 2");
    assert_eq!(req.language, "cpp");
    assert_eq!(req.files[0].name, "main.cpp");
  }

  #[tokio::test]
  async fn blank_source_short_circuits() {
    let runner = RemoteRunner::new("http://127.0.0.1:9/never", Duration::from_secs(1)).unwrap();
    assert_eq!(runner.execute("  \n", Language::Python, "").await, NO_CODE);
    assert_eq!(Disabled.execute("", Language::Java, "").await, NO_CODE);
    assert_eq!(Disabled.execute("class A {}", Language::Java, "").await, DISABLED);
  }

  #[tokio::test]
  async fn transport_failure_becomes_text() {
    // Port 9 (discard) is closed on test hosts; the connect error must not escape.
    let runner = RemoteRunner::new("http://127.0.0.1:9/execute", Duration::from_secs(2)).unwrap();
    let out = runner.execute("print(1)", Language::Python, "").await;
    assert!(out.starts_with("Execution Error:"), "{}", out);
  }

  #[test]
  fn javascript_goes_to_the_runner_like_any_language() {
    let req = RunRequest::new("console.log(1)", Language::Javascript, "");
    assert_eq!(req.language, "javascript");
    assert_eq!(req.files[0].name, "main.js");
  }
}
