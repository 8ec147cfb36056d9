//! Minimal OpenAI client for our use-cases.
//!
//! We call chat.completions requesting a strict JSON object, and audio/speech
//! for spoken interviewer answers. Calls are instrumented and log model names,
//! latencies and response sizes (not contents).
//!
//! NOTE: We never log the API key.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::error::FlowError;
use crate::flows::CompletionService;
use crate::util::trunc_for_log;

const CLIENT_UA: &str = "codesprint-backend/0.1";

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
  pub tts_model: String,
  pub tts_voice: String,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let tts_model = std::env::var("OPENAI_TTS_MODEL").unwrap_or_else(|_| "gpt-4o-mini-tts".into());
    let tts_voice = std::env::var("OPENAI_TTS_VOICE").unwrap_or_else(|_| "alloy".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(60))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, model, tts_model, tts_voice })
  }

  fn post(&self, path: &str) -> reqwest::RequestBuilder {
    self.client.post(format!("{}/{}", self.base_url, path))
      .header(USER_AGENT, CLIENT_UA)
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
  }

  /// JSON-object chat completion; returns the raw object for the caller to shape-check.
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.model, user_len = user.len()))]
  async fn chat_json(&self, system: &str, user: &str, temperature: f32) -> Result<serde_json::Value, FlowError> {
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
    };

    let res = self.post("chat/completions")
      .json(&req).send().await
      .map_err(|e| FlowError::Completion(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(FlowError::Completion(format!("OpenAI HTTP {}: {}", status, trunc_for_log(&msg, 300))));
    }

    let body: ChatCompletionResponse = res.json().await
      .map_err(|e| FlowError::Completion(e.to_string()))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();

    serde_json::from_str(&text).map_err(|e| FlowError::Shape(format!("JSON parse error: {}", e)))
  }
}

#[async_trait]
impl CompletionService for OpenAI {
  #[instrument(level = "info", skip(self, system, user), fields(%operation))]
  async fn complete_json(&self, operation: &str, system: &str, user: &str) -> Result<serde_json::Value, FlowError> {
    let start = Instant::now();
    let result = self.chat_json(system, user, 0.7).await;
    let elapsed = start.elapsed();
    match &result {
      Ok(_) => info!(?elapsed, %operation, "Model response received"),
      Err(e) => error!(?elapsed, %operation, error = %e, "Model call failed"),
    }
    result
  }

  #[instrument(level = "info", skip(self, text), fields(model = %self.tts_model, text_len = text.len()))]
  async fn synthesize_speech(&self, text: &str) -> Result<Vec<u8>, FlowError> {
    let req = SpeechRequest {
      model: self.tts_model.clone(),
      voice: self.tts_voice.clone(),
      input: text.to_string(),
      response_format: "wav".into(),
    };

    let res = self.post("audio/speech")
      .json(&req).send().await
      .map_err(|e| FlowError::Completion(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(FlowError::Completion(format!("OpenAI TTS HTTP {}: {}", status, trunc_for_log(&msg, 300))));
    }

    let bytes = res.bytes().await.map_err(|e| FlowError::Completion(e.to_string()))?;
    info!(audio_bytes = bytes.len(), "Speech synthesized");
    if bytes.is_empty() {
      return Err(FlowError::Shape("empty audio payload".into()));
    }
    Ok(bytes.to_vec())
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

#[derive(Serialize)]
struct SpeechRequest {
  model: String,
  voice: String,
  input: String,
  response_format: String,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extracts_error_message() {
    let body = r#"{"error": {"message": "Rate limit reached", "type": "requests"}}"#;
    assert_eq!(extract_openai_error(body).as_deref(), Some("Rate limit reached"));
    assert_eq!(extract_openai_error("<html>bad gateway</html>"), None);
  }

  #[test]
  fn json_mode_request_shape() {
    let req = ChatCompletionRequest {
      model: "m".into(),
      messages: vec![ChatMessageReq { role: "user".into(), content: "hi".into() }],
      temperature: 0.5,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
    };
    let v = serde_json::to_value(&req).unwrap();
    assert_eq!(v["response_format"]["type"], "json_object");
    assert_eq!(v["messages"][0]["role"], "user");
  }
}
