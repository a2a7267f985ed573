//! Question generation capability and a minimal OpenAI-compatible client.
//!
//! The matcher only sees `ContentGenerator`; it applies the timeout and turns
//! every failure into the static fallback. The client calls
//! chat.completions in JSON-object mode and logs model names, latencies and
//! token usage (never the API key or the material itself).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::GenerationConfig;
use crate::domain::{ContentId, ExamType};
use crate::error::GenerationError;
use crate::util::fill_template;

/// Context handed to the generator.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
  pub content_id: ContentId,
  pub title: String,
  pub body: String,
  pub subject: String,
  pub exam_type: Option<ExamType>,
}

/// Raw question as produced by a generator, before validation.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct GeneratedQuestion {
  pub prompt: String,
  pub options: Vec<String>,
  pub answer_key: String,
  #[serde(default)]
  pub explanation: String,
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
  async fn generate_question(&self, req: &GenerationRequest) -> Result<GeneratedQuestion, GenerationError>;

  /// Short name for logs.
  fn name(&self) -> &'static str;
}

#[derive(Clone)]
pub struct OpenAiGenerator {
  client: reqwest::Client,
  api_key: String,
  pub base_url: String,
  pub model: String,
  settings: GenerationConfig,
}

impl OpenAiGenerator {
  /// Construct the client if OPENAI_API_KEY is set; otherwise None.
  pub fn from_env(settings: GenerationConfig) -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());

    // Slightly above the matcher's own deadline so the matcher reports the timeout.
    let client = reqwest::Client::builder()
      .timeout(settings.timeout() + Duration::from_secs(1))
      .build()
      .map_err(|e| error!(target: "questions", error = %e, "Failed to build HTTP client"))
      .ok()?;

    Some(Self { client, api_key, base_url, model, settings })
  }

  /// JSON-object chat completion, generic over the target type.
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.model))]
  async fn chat_json<T: for<'a> Deserialize<'a>>(&self, system: &str, user: &str) -> Result<T, GenerationError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature: self.settings.temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "prepcore-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await
      .map_err(|e| GenerationError::Http(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(GenerationError::Http(format!("HTTP {}: {}", status, msg)));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| GenerationError::Malformed(e.to_string()))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();

    serde_json::from_str::<T>(&text).map_err(|e| GenerationError::Malformed(format!("JSON parse error: {}", e)))
  }
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
  #[instrument(level = "info", skip(self, req), fields(content_id = %req.content_id, model = %self.model))]
  async fn generate_question(&self, req: &GenerationRequest) -> Result<GeneratedQuestion, GenerationError> {
    let exam = req.exam_type.as_ref().map(|e| e.as_str()).unwrap_or("any police entrance exam");
    let user = fill_template(
      &self.settings.user_template,
      &[("title", &req.title), ("body", &req.body), ("subject", &req.subject), ("exam_type", exam)],
    );

    let start = Instant::now();
    let result = self.chat_json::<GeneratedQuestion>(&self.settings.system_prompt, &user).await;
    let elapsed = start.elapsed();
    match &result {
      Ok(q) => info!(?elapsed, options = q.options.len(), "Question generated"),
      Err(e) => error!(?elapsed, error = %e, "Model call failed during question generation"),
    }
    result
  }

  fn name(&self) -> &'static str { "openai" }
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

/// Pull the human-readable message out of an OpenAI error body.
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
  fn error_body_message_is_extracted() {
    let body = r#"{"error":{"message":"Rate limit reached","type":"requests"}}"#;
    assert_eq!(extract_openai_error(body).as_deref(), Some("Rate limit reached"));
    assert_eq!(extract_openai_error("<html>bad gateway</html>"), None);
  }

  #[test]
  fn generated_question_parses_without_explanation() {
    let raw = r#"{"prompt":"Which court?","options":["STF","STJ","TRF","TJ"],"answer_key":"A"}"#;
    let q: GeneratedQuestion = serde_json::from_str(raw).unwrap();
    assert_eq!(q.options.len(), 4);
    assert!(q.explanation.is_empty());
  }

  #[test]
  fn request_serializes_json_mode() {
    let req = ChatCompletionRequest {
      model: "m".into(),
      messages: vec![ChatMessageReq { role: "user".into(), content: "hi".into() }],
      temperature: 0.4,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
    };
    let v = serde_json::to_value(&req).unwrap();
    assert_eq!(v["response_format"]["type"], "json_object");
  }
}
