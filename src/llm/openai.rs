//! `OpenAI` Responses API provider

use super::types::{CompletionRequest, TurnRole};
use super::{CompletionProvider, LlmError};
use crate::config::CompletionConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `OpenAI` Responses API client
pub struct OpenAIService {
    client: Client,
    api_key: String,
    url: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl OpenAIService {
    pub fn new(config: &CompletionConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            url: format!("{}/v1/responses", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    fn translate_request<'a>(&'a self, request: &'a CompletionRequest) -> ResponsesApiRequest<'a> {
        let input = request
            .turns
            .iter()
            .map(|turn| ResponsesApiInputItem::Message {
                role: turn.role.as_str(),
                content: &turn.text,
            })
            .collect();

        ResponsesApiRequest {
            model: &self.model,
            input,
            instructions: request.instructions.as_deref(),
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        }
    }

    /// Concatenate every `output_text` part of every message output
    fn normalize_response(resp: ResponsesApiResponse) -> Result<String, LlmError> {
        let mut text = String::new();

        for output in resp.output {
            match output.r#type.as_str() {
                "message" => {
                    for item in output.content.unwrap_or_default() {
                        if item.r#type == "output_text" {
                            if let Some(part) = item.text {
                                text.push_str(&part);
                            }
                        }
                    }
                }
                "reasoning" => {}
                other => {
                    tracing::debug!(output_type = %other, "Ignoring unknown output type");
                }
            }
        }

        if text.trim().is_empty() {
            let status = resp.status.unwrap_or_else(|| "unknown".to_string());
            return Err(LlmError::malformed(format!(
                "No text in response (status: {status})"
            )));
        }

        Ok(text)
    }
}

#[async_trait]
impl CompletionProvider for OpenAIService {
    async fn generate(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        if request.turns.is_empty() {
            return Err(LlmError::invalid_request("Completion request has no turns"));
        }
        debug_assert_eq!(
            request.turns.last().map(|t| t.role),
            Some(TurnRole::User),
            "last turn must be the inbound message"
        );

        let body = self.translate_request(request);

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::timeout(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::network(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::timeout(format!("Timed out reading response: {e}"))
            } else {
                LlmError::network(format!("Failed to read response: {e}"))
            }
        })?;

        if !status.is_success() {
            let message = match serde_json::from_str::<OpenAIErrorResponse>(&body) {
                Ok(resp) => resp.error.message,
                Err(_) => {
                    tracing::warn!(status = status.as_u16(), body = %body, "Unparseable error response");
                    status.canonical_reason().unwrap_or("unknown error").to_string()
                }
            };
            let error = LlmError::from_status(status.as_u16(), &message);
            return Err(match retry_after {
                Some(after) => error.with_retry_after(after),
                None => error,
            });
        }

        let parsed: ResponsesApiResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(error = %e, body = %body, "Unparseable completion response");
            LlmError::malformed(format!("Failed to parse response: {e}"))
        })?;

        Self::normalize_response(parsed)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// Responses API types

#[derive(Debug, Serialize)]
struct ResponsesApiRequest<'a> {
    model: &'a str,
    input: Vec<ResponsesApiInputItem<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ResponsesApiInputItem<'a> {
    #[serde(rename = "message")]
    Message { role: &'static str, content: &'a str },
}

#[derive(Debug, Deserialize)]
struct ResponsesApiResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Vec<ResponsesApiOutput>,
}

#[derive(Debug, Deserialize)]
struct ResponsesApiOutput {
    r#type: String,
    #[serde(default)]
    content: Option<Vec<ResponsesApiContent>>,
}

#[derive(Debug, Deserialize)]
struct ResponsesApiContent {
    r#type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}
