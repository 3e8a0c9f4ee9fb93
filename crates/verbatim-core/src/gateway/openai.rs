//! OpenAI API gateway
//!
//! Uses reqwest against the chat-completions and embeddings endpoints of any
//! OpenAI-compatible server. Rate limits, server errors and transport
//! failures are retried with exponential backoff.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::prompt::{batch_user_message, parse_batch_labels};
use super::{BatchLabels, ClassifierGateway, ClassifyRequest};
use crate::error::GatewayError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Max tokens for a bare category title
const SINGLE_MAX_TOKENS: u32 = 20;

/// Connection options for [`OpenAiGateway`]
#[derive(Debug, Clone)]
pub struct OpenAiOptions {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub timeout: Option<Duration>,
    /// Retries after the first attempt
    pub max_retries: usize,
}

/// OpenAI-compatible classifier
pub struct OpenAiGateway {
    client: reqwest::Client,
    chat_endpoint: String,
    embeddings_endpoint: String,
    model: String,
    embedding_model: String,
    max_retries: usize,
}

impl OpenAiGateway {
    pub fn new(options: OpenAiOptions) -> Result<Self> {
        anyhow::ensure!(!options.api_key.trim().is_empty(), "missing OpenAI API key");
        anyhow::ensure!(!options.model.trim().is_empty(), "missing OpenAI model name");

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", options.api_key.trim()))
                .context("Invalid API key format")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        let base_url = options.base_url.trim_end_matches('/');
        Ok(Self {
            client,
            chat_endpoint: format!("{base_url}/chat/completions"),
            embeddings_endpoint: format!("{base_url}/embeddings"),
            model: options.model,
            embedding_model: options.embedding_model,
            max_retries: options.max_retries,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// POST a JSON body, retrying transient failures.
    async fn post_json<B, T>(&self, endpoint: &str, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let mut attempt = 0usize;
        loop {
            let result = self.send_once(endpoint, body).await;
            match result {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let backoff = retry_backoff(attempt);
                    debug!(
                        endpoint,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying classifier request"
                    );
                    tokio::time::sleep(backoff).await;
                }
                other => return other,
            }
        }
    }

    async fn send_once<B, T>(&self, endpoint: &str, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self.client.post(endpoint).json(body).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GatewayError::RateLimited);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: message,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| GatewayError::Malformed(e.to_string()))
    }

    async fn chat(&self, request: ChatRequest<'_>) -> Result<String, GatewayError> {
        let response: ChatResponse = self.post_json(&self.chat_endpoint, &request).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GatewayError::Malformed("response has no content".to_string()))
    }
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

#[async_trait]
impl ClassifierGateway for OpenAiGateway {
    async fn classify_batch(
        &self,
        request: &ClassifyRequest,
        comments: &[String],
    ) -> Result<BatchLabels, GatewayError> {
        let user = batch_user_message(comments);
        let content = self
            .chat(ChatRequest {
                model: &self.model,
                messages: vec![
                    ChatMessage::system(&request.batch_prompt),
                    ChatMessage::user(&user),
                ],
                temperature: 0.0,
                max_tokens: None,
                response_format: Some(ResponseFormat::json_object()),
            })
            .await?;

        debug!(comments = comments.len(), "Batch classification response received");
        parse_batch_labels(&content)
    }

    async fn classify_single(
        &self,
        request: &ClassifyRequest,
        comment: &str,
    ) -> Result<String, GatewayError> {
        let content = self
            .chat(ChatRequest {
                model: &self.model,
                messages: vec![
                    ChatMessage::system(&request.single_prompt),
                    ChatMessage::user(comment),
                ],
                temperature: 0.0,
                max_tokens: Some(SINGLE_MAX_TOKENS),
                response_format: None,
            })
            .await?;
        Ok(content.trim().to_string())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: text,
        };
        let response: EmbeddingResponse =
            self.post_json(&self.embeddings_endpoint, &request).await?;
        response
            .data
            .into_iter()
            .next()
            .map(|entry| entry.embedding)
            .ok_or_else(|| GatewayError::Malformed("no embedding returned".to_string()))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

// Request/Response types for the OpenAI API

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> ChatMessage<'a> {
    fn system(content: &'a str) -> Self {
        Self {
            role: "system",
            content,
        }
    }

    fn user(content: &'a str) -> Self {
        Self {
            role: "user",
            content,
        }
    }
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

impl ResponseFormat {
    fn json_object() -> Self {
        Self {
            format_type: "json_object",
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}
