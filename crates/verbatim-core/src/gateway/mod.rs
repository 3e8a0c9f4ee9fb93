//! Classifier gateway abstraction
//!
//! The pipeline talks to the external classifier only through
//! [`ClassifierGateway`]:
//! - `OpenAiGateway`: chat completions + embeddings over HTTP
//! - `KeywordGateway`: deterministic local matcher used without an API key
//!
//! Gateway calls are unreliable by contract. Every error is returned as a
//! [`GatewayError`] and handled by the repair layer.

pub mod keyword;
pub mod openai;
pub mod prompt;

pub use keyword::KeywordGateway;
pub use openai::OpenAiGateway;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::category::CategorySet;
use crate::config::{ProviderConfig, Settings};
use crate::error::GatewayError;

/// Everything a gateway needs to classify comments for one job.
#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    /// System prompt for batch calls (JSON output)
    pub batch_prompt: String,
    /// System prompt for per-item calls (bare title output)
    pub single_prompt: String,
    pub categories: CategorySet,
}

impl ClassifyRequest {
    pub fn new(categories: CategorySet) -> Self {
        let vocabulary = categories.vocabulary();
        Self {
            batch_prompt: prompt::batch_system_prompt(&vocabulary),
            single_prompt: prompt::single_system_prompt(&vocabulary),
            categories,
        }
    }
}

/// Raw output of a batch call, positionally matched to the input comments.
///
/// Lengths are not checked here; see `pipeline::validate::align`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchLabels {
    pub categories: Vec<String>,
    /// Confidence per label (0-100), absent entries are `None`
    pub confidence: Vec<Option<f64>>,
}

/// Unified classifier interface
#[async_trait]
pub trait ClassifierGateway: Send + Sync {
    /// Classify an ordered batch of comments in one call.
    async fn classify_batch(
        &self,
        request: &ClassifyRequest,
        comments: &[String],
    ) -> Result<BatchLabels, GatewayError>;

    /// Classify a single comment, returning the raw category title.
    async fn classify_single(
        &self,
        request: &ClassifyRequest,
        comment: &str,
    ) -> Result<String, GatewayError>;

    /// Embed a text for similarity matching.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError>;

    /// Gateway name (e.g., "openai", "keyword")
    fn name(&self) -> &'static str;
}

/// Build the gateway selected by the settings.
///
/// An OpenAI provider without an API key degrades to the keyword gateway.
pub fn build_gateway(settings: &Settings) -> Result<Arc<dyn ClassifierGateway>> {
    match &settings.provider {
        ProviderConfig::OpenAi {
            api_key: Some(api_key),
            model,
            embedding_model,
            base_url,
        } if !api_key.trim().is_empty() => {
            let gateway = OpenAiGateway::new(openai::OpenAiOptions {
                api_key: api_key.clone(),
                base_url: base_url.clone(),
                model: model.clone(),
                embedding_model: embedding_model.clone(),
                timeout: settings.request_timeout(),
                max_retries: settings.max_retries,
            })?;
            tracing::info!(model = %model, "Using OpenAI classifier");
            Ok(Arc::new(gateway))
        }
        ProviderConfig::OpenAi { .. } => {
            tracing::warn!("No OpenAI API key configured, falling back to keyword matching");
            Ok(Arc::new(KeywordGateway::new()))
        }
        ProviderConfig::Keyword => Ok(Arc::new(KeywordGateway::new())),
    }
}

/// Cosine similarity of two vectors; 0 for empty, zero or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
