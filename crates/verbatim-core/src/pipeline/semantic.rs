//! Semantic fallback: pick a category by embedding similarity.

use std::sync::Arc;

use tokio::sync::OnceCell;

use super::limiter::CallLimiter;
use crate::category::CategorySet;
use crate::error::GatewayError;
use crate::gateway::{cosine_similarity, ClassifierGateway};

/// Best category for a comment according to the embeddings.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticMatch {
    pub category: String,
    pub similarity: f32,
    /// Similarity mapped onto the 0-100 confidence scale
    pub confidence: f64,
}

/// Embedding-based matcher over the classification vocabulary.
///
/// Category embeddings are computed once per job on first use. A failed
/// initialization is retried by the next caller.
pub struct SemanticMatcher {
    gateway: Arc<dyn ClassifierGateway>,
    limiter: CallLimiter,
    /// (title, text to embed)
    vocabulary: Vec<(String, String)>,
    category_vectors: OnceCell<Vec<(String, Vec<f32>)>>,
}

impl SemanticMatcher {
    pub fn new(
        gateway: Arc<dyn ClassifierGateway>,
        limiter: CallLimiter,
        categories: &CategorySet,
    ) -> Self {
        let vocabulary = categories
            .vocabulary()
            .into_iter()
            .map(|c| (c.title.clone(), c.embedding_text().to_string()))
            .collect();
        Self {
            gateway,
            limiter,
            vocabulary,
            category_vectors: OnceCell::new(),
        }
    }

    /// One embedding call under a limiter slot.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        let _permit = self.limiter.acquire().await?;
        self.gateway.embed(text).await
    }

    async fn category_vectors(&self) -> Result<&[(String, Vec<f32>)], GatewayError> {
        self.category_vectors
            .get_or_try_init(|| async {
                let mut vectors = Vec::with_capacity(self.vocabulary.len());
                for (title, text) in &self.vocabulary {
                    vectors.push((title.clone(), self.embed(text).await?));
                }
                tracing::debug!(categories = vectors.len(), "Category embeddings cached");
                Ok::<_, GatewayError>(vectors)
            })
            .await
            .map(Vec::as_slice)
    }

    /// Find the vocabulary category closest to `comment`.
    pub async fn best_match(&self, comment: &str) -> Result<SemanticMatch, GatewayError> {
        let categories = self.category_vectors().await?;
        let vector = self.embed(comment).await?;

        let mut best: Option<(&str, f32)> = None;
        for (title, category_vector) in categories {
            let similarity = cosine_similarity(&vector, category_vector);
            if best.map_or(true, |(_, s)| similarity > s) {
                best = Some((title.as_str(), similarity));
            }
        }

        let (category, similarity) = best
            .ok_or_else(|| GatewayError::Malformed("no category embeddings".to_string()))?;
        Ok(SemanticMatch {
            category: category.to_string(),
            similarity,
            confidence: (similarity.clamp(0.0, 1.0) as f64 * 100.0).round(),
        })
    }
}
