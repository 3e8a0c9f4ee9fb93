//! Mock gateways and stores shared by pipeline and job tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::{GatewayError, StoreError};
use crate::store::{KeyValueStore, MemoryStore};
use crate::gateway::keyword::hashed_embedding;
use crate::gateway::{BatchLabels, ClassifierGateway, ClassifyRequest};

/// Labels by substring rules with high confidence.
pub struct PerfectGateway {
    default: String,
    rules: Vec<(String, String)>,
}

impl PerfectGateway {
    pub fn new(default: &str) -> Self {
        Self {
            default: default.to_string(),
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, needle: &str, category: &str) -> Self {
        self.rules
            .push((needle.to_lowercase(), category.to_string()));
        self
    }

    fn label(&self, comment: &str) -> String {
        let comment = comment.to_lowercase();
        self.rules
            .iter()
            .find(|(needle, _)| comment.contains(needle.as_str()))
            .map(|(_, category)| category.clone())
            .unwrap_or_else(|| self.default.clone())
    }
}

#[async_trait]
impl ClassifierGateway for PerfectGateway {
    async fn classify_batch(
        &self,
        _request: &ClassifyRequest,
        comments: &[String],
    ) -> Result<BatchLabels, GatewayError> {
        Ok(BatchLabels {
            categories: comments.iter().map(|c| self.label(c)).collect(),
            confidence: vec![Some(95.0); comments.len()],
        })
    }

    async fn classify_single(
        &self,
        _request: &ClassifyRequest,
        comment: &str,
    ) -> Result<String, GatewayError> {
        Ok(self.label(comment))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        Ok(hashed_embedding(text))
    }

    fn name(&self) -> &'static str {
        "perfect"
    }
}

/// Every call fails.
pub struct FailingGateway;

#[async_trait]
impl ClassifierGateway for FailingGateway {
    async fn classify_batch(
        &self,
        _request: &ClassifyRequest,
        _comments: &[String],
    ) -> Result<BatchLabels, GatewayError> {
        Err(GatewayError::Transport("connection refused".to_string()))
    }

    async fn classify_single(
        &self,
        _request: &ClassifyRequest,
        _comment: &str,
    ) -> Result<String, GatewayError> {
        Err(GatewayError::Status {
            status: 503,
            body: "unavailable".to_string(),
        })
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, GatewayError> {
        Err(GatewayError::RateLimited)
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Batch calls return one label too few; single calls succeed.
pub struct ShortBatchGateway {
    category: String,
    single_calls: AtomicUsize,
}

impl ShortBatchGateway {
    pub fn new(category: &str) -> Self {
        Self {
            category: category.to_string(),
            single_calls: AtomicUsize::new(0),
        }
    }

    pub fn single_calls(&self) -> usize {
        self.single_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClassifierGateway for ShortBatchGateway {
    async fn classify_batch(
        &self,
        _request: &ClassifyRequest,
        comments: &[String],
    ) -> Result<BatchLabels, GatewayError> {
        let n = comments.len().saturating_sub(1);
        Ok(BatchLabels {
            categories: vec![self.category.clone(); n],
            confidence: vec![Some(95.0); n],
        })
    }

    async fn classify_single(
        &self,
        _request: &ClassifyRequest,
        _comment: &str,
    ) -> Result<String, GatewayError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.category.clone())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        Ok(hashed_embedding(text))
    }

    fn name(&self) -> &'static str {
        "short"
    }
}

/// Returns `category` for every comment, with low confidence for the
/// comment at `low_position` of each batch. Counts embedding calls.
pub struct LowConfidenceGateway {
    category: String,
    low_position: usize,
    embed_calls: AtomicUsize,
}

impl LowConfidenceGateway {
    pub fn new(category: &str, low_position: usize) -> Self {
        Self {
            category: category.to_string(),
            low_position,
            embed_calls: AtomicUsize::new(0),
        }
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClassifierGateway for LowConfidenceGateway {
    async fn classify_batch(
        &self,
        _request: &ClassifyRequest,
        comments: &[String],
    ) -> Result<BatchLabels, GatewayError> {
        Ok(BatchLabels {
            categories: vec![self.category.clone(); comments.len()],
            confidence: (0..comments.len())
                .map(|i| Some(if i == self.low_position { 50.0 } else { 90.0 }))
                .collect(),
        })
    }

    async fn classify_single(
        &self,
        _request: &ClassifyRequest,
        _comment: &str,
    ) -> Result<String, GatewayError> {
        Ok(self.category.clone())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(hashed_embedding(text))
    }

    fn name(&self) -> &'static str {
        "low-confidence"
    }
}

/// Records the peak number of simultaneous calls. Batch calls fail every
/// other time so single-call fallbacks run alongside batch calls.
pub struct ConcurrencyCounter {
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    batch_calls: AtomicUsize,
}

impl ConcurrencyCounter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn call(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClassifierGateway for ConcurrencyCounter {
    async fn classify_batch(
        &self,
        request: &ClassifyRequest,
        comments: &[String],
    ) -> Result<BatchLabels, GatewayError> {
        self.call().await;
        if self.batch_calls.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
            return Err(GatewayError::Malformed("every other batch".to_string()));
        }
        let title = request.categories.default_category().to_string();
        Ok(BatchLabels {
            categories: vec![title; comments.len()],
            confidence: vec![Some(90.0); comments.len()],
        })
    }

    async fn classify_single(
        &self,
        request: &ClassifyRequest,
        _comment: &str,
    ) -> Result<String, GatewayError> {
        self.call().await;
        Ok(request.categories.default_category().to_string())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        self.call().await;
        Ok(hashed_embedding(text))
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// Holds every batch call until [`GatedGateway::release`] is called.
/// Labels everything with the default category.
#[derive(Default)]
pub struct GatedGateway {
    entered: Notify,
    gate: Notify,
}

impl GatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until a batch call is in flight.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let one waiting batch call return.
    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl ClassifierGateway for GatedGateway {
    async fn classify_batch(
        &self,
        request: &ClassifyRequest,
        comments: &[String],
    ) -> Result<BatchLabels, GatewayError> {
        self.entered.notify_one();
        self.gate.notified().await;
        let title = request.categories.default_category().to_string();
        Ok(BatchLabels {
            categories: vec![title; comments.len()],
            confidence: vec![Some(90.0); comments.len()],
        })
    }

    async fn classify_single(
        &self,
        request: &ClassifyRequest,
        _comment: &str,
    ) -> Result<String, GatewayError> {
        Ok(request.categories.default_category().to_string())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        Ok(hashed_embedding(text))
    }

    fn name(&self) -> &'static str {
        "gated"
    }
}

/// Memory store that rejects the first `failures` writes whose value
/// contains `needle`.
pub struct FlakyStore {
    inner: MemoryStore,
    needle: String,
    failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new(needle: &str, failures: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            needle: needle.to_string(),
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError> {
        if value.contains(&self.needle)
            && self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(StoreError::Backend("write rejected".to_string()));
        }
        self.inner.set(key, value, ttl).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.inner.expire(key, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }
}
