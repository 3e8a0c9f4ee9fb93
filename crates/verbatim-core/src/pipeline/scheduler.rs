//! Concurrent batch scheduling.
//!
//! ```text
//! comments ─▶ partition ─▶ batch tasks (join_all)
//!                               │
//!                 ┌─────────────┴──────────────┐
//!                 ▼                            ▼
//!          classify_batch ──ok──▶ validate/repair per item
//!                 │                   (semantic fallback)
//!               error
//!                 ▼
//!          classify_single per item ──error──▶ default
//! ```
//!
//! Every gateway call, including fallbacks, takes one slot of the shared
//! [`CallLimiter`] for its own duration only.

use std::sync::Arc;

use futures::future::join_all;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::limiter::CallLimiter;
use super::progress::ProgressTracker;
use super::semantic::SemanticMatcher;
use super::types::{Batch, ClassificationMap, Comment, Label};
use super::validate::{align, Repairer};
use crate::category::CategorySet;
use crate::error::GatewayError;
use crate::gateway::{ClassifierGateway, ClassifyRequest};

/// Runs the batches of one job against a gateway.
pub struct BatchRunner {
    gateway: Arc<dyn ClassifierGateway>,
    limiter: CallLimiter,
    request: ClassifyRequest,
    repairer: Repairer,
    tracker: ProgressTracker,
}

impl BatchRunner {
    pub fn new(
        gateway: Arc<dyn ClassifierGateway>,
        categories: CategorySet,
        max_concurrent_calls: usize,
        confidence_threshold: f64,
        tracker: ProgressTracker,
    ) -> Self {
        let limiter = CallLimiter::new(max_concurrent_calls);
        let semantic = SemanticMatcher::new(gateway.clone(), limiter.clone(), &categories);
        Self {
            request: ClassifyRequest::new(categories.clone()),
            repairer: Repairer::new(categories, confidence_threshold, semantic),
            gateway,
            limiter,
            tracker,
        }
    }

    /// Classify every batch. The result holds one label per comment,
    /// regardless of the order in which batches finish.
    pub async fn run(&self, batches: &[Batch]) -> ClassificationMap {
        self.tracker.set_batches(batches.len()).await;

        let results = join_all(batches.iter().map(|batch| self.run_batch(batch))).await;

        let mut map = ClassificationMap::new();
        for (index, label) in results.into_iter().flatten() {
            map.insert(index, label);
        }
        map
    }

    async fn run_batch(&self, batch: &Batch) -> Vec<(usize, Label)> {
        let started = Instant::now();
        let texts: Vec<String> = batch.comments.iter().map(|c| c.text.clone()).collect();

        let outcome = match self.limiter.acquire().await {
            Ok(_permit) => {
                self.tracker.batch_started(batch.number).await;
                self.gateway.classify_batch(&self.request, &texts).await
            }
            Err(e) => Err(e),
        };

        let labels = match outcome.and_then(|labels| align(batch.len(), labels)) {
            Ok(aligned) => {
                join_all(batch.comments.iter().zip(aligned).map(
                    |(comment, (raw, confidence))| async move {
                        self.repairer
                            .resolve_batch_item(comment, &raw, confidence)
                            .await
                    },
                ))
                .await
            }
            Err(e) => {
                warn!(
                    batch = batch.number,
                    size = batch.len(),
                    error = %e,
                    "Batch call failed, escalating to per-item calls"
                );
                self.classify_items(&batch.comments).await
            }
        };

        self.tracker.batch_finished(batch.len()).await;
        debug!(
            batch = batch.number,
            size = batch.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch classified"
        );

        batch
            .comments
            .iter()
            .map(|c| c.index)
            .zip(labels)
            .collect()
    }

    async fn classify_items(&self, comments: &[Comment]) -> Vec<Label> {
        join_all(comments.iter().map(|comment| self.classify_item(comment))).await
    }

    async fn classify_item(&self, comment: &Comment) -> Label {
        let outcome: Result<String, GatewayError> = match self.limiter.acquire().await {
            Ok(_permit) => {
                self.gateway
                    .classify_single(&self.request, &comment.text)
                    .await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(raw) => self.repairer.resolve_single(comment, &raw).await,
            Err(e) => {
                debug!(index = comment.index, error = %e, "Single call failed, using default");
                self.repairer.default_label()
            }
        }
    }
}
