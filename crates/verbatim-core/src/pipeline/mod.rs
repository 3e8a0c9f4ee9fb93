//! Batch classification pipeline.
//!
//! ```text
//! table ─▶ extract_comments ─▶ partition ─▶ BatchRunner ─▶ assign_rows
//!                                              │
//!                                        ProgressTracker
//! ```

pub mod limiter;
pub mod progress;
pub mod reduce;
pub mod scheduler;
pub mod semantic;
pub mod types;
pub mod validate;

#[cfg(test)]
pub(crate) mod testing;

pub use limiter::CallLimiter;
pub use progress::{JobStatus, ProgressRecord, ProgressTracker};
pub use reduce::assign_rows;
pub use scheduler::BatchRunner;
pub use semantic::{SemanticMatch, SemanticMatcher};
pub use types::{
    extract_comments, partition, Batch, ClassificationMap, ClassifiedRow, Comment, Label,
    LabelSource,
};

use std::sync::Arc;

use crate::category::CategorySet;
use crate::config::Settings;
use crate::gateway::ClassifierGateway;
use crate::table::Table;

/// Tunables of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub batch_size: usize,
    pub max_concurrent_calls: usize,
    /// Labels below this confidence go through the semantic fallback
    pub confidence_threshold: f64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for PipelineOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            batch_size: settings.batch_size,
            max_concurrent_calls: settings.max_concurrent_calls,
            confidence_threshold: settings.confidence_threshold,
        }
    }
}

/// Classify the comments of `column` and assign a category to every row.
///
/// External failures only lower classification quality; this always
/// returns one row per table row.
pub async fn classify_table(
    gateway: Arc<dyn ClassifierGateway>,
    table: &Table,
    column: &str,
    categories: &CategorySet,
    options: &PipelineOptions,
    tracker: &ProgressTracker,
) -> Vec<ClassifiedRow> {
    let comments = extract_comments(table, column);
    let comment_count = comments.len();

    let classifications = if comments.is_empty() {
        ClassificationMap::new()
    } else {
        tracker.set_step("Classifying comments...").await;
        let batches = partition(comments, options.batch_size);
        tracing::info!(
            job = %tracker.job(),
            gateway = gateway.name(),
            comments = comment_count,
            batches = batches.len(),
            "Classifying comments"
        );

        let runner = BatchRunner::new(
            gateway,
            categories.clone(),
            options.max_concurrent_calls,
            options.confidence_threshold,
            tracker.clone(),
        );
        runner.run(&batches).await
    };

    tracker.set_step("Finalizing results...").await;
    let rows = assign_rows(table, column, &classifications, categories);

    let fallbacks = classifications
        .values()
        .filter(|l| l.source != LabelSource::Batch)
        .count();
    tracing::debug!(job = %tracker.job(), fallbacks, "Rows assigned");

    rows
}
