//! Background execution of one classification job.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::JobHandle;
use crate::category::CategorySet;
use crate::gateway::ClassifierGateway;
use crate::pipeline::{classify_table, PipelineOptions, ProgressTracker};
use crate::report::ClassificationReport;
use crate::store::JobStore;
use crate::table::Table;

/// Everything a job needs, moved into its task.
pub(super) struct ClassificationJob {
    pub handle: JobHandle,
    pub table: Table,
    pub column: String,
    pub categories: CategorySet,
    pub options: PipelineOptions,
    pub gateway: Arc<dyn ClassifierGateway>,
    pub store: JobStore,
    pub tracker: ProgressTracker,
}

impl ClassificationJob {
    async fn run(self) -> Result<()> {
        let started = Instant::now();

        let rows = classify_table(
            self.gateway.clone(),
            &self.table,
            &self.column,
            &self.categories,
            &self.options,
            &self.tracker,
        )
        .await;

        self.store
            .set_result(self.handle.as_str(), &rows)
            .await
            .context("Failed to store classification result")?;

        let report =
            ClassificationReport::build(&self.table, &self.column, &rows, &self.categories);
        self.store
            .set_report(self.handle.as_str(), &report)
            .await
            .context("Failed to store classification report")?;

        self.tracker
            .complete()
            .await
            .context("Failed to mark job completed")?;

        tracing::info!(
            job = %self.handle,
            rows = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Classification completed"
        );
        Ok(())
    }
}

/// Spawn the job and a supervisor that marks it failed if the job returns
/// an error or panics.
pub(super) fn spawn_supervised(job: ClassificationJob) -> JoinHandle<()> {
    let handle = job.handle.clone();
    let tracker = job.tracker.clone();
    let task = tokio::spawn(job.run());

    tokio::spawn(async move {
        let failure = match task.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{e:#}")),
            Err(join_error) if join_error.is_panic() => Some("classification task panicked".to_string()),
            Err(join_error) => Some(join_error.to_string()),
        };

        if let Some(message) = failure {
            tracing::error!(job = %handle, error = %message, "Classification failed");
            if let Err(e) = tracker.fail(&message).await {
                tracing::error!(job = %handle, error = %e, "Failed to record job failure");
            }
        }
    })
}
