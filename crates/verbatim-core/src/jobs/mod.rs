//! Job coordinator for classification runs.
//!
//! # Architecture
//!
//! ```text
//! start(handle, table, column, categories)
//!      │  validate input, write initial progress
//!      ▼
//! ┌──────────────┐   awaits   ┌────────────────────┐
//! │  supervisor  │──────────▶│  job task          │
//! │  (marks      │            │  classify_table    │
//! │   failures)  │            │  store result      │
//! └──────────────┘            │  complete()        │
//!                             └────────────────────┘
//!
//! get_progress / stream_progress / get_result / summary read the JobStore
//! ```

mod worker;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::category::{Category, CategorySet};
use crate::config::Settings;
use crate::error::{InputError, JobError};
use crate::gateway::ClassifierGateway;
use crate::pipeline::{
    extract_comments, ClassifiedRow, JobStatus, PipelineOptions, ProgressRecord, ProgressTracker,
};
use crate::report::ClassificationReport;
use crate::store::{JobStore, KeyValueStore};
use crate::table::Table;

use worker::{spawn_supervised, ClassificationJob};

/// Opaque identifier of a classification job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    /// Fresh random handle.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for JobHandle {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobHandle {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Starts classification jobs and answers progress and result queries.
pub struct JobCoordinator {
    gateway: Arc<dyn ClassifierGateway>,
    store: JobStore,
    options: PipelineOptions,
    poll_interval: Duration,
    /// Supervisor tasks of jobs started by this coordinator
    supervisors: Mutex<HashMap<JobHandle, JoinHandle<()>>>,
}

impl JobCoordinator {
    pub fn new(
        gateway: Arc<dyn ClassifierGateway>,
        kv: Arc<dyn KeyValueStore>,
        settings: &Settings,
    ) -> Self {
        Self {
            gateway,
            store: JobStore::new(kv, settings.progress_ttl()),
            options: PipelineOptions::from(settings),
            poll_interval: settings.progress_poll_interval(),
            supervisors: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Validate the input, record the job as processing and run it in the
    /// background. Returns as soon as the job is submitted.
    pub async fn start(
        &self,
        handle: JobHandle,
        table: Table,
        verbatim_column: &str,
        categories: Vec<Category>,
    ) -> Result<JobHandle, JobError> {
        if !table.has_column(verbatim_column) {
            return Err(InputError::MissingColumn(verbatim_column.to_string()).into());
        }
        if let Some(index) = table.duplicate_index() {
            return Err(InputError::DuplicateRowIndex(index).into());
        }
        let categories = CategorySet::new(categories)?;

        // Held until the job is registered so concurrent starts of the same
        // handle cannot both pass the running check.
        let mut supervisors = self.supervisors.lock().await;
        if let Some(record) = self.store.get_progress(handle.as_str()).await? {
            if record.status == JobStatus::Processing {
                return Err(InputError::AlreadyRunning(handle.to_string()).into());
            }
            // Rerun of a finished job: drop its stale result and report
            self.store.clear(handle.as_str()).await?;
        }

        let total = extract_comments(&table, verbatim_column).len();
        let tracker = ProgressTracker::start(handle.as_str(), self.store.clone(), total).await?;

        tracing::info!(
            job = %handle,
            rows = table.len(),
            comments = total,
            column = verbatim_column,
            "Classification job started"
        );

        let supervisor = spawn_supervised(ClassificationJob {
            handle: handle.clone(),
            table,
            column: verbatim_column.to_string(),
            categories,
            options: self.options.clone(),
            gateway: self.gateway.clone(),
            store: self.store.clone(),
            tracker,
        });
        supervisors.retain(|_, task| !task.is_finished());
        supervisors.insert(handle.clone(), supervisor);

        Ok(handle)
    }

    /// Current progress; `not_started` for unknown or expired jobs.
    pub async fn get_progress(&self, handle: &JobHandle) -> Result<ProgressRecord, JobError> {
        Ok(self
            .store
            .get_progress(handle.as_str())
            .await?
            .unwrap_or_else(ProgressRecord::not_started))
    }

    /// Poll the progress record until the job completes or fails.
    ///
    /// The stream yields the current record immediately, then one record per
    /// poll interval. It ends after a terminal record, or after a
    /// `not_started` record for an unknown job. Each call starts a new stream.
    pub fn stream_progress(&self, handle: &JobHandle) -> impl Stream<Item = ProgressRecord> {
        let store = self.store.clone();
        let job = handle.to_string();
        let interval = self.poll_interval;

        futures::stream::unfold(Some(true), move |state| {
            let store = store.clone();
            let job = job.clone();
            async move {
                let mut first = state?;
                loop {
                    if !first {
                        tokio::time::sleep(interval).await;
                    }
                    first = false;

                    match store.get_progress(&job).await {
                        Ok(Some(record)) => {
                            let next = if record.is_terminal() { None } else { Some(false) };
                            return Some((record, next));
                        }
                        Ok(None) => return Some((ProgressRecord::not_started(), None)),
                        Err(e) => {
                            tracing::warn!(job = %job, error = %e, "Failed to read progress");
                        }
                    }
                }
            }
        })
    }

    /// Classified rows of a completed job, in table order.
    pub async fn get_result(&self, handle: &JobHandle) -> Result<Vec<ClassifiedRow>, JobError> {
        self.ensure_completed(handle).await?;
        self.store
            .get_result(handle.as_str())
            .await?
            .ok_or_else(|| JobError::ResultNotFound(handle.to_string()))
    }

    /// Category summary of a completed job.
    pub async fn summary(&self, handle: &JobHandle) -> Result<ClassificationReport, JobError> {
        self.ensure_completed(handle).await?;
        self.store
            .get_report(handle.as_str())
            .await?
            .ok_or_else(|| JobError::ResultNotFound(handle.to_string()))
    }

    /// Wait for a job to finish and return its final progress.
    ///
    /// Jobs started by this coordinator are awaited through their
    /// supervisor. Jobs started elsewhere on the same store are polled until
    /// terminal; unknown jobs return `not_started` at once.
    pub async fn wait(&self, handle: &JobHandle) -> Result<ProgressRecord, JobError> {
        let supervisor = self.supervisors.lock().await.remove(handle);
        match supervisor {
            Some(supervisor) => {
                if let Err(e) = supervisor.await {
                    tracing::error!(job = %handle, error = %e, "Job supervisor failed");
                }
                self.get_progress(handle).await
            }
            None if !self.store.progress_exists(handle.as_str()).await? => {
                Ok(ProgressRecord::not_started())
            }
            None => {
                let mut last = None;
                let mut records = std::pin::pin!(self.stream_progress(handle));
                while let Some(record) = records.next().await {
                    last = Some(record);
                }
                Ok(last.unwrap_or_else(ProgressRecord::not_started))
            }
        }
    }

    async fn ensure_completed(&self, handle: &JobHandle) -> Result<(), JobError> {
        let record = self.get_progress(handle).await?;
        if record.status != JobStatus::Completed {
            return Err(JobError::NotCompleted {
                job: handle.to_string(),
                status: record.status.to_string(),
            });
        }
        Ok(())
    }
}
