//! Progress tracking for classification jobs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::StoreError;
use crate::store::JobStore;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    NotStarted,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::NotStarted => write!(f, "not_started"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Snapshot of a job's progress, as seen by pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub status: JobStatus,
    /// Percentage in [0, 100]
    pub progress: f64,
    /// Comments classified so far
    pub processed: usize,
    pub remaining: usize,
    /// Comments entering the pipeline
    pub total: usize,
    pub batches_done: usize,
    pub batches_total: usize,
    pub current_step: String,
    /// Items per second since the job started
    pub rate: Option<f64>,
    pub eta_seconds: Option<f64>,
    pub error: Option<String>,
    pub started_at: Option<String>,
    pub updated_at: Option<String>,
}

impl ProgressRecord {
    /// Record returned for jobs that were never started.
    pub fn not_started() -> Self {
        Self {
            status: JobStatus::NotStarted,
            progress: 0.0,
            processed: 0,
            remaining: 0,
            total: 0,
            batches_done: 0,
            batches_total: 0,
            current_step: "Not started".to_string(),
            rate: None,
            eta_seconds: None,
            error: None,
            started_at: None,
            updated_at: None,
        }
    }

    /// Initial record of a freshly started job.
    pub fn processing(total: usize) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            status: JobStatus::Processing,
            remaining: total,
            total,
            current_step: "Preparing classification...".to_string(),
            started_at: Some(now.clone()),
            updated_at: Some(now),
            ..Self::not_started()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

struct TrackerState {
    record: ProgressRecord,
    started: Instant,
}

/// Single writer for one job's progress record.
///
/// Every mutation happens under one lock and is written through to the
/// store before the lock is released, so concurrent batches never lose
/// updates and pollers always read a consistent record.
#[derive(Clone)]
pub struct ProgressTracker {
    job: String,
    store: JobStore,
    state: Arc<Mutex<TrackerState>>,
}

impl ProgressTracker {
    /// Create the tracker and persist the initial `processing` record.
    pub async fn start(job: &str, store: JobStore, total: usize) -> Result<Self, StoreError> {
        let record = ProgressRecord::processing(total);
        store.set_progress(job, &record).await?;

        Ok(Self {
            job: job.to_string(),
            store,
            state: Arc::new(Mutex::new(TrackerState {
                record,
                started: Instant::now(),
            })),
        })
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    /// Current in-memory record.
    pub async fn snapshot(&self) -> ProgressRecord {
        self.state.lock().await.record.clone()
    }

    /// Record how many batches the job was split into.
    pub async fn set_batches(&self, batches_total: usize) {
        self.update(|state| {
            state.record.batches_total = batches_total;
        })
        .await;
    }

    /// Set the human-readable step.
    pub async fn set_step(&self, step: impl Into<String>) {
        let step = step.into();
        self.update(move |state| {
            state.record.current_step = step;
        })
        .await;
    }

    /// A batch acquired a concurrency slot and is about to call out.
    pub async fn batch_started(&self, batch: usize) {
        self.update(|state| {
            let total_batches = state.record.batches_total;
            state.record.current_step = format!("Processing batch {batch} of {total_batches}...");
            refresh_rate(state);
        })
        .await;
    }

    /// A batch finished; `items` comments now have labels.
    pub async fn batch_finished(&self, items: usize) {
        self.update(|state| {
            let record = &mut state.record;
            record.processed = (record.processed + items).min(record.total);
            record.remaining = record.total - record.processed;
            record.batches_done = (record.batches_done + 1).min(record.batches_total);
            if record.total > 0 {
                let pct = record.processed as f64 / record.total as f64 * 100.0;
                record.progress = record.progress.max(round1(pct));
            }
            refresh_rate(state);
        })
        .await;
    }

    /// Mark the job completed. Returns false if it already finished.
    pub async fn complete(&self) -> Result<bool, StoreError> {
        self.finish(|record| {
            record.status = JobStatus::Completed;
            record.progress = 100.0;
            record.processed = record.total;
            record.remaining = 0;
            record.batches_done = record.batches_total;
            record.eta_seconds = Some(0.0);
            record.current_step = "Classification completed".to_string();
        })
        .await
    }

    /// Mark the job failed, keeping partial counts. Returns false if it
    /// already finished.
    pub async fn fail(&self, error: &str) -> Result<bool, StoreError> {
        self.finish(|record| {
            record.status = JobStatus::Failed;
            record.eta_seconds = None;
            record.current_step = format!("Classification failed: {error}");
            record.error = Some(error.to_string());
        })
        .await
    }

    /// Apply a terminal transition. The in-memory record only turns
    /// terminal once the store accepted it, so a failed write can be
    /// followed by another attempt (typically `fail`).
    async fn finish<F>(&self, f: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut ProgressRecord),
    {
        let mut state = self.state.lock().await;
        if state.record.is_terminal() {
            return Ok(false);
        }
        let mut record = state.record.clone();
        f(&mut record);
        record.updated_at = Some(chrono::Utc::now().to_rfc3339());
        self.store.set_progress(&self.job, &record).await?;
        state.record = record;
        Ok(true)
    }

    /// Apply a non-terminal update and write it through.
    ///
    /// Store failures are logged, not returned: progress is observational
    /// and must not abort classification.
    async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut TrackerState),
    {
        let mut state = self.state.lock().await;
        if state.record.is_terminal() {
            return;
        }
        f(&mut state);
        state.record.updated_at = Some(chrono::Utc::now().to_rfc3339());
        if let Err(e) = self.store.set_progress(&self.job, &state.record).await {
            tracing::warn!(job = %self.job, error = %e, "Failed to persist progress");
        }
    }
}

/// Recompute rate and ETA from elapsed time.
fn refresh_rate(state: &mut TrackerState) {
    let elapsed = state.started.elapsed().as_secs_f64();
    let record = &mut state.record;
    if elapsed > 0.0 && record.processed > 0 {
        let rate = record.processed as f64 / elapsed;
        record.rate = Some(rate);
        record.eta_seconds = if rate > 0.0 {
            Some(record.remaining as f64 / rate)
        } else {
            None
        };
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
