//! Key-value persistence for job progress and results.
//!
//! The pipeline only depends on the [`KeyValueStore`] trait. [`JobStore`]
//! is the typed client used by the coordinator and the progress tracker.

mod memory;

pub use memory::MemoryStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::pipeline::{ClassifiedRow, ProgressRecord};
use crate::report::ClassificationReport;

/// Minimal key-value interface with per-key expiry.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get a value. Expired keys read as absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set a value, replacing any previous value and expiry.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Check whether a live value exists.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Reset the expiry of an existing key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Remove a key. Returns false if the key was absent.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

/// Typed access to per-job progress records and results.
#[derive(Clone)]
pub struct JobStore {
    kv: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl JobStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    fn progress_key(job: &str) -> String {
        format!("progress:{job}")
    }

    fn result_key(job: &str) -> String {
        format!("result:{job}")
    }

    fn report_key(job: &str) -> String {
        format!("report:{job}")
    }

    pub async fn get_progress(&self, job: &str) -> Result<Option<ProgressRecord>, StoreError> {
        match self.kv.get(&Self::progress_key(job)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set_progress(&self, job: &str, record: &ProgressRecord) -> Result<(), StoreError> {
        let raw = serde_json::to_string(record)?;
        self.kv
            .set(&Self::progress_key(job), raw, Some(self.ttl))
            .await
    }

    pub async fn progress_exists(&self, job: &str) -> Result<bool, StoreError> {
        self.kv.exists(&Self::progress_key(job)).await
    }

    pub async fn get_result(&self, job: &str) -> Result<Option<Vec<ClassifiedRow>>, StoreError> {
        match self.kv.get(&Self::result_key(job)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set_result(&self, job: &str, rows: &[ClassifiedRow]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(rows)?;
        self.kv.set(&Self::result_key(job), raw, Some(self.ttl)).await
    }

    pub async fn get_report(
        &self,
        job: &str,
    ) -> Result<Option<ClassificationReport>, StoreError> {
        match self.kv.get(&Self::report_key(job)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set_report(
        &self,
        job: &str,
        report: &ClassificationReport,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(report)?;
        self.kv.set(&Self::report_key(job), raw, Some(self.ttl)).await
    }

    /// Drop everything stored for a job.
    pub async fn clear(&self, job: &str) -> Result<(), StoreError> {
        self.kv.delete(&Self::progress_key(job)).await?;
        self.kv.delete(&Self::result_key(job)).await?;
        self.kv.delete(&Self::report_key(job)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::JobStatus;

    fn store() -> JobStore {
        JobStore::new(Arc::new(MemoryStore::new()), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_progress_roundtrip() {
        let store = store();
        assert!(store.get_progress("job").await.unwrap().is_none());
        assert!(!store.progress_exists("job").await.unwrap());

        let record = ProgressRecord::processing(12);
        store.set_progress("job", &record).await.unwrap();

        let loaded = store.get_progress("job").await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Processing);
        assert_eq!(loaded.total, 12);
        assert!(store.progress_exists("job").await.unwrap());
    }

    #[tokio::test]
    async fn test_result_and_clear() {
        let store = store();
        let rows = vec![ClassifiedRow {
            index: 3,
            category: "Praise".to_string(),
            confidence: Some(90.0),
        }];
        store.set_result("job", &rows).await.unwrap();
        assert_eq!(store.get_result("job").await.unwrap(), Some(rows));

        store.clear("job").await.unwrap();
        assert!(store.get_result("job").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_an_error() {
        let kv = Arc::new(MemoryStore::new());
        kv.set("progress:job", "not json".to_string(), None)
            .await
            .unwrap();
        let store = JobStore::new(kv, Duration::from_secs(60));
        assert!(matches!(
            store.get_progress("job").await,
            Err(StoreError::Serialization(_))
        ));
    }
}
