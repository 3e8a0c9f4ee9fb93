//! Verbatim Core - survey comment classification
//!
//! This crate contains the classification pipeline, including:
//! - Category sets and verbatim column detection
//! - Classifier gateways (OpenAI API, local keyword matching)
//! - Concurrent batch scheduling with validation and repair
//! - Progress tracking over a key-value store
//! - Job coordination and category summaries

pub mod category;
pub mod config;
pub mod error;
pub mod gateway;
pub mod jobs;
pub mod pipeline;
pub mod report;
pub mod store;
pub mod table;

pub use category::{default_categories, Category, CategorySet, SENTINEL_CATEGORY};
pub use config::{Config, ProviderConfig, Settings};
pub use error::{GatewayError, InputError, JobError, StoreError};
pub use gateway::{build_gateway, ClassifierGateway};
pub use jobs::{JobCoordinator, JobHandle};
pub use pipeline::{ClassifiedRow, JobStatus, ProgressRecord};
pub use report::{CategorySummary, ClassificationReport};
pub use store::{JobStore, KeyValueStore, MemoryStore};
pub use table::{detect_verbatim_column, Row, Table};
