//! Pipeline types: comments, batches and classification labels.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::table::Table;

/// A non-empty, trimmed comment and the row it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub index: usize,
    pub text: String,
}

impl Comment {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }
}

/// Collect the comments that enter the pipeline, in row order.
///
/// Empty, whitespace-only and missing cells are skipped; the row reducer
/// assigns those rows the sentinel.
pub fn extract_comments(table: &Table, column: &str) -> Vec<Comment> {
    table
        .rows
        .iter()
        .filter_map(|row| {
            row.comment_text(column)
                .map(|text| Comment::new(row.index, text))
        })
        .collect()
}

/// A contiguous group of comments classified in one external call.
#[derive(Debug, Clone)]
pub struct Batch {
    /// 1-based batch number (for progress and logs)
    pub number: usize,
    pub comments: Vec<Comment>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }
}

/// Split comments into batches of at most `batch_size`, preserving order.
pub fn partition(comments: Vec<Comment>, batch_size: usize) -> Vec<Batch> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(comments.len().div_ceil(batch_size));
    let mut current = Vec::with_capacity(batch_size);

    for comment in comments {
        current.push(comment);
        if current.len() == batch_size {
            batches.push(Batch {
                number: batches.len() + 1,
                comments: std::mem::replace(&mut current, Vec::with_capacity(batch_size)),
            });
        }
    }
    if !current.is_empty() {
        batches.push(Batch {
            number: batches.len() + 1,
            comments: current,
        });
    }

    batches
}

/// Which layer of the fallback cascade produced a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    /// Accepted from the batch call
    Batch,
    /// Picked by embedding similarity
    Semantic,
    /// Recovered by a per-item call
    Single,
    /// Every layer failed; first category used
    Default,
}

impl std::fmt::Display for LabelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelSource::Batch => write!(f, "batch"),
            LabelSource::Semantic => write!(f, "semantic"),
            LabelSource::Single => write!(f, "single"),
            LabelSource::Default => write!(f, "default"),
        }
    }
}

/// The category assigned to one comment.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub category: String,
    pub source: LabelSource,
    /// 0-100, from the classifier or the embedding similarity
    pub confidence: Option<f64>,
}

impl Label {
    pub fn new(category: impl Into<String>, source: LabelSource) -> Self {
        Self {
            category: category.into(),
            source,
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: Option<f64>) -> Self {
        self.confidence = confidence;
        self
    }
}

/// Comment index → label.
pub type ClassificationMap = HashMap<usize, Label>;

/// Final per-row assignment consumed by reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedRow {
    pub index: usize,
    pub category: String,
    /// Absent for empty comments and default assignments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}
