//! Tabular survey data handed over by the session layer.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Header fragments that identify a verbatim column outright.
const STRICT_HEADER_PATTERNS: &[&str] = &[
    "how can we improve this service",
    "comments",
    "feedback",
    "verbatim",
];

/// Header keywords that hint at free-text content.
const HEADER_KEYWORDS: &[&str] = &[
    "improve",
    "comment",
    "feedback",
    "verbatim",
    "suggestion",
    "opinion",
];

/// Average cell length above which a column counts as free text.
const LONG_TEXT_THRESHOLD: f64 = 25.0;

/// Average cell length required by the last-resort column pick.
const MIN_TEXT_THRESHOLD: f64 = 10.0;

/// A table row with a stable index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Stable row identifier (not necessarily contiguous)
    pub index: usize,
    /// Cell values by column name
    pub cells: BTreeMap<String, Value>,
}

impl Row {
    pub fn new(index: usize, cells: BTreeMap<String, Value>) -> Self {
        Self { index, cells }
    }

    /// Display text of a cell, `None` for null or missing cells.
    pub fn text(&self, column: &str) -> Option<String> {
        match self.cells.get(column)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            other => Some(other.to_string()),
        }
    }

    /// Trimmed, non-empty verbatim text.
    pub fn comment_text(&self, column: &str) -> Option<String> {
        let text = self.text(column)?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// Parsed survey table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    /// Row indexes are expected to be unique; the job coordinator rejects
    /// tables where they are not.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Build a table from JSON records, indexing rows by position.
    ///
    /// Columns are collected in first-seen order (record keys keep their
    /// file order through serde_json's `preserve_order`).
    pub fn from_records(records: Vec<serde_json::Map<String, Value>>) -> Self {
        let mut columns = Vec::new();
        let mut seen = HashSet::new();
        let mut rows = Vec::with_capacity(records.len());

        for (index, record) in records.into_iter().enumerate() {
            for key in record.keys() {
                if seen.insert(key.clone()) {
                    columns.push(key.clone());
                }
            }
            rows.push(Row::new(index, record.into_iter().collect()));
        }

        Self { columns, rows }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First row index that appears more than once.
    pub fn duplicate_index(&self) -> Option<usize> {
        let mut seen = HashSet::with_capacity(self.rows.len());
        self.rows
            .iter()
            .map(|row| row.index)
            .find(|index| !seen.insert(*index))
    }

    /// Mean character length of a column's cells (missing cells count as empty).
    pub fn average_text_len(&self, column: &str) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        let total: usize = self
            .rows
            .iter()
            .map(|row| row.text(column).map(|t| t.chars().count()).unwrap_or(0))
            .sum();
        total as f64 / self.rows.len() as f64
    }
}

/// Pick the column most likely to hold free-text comments.
///
/// Returns the column name and whether the match was confident (a strict
/// header match). Returns `None` only for a table without columns.
pub fn detect_verbatim_column(table: &Table) -> Option<(String, bool)> {
    for column in &table.columns {
        let header = column.trim().to_lowercase();
        if STRICT_HEADER_PATTERNS.iter().any(|p| header.contains(p)) {
            return Some((column.clone(), true));
        }
    }

    let long_columns: Vec<&String> = table
        .columns
        .iter()
        .filter(|c| table.average_text_len(c) > LONG_TEXT_THRESHOLD)
        .collect();
    let keyword_columns: Vec<&String> = table
        .columns
        .iter()
        .filter(|c| {
            let header = c.to_lowercase();
            HEADER_KEYWORDS.iter().any(|k| header.contains(k))
        })
        .collect();

    let mut candidates: Vec<&String> = long_columns
        .iter()
        .filter(|c| keyword_columns.contains(c))
        .copied()
        .collect();
    if candidates.is_empty() {
        candidates = if long_columns.is_empty() {
            keyword_columns
        } else {
            long_columns
        };
    }

    let best = candidates.into_iter().fold(None::<(&String, f64)>, |best, column| {
        let len = table.average_text_len(column);
        match best {
            Some((_, best_len)) if best_len >= len => best,
            _ => Some((column, len)),
        }
    });
    if let Some((column, _)) = best {
        return Some((column.clone(), false));
    }

    table
        .columns
        .iter()
        .find(|c| table.average_text_len(c) > MIN_TEXT_THRESHOLD)
        .or_else(|| table.columns.first())
        .map(|c| (c.clone(), false))
}
