//! Final per-row category assignment.

use super::types::{ClassificationMap, ClassifiedRow};
use crate::category::{CategorySet, SENTINEL_CATEGORY};
use crate::table::Table;

/// Assign exactly one category to every row, in table order.
///
/// Empty verbatim cells always get the sentinel, even if the map has an
/// entry for the row. Missing or unknown labels become the default category.
pub fn assign_rows(
    table: &Table,
    column: &str,
    classifications: &ClassificationMap,
    categories: &CategorySet,
) -> Vec<ClassifiedRow> {
    table
        .rows
        .iter()
        .map(|row| {
            let (category, confidence) = if row.comment_text(column).is_none() {
                (SENTINEL_CATEGORY.to_string(), None)
            } else {
                match classifications.get(&row.index) {
                    Some(label) if categories.contains(&label.category) => {
                        (label.category.clone(), label.confidence)
                    }
                    other => {
                        if let Some(label) = other {
                            tracing::warn!(
                                index = row.index,
                                category = %label.category,
                                "Unknown category in results, using default"
                            );
                        }
                        (categories.default_category().to_string(), None)
                    }
                }
            };
            ClassifiedRow {
                index: row.index,
                category,
                confidence,
            }
        })
        .collect()
}
