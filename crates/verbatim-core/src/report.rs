//! Category summary of a completed classification.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::category::{CategorySet, SENTINEL_CATEGORY};
use crate::pipeline::ClassifiedRow;
use crate::table::Table;

/// Sample comments kept per category
const MAX_SAMPLE_QUOTES: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub title: String,
    pub description: String,
    pub count: usize,
    /// Share of all rows, rounded to one decimal
    pub percentage: f64,
    #[serde(default)]
    pub sample_quotes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub verbatim_column: String,
    pub total_rows: usize,
    pub total_with_comments: usize,
    /// Sorted by count, largest first
    pub categories: Vec<CategorySummary>,
    pub generated_at: String,
}

impl ClassificationReport {
    /// Summarize classified rows.
    ///
    /// Every non-sentinel category is listed, including empty ones. The
    /// sentinel is listed only when some row has it. Ties keep category-set
    /// order.
    pub fn build(
        table: &Table,
        column: &str,
        rows: &[ClassifiedRow],
        categories: &CategorySet,
    ) -> Self {
        let total_rows = rows.len();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for row in rows {
            *counts.entry(row.category.as_str()).or_default() += 1;
        }

        let mut samples: HashMap<&str, Vec<String>> = HashMap::new();
        for (row, classified) in table.rows.iter().zip(rows) {
            if classified.category == SENTINEL_CATEGORY {
                continue;
            }
            let quotes = samples.entry(classified.category.as_str()).or_default();
            if quotes.len() < MAX_SAMPLE_QUOTES {
                if let Some(text) = row.comment_text(column) {
                    quotes.push(text);
                }
            }
        }

        let mut summaries: Vec<CategorySummary> = categories
            .iter()
            .filter_map(|category| {
                let count = counts.get(category.title.as_str()).copied().unwrap_or(0);
                if category.is_sentinel() && count == 0 {
                    return None;
                }
                Some(CategorySummary {
                    title: category.title.clone(),
                    description: category.description.clone(),
                    count,
                    percentage: percentage(count, total_rows),
                    sample_quotes: samples.remove(category.title.as_str()).unwrap_or_default(),
                })
            })
            .collect();
        summaries.sort_by(|a, b| b.count.cmp(&a.count));

        Self {
            verbatim_column: column.to_string(),
            total_rows,
            total_with_comments: rows
                .iter()
                .filter(|r| r.category != SENTINEL_CATEGORY)
                .count(),
            categories: summaries,
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 / total as f64 * 1000.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;
    use crate::table::Row;
    use serde_json::json;

    fn setup() -> (Table, Vec<ClassifiedRow>, CategorySet) {
        let texts = ["Great", "", "Crash", "Lovely", "Slow"];
        let labels = [
            "Praise",
            SENTINEL_CATEGORY,
            "Bugs",
            "Praise",
            "Praise",
        ];
        let rows = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Row::new(i, [("c".to_string(), json!(t))].into_iter().collect()))
            .collect();
        let classified = labels
            .iter()
            .enumerate()
            .map(|(index, category)| ClassifiedRow {
                index,
                category: category.to_string(),
                confidence: None,
            })
            .collect();
        let categories = CategorySet::new(vec![
            Category::new("Bugs", "Crashes"),
            Category::new("Praise", "Kind words"),
            Category::new("Billing", "Invoices"),
        ])
        .unwrap();
        (Table::new(vec!["c".to_string()], rows), classified, categories)
    }

    #[test]
    fn test_counts_sorted_with_sentinel() {
        let (table, rows, categories) = setup();
        let report = ClassificationReport::build(&table, "c", &rows, &categories);

        let titles: Vec<(&str, usize)> = report
            .categories
            .iter()
            .map(|c| (c.title.as_str(), c.count))
            .collect();
        assert_eq!(
            titles,
            vec![
                ("Praise", 3),
                ("Bugs", 1),
                (SENTINEL_CATEGORY, 1),
                ("Billing", 0)
            ]
        );
        assert_eq!(report.categories[0].percentage, 60.0);
        assert_eq!(report.categories[0].sample_quotes, vec!["Great", "Lovely", "Slow"]);
        assert_eq!(report.total_rows, 5);
        assert_eq!(report.total_with_comments, 4);
    }

    #[test]
    fn test_sentinel_omitted_when_unused() {
        let (table, mut rows, categories) = setup();
        rows[1].category = "Billing".to_string();
        let report = ClassificationReport::build(&table, "c", &rows, &categories);
        assert!(report.categories.iter().all(|c| c.title != SENTINEL_CATEGORY));
        assert_eq!(report.categories.len(), 3);
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage(1, 3), 33.3);
        assert_eq!(percentage(2, 3), 66.7);
        assert_eq!(percentage(0, 0), 0.0);
    }
}
