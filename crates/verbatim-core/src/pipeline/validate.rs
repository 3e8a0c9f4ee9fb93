//! Validation and repair of classifier output.
//!
//! Every comment ends with exactly one label. Bad output is repaired through
//! the semantic matcher and, when that also fails, the default category.

use tracing::debug;

use super::semantic::SemanticMatcher;
use super::types::{Comment, Label, LabelSource};
use crate::category::CategorySet;
use crate::error::GatewayError;
use crate::gateway::BatchLabels;

/// Pair batch labels with their confidence, one per input comment.
///
/// A label count different from the batch size is an error. Missing
/// confidence entries are `None`; extra ones are ignored.
pub fn align(
    batch_len: usize,
    labels: BatchLabels,
) -> Result<Vec<(String, Option<f64>)>, GatewayError> {
    if labels.categories.len() != batch_len {
        return Err(GatewayError::LengthMismatch {
            expected: batch_len,
            got: labels.categories.len(),
        });
    }

    let mut confidence = labels.confidence.into_iter();
    Ok(labels
        .categories
        .into_iter()
        .map(|category| (category, confidence.next().flatten()))
        .collect())
}

/// Outcome of checking one batch label.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict<'a> {
    /// Known category with sufficient confidence
    Accept(&'a str),
    /// Needs the semantic fallback; `suggested` is the label if it is known
    Repair { suggested: Option<&'a str> },
}

/// Judge a (category, confidence) pair against the category set.
pub fn judge<'a>(
    categories: &'a CategorySet,
    raw: &str,
    confidence: Option<f64>,
    threshold: f64,
) -> Verdict<'a> {
    let known = categories.match_title(raw);
    match (known, confidence) {
        (Some(title), Some(c)) if c >= threshold => Verdict::Accept(title),
        _ => Verdict::Repair { suggested: known },
    }
}

/// Applies the repair cascade for one job.
pub struct Repairer {
    categories: CategorySet,
    threshold: f64,
    semantic: SemanticMatcher,
}

impl Repairer {
    pub fn new(categories: CategorySet, threshold: f64, semantic: SemanticMatcher) -> Self {
        Self {
            categories,
            threshold,
            semantic,
        }
    }

    pub fn default_label(&self) -> Label {
        Label::new(self.categories.default_category(), LabelSource::Default)
    }

    /// Resolve one label from a successful batch call.
    pub async fn resolve_batch_item(
        &self,
        comment: &Comment,
        raw: &str,
        confidence: Option<f64>,
    ) -> Label {
        match judge(&self.categories, raw, confidence, self.threshold) {
            Verdict::Accept(title) => {
                Label::new(title, LabelSource::Batch).with_confidence(confidence)
            }
            Verdict::Repair { suggested } => {
                debug!(
                    index = comment.index,
                    suggested = raw,
                    confidence,
                    "Batch label needs semantic check"
                );
                let fallback = suggested.map(|title| Label::new(title, LabelSource::Batch));
                self.semantic_repair(comment, fallback).await
            }
        }
    }

    /// Resolve the raw title returned by a per-item call.
    pub async fn resolve_single(&self, comment: &Comment, raw: &str) -> Label {
        match self.categories.match_title(raw) {
            Some(title) => Label::new(title, LabelSource::Single),
            None => {
                debug!(index = comment.index, returned = raw, "Unknown category from single call");
                self.semantic_repair(comment, None).await
            }
        }
    }

    /// Ask the semantic matcher. If it fails, keep `fallback` or use the
    /// default category.
    async fn semantic_repair(&self, comment: &Comment, fallback: Option<Label>) -> Label {
        match self.semantic.best_match(&comment.text).await {
            Ok(found) => {
                if fallback.as_ref().map(|l| l.category.as_str()) != Some(found.category.as_str()) {
                    debug!(
                        index = comment.index,
                        original = fallback.as_ref().map(|l| l.category.as_str()),
                        semantic = %found.category,
                        similarity = found.similarity,
                        "Semantic fallback diverged from classifier"
                    );
                }
                Label::new(found.category, LabelSource::Semantic)
                    .with_confidence(Some(found.confidence))
            }
            Err(e) => {
                debug!(index = comment.index, error = %e, "Semantic fallback failed");
                fallback.unwrap_or_else(|| self.default_label())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;
    use crate::gateway::KeywordGateway;
    use crate::pipeline::limiter::CallLimiter;
    use std::sync::Arc;

    fn categories() -> CategorySet {
        CategorySet::new(vec![
            Category::new("Positive Remark", "great friendly helpful staff"),
            Category::new("Technical Issue", "website crashed error login bug"),
        ])
        .unwrap()
    }

    fn repairer() -> Repairer {
        let categories = categories();
        let semantic = SemanticMatcher::new(
            Arc::new(KeywordGateway::new()),
            CallLimiter::new(2),
            &categories,
        );
        Repairer::new(categories, 70.0, semantic)
    }

    #[test]
    fn test_align_pairs_and_pads_confidence() {
        let labels = BatchLabels {
            categories: vec!["A".to_string(), "B".to_string()],
            confidence: vec![Some(90.0)],
        };
        assert_eq!(
            align(2, labels).unwrap(),
            vec![("A".to_string(), Some(90.0)), ("B".to_string(), None)]
        );
    }

    #[test]
    fn test_align_rejects_length_mismatch() {
        let labels = BatchLabels {
            categories: vec!["A".to_string()],
            confidence: vec![Some(90.0)],
        };
        assert_eq!(
            align(3, labels),
            Err(GatewayError::LengthMismatch {
                expected: 3,
                got: 1
            })
        );
    }

    #[test]
    fn test_judge() {
        let set = categories();
        assert_eq!(
            judge(&set, "technical issue", Some(95.0), 70.0),
            Verdict::Accept("Technical Issue")
        );
        assert_eq!(
            judge(&set, "Technical Issue", Some(50.0), 70.0),
            Verdict::Repair {
                suggested: Some("Technical Issue")
            }
        );
        assert_eq!(
            judge(&set, "Technical Issue", None, 70.0),
            Verdict::Repair {
                suggested: Some("Technical Issue")
            }
        );
        assert_eq!(
            judge(&set, "Billing", Some(99.0), 70.0),
            Verdict::Repair { suggested: None }
        );
    }

    #[tokio::test]
    async fn test_low_confidence_goes_semantic() {
        let repairer = repairer();
        let comment = Comment::new(0, "The website crashed during login");
        let label = repairer
            .resolve_batch_item(&comment, "Positive Remark", Some(40.0))
            .await;
        assert_eq!(label.category, "Technical Issue");
        assert_eq!(label.source, LabelSource::Semantic);
        let confidence = label.confidence.unwrap();
        assert!((0.0..=100.0).contains(&confidence));
    }

    #[tokio::test]
    async fn test_confident_label_accepted() {
        let repairer = repairer();
        let comment = Comment::new(0, "Great service!");
        let label = repairer
            .resolve_batch_item(&comment, "Positive Remark", Some(92.0))
            .await;
        assert_eq!(
            label,
            Label::new("Positive Remark", LabelSource::Batch).with_confidence(Some(92.0))
        );
    }

    #[tokio::test]
    async fn test_single_unknown_title_goes_semantic() {
        let repairer = repairer();
        let comment = Comment::new(0, "friendly and helpful staff");
        let label = repairer.resolve_single(&comment, "Kudos").await;
        assert_eq!(label.category, "Positive Remark");
        assert_eq!(label.source, LabelSource::Semantic);
        assert!(label.confidence.is_some());

        let label = repairer.resolve_single(&comment, "Positive Remark.").await;
        assert_eq!(label, Label::new("Positive Remark", LabelSource::Single));
    }
}
