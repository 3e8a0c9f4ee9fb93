//! Prompt construction and response parsing for LLM classifiers.

use std::fmt::Write;

use serde::Deserialize;
use serde_json::Value;

use super::BatchLabels;
use crate::category::Category;
use crate::error::GatewayError;

fn vocabulary_list(vocabulary: &[&Category]) -> String {
    let mut result = String::new();
    for category in vocabulary {
        if category.description.trim().is_empty() {
            let _ = writeln!(result, "- {}", category.title);
        } else {
            let _ = writeln!(result, "- {}: {}", category.title, category.description);
        }
    }
    result
}

/// System prompt for batch classification with confidence scores.
pub fn batch_system_prompt(vocabulary: &[&Category]) -> String {
    let categories = vocabulary_list(vocabulary);

    format!(
        r#"You classify survey comments into categories.

# Categories (use ONLY these exact titles)

{categories}
# Rules

1. Assign exactly ONE category title to every comment.
2. Use the titles exactly as written above.
3. If a comment is unclear or fits no category well, choose the closest match and give it a low confidence.
4. Confidence is an integer from 0 to 100.
5. You MUST return one entry per comment, in the order the comments were given.

# Response

Return a JSON object only:
{{"categories": ["<title>", ...], "confidence": [<0-100>, ...]}}"#
    )
}

/// System prompt for per-item classification.
pub fn single_system_prompt(vocabulary: &[&Category]) -> String {
    let titles: Vec<&str> = vocabulary.iter().map(|c| c.title.as_str()).collect();
    format!(
        "You label comments.\n\
         RULES:\n\
         1. Choose ONE of the following categories exactly: {}.\n\
         2. Output only that category title.\n\
         3. If the comment is unclear or doesn't fit any category well, choose the closest match.",
        titles.join(", ")
    )
}

/// User message listing the comments of one batch.
pub fn batch_user_message(comments: &[String]) -> String {
    let mut message = format!("Classify these {} comments:\n\n", comments.len());
    for (i, comment) in comments.iter().enumerate() {
        // JSON-encode so embedded newlines and quotes cannot break the numbering
        let encoded = serde_json::to_string(comment).unwrap_or_else(|_| comment.clone());
        let _ = writeln!(message, "{}. {}", i + 1, encoded);
    }
    message
}

#[derive(Deserialize)]
struct RawBatch {
    categories: Vec<Value>,
    #[serde(default)]
    confidence: Vec<Value>,
}

/// Parse a batch response into labels.
///
/// Accepts code-fenced JSON and numbers given as strings. Confidence values
/// are clamped to [0, 100]; unparseable entries become `None`.
pub fn parse_batch_labels(content: &str) -> Result<BatchLabels, GatewayError> {
    let json = extract_json(content)
        .ok_or_else(|| GatewayError::Malformed("no JSON object in response".to_string()))?;
    let raw: RawBatch =
        serde_json::from_str(json).map_err(|e| GatewayError::Malformed(e.to_string()))?;

    let categories = raw
        .categories
        .into_iter()
        .map(|value| match value {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .collect();
    let confidence = raw.confidence.iter().map(parse_confidence).collect();

    Ok(BatchLabels {
        categories,
        confidence,
    })
}

fn parse_confidence(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    }?;
    if number.is_finite() {
        Some(number.clamp(0.0, 100.0))
    } else {
        None
    }
}

/// Locate the outermost JSON object in model output.
pub fn extract_json(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&content[start..=end])
}
