//! Keyword-matching classifier used when no LLM is configured.
//!
//! Each category gets a keyword list from its title and description words
//! plus a domain expansion for common survey themes. Embeddings are hashed
//! bag-of-words vectors, good enough for the similarity fallback.

use async_trait::async_trait;

use super::{BatchLabels, ClassifierGateway, ClassifyRequest};
use crate::category::Category;
use crate::error::GatewayError;

/// Dimensions of the hashed bag-of-words embedding
pub const KEYWORD_EMBEDDING_DIM: usize = 256;

/// Description words shorter than this are ignored
const MIN_DESCRIPTION_WORD_LEN: usize = 5;

/// Description words too generic to signal a category
const STOPWORDS: &[&str] = &["about", "comments", "general", "other", "their", "these", "which"];

/// Theme triggers (matched against the lowercase title) and their keywords.
/// Only the first matching theme applies.
const THEMES: &[(&[&str], &[&str])] = &[
    (
        &["wait", "time"],
        &["wait", "delay", "slow", "queue", "appointment", "booking"],
    ),
    (
        &["service", "quality"],
        &["service", "staff", "quality", "professional", "helpful"],
    ),
    (
        &["access"],
        &["access", "parking", "disabled", "wheelchair", "stairs"],
    ),
    (
        &["communication"],
        &["information", "explain", "told", "communication", "contact"],
    ),
    (
        &["positive", "good"],
        &["good", "great", "excellent", "thank", "appreciate", "helpful"],
    ),
    (
        &["process"],
        &["process", "paperwork", "form", "system", "procedure"],
    ),
];

/// Deterministic local classifier
#[derive(Debug, Clone, Default)]
pub struct KeywordGateway;

impl KeywordGateway {
    pub fn new() -> Self {
        Self
    }

    /// Best vocabulary title for a comment and its keyword match count.
    ///
    /// Ties go to the earlier category; no match yields the first one.
    fn best_match<'a>(&self, vocabulary: &[&'a Category], comment: &str) -> (&'a str, usize) {
        let comment = comment.to_lowercase();
        let mut best = vocabulary.first().map(|c| c.title.as_str()).unwrap_or("");
        let mut best_matches = 0;

        for category in vocabulary {
            let matches = keywords_for(category)
                .iter()
                .filter(|keyword| comment.contains(keyword.as_str()))
                .count();
            if matches > best_matches {
                best_matches = matches;
                best = &category.title;
            }
        }

        (best, best_matches)
    }
}

/// Keyword list for one category.
pub fn keywords_for(category: &Category) -> Vec<String> {
    let title = category.title.to_lowercase();
    let mut keywords: Vec<String> = title.split_whitespace().map(str::to_string).collect();

    keywords.extend(
        tokenize(&category.description)
            .map(str::to_lowercase)
            .filter(|w| w.chars().count() >= MIN_DESCRIPTION_WORD_LEN)
            .filter(|w| !STOPWORDS.contains(&w.as_str())),
    );

    if let Some((_, theme)) = THEMES
        .iter()
        .find(|(triggers, _)| triggers.iter().any(|t| title.contains(t)))
    {
        keywords.extend(theme.iter().map(|k| k.to_string()));
    }

    keywords.sort();
    keywords.dedup();
    keywords
}

/// Confidence from keyword matches: none → 0, then 80, 100.
fn confidence_for(matches: usize) -> f64 {
    if matches == 0 {
        0.0
    } else {
        (60.0 + 20.0 * matches as f64).min(100.0)
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
}

/// FNV-1a hash of a lowercase token.
fn fnv1a(token: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in token.bytes() {
        hash ^= byte.to_ascii_lowercase() as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// L2-normalized hashed bag-of-words vector.
pub fn hashed_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; KEYWORD_EMBEDDING_DIM];
    for token in tokenize(text) {
        let bucket = (fnv1a(token) % KEYWORD_EMBEDDING_DIM as u64) as usize;
        vector[bucket] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

#[async_trait]
impl ClassifierGateway for KeywordGateway {
    async fn classify_batch(
        &self,
        request: &ClassifyRequest,
        comments: &[String],
    ) -> Result<BatchLabels, GatewayError> {
        let vocabulary = request.categories.vocabulary();
        let mut labels = BatchLabels::default();
        for comment in comments {
            let (title, matches) = self.best_match(&vocabulary, comment);
            labels.categories.push(title.to_string());
            labels.confidence.push(Some(confidence_for(matches)));
        }
        Ok(labels)
    }

    async fn classify_single(
        &self,
        request: &ClassifyRequest,
        comment: &str,
    ) -> Result<String, GatewayError> {
        let vocabulary = request.categories.vocabulary();
        Ok(self.best_match(&vocabulary, comment).0.to_string())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        Ok(hashed_embedding(text))
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}
