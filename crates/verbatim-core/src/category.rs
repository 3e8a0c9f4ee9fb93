//! Category vocabulary for classification.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// Label assigned to rows whose verbatim cell is empty or missing.
pub const SENTINEL_CATEGORY: &str = "No Comment";

const SENTINEL_DESCRIPTION: &str = "Empty, blank, or missing comments";

/// A single category the classifier can choose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl Category {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.title == SENTINEL_CATEGORY
    }

    /// Text used when embedding this category.
    pub fn embedding_text(&self) -> &str {
        if self.description.trim().is_empty() {
            &self.title
        } else {
            &self.description
        }
    }
}

/// Ordered, validated set of categories.
///
/// Titles are unique and the sentinel is always a member. The first
/// caller-supplied category doubles as the default when every
/// classification layer fails for a comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Category>", into = "Vec<Category>")]
pub struct CategorySet {
    categories: Vec<Category>,
}

impl CategorySet {
    /// Build a category set, appending the sentinel if absent.
    pub fn new(categories: Vec<Category>) -> Result<Self, InputError> {
        if categories.is_empty() {
            return Err(InputError::NoCategories);
        }

        let mut seen = HashSet::new();
        let mut cleaned = Vec::with_capacity(categories.len() + 1);
        for mut category in categories {
            category.title = category.title.trim().to_string();
            if category.title.is_empty() {
                continue;
            }
            if !seen.insert(category.title.clone()) {
                return Err(InputError::DuplicateCategory(category.title));
            }
            cleaned.push(category);
        }

        if cleaned.is_empty() {
            return Err(InputError::NoCategories);
        }

        if !seen.contains(SENTINEL_CATEGORY) {
            cleaned.push(Category::new(SENTINEL_CATEGORY, SENTINEL_DESCRIPTION));
        }

        Ok(Self {
            categories: cleaned,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// First category in caller order.
    pub fn default_category(&self) -> &str {
        // Construction guarantees at least one category.
        self.categories
            .first()
            .map(|c| c.title.as_str())
            .unwrap_or(SENTINEL_CATEGORY)
    }

    pub fn contains(&self, title: &str) -> bool {
        self.categories.iter().any(|c| c.title == title)
    }

    /// Categories offered to classifiers.
    ///
    /// The sentinel is reserved for empty comments, unless it is the only
    /// category the caller supplied.
    pub fn vocabulary(&self) -> Vec<&Category> {
        let vocabulary: Vec<&Category> =
            self.categories.iter().filter(|c| !c.is_sentinel()).collect();
        if vocabulary.is_empty() {
            self.categories.iter().collect()
        } else {
            vocabulary
        }
    }

    pub fn vocabulary_titles(&self) -> Vec<&str> {
        self.vocabulary()
            .into_iter()
            .map(|c| c.title.as_str())
            .collect()
    }

    /// Resolve free-form classifier output to a known title.
    ///
    /// Tolerates surrounding whitespace, quotes, a trailing period and
    /// case differences.
    pub fn match_title(&self, raw: &str) -> Option<&str> {
        // Quotes and periods can nest either way ("Title". or "Title.")
        let mut cleaned = raw;
        loop {
            let next = cleaned
                .trim()
                .trim_end_matches('.')
                .trim_matches(|c| c == '"' || c == '\'' || c == '`');
            if next == cleaned {
                break;
            }
            cleaned = next;
        }
        if cleaned.is_empty() {
            return None;
        }

        self.categories
            .iter()
            .find(|c| c.title == cleaned)
            .or_else(|| {
                self.categories
                    .iter()
                    .find(|c| c.title.eq_ignore_ascii_case(cleaned))
            })
            .map(|c| c.title.as_str())
    }
}

impl TryFrom<Vec<Category>> for CategorySet {
    type Error = InputError;

    fn try_from(categories: Vec<Category>) -> Result<Self, Self::Error> {
        Self::new(categories)
    }
}

impl From<CategorySet> for Vec<Category> {
    fn from(set: CategorySet) -> Self {
        set.categories
    }
}

/// Fixed category list used when no categories were supplied.
pub fn default_categories() -> Vec<Category> {
    vec![
        Category::new(
            "Service Quality",
            "Comments about the quality of service delivery, staff performance, or service standards",
        ),
        Category::new(
            "Wait Times",
            "Comments about waiting times, delays, scheduling, or appointment availability",
        ),
        Category::new(
            "Accessibility",
            "Comments about physical access, digital access, or accommodation needs",
        ),
        Category::new(
            "Communication",
            "Comments about information sharing, clarity of communication, or responsiveness",
        ),
        Category::new(
            "Process Issues",
            "Comments about procedures, paperwork, bureaucracy, or system problems",
        ),
        Category::new(
            "Positive Feedback",
            "General praise, compliments, or positive experiences with the service",
        ),
        Category::new(SENTINEL_CATEGORY, SENTINEL_DESCRIPTION),
    ]
}
