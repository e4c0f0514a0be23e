//! Automatic content classification
//!
//! Keyword-membership tagging of talk text. The classifier sits behind a
//! trait so the keyword table can later be swapped for a smarter model
//! without touching the reconciler or the search vector builder.

/// Maps talk text to a set of category labels
pub trait TagClassifier: Send + Sync {
    /// Classify a title/description pair into category labels.
    ///
    /// Returns labels in rule-declaration order, duplicate-free. Empty input
    /// or no keyword match yields an empty list, never an error.
    fn classify(&self, title: &str, description: &str) -> Vec<String>;
}

/// One classification rule: a label emitted when any keyword matches
#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub label: String,
    pub keywords: Vec<String>,
}

impl KeywordRule {
    pub fn new(label: &str, keywords: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Deterministic substring-based classifier
pub struct KeywordClassifier {
    rules: Vec<KeywordRule>,
}

impl KeywordClassifier {
    /// Build a classifier from an explicit rule table
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        Self { rules }
    }

    /// Built-in rule table covering the common talk categories
    pub fn with_default_rules() -> Self {
        Self::new(vec![
            KeywordRule::new(
                "AI/ML",
                &[
                    "machine learning",
                    "deep learning",
                    "neural",
                    "llm",
                    "gpt",
                    "artificial intelligence",
                ],
            ),
            KeywordRule::new(
                "Web Development",
                &[
                    "django", "flask", "fastapi", "web", "http", "rest", "frontend", "backend",
                    "react", "vue",
                ],
            ),
            KeywordRule::new(
                "Data Science",
                &[
                    "pandas",
                    "numpy",
                    "dataframe",
                    "visualization",
                    "jupyter",
                    "matplotlib",
                    "analytics",
                ],
            ),
            KeywordRule::new(
                "Testing",
                &["pytest", "unittest", "tdd", "unit test", "integration test", "coverage"],
            ),
            KeywordRule::new(
                "DevOps",
                &["docker", "kubernetes", "ci/cd", "deployment", "infrastructure", "cloud"],
            ),
            KeywordRule::new(
                "Security",
                &[
                    "security",
                    "authentication",
                    "authorization",
                    "encryption",
                    "vulnerability",
                    "cybersecurity",
                ],
            ),
        ])
    }
}

/// Collapse whitespace runs and lowercase
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl TagClassifier for KeywordClassifier {
    fn classify(&self, title: &str, description: &str) -> Vec<String> {
        let text = format!("{} {}", normalize(title), normalize(description));
        self.rules
            .iter()
            .filter(|rule| rule.keywords.iter().any(|kw| text.contains(kw.as_str())))
            .map(|rule| rule.label.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_category_when_keyword_present() {
        let c = KeywordClassifier::with_default_rules();
        let tags = c.classify("Intro to Machine Learning", "training neural networks");
        assert!(tags.contains(&"AI/ML".to_string()));
    }

    #[test]
    fn empty_input_yields_empty_set() {
        let c = KeywordClassifier::with_default_rules();
        assert!(c.classify("", "").is_empty());
    }

    #[test]
    fn no_keyword_yields_empty_set() {
        let c = KeywordClassifier::with_default_rules();
        assert!(c.classify("Birdwatching basics", "binoculars and patience").is_empty());
    }

    #[test]
    fn matching_is_case_insensitive_and_whitespace_normalized() {
        let c = KeywordClassifier::with_default_rules();
        let tags = c.classify("DEEP\n\tLEARNING", "");
        assert_eq!(tags, vec!["AI/ML".to_string()]);
    }

    #[test]
    fn labels_come_in_rule_order_without_duplicates() {
        let c = KeywordClassifier::with_default_rules();
        let tags = c.classify(
            "Testing Django apps in Docker",
            "pytest and coverage for web backends",
        );
        assert_eq!(
            tags,
            vec![
                "Web Development".to_string(),
                "Testing".to_string(),
                "DevOps".to_string()
            ]
        );
    }

    #[test]
    fn custom_rule_table_is_respected() {
        let c = KeywordClassifier::new(vec![KeywordRule::new("Rust", &["rustc", "cargo"])]);
        assert_eq!(c.classify("Faster cargo builds", ""), vec!["Rust".to_string()]);
        assert!(c.classify("Intro to machine learning", "").is_empty());
    }
}
