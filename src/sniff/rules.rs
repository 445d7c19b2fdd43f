use regex::Regex;

use crate::error::{Error, Result};

use super::{Classifier, Match};

/// Built-in rules: (id, pattern)
const DEFAULT_RULES: &[(&str, &str)] = &[
    ("private-key", r"-----BEGIN ((RSA|DSA|EC|OPENSSH|PGP) )?PRIVATE KEY( BLOCK)?-----"),
    ("aws-access-key", r"\b(AKIA|ASIA)[0-9A-Z]{16}\b"),
    ("github-token", r"\bgh[pousr]_[A-Za-z0-9]{36,}\b"),
    (
        "assigned-secret",
        r#"(?i)\b[\w.-]*(password|passwd|secret|token|api_?key)[\w.-]*\s*[:=]\s*["'][^"'\s]{6,}["']"#,
    ),
];

struct Rule {
    id: String,
    regex: Regex,
}

/// Regex rule set; the first matching rule wins
pub struct PatternClassifier {
    rules: Vec<Rule>,
}

impl PatternClassifier {
    pub fn from_patterns<'a>(
        patterns: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self> {
        let rules = patterns
            .into_iter()
            .map(|(id, pattern)| {
                Regex::new(pattern)
                    .map(|regex| Rule { id: id.to_string(), regex })
                    .map_err(|e| Error::Config(format!("rule {}: {}", id, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for PatternClassifier {
    fn default() -> Self {
        // Built-in patterns are compile-time constants covered by tests
        let rules = DEFAULT_RULES
            .iter()
            .filter_map(|(id, pattern)| {
                Regex::new(pattern)
                    .ok()
                    .map(|regex| Rule { id: id.to_string(), regex })
            })
            .collect();
        Self { rules }
    }
}

impl Classifier for PatternClassifier {
    fn classify(&self, content: &str) -> Option<Match> {
        self.rules.iter().find_map(|rule| {
            rule.regex.find(content).map(|m| Match {
                rule: rule.id.clone(),
                start: m.start(),
                end: m.end(),
            })
        })
    }
}
