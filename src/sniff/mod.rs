//! Content scanning protocol
//!
//! A [`Classifier`] decides whether one line holds a credential. The
//! [`Sniffer`] drives it over a lazy sequence of lines and reports every hit
//! through a callback, so callers decide what a violation means (notify,
//! count, collect).
//!
//! - **lines**: line sources over any `BufRead`
//! - **diff**: added-line source over unified patch text
//! - **mime**: binary/text sniffing
//! - **rules**: default regex classifier

mod diff;
mod lines;
mod mime;
mod rules;

pub use diff::DiffLines;
pub use lines::LineReader;
pub use mime::is_text;
pub use rules::PatternClassifier;

use std::io;
use std::sync::Arc;

use crate::error::{Error, Result};

/// One line of scanned content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub path: String,
    /// 1-based
    pub line_number: usize,
    pub content: String,
}

/// Where in a line a rule matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub rule: String,
    pub start: usize,
    pub end: usize,
}

/// A line the classifier flagged, with the span and rule that matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub line: Line,
    pub rule: String,
    pub start: usize,
    pub end: usize,
}

impl Violation {
    pub fn matched_text(&self) -> &str {
        self.line
            .content
            .get(self.start..self.end)
            .unwrap_or_default()
    }
}

/// Pluggable rule set. Implementations must be pure for a given line.
pub trait Classifier: Send + Sync {
    fn classify(&self, content: &str) -> Option<Match>;
}

/// Runs a classifier over line sources
#[derive(Clone)]
pub struct Sniffer {
    classifier: Arc<dyn Classifier>,
}

impl Sniffer {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self { classifier }
    }

    /// Scan `lines`, invoking `on_violation` for each flagged line.
    ///
    /// Stops at the first read error or callback error. Returns the number
    /// of violations reported.
    pub fn sniff<I, F>(&self, lines: I, mut on_violation: F) -> Result<usize>
    where
        I: IntoIterator<Item = io::Result<Line>>,
        F: FnMut(Violation) -> Result<()>,
    {
        let mut found = 0;
        for line in lines {
            let line = line.map_err(|e| Error::Scan(e.to_string()))?;
            if let Some(m) = self.classifier.classify(&line.content) {
                found += 1;
                on_violation(Violation {
                    line,
                    rule: m.rule,
                    start: m.start,
                    end: m.end,
                })?;
            }
        }
        Ok(found)
    }

    /// Count violations without reporting them
    pub fn count<I>(&self, lines: I) -> Result<u64>
    where
        I: IntoIterator<Item = io::Result<Line>>,
    {
        let found = self.sniff(lines, |_| Ok(()))?;
        Ok(found as u64)
    }
}

impl Default for Sniffer {
    fn default() -> Self {
        Self::new(Arc::new(PatternClassifier::default()))
    }
}
