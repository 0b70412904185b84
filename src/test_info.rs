//! Hierarchical test log.
//!
//! A `TestInfo` is a named node holding an ordered mix of messages and nested
//! subtests. Every message is also forwarded to the `log` facade so the console
//! shows progress while the tree keeps the full record for the reports.

use log::{debug, error, warn};
use serde::Serialize;
use std::fmt::Write as _;

/// Severity of a recorded message, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Warning,
    Failure,
}

impl MessageLevel {
    fn label(self) -> &'static str {
        match self {
            MessageLevel::Info => "Info",
            MessageLevel::Warning => "Warning",
            MessageLevel::Failure => "Failure",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Entry {
    Message { level: MessageLevel, text: String },
    Subtest(TestInfo),
}

#[derive(Debug, Clone, Serialize)]
pub struct TestInfo {
    pub name: String,
    entries: Vec<Entry>,
}

impl TestInfo {
    pub fn new(name: impl Into<String>) -> Self {
        TestInfo {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Append a child node and return it for recording.
    pub fn create_subtest(&mut self, name: impl Into<String>) -> &mut TestInfo {
        self.entries.push(Entry::Subtest(TestInfo::new(name)));
        match self.entries.last_mut() {
            Some(Entry::Subtest(subtest)) => subtest,
            _ => unreachable!("subtest was just pushed"),
        }
    }

    pub fn info(&mut self, text: impl Into<String>) {
        let text = text.into();
        debug!("[{}] {}", self.name, text);
        self.push(MessageLevel::Info, text);
    }

    pub fn warning(&mut self, text: impl Into<String>) {
        let text = text.into();
        warn!("[{}] {}", self.name, text);
        self.push(MessageLevel::Warning, text);
    }

    pub fn failure(&mut self, text: impl Into<String>) {
        let text = text.into();
        error!("[{}] {}", self.name, text);
        self.push(MessageLevel::Failure, text);
    }

    fn push(&mut self, level: MessageLevel, text: String) {
        self.entries.push(Entry::Message { level, text });
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    fn count(&self, level: MessageLevel) -> usize {
        self.entries
            .iter()
            .map(|entry| match entry {
                Entry::Message { level: l, .. } if *l == level => 1,
                Entry::Message { .. } => 0,
                Entry::Subtest(subtest) => subtest.count(level),
            })
            .sum()
    }

    /// Failures recorded here and in every subtest.
    pub fn failure_count(&self) -> usize {
        self.count(MessageLevel::Failure)
    }

    pub fn warning_count(&self) -> usize {
        self.count(MessageLevel::Warning)
    }

    pub fn passed(&self) -> bool {
        self.failure_count() == 0
    }

    /// Render messages at or above `min_level`.
    ///
    /// `max_depth` limits how many subtest levels are expanded; `Some(0)` prints only
    /// this node's own messages. Subtests beyond the limit still contribute to the
    /// counts in their parent's header.
    pub fn render(&self, min_level: MessageLevel, max_depth: Option<usize>) -> String {
        let mut out = String::new();
        self.render_into(&mut out, min_level, max_depth, 0);
        out
    }

    fn render_into(
        &self,
        out: &mut String,
        min_level: MessageLevel,
        max_depth: Option<usize>,
        depth: usize,
    ) {
        let indent = "  ".repeat(depth);
        let _ = writeln!(
            out,
            "{}{}: {} failure(s), {} warning(s)",
            indent,
            self.name,
            self.failure_count(),
            self.warning_count()
        );
        for entry in &self.entries {
            match entry {
                Entry::Message { level, text } if *level >= min_level => {
                    let _ = writeln!(out, "{}  {}: {}", indent, level.label(), text);
                }
                Entry::Message { .. } => {}
                Entry::Subtest(subtest) => {
                    if max_depth.is_none_or(|max| depth < max) {
                        subtest.render_into(out, min_level, max_depth, depth + 1);
                    }
                }
            }
        }
    }
}
