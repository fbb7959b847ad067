//! Sanitization audit trail
//!
//! Every content mutation the sanitizer performs is recorded: what
//! changed, where, and why. The trail is written alongside the run's
//! artifacts for review; it never gates success.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What class of mutation an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizeCategory {
    AnsiEscapes,
    ControlChars,
    MentionNeutralized,
    ClosePhraseNeutralized,
    UriRedacted,
    MarkupEscaped,
    Truncated,
}

impl fmt::Display for SanitizeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SanitizeCategory::AnsiEscapes => "ansi-escapes",
            SanitizeCategory::ControlChars => "control-chars",
            SanitizeCategory::MentionNeutralized => "mention-neutralized",
            SanitizeCategory::ClosePhraseNeutralized => "close-phrase-neutralized",
            SanitizeCategory::UriRedacted => "uri-redacted",
            SanitizeCategory::MarkupEscaped => "markup-escaped",
            SanitizeCategory::Truncated => "truncated",
        };
        f.write_str(name)
    }
}

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanitizationAuditEntry {
    pub category: SanitizeCategory,
    /// The original fragment, clipped for the trail.
    pub original: String,
    pub replacement: String,
    /// 1-based line within the sanitized text.
    pub line: usize,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl SanitizationAuditEntry {
    pub fn new(
        category: SanitizeCategory,
        original: &str,
        replacement: &str,
        line: usize,
        reason: &str,
    ) -> Self {
        Self {
            category,
            original: clip(original),
            replacement: clip(replacement),
            line,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Clip audit fragments so the trail stays readable.
fn clip(fragment: &str) -> String {
    const MAX: usize = 120;
    if fragment.len() <= MAX {
        return fragment.to_string();
    }
    let mut cut = MAX;
    while !fragment.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &fragment[..cut])
}

/// The accumulated trail for one processed payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    entries: Vec<SanitizationAuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: SanitizationAuditEntry) {
        self.entries.push(entry);
    }

    pub fn extend(&mut self, entries: Vec<SanitizationAuditEntry>) {
        self.entries.extend(entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[SanitizationAuditEntry] {
        &self.entries
    }

    /// Render as a markdown table for the run summary.
    pub fn render_markdown(&self) -> String {
        if self.entries.is_empty() {
            return String::from("No content mutations.\n");
        }
        let mut out = String::from("| Category | Line | Original | Replacement | Reason |\n|---|---|---|---|---|\n");
        for entry in &self.entries {
            out.push_str(&format!(
                "| {} | {} | `{}` | `{}` | {} |\n",
                entry.category,
                entry.line,
                entry.original.replace('|', "\\|").replace('\n', " "),
                entry.replacement.replace('|', "\\|").replace('\n', " "),
                entry.reason
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_long_fragments() {
        let long = "x".repeat(300);
        let entry = SanitizationAuditEntry::new(
            SanitizeCategory::Truncated,
            &long,
            "",
            1,
            "content over budget",
        );
        assert!(entry.original.len() < 300);
        assert!(entry.original.ends_with('…'));
    }

    #[test]
    fn test_render_markdown_escapes_pipes() {
        let mut log = AuditLog::new();
        log.push(SanitizationAuditEntry::new(
            SanitizeCategory::MarkupEscaped,
            "a|b",
            "a\\|b",
            2,
            "markup",
        ));
        let table = log.render_markdown();
        assert!(table.contains("a\\|b"));
        assert!(table.contains("| 2 |"));
    }
}
