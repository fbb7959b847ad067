//! Run summary
//!
//! Per-item final states plus the sanitization audit trail, rendered as
//! step-summary markdown. The summary reports; it never gates success.

use crate::audit::AuditLog;
use serde::{Deserialize, Serialize};
use std::fmt;
use warden_core::SafeOutputKind;

/// The per-item state machine. Everything after the pipeline's last
/// touch is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Received,
    Sanitized,
    Valid,
    RateLimited,
    FilteredOut,
    Resolved,
    UnresolvedReference,
    Applied,
    StagedPreview,
    HandlerFailed,
    Skipped,
}

impl ItemState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemState::Applied
                | ItemState::StagedPreview
                | ItemState::HandlerFailed
                | ItemState::Skipped
                | ItemState::RateLimited
                | ItemState::FilteredOut
                | ItemState::UnresolvedReference
        )
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemState::Received => "received",
            ItemState::Sanitized => "sanitized",
            ItemState::Valid => "valid",
            ItemState::RateLimited => "rate-limited",
            ItemState::FilteredOut => "filtered-out",
            ItemState::Resolved => "resolved",
            ItemState::UnresolvedReference => "unresolved-reference",
            ItemState::Applied => "applied",
            ItemState::StagedPreview => "staged-preview",
            ItemState::HandlerFailed => "handler-failed",
            ItemState::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Final record for one stream item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedItem {
    /// 1-based line in the ndjson stream.
    pub line: usize,
    pub kind: SafeOutputKind,
    pub state: ItemState,
    pub detail: String,
}

impl ProcessedItem {
    pub fn new(line: usize, kind: SafeOutputKind, state: ItemState, detail: &str) -> Self {
        Self {
            line,
            kind,
            state,
            detail: detail.to_string(),
        }
    }
}

/// Everything one pipeline run produced.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub items: Vec<ProcessedItem>,
    pub audit: AuditLog,
    pub warnings: Vec<String>,
    /// Staged-mode previews, in dispatch order.
    pub previews: Vec<String>,
    /// True when no agent output was present; the consuming job succeeds
    /// without doing anything.
    pub neutral_skip: bool,
}

impl RunSummary {
    pub fn count(&self, state: ItemState) -> usize {
        self.items.iter().filter(|item| item.state == state).count()
    }

    /// True when every processed item reached a terminal state.
    pub fn all_terminal(&self) -> bool {
        self.items.iter().all(|item| item.state.is_terminal())
    }

    /// Render the step-summary markdown.
    pub fn render_markdown(&self) -> String {
        if self.neutral_skip {
            return String::from("No agent output produced; nothing to process.\n");
        }

        let mut out = String::from("## Safe outputs\n\n");
        if self.items.is_empty() {
            out.push_str("No items emitted.\n");
        } else {
            out.push_str("| Line | Kind | State | Detail |\n|---|---|---|---|\n");
            for item in &self.items {
                out.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    item.line,
                    item.kind,
                    item.state,
                    item.detail.replace('|', "\\|").replace('\n', " ")
                ));
            }
        }

        if !self.previews.is_empty() {
            out.push_str("\n### Staged previews\n\n");
            for preview in &self.previews {
                out.push_str(&format!("- {}\n", preview.replace('\n', " ")));
            }
        }

        if !self.warnings.is_empty() {
            out.push_str("\n### Warnings\n\n");
            for warning in &self.warnings {
                out.push_str(&format!("- {warning}\n"));
            }
        }

        out.push_str("\n### Sanitization audit\n\n");
        out.push_str(&self.audit.render_markdown());
        out
    }
}
