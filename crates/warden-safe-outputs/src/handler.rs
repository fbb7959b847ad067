//! Handler dispatch surface
//!
//! Handlers perform the privileged action an item requests. The set is
//! closed: one slot per [`SafeOutputKind`], selected by an exhaustive
//! match, so adding an output kind is a compile-time change rather than a
//! runtime name lookup. This crate ships only the non-privileged
//! implementations (recording and preview); real API-backed handlers live
//! with the platform adapters.

use crate::error::SafeOutputError;
use crate::item::SafeOutputItem;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;
use warden_core::SafeOutputKind;

/// Context shared by every dispatch within one run.
#[derive(Debug, Clone, Default)]
pub struct HandlerContext {
    /// `owner/repo` override, empty for the current repository.
    pub target_repo: String,
    /// Workflow name, for attribution in handler-produced content.
    pub workflow_name: String,
}

/// Result of one successful application.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyOutcome {
    /// Real identifier of a created entity, when the kind creates one.
    pub created_id: Option<u64>,
    /// Human-readable note for the run summary.
    pub detail: String,
}

/// One privileged-action implementation.
#[async_trait]
pub trait SafeOutputHandler: Send + Sync {
    async fn apply(
        &self,
        item: &SafeOutputItem,
        ctx: &HandlerContext,
    ) -> Result<ApplyOutcome, SafeOutputError>;
}

/// The closed handler table, one slot per kind.
#[derive(Clone)]
pub struct HandlerSet {
    pub create_issue: Arc<dyn SafeOutputHandler>,
    pub add_comment: Arc<dyn SafeOutputHandler>,
    pub create_pull_request: Arc<dyn SafeOutputHandler>,
    pub update_issue: Arc<dyn SafeOutputHandler>,
    pub close_issue: Arc<dyn SafeOutputHandler>,
    pub add_labels: Arc<dyn SafeOutputHandler>,
    pub link_sub_issue: Arc<dyn SafeOutputHandler>,
    pub missing_tool: Arc<dyn SafeOutputHandler>,
}

impl HandlerSet {
    /// One handler serving every kind; the usual shape for tests and for
    /// the recording/staged runtimes.
    pub fn uniform(handler: Arc<dyn SafeOutputHandler>) -> Self {
        Self {
            create_issue: handler.clone(),
            add_comment: handler.clone(),
            create_pull_request: handler.clone(),
            update_issue: handler.clone(),
            close_issue: handler.clone(),
            add_labels: handler.clone(),
            link_sub_issue: handler.clone(),
            missing_tool: handler,
        }
    }

    /// Select the handler for a kind. Exhaustive by construction.
    pub fn for_kind(&self, kind: SafeOutputKind) -> &Arc<dyn SafeOutputHandler> {
        match kind {
            SafeOutputKind::CreateIssue => &self.create_issue,
            SafeOutputKind::AddComment => &self.add_comment,
            SafeOutputKind::CreatePullRequest => &self.create_pull_request,
            SafeOutputKind::UpdateIssue => &self.update_issue,
            SafeOutputKind::CloseIssue => &self.close_issue,
            SafeOutputKind::AddLabels => &self.add_labels,
            SafeOutputKind::LinkSubIssue => &self.link_sub_issue,
            SafeOutputKind::MissingTool => &self.missing_tool,
        }
    }
}

/// Records applied items and hands out sequential identifiers for
/// creation kinds. The default handler for tests and dry environments.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    applied: Mutex<Vec<SafeOutputItem>>,
    next_id: Mutex<u64>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self {
            applied: Mutex::new(Vec::new()),
            next_id: Mutex::new(100),
        }
    }

    pub fn applied(&self) -> Vec<SafeOutputItem> {
        self.applied.lock().expect("recording handler poisoned").clone()
    }
}

#[async_trait]
impl SafeOutputHandler for RecordingHandler {
    async fn apply(
        &self,
        item: &SafeOutputItem,
        _ctx: &HandlerContext,
    ) -> Result<ApplyOutcome, SafeOutputError> {
        self.applied
            .lock()
            .expect("recording handler poisoned")
            .push(item.clone());
        let created_id = if item.kind().registers_temporary_id() {
            let mut next = self.next_id.lock().expect("recording handler poisoned");
            *next += 1;
            Some(*next)
        } else {
            None
        };
        Ok(ApplyOutcome {
            created_id,
            detail: format!("recorded {}", item.kind()),
        })
    }
}

/// Always fails; exercises partial-failure isolation in tests.
#[derive(Debug, Default)]
pub struct FailingHandler;

#[async_trait]
impl SafeOutputHandler for FailingHandler {
    async fn apply(
        &self,
        item: &SafeOutputItem,
        _ctx: &HandlerContext,
    ) -> Result<ApplyOutcome, SafeOutputError> {
        Err(SafeOutputError::Handler {
            kind: item.kind(),
            reason: "handler unavailable".to_string(),
        })
    }
}

/// Render the human-readable preview used by staged dispatch.
pub fn render_preview(item: &SafeOutputItem) -> String {
    match item {
        SafeOutputItem::CreateIssue { title, body, labels, .. } => {
            let labels = if labels.is_empty() {
                String::new()
            } else {
                format!(" [{}]", labels.join(", "))
            };
            format!("would create issue \"{title}\"{labels}\n\n{body}")
        }
        SafeOutputItem::AddComment { body, target } => {
            let target = target
                .as_ref()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "current".to_string());
            format!("would comment on {target}\n\n{body}")
        }
        SafeOutputItem::CreatePullRequest { title, branch, .. } => {
            format!("would open pull request \"{title}\" from branch {branch}")
        }
        SafeOutputItem::UpdateIssue { target, status, .. } => {
            let target = target
                .as_ref()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "current".to_string());
            match status {
                Some(status) => format!("would update issue {target} (status: {status})"),
                None => format!("would update issue {target}"),
            }
        }
        SafeOutputItem::CloseIssue { target, .. } => {
            let target = target
                .as_ref()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "current".to_string());
            format!("would close issue {target}")
        }
        SafeOutputItem::AddLabels { target, labels } => {
            let target = target
                .as_ref()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "current".to_string());
            format!("would add labels [{}] to {target}", labels.join(", "))
        }
        SafeOutputItem::LinkSubIssue { parent, sub } => {
            format!("would link issue {sub} under {parent}")
        }
        SafeOutputItem::MissingTool { tool, reason } => match reason {
            Some(reason) => format!("agent reported missing tool '{tool}': {reason}"),
            None => format!("agent reported missing tool '{tool}'"),
        },
    }
}
