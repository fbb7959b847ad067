//! The closed set of safe-output kinds
//!
//! Each kind names one privileged action an agent may request through the
//! safe-output contract. The set is closed: adding a kind is a compile-time
//! change (new enum variant, new handler arm), never a runtime registration.

use crate::permissions::{PermissionLevel, PermissionScope, Permissions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A safe-output kind, keyed by its wire name in the ndjson stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafeOutputKind {
    CreateIssue,
    AddComment,
    CreatePullRequest,
    UpdateIssue,
    CloseIssue,
    AddLabels,
    LinkSubIssue,
    MissingTool,
}

impl SafeOutputKind {
    /// All kinds in stable order.
    pub const ALL: [SafeOutputKind; 8] = [
        SafeOutputKind::CreateIssue,
        SafeOutputKind::AddComment,
        SafeOutputKind::CreatePullRequest,
        SafeOutputKind::UpdateIssue,
        SafeOutputKind::CloseIssue,
        SafeOutputKind::AddLabels,
        SafeOutputKind::LinkSubIssue,
        SafeOutputKind::MissingTool,
    ];

    /// Wire name used in the ndjson `type` discriminator and in
    /// configuration keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            SafeOutputKind::CreateIssue => "create_issue",
            SafeOutputKind::AddComment => "add_comment",
            SafeOutputKind::CreatePullRequest => "create_pull_request",
            SafeOutputKind::UpdateIssue => "update_issue",
            SafeOutputKind::CloseIssue => "close_issue",
            SafeOutputKind::AddLabels => "add_labels",
            SafeOutputKind::LinkSubIssue => "link_sub_issue",
            SafeOutputKind::MissingTool => "missing_tool",
        }
    }

    /// Name of the emitted job handling this kind.
    pub fn job_name(&self) -> &'static str {
        match self {
            SafeOutputKind::CreateIssue => "create_issue",
            SafeOutputKind::AddComment => "add_comment",
            SafeOutputKind::CreatePullRequest => "create_pull_request",
            SafeOutputKind::UpdateIssue => "update_issue",
            SafeOutputKind::CloseIssue => "close_issue",
            SafeOutputKind::AddLabels => "add_labels",
            SafeOutputKind::LinkSubIssue => "link_sub_issue",
            SafeOutputKind::MissingTool => "missing_tool",
        }
    }

    /// Whether items of this kind may carry a `temporary_id` that later
    /// items reference.
    pub fn registers_temporary_id(&self) -> bool {
        matches!(
            self,
            SafeOutputKind::CreateIssue | SafeOutputKind::CreatePullRequest
        )
    }

    /// Default maximum item count when the workflow does not configure one.
    pub fn default_max(&self) -> usize {
        match self {
            SafeOutputKind::CreateIssue => 1,
            SafeOutputKind::AddComment => 1,
            SafeOutputKind::CreatePullRequest => 1,
            SafeOutputKind::UpdateIssue => 1,
            SafeOutputKind::CloseIssue => 1,
            SafeOutputKind::AddLabels => 3,
            SafeOutputKind::LinkSubIssue => 5,
            SafeOutputKind::MissingTool => 20,
        }
    }

    /// The minimal permission set the handling job requires. A job for one
    /// kind never receives a scope another kind would need.
    pub fn minimal_permissions(&self) -> Permissions {
        use PermissionLevel::*;
        use PermissionScope::*;
        match self {
            SafeOutputKind::CreateIssue
            | SafeOutputKind::UpdateIssue
            | SafeOutputKind::CloseIssue
            | SafeOutputKind::LinkSubIssue => {
                Permissions::from_grants(&[(Contents, Read), (Issues, Write)])
            }
            SafeOutputKind::AddComment | SafeOutputKind::AddLabels => Permissions::from_grants(&[
                (Contents, Read),
                (Issues, Write),
                (PullRequests, Write),
            ]),
            SafeOutputKind::CreatePullRequest => Permissions::from_grants(&[
                (Contents, Write),
                (PullRequests, Write),
                (Issues, Read),
            ]),
            SafeOutputKind::MissingTool => {
                Permissions::from_grants(&[(Contents, Read)])
            }
        }
    }
}

impl fmt::Display for SafeOutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SafeOutputKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SafeOutputKind::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Error returned when a `type` discriminator names no known kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown safe-output kind: {0}")]
pub struct UnknownKind(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_round_trip() {
        for kind in SafeOutputKind::ALL {
            assert_eq!(kind.as_str().parse::<SafeOutputKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_kind_is_error() {
        assert!("delete_repository".parse::<SafeOutputKind>().is_err());
    }

    #[test]
    fn test_issue_job_never_gets_pull_request_write() {
        let perms = SafeOutputKind::CreateIssue.minimal_permissions();
        assert_eq!(
            perms.level(PermissionScope::PullRequests),
            PermissionLevel::None
        );
        assert_eq!(perms.level(PermissionScope::Issues), PermissionLevel::Write);
    }

    #[test]
    fn test_missing_tool_is_report_only() {
        let perms = SafeOutputKind::MissingTool.minimal_permissions();
        assert_eq!(perms.level(PermissionScope::Issues), PermissionLevel::None);
        assert_eq!(
            perms.level(PermissionScope::Contents),
            PermissionLevel::Read
        );
    }

    #[test]
    fn test_only_creation_kinds_register_ids() {
        assert!(SafeOutputKind::CreateIssue.registers_temporary_id());
        assert!(SafeOutputKind::CreatePullRequest.registers_temporary_id());
        assert!(!SafeOutputKind::AddComment.registers_temporary_id());
        assert!(!SafeOutputKind::LinkSubIssue.registers_temporary_id());
    }
}
