//! Safe-output items
//!
//! The wire format is one JSON object per line, discriminated by `type`.
//! Fields are lenient at parse time (missing fields deserialize to their
//! defaults) so required-field checks happen in the validation stage with
//! structured errors, not serde messages.

use crate::error::SafeOutputError;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use warden_core::SafeOutputKind;

/// A reference to a platform entity: either a real numeric identifier or
/// an agent-chosen temporary-id placeholder. Accepts JSON strings and
/// numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRef(pub String);

impl EntityRef {
    /// The real identifier, when this reference is already numeric.
    pub fn as_number(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    pub fn is_placeholder(&self) -> bool {
        self.as_number().is_none()
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EntityRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RefVisitor;

        impl Visitor<'_> for RefVisitor {
            type Value = EntityRef;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string or number entity reference")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<EntityRef, E> {
                Ok(EntityRef(value.to_string()))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<EntityRef, E> {
                Ok(EntityRef(value.to_string()))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<EntityRef, E> {
                Ok(EntityRef(value.to_string()))
            }
        }

        deserializer.deserialize_any(RefVisitor)
    }
}

/// One structured output item emitted by the agent process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SafeOutputItem {
    CreateIssue {
        #[serde(default)]
        title: String,
        #[serde(default)]
        body: String,
        #[serde(default)]
        labels: Vec<String>,
        #[serde(default, rename = "temporary-id")]
        temporary_id: Option<String>,
    },
    AddComment {
        #[serde(default)]
        body: String,
        #[serde(default)]
        target: Option<EntityRef>,
    },
    CreatePullRequest {
        #[serde(default)]
        title: String,
        #[serde(default)]
        body: String,
        #[serde(default)]
        branch: String,
        #[serde(default)]
        base: Option<String>,
        #[serde(default, rename = "temporary-id")]
        temporary_id: Option<String>,
    },
    UpdateIssue {
        #[serde(default)]
        target: Option<EntityRef>,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        body: Option<String>,
        #[serde(default)]
        status: Option<String>,
    },
    CloseIssue {
        #[serde(default)]
        target: Option<EntityRef>,
        #[serde(default)]
        comment: Option<String>,
    },
    AddLabels {
        #[serde(default)]
        target: Option<EntityRef>,
        #[serde(default)]
        labels: Vec<String>,
    },
    LinkSubIssue {
        parent: EntityRef,
        sub: EntityRef,
    },
    MissingTool {
        #[serde(default)]
        tool: String,
        #[serde(default)]
        reason: Option<String>,
    },
}

impl SafeOutputItem {
    pub fn kind(&self) -> SafeOutputKind {
        match self {
            SafeOutputItem::CreateIssue { .. } => SafeOutputKind::CreateIssue,
            SafeOutputItem::AddComment { .. } => SafeOutputKind::AddComment,
            SafeOutputItem::CreatePullRequest { .. } => SafeOutputKind::CreatePullRequest,
            SafeOutputItem::UpdateIssue { .. } => SafeOutputKind::UpdateIssue,
            SafeOutputItem::CloseIssue { .. } => SafeOutputKind::CloseIssue,
            SafeOutputItem::AddLabels { .. } => SafeOutputKind::AddLabels,
            SafeOutputItem::LinkSubIssue { .. } => SafeOutputKind::LinkSubIssue,
            SafeOutputItem::MissingTool { .. } => SafeOutputKind::MissingTool,
        }
    }

    /// The temporary-id placeholder, on kinds that may register one.
    pub fn temporary_id(&self) -> Option<&str> {
        match self {
            SafeOutputItem::CreateIssue { temporary_id, .. }
            | SafeOutputItem::CreatePullRequest { temporary_id, .. } => temporary_id.as_deref(),
            _ => None,
        }
    }

    /// Check the type-specific required fields.
    pub fn validate(&self) -> Result<(), SafeOutputError> {
        let missing = |field: &str| SafeOutputError::MissingField {
            kind: self.kind(),
            field: field.to_string(),
        };
        match self {
            SafeOutputItem::CreateIssue { title, .. } if title.is_empty() => Err(missing("title")),
            SafeOutputItem::AddComment { body, .. } if body.is_empty() => Err(missing("body")),
            SafeOutputItem::CreatePullRequest { title, .. } if title.is_empty() => {
                Err(missing("title"))
            }
            SafeOutputItem::CreatePullRequest { branch, .. } if branch.is_empty() => {
                Err(missing("branch"))
            }
            SafeOutputItem::UpdateIssue {
                title: None,
                body: None,
                status: None,
                ..
            } => Err(missing("title, body, or status")),
            SafeOutputItem::AddLabels { labels, .. } if labels.is_empty() => Err(missing("labels")),
            SafeOutputItem::MissingTool { tool, .. } if tool.is_empty() => Err(missing("tool")),
            _ => Ok(()),
        }
    }

    /// Labels this item carries, for label-filter checks.
    pub fn labels(&self) -> &[String] {
        match self {
            SafeOutputItem::CreateIssue { labels, .. }
            | SafeOutputItem::AddLabels { labels, .. } => labels,
            _ => &[],
        }
    }

    /// Title this item carries, for title-filter checks.
    pub fn title(&self) -> Option<&str> {
        match self {
            SafeOutputItem::CreateIssue { title, .. }
            | SafeOutputItem::CreatePullRequest { title, .. } => Some(title),
            SafeOutputItem::UpdateIssue { title, .. } => title.as_deref(),
            _ => None,
        }
    }

    /// Mutable views of every free-text field, for the sanitizer.
    pub fn text_fields_mut(&mut self) -> Vec<&mut String> {
        let mut fields = Vec::new();
        match self {
            SafeOutputItem::CreateIssue {
                title,
                body,
                labels,
                ..
            } => {
                fields.push(title);
                fields.push(body);
                fields.extend(labels.iter_mut());
            }
            SafeOutputItem::AddComment { body, .. } => fields.push(body),
            SafeOutputItem::CreatePullRequest { title, body, .. } => {
                fields.push(title);
                fields.push(body);
            }
            SafeOutputItem::UpdateIssue { title, body, .. } => {
                fields.extend(title.iter_mut());
                fields.extend(body.iter_mut());
            }
            SafeOutputItem::CloseIssue { comment, .. } => fields.extend(comment.iter_mut()),
            SafeOutputItem::AddLabels { labels, .. } => fields.extend(labels.iter_mut()),
            SafeOutputItem::LinkSubIssue { .. } => {}
            SafeOutputItem::MissingTool { tool, reason, .. } => {
                fields.push(tool);
                fields.extend(reason.iter_mut());
            }
        }
        fields
    }

    /// Mutable views of every cross-reference field.
    pub fn reference_fields_mut(&mut self) -> Vec<&mut EntityRef> {
        let mut fields = Vec::new();
        match self {
            SafeOutputItem::AddComment { target, .. }
            | SafeOutputItem::UpdateIssue { target, .. }
            | SafeOutputItem::CloseIssue { target, .. }
            | SafeOutputItem::AddLabels { target, .. } => fields.extend(target.iter_mut()),
            SafeOutputItem::LinkSubIssue { parent, sub } => {
                fields.push(parent);
                fields.push(sub);
            }
            _ => {}
        }
        fields
    }
}

/// One successfully parsed line of the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    /// 1-based line number in the ndjson stream.
    pub line: usize,
    pub item: SafeOutputItem,
}

/// Parse an ndjson stream. Blank lines are skipped; a malformed line is a
/// per-line error carried alongside the good lines, never a stream abort.
pub fn parse_stream(text: &str) -> (Vec<ParsedLine>, Vec<SafeOutputError>) {
    let mut items = Vec::new();
    let mut errors = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        if raw.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<SafeOutputItem>(raw) {
            Ok(item) => items.push(ParsedLine { line, item }),
            Err(err) => errors.push(SafeOutputError::Malformed {
                line,
                reason: err.to_string(),
            }),
        }
    }
    (items, errors)
}
