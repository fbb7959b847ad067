//! Permission model for emitted jobs
//!
//! Every job in an emitted workflow carries an explicit permission set;
//! nothing inherits ambient permissions. Scopes and levels mirror the
//! target platform's token scopes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A token scope a job permission set can grant.
///
/// Ordering is the stable emission order for rendered permission blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionScope {
    Actions,
    Checks,
    Contents,
    Discussions,
    Issues,
    PullRequests,
    Statuses,
}

impl PermissionScope {
    /// All scopes in emission order.
    pub const ALL: [PermissionScope; 7] = [
        PermissionScope::Actions,
        PermissionScope::Checks,
        PermissionScope::Contents,
        PermissionScope::Discussions,
        PermissionScope::Issues,
        PermissionScope::PullRequests,
        PermissionScope::Statuses,
    ];

    /// Wire name as it appears in workflow YAML.
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionScope::Actions => "actions",
            PermissionScope::Checks => "checks",
            PermissionScope::Contents => "contents",
            PermissionScope::Discussions => "discussions",
            PermissionScope::Issues => "issues",
            PermissionScope::PullRequests => "pull-requests",
            PermissionScope::Statuses => "statuses",
        }
    }

    /// Parse a wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "actions" => Some(PermissionScope::Actions),
            "checks" => Some(PermissionScope::Checks),
            "contents" => Some(PermissionScope::Contents),
            "discussions" => Some(PermissionScope::Discussions),
            "issues" => Some(PermissionScope::Issues),
            "pull-requests" => Some(PermissionScope::PullRequests),
            "statuses" => Some(PermissionScope::Statuses),
            _ => None,
        }
    }
}

impl fmt::Display for PermissionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access level for a scope. `None < Read < Write`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    None,
    Read,
    Write,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::None => "none",
            PermissionLevel::Read => "read",
            PermissionLevel::Write => "write",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(PermissionLevel::None),
            "read" => Some(PermissionLevel::Read),
            "write" => Some(PermissionLevel::Write),
            _ => None,
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An explicit, ordered permission set for one job.
///
/// Backed by a `BTreeMap` so iteration (and therefore emission) order is
/// stable for identical sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    grants: BTreeMap<PermissionScope, PermissionLevel>,
}

impl Permissions {
    /// The empty permission set (`permissions: {}` once rendered).
    pub fn none() -> Self {
        Self::default()
    }

    /// Build a set from scope/level pairs. Later duplicates take the
    /// higher of the two levels.
    pub fn from_grants(grants: &[(PermissionScope, PermissionLevel)]) -> Self {
        let mut perms = Self::default();
        for (scope, level) in grants {
            perms.grant(*scope, *level);
        }
        perms
    }

    /// Read access to every scope.
    pub fn read_all() -> Self {
        let mut perms = Self::default();
        for scope in PermissionScope::ALL {
            perms.grant(scope, PermissionLevel::Read);
        }
        perms
    }

    /// Grant a level for a scope, keeping the higher level if one is
    /// already present.
    pub fn grant(&mut self, scope: PermissionScope, level: PermissionLevel) {
        let entry = self.grants.entry(scope).or_insert(PermissionLevel::None);
        if level > *entry {
            *entry = level;
        }
    }

    /// Level granted for a scope (`None` when absent).
    pub fn level(&self, scope: PermissionScope) -> PermissionLevel {
        self.grants
            .get(&scope)
            .copied()
            .unwrap_or(PermissionLevel::None)
    }

    /// Merge another set into this one, taking the maximum level per scope.
    pub fn merge_max(&mut self, other: &Permissions) {
        for (scope, level) in &other.grants {
            self.grant(*scope, *level);
        }
    }

    /// True when every grant in `self` is at or below the corresponding
    /// grant in `other`. Used to verify least-privilege invariants.
    pub fn is_subset_of(&self, other: &Permissions) -> bool {
        self.grants
            .iter()
            .all(|(scope, level)| *level <= other.level(*scope))
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
            || self
                .grants
                .values()
                .all(|l| *l == PermissionLevel::None)
    }

    /// Iterate grants in stable scope order, skipping `none` entries.
    pub fn iter(&self) -> impl Iterator<Item = (PermissionScope, PermissionLevel)> + '_ {
        self.grants
            .iter()
            .filter(|(_, level)| **level != PermissionLevel::None)
            .map(|(scope, level)| (*scope, *level))
    }

    /// Render as a YAML block at the given indent. Always explicit:
    /// an empty set renders as `permissions: {}`.
    pub fn render_yaml(&self, indent: usize) -> String {
        let pad = " ".repeat(indent);
        if self.is_empty() {
            return format!("{pad}permissions: {{}}\n");
        }
        let mut out = format!("{pad}permissions:\n");
        for (scope, level) in self.iter() {
            out.push_str(&format!("{pad}  {scope}: {level}\n"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_keeps_higher_level() {
        let mut perms = Permissions::none();
        perms.grant(PermissionScope::Issues, PermissionLevel::Write);
        perms.grant(PermissionScope::Issues, PermissionLevel::Read);
        assert_eq!(perms.level(PermissionScope::Issues), PermissionLevel::Write);
    }

    #[test]
    fn test_merge_max() {
        let mut a = Permissions::from_grants(&[(PermissionScope::Contents, PermissionLevel::Read)]);
        let b = Permissions::from_grants(&[
            (PermissionScope::Contents, PermissionLevel::Write),
            (PermissionScope::Issues, PermissionLevel::Read),
        ]);
        a.merge_max(&b);
        assert_eq!(a.level(PermissionScope::Contents), PermissionLevel::Write);
        assert_eq!(a.level(PermissionScope::Issues), PermissionLevel::Read);
    }

    #[test]
    fn test_subset_check() {
        let small = Permissions::from_grants(&[(PermissionScope::Issues, PermissionLevel::Read)]);
        let big = Permissions::from_grants(&[
            (PermissionScope::Issues, PermissionLevel::Write),
            (PermissionScope::Contents, PermissionLevel::Read),
        ]);
        assert!(small.is_subset_of(&big));
        assert!(!big.is_subset_of(&small));
    }

    #[test]
    fn test_render_empty_is_explicit() {
        assert_eq!(Permissions::none().render_yaml(4), "    permissions: {}\n");
    }

    #[test]
    fn test_render_order_is_stable() {
        let perms = Permissions::from_grants(&[
            (PermissionScope::PullRequests, PermissionLevel::Write),
            (PermissionScope::Contents, PermissionLevel::Read),
        ]);
        let yaml = perms.render_yaml(0);
        let contents_pos = yaml.find("contents").unwrap();
        let pr_pos = yaml.find("pull-requests").unwrap();
        assert!(contents_pos < pr_pos);
    }
}
