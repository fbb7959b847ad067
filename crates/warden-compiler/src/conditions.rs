//! Condition expression trees
//!
//! Gating expressions (`if:` clauses) are built as a tagged tree and only
//! rendered to the platform's expression syntax at emission time, so the
//! gating logic is composable and testable without string matching. Trees
//! are side-effect-free; evaluation order is left-to-right and no
//! short-circuiting is assumed at compile time.

use crate::error::{CompilerError, Result};
use warden_config::{ForkPolicy, WorkflowSpec};
use warden_core::constants::{MAX_CONDITION_DEPTH, MAX_CONDITION_NODES};

/// A node of a gating expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionNode {
    /// Always true.
    True,
    /// Always false.
    False,
    /// A quoted string literal.
    Str(String),
    /// A raw platform expression (property access or function call).
    Expr(String),
    /// `github.event_name == '<name>'`.
    EventEquals(String),
    And(Vec<ConditionNode>),
    Or(Vec<ConditionNode>),
    Not(Box<ConditionNode>),
}

impl ConditionNode {
    /// Conjunction, flattening nested `And`s and dropping `True` terms.
    /// An empty conjunction is `True`.
    pub fn and_all(terms: Vec<ConditionNode>) -> ConditionNode {
        let mut flat = Vec::new();
        for term in terms {
            match term {
                ConditionNode::True => {}
                ConditionNode::And(children) => flat.extend(children),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => ConditionNode::True,
            1 => flat.remove(0),
            _ => ConditionNode::And(flat),
        }
    }

    /// Disjunction, flattening nested `Or`s and dropping `False` terms.
    /// An empty disjunction is `False`.
    pub fn or_all(terms: Vec<ConditionNode>) -> ConditionNode {
        let mut flat = Vec::new();
        for term in terms {
            match term {
                ConditionNode::False => {}
                ConditionNode::Or(children) => flat.extend(children),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => ConditionNode::False,
            1 => flat.remove(0),
            _ => ConditionNode::Or(flat),
        }
    }

    pub fn negate(self) -> ConditionNode {
        ConditionNode::Not(Box::new(self))
    }

    /// Explicit disjunction over event names. Deliberately never collapses
    /// to `True`: every permitted event stays enumerated so a future
    /// trigger addition cannot silently inherit this gate.
    pub fn event_in<S: AsRef<str>>(names: &[S]) -> ConditionNode {
        ConditionNode::or_all(
            names
                .iter()
                .map(|name| ConditionNode::EventEquals(name.as_ref().to_string()))
                .collect(),
        )
    }

    /// Tree depth, counting leaves as 1.
    pub fn depth(&self) -> usize {
        match self {
            ConditionNode::And(children) | ConditionNode::Or(children) => {
                1 + children.iter().map(ConditionNode::depth).max().unwrap_or(0)
            }
            ConditionNode::Not(child) => 1 + child.depth(),
            _ => 1,
        }
    }

    /// Total node count.
    pub fn node_count(&self) -> usize {
        match self {
            ConditionNode::And(children) | ConditionNode::Or(children) => {
                1 + children.iter().map(ConditionNode::node_count).sum::<usize>()
            }
            ConditionNode::Not(child) => 1 + child.node_count(),
            _ => 1,
        }
    }

    /// Enforce the tree bounds that keep rendered expressions reviewable.
    pub fn validate(&self) -> Result<()> {
        let depth = self.depth();
        let nodes = self.node_count();
        if depth > MAX_CONDITION_DEPTH || nodes > MAX_CONDITION_NODES {
            return Err(CompilerError::ConditionTooComplex { depth, nodes });
        }
        Ok(())
    }

    /// Render to the platform's expression syntax.
    pub fn render(&self) -> String {
        match self {
            ConditionNode::True => "true".to_string(),
            ConditionNode::False => "false".to_string(),
            ConditionNode::Str(value) => format!("'{value}'"),
            ConditionNode::Expr(expr) => expr.clone(),
            ConditionNode::EventEquals(name) => format!("github.event_name == '{name}'"),
            ConditionNode::And(children) => children
                .iter()
                .map(|c| c.render_grouped())
                .collect::<Vec<_>>()
                .join(" && "),
            ConditionNode::Or(children) => children
                .iter()
                .map(|c| c.render_grouped())
                .collect::<Vec<_>>()
                .join(" || "),
            ConditionNode::Not(child) => format!("!({})", child.render()),
        }
    }

    fn render_grouped(&self) -> String {
        match self {
            ConditionNode::And(_) | ConditionNode::Or(_) => format!("({})", self.render()),
            _ => self.render(),
        }
    }
}

/// Author associations accepted for each minimum role level.
fn associations_for_roles(roles: &[String]) -> Vec<&'static str> {
    let mut associations = Vec::new();
    fn add(associations: &mut Vec<&'static str>, assoc: &'static str) {
        if !associations.contains(&assoc) {
            associations.push(assoc);
        }
    }
    for role in roles {
        match role.as_str() {
            "admin" => add(&mut associations, "OWNER"),
            "maintainer" => add(&mut associations, "MEMBER"),
            "write" => add(&mut associations, "COLLABORATOR"),
            _ => {}
        }
    }
    if associations.is_empty() {
        // An unrecognized role list falls back to the strictest gate.
        add(&mut associations, "OWNER");
    }
    associations
}

/// Build the activation job's combined gate from the spec's trigger and
/// security policy. Each concern contributes an independent sub-tree;
/// sub-trees combine with `And`.
pub fn build_activation_condition(spec: &WorkflowSpec) -> Result<ConditionNode> {
    let events = spec.triggers.event_names();
    let mut concerns = vec![ConditionNode::event_in(&events)];

    // Fork protection: pull_request events must originate in this
    // repository unless the trigger explicitly allows forks.
    if let Some(pr) = &spec.triggers.pull_request {
        if pr.forks == ForkPolicy::Denied {
            concerns.push(ConditionNode::or_all(vec![
                ConditionNode::EventEquals("pull_request".to_string()).negate(),
                ConditionNode::Expr(
                    "github.event.pull_request.head.repo.full_name == github.repository"
                        .to_string(),
                ),
            ]));
        }
    }

    // Actor permission: events carrying actor-provided content require a
    // sufficient author association. Non-actor events (schedule, dispatch,
    // push) are enumerated explicitly rather than collapsed away.
    if spec.triggers.has_actor_events() {
        let actor_events: Vec<&str> = events
            .iter()
            .copied()
            .filter(|e| matches!(*e, "issues" | "issue_comment" | "pull_request"))
            .collect();
        let associations = associations_for_roles(&spec.roles);
        let list = associations
            .iter()
            .map(|a| format!("\"{a}\""))
            .collect::<Vec<_>>()
            .join(",");
        concerns.push(ConditionNode::or_all(vec![
            ConditionNode::event_in(&actor_events).negate(),
            ConditionNode::Expr(format!(
                "contains(fromJSON('[{list}]'), github.event.sender.author_association)"
            )),
        ]));
    }

    // Lock state: issue-driven runs do not start on an already-locked
    // conversation.
    if spec.lock_for_agent {
        concerns.push(ConditionNode::or_all(vec![
            ConditionNode::event_in(&["issues", "issue_comment"]).negate(),
            ConditionNode::Expr("github.event.issue.locked == false".to_string()),
        ]));
    }

    let condition = ConditionNode::and_all(concerns);
    condition.validate()?;
    Ok(condition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_config::{parse_document, MemoryImportResolver};

    fn spec(doc: &str) -> WorkflowSpec {
        parse_document("wf.md", doc, &MemoryImportResolver::new()).unwrap()
    }

    #[test]
    fn test_event_in_enumerates_explicitly() {
        let node = ConditionNode::event_in(&["issues", "issue_comment"]);
        assert_eq!(
            node.render(),
            "github.event_name == 'issues' || github.event_name == 'issue_comment'"
        );
    }

    #[test]
    fn test_event_in_never_collapses_to_true() {
        // Even a single event renders as an explicit comparison.
        let node = ConditionNode::event_in(&["workflow_dispatch"]);
        assert_ne!(node, ConditionNode::True);
        assert_eq!(node.render(), "github.event_name == 'workflow_dispatch'");
    }

    #[test]
    fn test_and_flattens_and_drops_true() {
        let node = ConditionNode::and_all(vec![
            ConditionNode::True,
            ConditionNode::and_all(vec![
                ConditionNode::EventEquals("issues".into()),
                ConditionNode::Expr("a == b".into()),
            ]),
        ]);
        assert_eq!(node.render(), "github.event_name == 'issues' && a == b");
    }

    #[test]
    fn test_empty_or_is_false() {
        let node = ConditionNode::or_all(vec![]);
        assert_eq!(node, ConditionNode::False);
    }

    #[test]
    fn test_grouping_of_nested_trees() {
        let node = ConditionNode::and_all(vec![
            ConditionNode::or_all(vec![
                ConditionNode::EventEquals("issues".into()),
                ConditionNode::EventEquals("issue_comment".into()),
            ]),
            ConditionNode::Expr("x".into()),
        ]);
        assert_eq!(
            node.render(),
            "(github.event_name == 'issues' || github.event_name == 'issue_comment') && x"
        );
    }

    #[test]
    fn test_bounds_enforced() {
        let mut node = ConditionNode::Expr("x".into());
        for _ in 0..MAX_CONDITION_DEPTH + 1 {
            node = node.negate();
        }
        assert!(matches!(
            node.validate(),
            Err(CompilerError::ConditionTooComplex { .. })
        ));
    }

    #[test]
    fn test_activation_condition_includes_fork_gate() {
        let spec = spec("---\non:\n  pull_request:\n    types: [opened]\n---\n");
        let condition = build_activation_condition(&spec).unwrap();
        let rendered = condition.render();
        assert!(rendered.contains("github.event_name == 'pull_request'"));
        assert!(rendered.contains("head.repo.full_name == github.repository"));
    }

    #[test]
    fn test_activation_condition_fork_gate_disabled_when_allowed() {
        let spec = spec("---\non:\n  pull_request:\n    forks: allowed\n---\n");
        let condition = build_activation_condition(&spec).unwrap();
        assert!(!condition.render().contains("head.repo.full_name"));
    }

    #[test]
    fn test_schedule_only_workflow_skips_actor_gate() {
        let spec = spec("---\non:\n  schedule:\n    - cron: '0 0 * * *'\n---\n");
        let condition = build_activation_condition(&spec).unwrap();
        let rendered = condition.render();
        assert!(rendered.contains("github.event_name == 'schedule'"));
        assert!(!rendered.contains("author_association"));
    }

    #[test]
    fn test_lock_gate_enumerates_issue_events() {
        let spec = spec("---\non:\n  issues:\nlock-for-agent: true\n---\n");
        let condition = build_activation_condition(&spec).unwrap();
        let rendered = condition.render();
        assert!(rendered.contains("github.event.issue.locked == false"));
        assert!(rendered.contains("!(github.event_name == 'issues'"));
    }
}
