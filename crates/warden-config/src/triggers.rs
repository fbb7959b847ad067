//! Trigger configuration
//!
//! Parses the `on:` section of workflow front matter into typed trigger
//! definitions. The section arrives as a generic YAML tree because most
//! event keys accept either `null` (defaults) or a nested mapping.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::debug;

/// Events a command (slash) trigger listens on.
pub const COMMAND_EVENTS: [&str; 2] = ["issues", "issue_comment"];

/// Fork handling policy for `pull_request` triggers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForkPolicy {
    /// Runs from forked repositories are denied (default).
    #[default]
    Denied,
    /// Forked repositories may trigger the workflow.
    Allowed,
}

/// Configuration shared by issue-like events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventConfig {
    /// Activity types, empty meaning all types.
    pub types: Vec<String>,
}

/// `pull_request` event configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestConfig {
    pub types: Vec<String>,
    pub branches: Vec<String>,
    pub forks: ForkPolicy,
}

/// `push` event configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushConfig {
    pub branches: Vec<String>,
}

/// One `schedule` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub cron: String,
}

/// A slash-command trigger, expanded onto issue and comment events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Command name without the leading slash.
    pub name: String,
}

/// The parsed `on:` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub issues: Option<EventConfig>,
    pub issue_comment: Option<EventConfig>,
    pub pull_request: Option<PullRequestConfig>,
    pub push: Option<PushConfig>,
    pub schedule: Vec<ScheduleEntry>,
    pub workflow_dispatch: bool,
    pub command: Option<CommandConfig>,
}

impl TriggerConfig {
    /// Parse the `on:` value. Unknown event keys are rejected.
    pub fn parse(file: &str, value: &Value) -> Result<Self> {
        let mapping = match value {
            Value::Mapping(m) => m,
            Value::String(event) => {
                // `on: issues` shorthand for a single default event.
                let mut config = TriggerConfig::default();
                config.enable_event(file, event, &Value::Null)?;
                return Ok(config);
            }
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: "on".to_string(),
                    file: file.to_string(),
                    line: 0,
                    reason: "expected a mapping of event names".to_string(),
                })
            }
        };

        let mut config = TriggerConfig::default();
        for (key, event_value) in mapping {
            let event = key.as_str().ok_or_else(|| ConfigError::InvalidValue {
                field: "on".to_string(),
                file: file.to_string(),
                line: 0,
                reason: "event names must be strings".to_string(),
            })?;
            config.enable_event(file, event, event_value)?;
        }

        debug!(events = ?config.event_names(), "parsed trigger configuration");
        Ok(config)
    }

    fn enable_event(&mut self, file: &str, event: &str, value: &Value) -> Result<()> {
        match event {
            "issues" => {
                self.issues = Some(EventConfig {
                    types: parse_string_array(value, "types"),
                });
            }
            "issue_comment" => {
                self.issue_comment = Some(EventConfig {
                    types: parse_string_array(value, "types"),
                });
            }
            "pull_request" => {
                let forks = match lookup(value, "forks").and_then(Value::as_str) {
                    Some("allowed") => ForkPolicy::Allowed,
                    _ => ForkPolicy::Denied,
                };
                self.pull_request = Some(PullRequestConfig {
                    types: parse_string_array(value, "types"),
                    branches: parse_string_array(value, "branches"),
                    forks,
                });
            }
            "push" => {
                self.push = Some(PushConfig {
                    branches: parse_string_array(value, "branches"),
                });
            }
            "schedule" => {
                let entries = value.as_sequence().ok_or_else(|| ConfigError::InvalidValue {
                    field: "on.schedule".to_string(),
                    file: file.to_string(),
                    line: 0,
                    reason: "expected a list of cron entries".to_string(),
                })?;
                for entry in entries {
                    let cron = lookup(entry, "cron").and_then(Value::as_str).ok_or_else(|| {
                        ConfigError::InvalidValue {
                            field: "on.schedule".to_string(),
                            file: file.to_string(),
                            line: 0,
                            reason: "each schedule entry needs a 'cron' string".to_string(),
                        }
                    })?;
                    self.schedule.push(ScheduleEntry {
                        cron: cron.to_string(),
                    });
                }
            }
            "workflow_dispatch" => {
                self.workflow_dispatch = true;
            }
            "command" => {
                let name = match value {
                    Value::String(name) => name.clone(),
                    _ => lookup(value, "name")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .ok_or_else(|| ConfigError::InvalidValue {
                            field: "on.command".to_string(),
                            file: file.to_string(),
                            line: 0,
                            reason: "expected a command name".to_string(),
                        })?,
                };
                self.command = Some(CommandConfig { name });
            }
            other => {
                return Err(ConfigError::UnknownTriggerEvent {
                    event: other.to_string(),
                    file: file.to_string(),
                })
            }
        }
        Ok(())
    }

    /// True when at least one trigger is configured.
    pub fn has_any(&self) -> bool {
        self.issues.is_some()
            || self.issue_comment.is_some()
            || self.pull_request.is_some()
            || self.push.is_some()
            || !self.schedule.is_empty()
            || self.workflow_dispatch
            || self.command.is_some()
    }

    /// All platform event names this configuration listens on, in stable
    /// order and deduplicated. A command trigger contributes the events it
    /// expands onto.
    pub fn event_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let mut add = |name: &'static str| {
            if !names.contains(&name) {
                names.push(name);
            }
        };
        if self.issues.is_some() {
            add("issues");
        }
        if self.issue_comment.is_some() {
            add("issue_comment");
        }
        if self.command.is_some() {
            for event in COMMAND_EVENTS {
                add(event);
            }
        }
        if self.pull_request.is_some() {
            add("pull_request");
        }
        if self.push.is_some() {
            add("push");
        }
        if !self.schedule.is_empty() {
            add("schedule");
        }
        if self.workflow_dispatch {
            add("workflow_dispatch");
        }
        names
    }

    pub fn has_event(&self, name: &str) -> bool {
        self.event_names().contains(&name)
    }

    /// Whether any configured event carries actor-provided content
    /// (the events a command or lock condition must enumerate).
    pub fn has_actor_events(&self) -> bool {
        self.issues.is_some()
            || self.issue_comment.is_some()
            || self.pull_request.is_some()
            || self.command.is_some()
    }

    /// Render the `on:` section, deterministically ordered.
    pub fn render_yaml(&self) -> String {
        let mut out = String::from("on:\n");
        if let Some(issues) = &self.issues {
            render_event(&mut out, "issues", &issues.types);
        } else if self.command.is_some() {
            render_event(&mut out, "issues", &["opened".into(), "edited".into()]);
        }
        if let Some(comments) = &self.issue_comment {
            render_event(&mut out, "issue_comment", &comments.types);
        } else if self.command.is_some() {
            render_event(&mut out, "issue_comment", &["created".into()]);
        }
        if let Some(pr) = &self.pull_request {
            out.push_str("  pull_request:\n");
            render_list(&mut out, "types", &pr.types);
            render_list(&mut out, "branches", &pr.branches);
        }
        if let Some(push) = &self.push {
            out.push_str("  push:\n");
            render_list(&mut out, "branches", &push.branches);
        }
        if !self.schedule.is_empty() {
            out.push_str("  schedule:\n");
            for entry in &self.schedule {
                out.push_str(&format!("    - cron: {:?}\n", entry.cron));
            }
        }
        if self.workflow_dispatch {
            out.push_str("  workflow_dispatch:\n");
        }
        out
    }
}

fn render_event(out: &mut String, name: &str, types: &[String]) {
    if types.is_empty() {
        out.push_str(&format!("  {name}:\n"));
    } else {
        out.push_str(&format!("  {name}:\n"));
        render_list(out, "types", types);
    }
}

fn render_list(out: &mut String, key: &str, values: &[String]) {
    if values.is_empty() {
        return;
    }
    out.push_str(&format!("    {key}:\n"));
    for value in values {
        out.push_str(&format!("      - {value}\n"));
    }
}

fn lookup<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.as_mapping().and_then(|m| m.get(Value::from(key)))
}

fn parse_string_array(value: &Value, key: &str) -> Vec<String> {
    match lookup(value, key) {
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(single)) => vec![single.clone()],
        _ => Vec::new(),
    }
}
