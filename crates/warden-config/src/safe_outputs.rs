//! Safe-outputs policy
//!
//! The `safe-outputs:` section of the front matter declares which privileged
//! actions the agent may request, and under what limits. The same
//! configuration type has two constructors, one from a serialized artifact
//! and one from an explicit map of environment-contract signals, so no code
//! path depends on ambient process state.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;
use warden_core::env::{EnvContract, ALLOWED_DOMAINS_VAR, TARGET_REPO_SLUG_VAR};
use warden_core::SafeOutputKind;

/// How a safe-output job resolves its target entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetMode {
    /// The entity that triggered the workflow.
    #[default]
    Current,
    /// An explicit entity number.
    Explicit(u64),
    /// Any entity the agent names.
    Wildcard,
}

impl TargetMode {
    /// Parse the wire form used in front matter and the env contract.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "" | "current" => Some(TargetMode::Current),
            "*" => Some(TargetMode::Wildcard),
            number => number.parse::<u64>().ok().map(TargetMode::Explicit),
        }
    }
}

impl fmt::Display for TargetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetMode::Current => f.write_str("current"),
            TargetMode::Explicit(n) => write!(f, "{n}"),
            TargetMode::Wildcard => f.write_str("*"),
        }
    }
}

/// Per-kind policy limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct OutputPolicy {
    /// Maximum accepted item count for this kind.
    pub max: usize,
    /// Target-resolution mode.
    #[serde(default)]
    pub target: TargetMode,
    /// Label filter: when non-empty, items must target an entity carrying
    /// at least one of these labels.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Title filter: when set, created entities must use this prefix.
    #[serde(default)]
    pub title_prefix: Option<String>,
    /// `owner/repo` override for cross-repository outputs.
    #[serde(default)]
    pub target_repo: Option<String>,
}

impl OutputPolicy {
    /// Defaults for a kind enabled without an explicit policy block.
    pub fn defaults_for(kind: SafeOutputKind) -> Self {
        Self {
            max: kind.default_max(),
            target: TargetMode::Current,
            labels: Vec::new(),
            title_prefix: None,
            target_repo: None,
        }
    }
}

/// The parsed `safe-outputs:` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafeOutputsConfig {
    /// Enabled kinds with their limits, in stable kind order.
    #[serde(default)]
    pub policies: BTreeMap<SafeOutputKind, OutputPolicy>,
    /// When true every kind dispatches as a preview, performing no mutation.
    #[serde(default)]
    pub staged: bool,
    /// Extra URI hosts the sanitizer accepts beyond the platform defaults.
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    /// Global `owner/repo` override; per-kind policies may refine it.
    #[serde(default)]
    pub target_repo: Option<String>,
}

impl SafeOutputsConfig {
    /// Parse the front-matter `safe-outputs:` value.
    pub fn parse(file: &str, value: &Value) -> Result<Self> {
        let mapping = value.as_mapping().ok_or_else(|| ConfigError::InvalidValue {
            field: "safe-outputs".to_string(),
            file: file.to_string(),
            line: 0,
            reason: "expected a mapping of output kinds".to_string(),
        })?;

        let mut config = SafeOutputsConfig::default();
        for (key, entry) in mapping {
            let key = key.as_str().ok_or_else(|| ConfigError::InvalidValue {
                field: "safe-outputs".to_string(),
                file: file.to_string(),
                line: 0,
                reason: "keys must be strings".to_string(),
            })?;

            match key {
                "staged" => {
                    config.staged = entry.as_bool().ok_or_else(|| ConfigError::InvalidValue {
                        field: "safe-outputs.staged".to_string(),
                        file: file.to_string(),
                        line: 0,
                        reason: "expected a boolean".to_string(),
                    })?;
                }
                "allowed-domains" => {
                    let domains =
                        entry.as_sequence().ok_or_else(|| ConfigError::InvalidValue {
                            field: "safe-outputs.allowed-domains".to_string(),
                            file: file.to_string(),
                            line: 0,
                            reason: "expected a list of domains".to_string(),
                        })?;
                    config.allowed_domains = domains
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect();
                }
                "target-repo" => {
                    config.target_repo = entry.as_str().map(str::to_string);
                }
                kind_name => {
                    let kind: SafeOutputKind =
                        kind_name.parse().map_err(|_| ConfigError::InvalidValue {
                            field: format!("safe-outputs.{kind_name}"),
                            file: file.to_string(),
                            line: 0,
                            reason: "unknown safe-output kind".to_string(),
                        })?;
                    let policy = Self::parse_policy(file, kind, entry)?;
                    config.policies.insert(kind, policy);
                }
            }
        }

        config.validate(file)?;
        debug!(kinds = ?config.enabled_kinds(), staged = config.staged, "parsed safe-outputs policy");
        Ok(config)
    }

    fn parse_policy(file: &str, kind: SafeOutputKind, value: &Value) -> Result<OutputPolicy> {
        if value.is_null() {
            return Ok(OutputPolicy::defaults_for(kind));
        }

        let mut policy = OutputPolicy::defaults_for(kind);
        let mapping = value.as_mapping().ok_or_else(|| ConfigError::InvalidValue {
            field: format!("safe-outputs.{kind}"),
            file: file.to_string(),
            line: 0,
            reason: "expected null or a policy mapping".to_string(),
        })?;

        for (key, entry) in mapping {
            let key = key.as_str().unwrap_or_default();
            match key {
                "max" => {
                    policy.max =
                        entry
                            .as_u64()
                            .map(|v| v as usize)
                            .ok_or_else(|| ConfigError::InvalidValue {
                                field: format!("safe-outputs.{kind}.max"),
                                file: file.to_string(),
                                line: 0,
                                reason: "expected a positive integer".to_string(),
                            })?;
                }
                "target" => {
                    let raw = match entry {
                        Value::Number(n) => n.to_string(),
                        Value::String(s) => s.clone(),
                        _ => String::new(),
                    };
                    policy.target =
                        TargetMode::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                            field: format!("safe-outputs.{kind}.target"),
                            file: file.to_string(),
                            line: 0,
                            reason: "expected 'current', '*', or an entity number".to_string(),
                        })?;
                }
                "labels" => {
                    policy.labels = entry
                        .as_sequence()
                        .map(|items| {
                            items
                                .iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default();
                }
                "title-prefix" => {
                    policy.title_prefix = entry.as_str().map(str::to_string);
                }
                "target-repo" => {
                    policy.target_repo = entry.as_str().map(str::to_string);
                }
                other => {
                    return Err(ConfigError::UnknownField {
                        field: format!("safe-outputs.{kind}.{other}"),
                        file: file.to_string(),
                        line: 0,
                    })
                }
            }
        }
        Ok(policy)
    }

    fn validate(&self, file: &str) -> Result<()> {
        for (kind, policy) in &self.policies {
            if policy.max == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("safe-outputs.{kind}.max"),
                    file: file.to_string(),
                    line: 0,
                    reason: "max must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Reconstruct a configuration from its serialized artifact form.
    pub fn from_artifact_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ConfigError::Invalid {
            file: "<artifact>".to_string(),
            reason: format!("invalid safe-outputs artifact: {e}"),
        })
    }

    /// Serialize to the artifact form consumed by [`Self::from_artifact_json`].
    pub fn to_artifact_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Reconstruct a configuration from an explicit map of
    /// environment-contract signals. The presence of a kind's
    /// `..._MAX_COUNT` variable enables that kind.
    pub fn from_env_map(vars: &BTreeMap<String, String>) -> Result<Self> {
        let mut config = SafeOutputsConfig::default();

        for kind in SafeOutputKind::ALL {
            let max_var = EnvContract::max_count_var(kind);
            let Some(raw_max) = vars.get(&max_var) else {
                continue;
            };
            let max = raw_max.parse::<usize>().map_err(|_| ConfigError::Invalid {
                file: "<env>".to_string(),
                reason: format!("{max_var} is not an integer: {raw_max}"),
            })?;

            let mut policy = OutputPolicy::defaults_for(kind);
            policy.max = max;

            if let Some(raw_target) = vars.get(&EnvContract::target_var(kind)) {
                policy.target = TargetMode::parse(raw_target).ok_or_else(|| ConfigError::Invalid {
                    file: "<env>".to_string(),
                    reason: format!("invalid target mode: {raw_target}"),
                })?;
            }
            if let Some(raw_labels) = vars.get(&EnvContract::labels_var(kind)) {
                policy.labels = raw_labels
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            if vars
                .get(&EnvContract::staged_var(kind))
                .map(|v| v == "true")
                .unwrap_or(false)
            {
                config.staged = true;
            }
            config.policies.insert(kind, policy);
        }

        if let Some(domains) = vars.get(ALLOWED_DOMAINS_VAR) {
            config.allowed_domains = domains
                .split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(slug) = vars.get(TARGET_REPO_SLUG_VAR) {
            if !slug.is_empty() {
                config.target_repo = Some(slug.clone());
            }
        }

        Ok(config)
    }

    /// The environment-contract variables for one enabled kind, as the
    /// compiler emits them and [`Self::from_env_map`] reads them back.
    pub fn env_contract(&self, kind: SafeOutputKind) -> Vec<(String, String)> {
        let Some(policy) = self.policies.get(&kind) else {
            return Vec::new();
        };
        let mut vars = vec![
            (
                EnvContract::staged_var(kind),
                if self.staged { "true" } else { "false" }.to_string(),
            ),
            (EnvContract::max_count_var(kind), policy.max.to_string()),
            (EnvContract::target_var(kind), policy.target.to_string()),
        ];
        if !policy.labels.is_empty() {
            vars.push((EnvContract::labels_var(kind), policy.labels.join(",")));
        }
        vars
    }

    pub fn is_enabled(&self, kind: SafeOutputKind) -> bool {
        self.policies.contains_key(&kind)
    }

    pub fn policy(&self, kind: SafeOutputKind) -> Option<&OutputPolicy> {
        self.policies.get(&kind)
    }

    /// Enabled kinds in stable order.
    pub fn enabled_kinds(&self) -> Vec<SafeOutputKind> {
        self.policies.keys().copied().collect()
    }

    pub fn has_any(&self) -> bool {
        !self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> SafeOutputsConfig {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        SafeOutputsConfig::parse("wf.md", &value).unwrap()
    }

    #[test]
    fn test_parse_defaults_for_null_kind() {
        let config = parse("create_issue:\n");
        let policy = config.policy(SafeOutputKind::CreateIssue).unwrap();
        assert_eq!(policy.max, 1);
        assert_eq!(policy.target, TargetMode::Current);
    }

    #[test]
    fn test_parse_policy_fields() {
        let config = parse(
            "add_comment:\n  max: 3\n  target: '*'\n  labels: [triage]\nstaged: true\nallowed-domains: [example.com]\n",
        );
        let policy = config.policy(SafeOutputKind::AddComment).unwrap();
        assert_eq!(policy.max, 3);
        assert_eq!(policy.target, TargetMode::Wildcard);
        assert_eq!(policy.labels, vec!["triage"]);
        assert!(config.staged);
        assert_eq!(config.allowed_domains, vec!["example.com"]);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let value: Value = serde_yaml::from_str("delete_everything:\n").unwrap();
        assert!(SafeOutputsConfig::parse("wf.md", &value).is_err());
    }

    #[test]
    fn test_unknown_policy_field_rejected() {
        let value: Value = serde_yaml::from_str("create_issue:\n  maxx: 2\n").unwrap();
        let err = SafeOutputsConfig::parse("wf.md", &value).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownField { ref field, .. } if field.contains("maxx")));
    }

    #[test]
    fn test_zero_max_rejected() {
        let value: Value = serde_yaml::from_str("create_issue:\n  max: 0\n").unwrap();
        assert!(SafeOutputsConfig::parse("wf.md", &value).is_err());
    }

    #[test]
    fn test_artifact_round_trip() {
        let config = parse("create_issue:\n  max: 2\nadd_labels:\nstaged: true\n");
        let json = config.to_artifact_json();
        let restored = SafeOutputsConfig::from_artifact_json(&json).unwrap();
        assert_eq!(config, restored);
    }

    #[test]
    fn test_env_map_round_trip() {
        let config = parse("create_issue:\n  max: 2\n  labels: [bot, triage]\nstaged: true\n");
        let mut vars = BTreeMap::new();
        for (name, value) in config.env_contract(SafeOutputKind::CreateIssue) {
            vars.insert(name, value);
        }
        let restored = SafeOutputsConfig::from_env_map(&vars).unwrap();
        assert_eq!(
            restored.policy(SafeOutputKind::CreateIssue),
            config.policy(SafeOutputKind::CreateIssue)
        );
        assert_eq!(restored.staged, config.staged);
    }

    #[test]
    fn test_env_map_absent_kind_disabled() {
        let vars = BTreeMap::new();
        let config = SafeOutputsConfig::from_env_map(&vars).unwrap();
        assert!(!config.has_any());
    }

    #[test]
    fn test_target_mode_parse() {
        assert_eq!(TargetMode::parse("current"), Some(TargetMode::Current));
        assert_eq!(TargetMode::parse("*"), Some(TargetMode::Wildcard));
        assert_eq!(TargetMode::parse("42"), Some(TargetMode::Explicit(42)));
        assert_eq!(TargetMode::parse("later"), None);
    }
}
