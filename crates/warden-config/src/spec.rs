//! Typed workflow specification
//!
//! [`RawFrontmatter`] is the closed serde schema for the YAML front matter;
//! [`PartialSpec`] is its parsed, mergeable form (main document and imports
//! share it); [`WorkflowSpec`] is the finalized, validated configuration a
//! compile invocation works from.

use crate::error::{ConfigError, ConfigReport, Result};
use crate::safe_outputs::SafeOutputsConfig;
use crate::triggers::TriggerConfig;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use tracing::debug;
use warden_core::constants::DEFAULT_RUNNER;
use warden_core::{PermissionLevel, PermissionScope, Permissions};

/// Default minimum actor permission levels for gated triggers.
pub const DEFAULT_ROLES: [&str; 3] = ["admin", "maintainer", "write"];

/// Default agent job timeout.
pub const DEFAULT_TIMEOUT_MINUTES: u64 = 30;

/// The closed front-matter schema. Unknown fields are a hard error; this
/// is a security-relevant configuration and silent misspellings must not
/// silently disable a gate.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct RawFrontmatter {
    pub name: Option<String>,
    pub description: Option<String>,
    pub on: Option<Value>,
    pub engine: Option<Value>,
    pub permissions: Option<Value>,
    pub network: Option<Value>,
    pub tools: Option<Value>,
    pub safe_outputs: Option<Value>,
    pub imports: Option<Value>,
    pub timeout_minutes: Option<u64>,
    pub runs_on: Option<String>,
    pub roles: Option<Vec<String>>,
    pub lock_for_agent: Option<bool>,
    pub env: Option<BTreeMap<String, String>>,
    pub jobs: Option<BTreeMap<String, Value>>,
}

/// Engine identifier, a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineId {
    Claude,
    Codex,
    Copilot,
    Custom,
}

impl EngineId {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineId::Claude => "claude",
            EngineId::Codex => "codex",
            EngineId::Copilot => "copilot",
            EngineId::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "claude" => Some(EngineId::Claude),
            "codex" => Some(EngineId::Codex),
            "copilot" => Some(EngineId::Copilot),
            "custom" => Some(EngineId::Custom),
            _ => None,
        }
    }
}

/// Execution engine selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub id: EngineId,
    pub version: Option<String>,
    pub model: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            id: EngineId::Claude,
            version: None,
            model: None,
        }
    }
}

impl EngineConfig {
    /// Parse `engine: claude` or the expanded mapping form.
    pub fn parse(file: &str, value: &Value) -> Result<Self> {
        match value {
            Value::String(id) => {
                let id = EngineId::parse(id).ok_or_else(|| ConfigError::InvalidValue {
                    field: "engine".to_string(),
                    file: file.to_string(),
                    line: 0,
                    reason: format!("unknown engine '{id}'"),
                })?;
                Ok(Self {
                    id,
                    version: None,
                    model: None,
                })
            }
            Value::Mapping(map) => {
                let id_value = map
                    .get(Value::from("id"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| ConfigError::InvalidValue {
                        field: "engine.id".to_string(),
                        file: file.to_string(),
                        line: 0,
                        reason: "expected an engine id".to_string(),
                    })?;
                let id = EngineId::parse(id_value).ok_or_else(|| ConfigError::InvalidValue {
                    field: "engine.id".to_string(),
                    file: file.to_string(),
                    line: 0,
                    reason: format!("unknown engine '{id_value}'"),
                })?;
                Ok(Self {
                    id,
                    version: map
                        .get(Value::from("version"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    model: map
                        .get(Value::from("model"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
            }
            _ => Err(ConfigError::InvalidValue {
                field: "engine".to_string(),
                file: file.to_string(),
                line: 0,
                reason: "expected an engine id or mapping".to_string(),
            }),
        }
    }
}

/// Network egress policy for the agent process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkPolicy {
    /// The platform's curated default allow-list.
    #[default]
    Defaults,
    /// No egress at all.
    DenyAll,
    /// Explicit allow-list: exact hosts or `*.suffix` patterns.
    Allowed(Vec<String>),
}

impl NetworkPolicy {
    pub fn parse(file: &str, value: &Value) -> Result<Self> {
        match value {
            Value::String(s) if s == "defaults" => Ok(NetworkPolicy::Defaults),
            Value::String(s) if s == "deny-all" => Ok(NetworkPolicy::DenyAll),
            Value::Mapping(map) => {
                let allowed = map
                    .get(Value::from("allowed"))
                    .and_then(Value::as_sequence)
                    .ok_or_else(|| ConfigError::InvalidValue {
                        field: "network".to_string(),
                        file: file.to_string(),
                        line: 0,
                        reason: "expected an 'allowed' list".to_string(),
                    })?;
                Ok(NetworkPolicy::Allowed(
                    allowed
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect(),
                ))
            }
            _ => Err(ConfigError::InvalidValue {
                field: "network".to_string(),
                file: file.to_string(),
                line: 0,
                reason: "expected 'defaults', 'deny-all', or an allowed-list mapping".to_string(),
            }),
        }
    }

    /// Domains this policy allows the sanitizer to keep, empty for
    /// deny-all.
    pub fn allowed_domains(&self) -> Vec<String> {
        match self {
            NetworkPolicy::Defaults => vec!["github.com".to_string()],
            NetworkPolicy::DenyAll => Vec::new(),
            NetworkPolicy::Allowed(domains) => domains.clone(),
        }
    }
}

/// Allow-list policy for one tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPolicy {
    /// Allowed invocations; empty means the tool's own defaults.
    pub allowed: Vec<String>,
}

/// Parse the `permissions:` baseline: `read-all` or a scope mapping.
pub fn parse_permissions(file: &str, value: &Value) -> Result<Permissions> {
    match value {
        Value::String(s) if s == "read-all" => Ok(Permissions::read_all()),
        Value::Mapping(map) => {
            let mut perms = Permissions::none();
            for (key, level) in map {
                let scope_name = key.as_str().unwrap_or_default();
                let scope =
                    PermissionScope::parse(scope_name).ok_or_else(|| ConfigError::InvalidValue {
                        field: format!("permissions.{scope_name}"),
                        file: file.to_string(),
                        line: 0,
                        reason: "unknown permission scope".to_string(),
                    })?;
                let level_name = level.as_str().unwrap_or_default();
                let level =
                    PermissionLevel::parse(level_name).ok_or_else(|| ConfigError::InvalidValue {
                        field: format!("permissions.{scope_name}"),
                        file: file.to_string(),
                        line: 0,
                        reason: format!("unknown permission level '{level_name}'"),
                    })?;
                perms.grant(scope, level);
            }
            Ok(perms)
        }
        _ => Err(ConfigError::InvalidValue {
            field: "permissions".to_string(),
            file: file.to_string(),
            line: 0,
            reason: "expected 'read-all' or a scope mapping".to_string(),
        }),
    }
}

/// Parse the `tools:` section: tool name to `null` or `{allowed: [..]}`.
pub fn parse_tools(file: &str, value: &Value) -> Result<BTreeMap<String, ToolPolicy>> {
    let mapping = value.as_mapping().ok_or_else(|| ConfigError::InvalidValue {
        field: "tools".to_string(),
        file: file.to_string(),
        line: 0,
        reason: "expected a mapping of tool names".to_string(),
    })?;

    let mut tools = BTreeMap::new();
    for (key, entry) in mapping {
        let name = key.as_str().ok_or_else(|| ConfigError::InvalidValue {
            field: "tools".to_string(),
            file: file.to_string(),
            line: 0,
            reason: "tool names must be strings".to_string(),
        })?;
        let allowed = match entry {
            Value::Null => Vec::new(),
            Value::Mapping(m) => m
                .get(Value::from("allowed"))
                .and_then(Value::as_sequence)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: format!("tools.{name}"),
                    file: file.to_string(),
                    line: 0,
                    reason: "expected null or a policy mapping".to_string(),
                })
            }
        };
        tools.insert(name.to_string(), ToolPolicy { allowed });
    }
    Ok(tools)
}

/// The parsed form of one document, main or imported; all fields optional
/// so fragments can contribute any subset.
#[derive(Debug, Clone, Default)]
pub struct PartialSpec {
    pub file: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub triggers: Option<TriggerConfig>,
    pub engine: Option<EngineConfig>,
    pub permissions: Option<Permissions>,
    pub network: Option<NetworkPolicy>,
    pub tools: BTreeMap<String, ToolPolicy>,
    pub safe_outputs: Option<SafeOutputsConfig>,
    pub imports: Vec<String>,
    pub timeout_minutes: Option<u64>,
    pub runs_on: Option<String>,
    pub roles: Option<Vec<String>>,
    pub lock_for_agent: Option<bool>,
    pub env: BTreeMap<String, String>,
    pub custom_jobs: BTreeMap<String, Value>,
    pub instructions: String,
}

impl PartialSpec {
    /// Build from the raw schema plus the document body.
    pub fn from_raw(file: &str, raw: RawFrontmatter, body: String) -> Result<Self> {
        let triggers = raw
            .on
            .as_ref()
            .map(|value| TriggerConfig::parse(file, value))
            .transpose()?;
        let engine = raw
            .engine
            .as_ref()
            .map(|value| EngineConfig::parse(file, value))
            .transpose()?;
        let permissions = raw
            .permissions
            .as_ref()
            .map(|value| parse_permissions(file, value))
            .transpose()?;
        let network = raw
            .network
            .as_ref()
            .map(|value| NetworkPolicy::parse(file, value))
            .transpose()?;
        let tools = raw
            .tools
            .as_ref()
            .map(|value| parse_tools(file, value))
            .transpose()?
            .unwrap_or_default();
        let safe_outputs = raw
            .safe_outputs
            .as_ref()
            .map(|value| SafeOutputsConfig::parse(file, value))
            .transpose()?;
        let imports = match raw.imports {
            None => Vec::new(),
            Some(Value::String(single)) => vec![single],
            Some(Value::Sequence(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(_) => {
                return Err(ConfigError::InvalidValue {
                    field: "imports".to_string(),
                    file: file.to_string(),
                    line: 0,
                    reason: "expected a path or list of paths".to_string(),
                })
            }
        };

        Ok(Self {
            file: file.to_string(),
            name: raw.name,
            description: raw.description,
            triggers,
            engine,
            permissions,
            network,
            tools,
            safe_outputs,
            imports,
            timeout_minutes: raw.timeout_minutes,
            runs_on: raw.runs_on,
            roles: raw.roles,
            lock_for_agent: raw.lock_for_agent,
            env: raw.env.unwrap_or_default(),
            custom_jobs: raw.jobs.unwrap_or_default(),
            instructions: body,
        })
    }

    /// Finalize into a validated [`WorkflowSpec`], applying defaults and
    /// collecting every remaining violation.
    pub fn finalize(self) -> std::result::Result<WorkflowSpec, ConfigReport> {
        let mut report = ConfigReport::new();

        let triggers = self.triggers.unwrap_or_default();
        if !triggers.has_any() {
            report.push(ConfigError::NoTriggers {
                file: self.file.clone(),
            });
        }

        let name = self.name.unwrap_or_else(|| {
            self.file
                .rsplit('/')
                .next()
                .unwrap_or(&self.file)
                .trim_end_matches(".md")
                .to_string()
        });

        let spec = WorkflowSpec {
            name,
            description: self.description,
            source_file: self.file,
            triggers,
            engine: self.engine.unwrap_or_default(),
            permissions: self.permissions.unwrap_or_else(|| {
                Permissions::from_grants(&[(PermissionScope::Contents, PermissionLevel::Read)])
            }),
            network: self.network.unwrap_or_default(),
            tools: self.tools,
            safe_outputs: self.safe_outputs.unwrap_or_default(),
            timeout_minutes: self.timeout_minutes.unwrap_or(DEFAULT_TIMEOUT_MINUTES),
            runs_on: self.runs_on.unwrap_or_else(|| DEFAULT_RUNNER.to_string()),
            roles: self
                .roles
                .unwrap_or_else(|| DEFAULT_ROLES.iter().map(|s| s.to_string()).collect()),
            lock_for_agent: self.lock_for_agent.unwrap_or(false),
            env: self.env,
            custom_jobs: self.custom_jobs,
            instructions: self.instructions,
        };

        debug!(workflow = %spec.name, "finalized workflow spec");
        report.into_result(spec)
    }
}

/// The validated configuration for one workflow document. Immutable after
/// parsing; compilation is stateless and idempotent over it.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowSpec {
    pub name: String,
    pub description: Option<String>,
    pub source_file: String,
    pub triggers: TriggerConfig,
    pub engine: EngineConfig,
    /// Permission baseline for the workflow header; individual jobs always
    /// declare their own minimal set.
    pub permissions: Permissions,
    pub network: NetworkPolicy,
    pub tools: BTreeMap<String, ToolPolicy>,
    pub safe_outputs: SafeOutputsConfig,
    pub timeout_minutes: u64,
    pub runs_on: String,
    /// Minimum actor permission levels accepted by the activation gate.
    pub roles: Vec<String>,
    pub lock_for_agent: bool,
    pub env: BTreeMap<String, String>,
    pub custom_jobs: BTreeMap<String, Value>,
    /// Free-form instruction text, passed through to the engine unmodified.
    pub instructions: String,
}

impl WorkflowSpec {
    /// Domains the sanitizer accepts: network policy plus the safe-outputs
    /// extension list, deduplicated and sorted.
    pub fn sanitizer_allowed_domains(&self) -> Vec<String> {
        let mut domains = self.network.allowed_domains();
        domains.extend(self.safe_outputs.allowed_domains.iter().cloned());
        domains.sort();
        domains.dedup();
        domains
    }
}
