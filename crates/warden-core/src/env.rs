//! Environment-variable naming contract
//!
//! The compiler writes these names into emitted workflow YAML and the
//! safe-output runtime reads them back, so generated handler code needs no
//! shared library at run time. Names are derived from the kind's wire name
//! uppercased, e.g. `WARDEN_CREATE_ISSUE_MAX_COUNT`.

use crate::kinds::SafeOutputKind;

/// Prefix shared by every contract variable.
pub const ENV_PREFIX: &str = "WARDEN";

/// Path to the agent's collected ndjson output artifact. Absent or empty
/// means the consuming job skips with a neutral result.
pub const AGENT_OUTPUT_VAR: &str = "WARDEN_AGENT_OUTPUT";

/// Comma-separated URI host allow-list for the sanitizer.
pub const ALLOWED_DOMAINS_VAR: &str = "WARDEN_ALLOWED_DOMAINS";

/// `owner/repo` override for cross-repository outputs; empty means the
/// current repository.
pub const TARGET_REPO_SLUG_VAR: &str = "WARDEN_TARGET_REPO_SLUG";

/// Selected execution engine id, version, and model, passed to the engine
/// adapter.
pub const ENGINE_ID_VAR: &str = "WARDEN_ENGINE_ID";
pub const ENGINE_VERSION_VAR: &str = "WARDEN_ENGINE_VERSION";
pub const ENGINE_MODEL_VAR: &str = "WARDEN_ENGINE_MODEL";

/// Comma-separated egress domains granted to the agent process.
pub const NETWORK_DOMAINS_VAR: &str = "WARDEN_NETWORK_DOMAINS";

/// Comma-separated minimum actor roles checked by the activation gate.
pub const REQUIRED_ROLES_VAR: &str = "WARDEN_REQUIRED_ROLES";

/// Builder for the per-kind variable names of the contract.
#[derive(Debug, Clone, Copy)]
pub struct EnvContract;

impl EnvContract {
    fn kind_fragment(kind: SafeOutputKind) -> String {
        kind.as_str().to_ascii_uppercase()
    }

    /// `WARDEN_<TYPE>_STAGED`: "true" when dispatch must render a preview
    /// instead of performing the action.
    pub fn staged_var(kind: SafeOutputKind) -> String {
        format!("{}_{}_STAGED", ENV_PREFIX, Self::kind_fragment(kind))
    }

    /// `WARDEN_<TYPE>_MAX_COUNT`: maximum accepted item count.
    pub fn max_count_var(kind: SafeOutputKind) -> String {
        format!("{}_{}_MAX_COUNT", ENV_PREFIX, Self::kind_fragment(kind))
    }

    /// `WARDEN_<TYPE>_TARGET`: `current`, an explicit entity number, or
    /// `*` for wildcard targeting.
    pub fn target_var(kind: SafeOutputKind) -> String {
        format!("{}_{}_TARGET", ENV_PREFIX, Self::kind_fragment(kind))
    }

    /// `WARDEN_<TYPE>_LABELS`: comma-separated label filter, empty when
    /// unfiltered.
    pub fn labels_var(kind: SafeOutputKind) -> String {
        format!("{}_{}_LABELS", ENV_PREFIX, Self::kind_fragment(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_names_substitute_kind() {
        assert_eq!(
            EnvContract::staged_var(SafeOutputKind::CreateIssue),
            "WARDEN_CREATE_ISSUE_STAGED"
        );
        assert_eq!(
            EnvContract::max_count_var(SafeOutputKind::AddLabels),
            "WARDEN_ADD_LABELS_MAX_COUNT"
        );
        assert_eq!(
            EnvContract::target_var(SafeOutputKind::AddComment),
            "WARDEN_ADD_COMMENT_TARGET"
        );
    }
}
