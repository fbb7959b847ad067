//! Import resolution and fragment merging
//!
//! Workflow documents may import fragments (other documents) that
//! contribute triggers, tools, safe-output policy, or custom jobs. The
//! resolver is injected so tests run against in-memory documents; merging
//! is conflict-checked: two sources defining the same named entity with
//! different values is an error, never a silent override.

use crate::error::{ConfigError, Result};
use crate::spec::PartialSpec;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// Source of imported documents. Reads must be pure (same path, same
/// text) and safe for concurrent use: many documents compile in parallel
/// against one resolver.
pub trait ImportResolver: Send + Sync {
    /// Return the document text for `path`, resolved relative to the
    /// importing file where the implementation supports it.
    fn resolve(&self, from_file: &str, path: &str) -> std::io::Result<String>;
}

/// Filesystem-backed resolver; paths resolve relative to the importing
/// document's directory.
#[derive(Debug, Default)]
pub struct FsImportResolver;

impl ImportResolver for FsImportResolver {
    fn resolve(&self, from_file: &str, path: &str) -> std::io::Result<String> {
        let base = PathBuf::from(from_file);
        let resolved = match base.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join(path),
            _ => PathBuf::from(path),
        };
        std::fs::read_to_string(resolved)
    }
}

/// In-memory resolver for tests and embedded fragments.
#[derive(Debug, Default)]
pub struct MemoryImportResolver {
    documents: BTreeMap<String, String>,
}

impl MemoryImportResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, text: &str) {
        self.documents.insert(path.to_string(), text.to_string());
    }
}

impl ImportResolver for MemoryImportResolver {
    fn resolve(&self, _from_file: &str, path: &str) -> std::io::Result<String> {
        self.documents.get(path).cloned().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("no document: {path}"))
        })
    }
}

/// Merge an imported fragment into the accumulating spec.
///
/// Scalars conflict when both sides define different values; identical
/// redefinition is idempotent. List-valued fields union. Permission
/// baselines merge by maximum level.
pub fn merge_import(base: &mut PartialSpec, import: PartialSpec) -> Result<()> {
    let first = base.file.clone();
    let second = import.file.clone();

    merge_scalar(&mut base.name, import.name, "name", &first, &second)?;
    merge_scalar(
        &mut base.description,
        import.description,
        "description",
        &first,
        &second,
    )?;
    merge_scalar(&mut base.engine, import.engine, "engine", &first, &second)?;
    merge_scalar(
        &mut base.runs_on,
        import.runs_on,
        "runs-on",
        &first,
        &second,
    )?;
    merge_scalar(
        &mut base.timeout_minutes,
        import.timeout_minutes,
        "timeout-minutes",
        &first,
        &second,
    )?;
    merge_scalar(
        &mut base.lock_for_agent,
        import.lock_for_agent,
        "lock-for-agent",
        &first,
        &second,
    )?;
    merge_scalar(
        &mut base.network,
        import.network,
        "network",
        &first,
        &second,
    )?;

    // Roles union, preserving base order.
    if let Some(imported_roles) = import.roles {
        let roles = base.roles.get_or_insert_with(Vec::new);
        for role in imported_roles {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }
    }

    // Permission baselines merge by maximum level per scope.
    if let Some(imported_perms) = import.permissions {
        match &mut base.permissions {
            Some(perms) => perms.merge_max(&imported_perms),
            None => base.permissions = Some(imported_perms),
        }
    }

    merge_triggers(base, import.triggers, &first, &second)?;

    // Tools union; allowed lists union per tool.
    for (name, imported_policy) in import.tools {
        let policy = base.tools.entry(name).or_default();
        for allowed in imported_policy.allowed {
            if !policy.allowed.contains(&allowed) {
                policy.allowed.push(allowed);
            }
        }
        policy.allowed.sort();
    }

    // Safe-output kinds conflict per kind; staged and domains accumulate.
    if let Some(imported_outputs) = import.safe_outputs {
        let outputs = base.safe_outputs.get_or_insert_with(Default::default);
        for (kind, policy) in imported_outputs.policies {
            match outputs.policies.get(&kind) {
                Some(existing) if *existing != policy => {
                    return Err(ConfigError::MergeConflict {
                        entity: format!("safe-outputs.{kind}"),
                        first,
                        second,
                    })
                }
                Some(_) => {}
                None => {
                    outputs.policies.insert(kind, policy);
                }
            }
        }
        outputs.staged |= imported_outputs.staged;
        for domain in imported_outputs.allowed_domains {
            if !outputs.allowed_domains.contains(&domain) {
                outputs.allowed_domains.push(domain);
            }
        }
        merge_scalar(
            &mut outputs.target_repo,
            imported_outputs.target_repo,
            "safe-outputs.target-repo",
            &first,
            &second,
        )?;
    }

    // Env entries conflict on same key, different value.
    for (key, value) in import.env {
        match base.env.get(&key) {
            Some(existing) if *existing != value => {
                return Err(ConfigError::MergeConflict {
                    entity: format!("env.{key}"),
                    first,
                    second,
                })
            }
            Some(_) => {}
            None => {
                base.env.insert(key, value);
            }
        }
    }

    // Custom jobs conflict on same name, different definition.
    for (name, job) in import.custom_jobs {
        match base.custom_jobs.get(&name) {
            Some(existing) if *existing != job => {
                return Err(ConfigError::MergeConflict {
                    entity: format!("jobs.{name}"),
                    first,
                    second,
                })
            }
            Some(_) => {}
            None => {
                base.custom_jobs.insert(name, job);
            }
        }
    }

    // Imported instruction text appends after the main body.
    if !import.instructions.trim().is_empty() {
        if !base.instructions.is_empty() {
            base.instructions.push_str("\n\n");
        }
        base.instructions.push_str(&import.instructions);
    }

    debug!(from = %second, into = %first, "merged import");
    Ok(())
}

fn merge_scalar<T: PartialEq>(
    base: &mut Option<T>,
    import: Option<T>,
    entity: &str,
    first: &str,
    second: &str,
) -> Result<()> {
    match (base.as_ref(), import) {
        (_, None) => Ok(()),
        (None, Some(value)) => {
            *base = Some(value);
            Ok(())
        }
        (Some(existing), Some(value)) if *existing == value => Ok(()),
        (Some(_), Some(_)) => Err(ConfigError::MergeConflict {
            entity: entity.to_string(),
            first: first.to_string(),
            second: second.to_string(),
        }),
    }
}

fn merge_triggers(
    base: &mut PartialSpec,
    import: Option<crate::triggers::TriggerConfig>,
    first: &str,
    second: &str,
) -> Result<()> {
    let Some(imported) = import else {
        return Ok(());
    };
    let Some(triggers) = &mut base.triggers else {
        base.triggers = Some(imported);
        return Ok(());
    };

    merge_scalar(
        &mut triggers.issues,
        imported.issues,
        "on.issues",
        first,
        second,
    )?;
    merge_scalar(
        &mut triggers.issue_comment,
        imported.issue_comment,
        "on.issue_comment",
        first,
        second,
    )?;
    merge_scalar(
        &mut triggers.pull_request,
        imported.pull_request,
        "on.pull_request",
        first,
        second,
    )?;
    merge_scalar(&mut triggers.push, imported.push, "on.push", first, second)?;
    merge_scalar(
        &mut triggers.command,
        imported.command,
        "on.command",
        first,
        second,
    )?;
    for entry in imported.schedule {
        if !triggers.schedule.contains(&entry) {
            triggers.schedule.push(entry);
        }
    }
    triggers.workflow_dispatch |= imported.workflow_dispatch;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::RawFrontmatter;

    fn partial(file: &str, yaml: &str) -> PartialSpec {
        let raw: RawFrontmatter = serde_yaml::from_str(yaml).unwrap();
        PartialSpec::from_raw(file, raw, String::new()).unwrap()
    }

    #[test]
    fn test_merge_fills_unset_fields() {
        let mut base = partial("main.md", "on:\n  workflow_dispatch:\n");
        let import = partial("shared.md", "engine: codex\nruns-on: ubuntu-22.04\n");
        merge_import(&mut base, import).unwrap();
        assert!(base.engine.is_some());
        assert_eq!(base.runs_on.as_deref(), Some("ubuntu-22.04"));
    }

    #[test]
    fn test_identical_scalar_is_idempotent() {
        let mut base = partial("main.md", "engine: claude\n");
        let import = partial("shared.md", "engine: claude\n");
        merge_import(&mut base, import).unwrap();
    }

    #[test]
    fn test_conflicting_scalar_is_error() {
        let mut base = partial("main.md", "engine: claude\n");
        let import = partial("shared.md", "engine: codex\n");
        let err = merge_import(&mut base, import).unwrap_err();
        assert!(matches!(err, ConfigError::MergeConflict { ref entity, .. } if entity == "engine"));
    }

    #[test]
    fn test_duplicate_custom_job_is_conflict() {
        let mut base = partial("main.md", "jobs:\n  deploy:\n    runs-on: ubuntu\n");
        let import = partial("shared.md", "jobs:\n  deploy:\n    runs-on: macos\n");
        let err = merge_import(&mut base, import).unwrap_err();
        assert!(
            matches!(err, ConfigError::MergeConflict { ref entity, .. } if entity == "jobs.deploy")
        );
    }

    #[test]
    fn test_duplicate_safe_output_kind_is_conflict() {
        let mut base = partial("main.md", "safe-outputs:\n  create_issue:\n    max: 1\n");
        let import = partial("shared.md", "safe-outputs:\n  create_issue:\n    max: 2\n");
        let err = merge_import(&mut base, import).unwrap_err();
        assert!(matches!(err, ConfigError::MergeConflict { .. }));
    }

    #[test]
    fn test_tools_union() {
        let mut base = partial("main.md", "tools:\n  bash:\n    allowed: [ls]\n");
        let import = partial("shared.md", "tools:\n  bash:\n    allowed: [cat]\n  web:\n");
        merge_import(&mut base, import).unwrap();
        assert_eq!(base.tools["bash"].allowed, vec!["cat", "ls"]);
        assert!(base.tools.contains_key("web"));
    }

    #[test]
    fn test_memory_resolver() {
        let mut resolver = MemoryImportResolver::new();
        resolver.insert("shared.md", "---\nengine: claude\n---\n");
        assert!(resolver.resolve("main.md", "shared.md").is_ok());
        assert!(resolver.resolve("main.md", "missing.md").is_err());
    }
}
