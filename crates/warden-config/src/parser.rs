//! Top-level document parsing
//!
//! `parse_document` is the public entry point: document text in, validated
//! [`WorkflowSpec`] (or a [`ConfigReport`]) out. Parsing is total and
//! deterministic for a given input tree; the only I/O happens inside the
//! injected [`ImportResolver`].

use crate::error::{ConfigError, ConfigReport};
use crate::frontmatter::{self, Frontmatter};
use crate::imports::{merge_import, ImportResolver};
use crate::spec::{PartialSpec, RawFrontmatter, WorkflowSpec};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static UNKNOWN_FIELD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"unknown field `([^`]+)`").unwrap());

/// Parse a single document into its mergeable partial form.
pub fn parse_partial(file: &str, text: &str) -> Result<PartialSpec, ConfigError> {
    let fm = frontmatter::extract(file, text)?;
    let raw = deserialize_frontmatter(file, &fm)?;
    PartialSpec::from_raw(file, raw, fm.body)
}

fn deserialize_frontmatter(file: &str, fm: &Frontmatter) -> Result<RawFrontmatter, ConfigError> {
    if fm.yaml.trim().is_empty() {
        return Ok(RawFrontmatter::default());
    }

    let deserializer = serde_yaml::Deserializer::from_str(&fm.yaml);
    match serde_path_to_error::deserialize::<_, RawFrontmatter>(deserializer) {
        Ok(raw) => Ok(raw),
        Err(err) => {
            let line = err
                .inner()
                .location()
                .map(|loc| fm.document_line(loc.line()))
                .unwrap_or(fm.yaml_start_line);
            let message = err.inner().to_string();
            if let Some(captures) = UNKNOWN_FIELD_RE.captures(&message) {
                Err(ConfigError::UnknownField {
                    field: captures[1].to_string(),
                    file: file.to_string(),
                    line,
                })
            } else {
                Err(ConfigError::MalformedFrontmatter {
                    file: file.to_string(),
                    line,
                    reason: message,
                })
            }
        }
    }
}

/// Parse a document, resolve its imports recursively, merge, and finalize.
///
/// Import resolution is depth-first in declaration order with cycle
/// detection; a fragment imported twice through different paths merges
/// once (identical redefinition is idempotent by the merge rules).
pub fn parse_document(
    file: &str,
    text: &str,
    resolver: &dyn ImportResolver,
) -> Result<WorkflowSpec, ConfigReport> {
    let mut root = parse_partial(file, text).map_err(ConfigReport::from)?;

    let mut chain = vec![file.to_string()];
    let mut visited = vec![file.to_string()];
    let imports = root.imports.clone();
    for path in imports {
        resolve_into(&mut root, file, &path, resolver, &mut chain, &mut visited)
            .map_err(ConfigReport::from)?;
    }

    debug!(file, imports = visited.len() - 1, "document parsed");
    root.finalize()
}

fn resolve_into(
    root: &mut PartialSpec,
    from_file: &str,
    path: &str,
    resolver: &dyn ImportResolver,
    chain: &mut Vec<String>,
    visited: &mut Vec<String>,
) -> Result<(), ConfigError> {
    if chain.iter().any(|seen| seen == path) {
        let mut cycle = chain.clone();
        cycle.push(path.to_string());
        return Err(ConfigError::ImportCycle {
            chain: cycle.join(" -> "),
        });
    }
    if visited.iter().any(|seen| seen == path) {
        // Diamond import: already merged once.
        return Ok(());
    }

    let text =
        resolver
            .resolve(from_file, path)
            .map_err(|err| ConfigError::UnresolvedImport {
                path: path.to_string(),
                file: from_file.to_string(),
                reason: err.to_string(),
            })?;

    let fragment = parse_partial(path, &text)?;
    let nested = fragment.imports.clone();

    chain.push(path.to_string());
    visited.push(path.to_string());
    for nested_path in nested {
        resolve_into(root, path, &nested_path, resolver, chain, visited)?;
    }
    chain.pop();

    merge_import(root, fragment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imports::MemoryImportResolver;
    use warden_core::SafeOutputKind;

    fn resolver() -> MemoryImportResolver {
        MemoryImportResolver::new()
    }

    #[test]
    fn test_parse_minimal_document() {
        let doc = "---\nname: triage\non:\n  issues:\n    types: [opened]\nsafe-outputs:\n  add_comment:\n---\n\nTriage the issue.\n";
        let spec = parse_document("triage.md", doc, &resolver()).unwrap();
        assert_eq!(spec.name, "triage");
        assert!(spec.safe_outputs.is_enabled(SafeOutputKind::AddComment));
        assert_eq!(spec.instructions.trim(), "Triage the issue.");
    }

    #[test]
    fn test_unknown_field_names_field_file_line() {
        let doc = "---\nname: demo\nenginee: copilot\non:\n  issues:\n---\nbody\n";
        let err = parse_document("wf.md", doc, &resolver()).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("enginee"), "report was: {text}");
        assert!(text.contains("wf.md"));
        assert!(text.contains(":3"));
    }

    #[test]
    fn test_import_merging() {
        let mut resolver = resolver();
        resolver.insert(
            "shared.md",
            "---\nsafe-outputs:\n  create_issue:\n    max: 2\n---\nShared guidance.\n",
        );
        let doc = "---\nname: demo\non:\n  workflow_dispatch:\nimports:\n  - shared.md\n---\nMain body.\n";
        let spec = parse_document("wf.md", doc, &resolver).unwrap();
        assert!(spec.safe_outputs.is_enabled(SafeOutputKind::CreateIssue));
        assert!(spec.instructions.contains("Main body."));
        assert!(spec.instructions.contains("Shared guidance."));
    }

    #[test]
    fn test_import_cycle_detected() {
        let mut resolver = resolver();
        resolver.insert("a.md", "---\nimports: [b.md]\n---\n");
        resolver.insert("b.md", "---\nimports: [a.md]\n---\n");
        let doc = "---\non:\n  workflow_dispatch:\nimports: [a.md]\n---\n";
        let err = parse_document("a.md", doc, &resolver).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_diamond_import_is_not_a_conflict() {
        let mut resolver = resolver();
        resolver.insert("base.md", "---\nengine: claude\n---\n");
        resolver.insert("left.md", "---\nimports: [base.md]\n---\n");
        resolver.insert("right.md", "---\nimports: [base.md]\n---\n");
        let doc = "---\non:\n  workflow_dispatch:\nimports: [left.md, right.md]\n---\n";
        let spec = parse_document("wf.md", doc, &resolver).unwrap();
        assert_eq!(spec.engine.id, crate::spec::EngineId::Claude);
    }

    #[test]
    fn test_conflicting_imports_reported() {
        let mut resolver = resolver();
        resolver.insert("a.md", "---\njobs:\n  deploy:\n    runs-on: ubuntu\n---\n");
        resolver.insert("b.md", "---\njobs:\n  deploy:\n    runs-on: macos\n---\n");
        let doc = "---\non:\n  workflow_dispatch:\nimports: [a.md, b.md]\n---\n";
        let err = parse_document("wf.md", doc, &resolver).unwrap_err();
        assert!(err.to_string().contains("jobs.deploy"));
    }

    #[test]
    fn test_unresolved_import() {
        let doc = "---\non:\n  workflow_dispatch:\nimports: [missing.md]\n---\n";
        let err = parse_document("wf.md", doc, &resolver()).unwrap_err();
        assert!(err.to_string().contains("missing.md"));
    }

    #[test]
    fn test_parse_is_deterministic() {
        let doc = "---\nname: demo\non:\n  issues:\nsafe-outputs:\n  create_issue:\n---\nBody.\n";
        let first = parse_document("wf.md", doc, &resolver()).unwrap();
        let second = parse_document("wf.md", doc, &resolver()).unwrap();
        assert_eq!(first, second);
    }
}
