//! The four-stage processing pipeline
//!
//! sanitize → validate/rate-limit → resolve references → dispatch, applied
//! to the ordered item stream. Dispatch is strictly sequential: reference
//! resolution depends on earlier items having been applied, so this loop
//! must never be parallelized. One item's failure never aborts the rest.

use crate::audit::AuditLog;
use crate::handler::{render_preview, HandlerContext, HandlerSet};
use crate::item::parse_stream;
use crate::refs::TemporaryIdMap;
use crate::sanitize::Sanitizer;
use crate::summary::{ItemState, ProcessedItem, RunSummary};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use warden_config::SafeOutputsConfig;
use warden_core::SafeOutputKind;

/// Runs the pipeline over one agent output payload.
pub struct OutputProcessor {
    config: SafeOutputsConfig,
    handlers: HandlerSet,
    ctx: HandlerContext,
    sanitizer: Sanitizer,
}

impl OutputProcessor {
    /// Build from a runtime configuration (artifact- or env-constructed;
    /// its `allowed_domains` must already carry the full allow-list).
    pub fn new(config: SafeOutputsConfig, handlers: HandlerSet) -> Self {
        let sanitizer = Sanitizer::new(config.allowed_domains.clone());
        let ctx = HandlerContext {
            target_repo: config.target_repo.clone().unwrap_or_default(),
            workflow_name: String::new(),
        };
        Self {
            config,
            handlers,
            ctx,
            sanitizer,
        }
    }

    pub fn with_context(mut self, ctx: HandlerContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// Process the agent's ndjson output. A missing or empty payload is a
    /// neutral skip, not a failure.
    pub async fn process(&self, output_text: Option<&str>) -> RunSummary {
        let mut summary = RunSummary::default();

        let text = match output_text {
            Some(text) if !text.trim().is_empty() => text,
            _ => {
                debug!("no agent output; skipping with neutral result");
                summary.neutral_skip = true;
                return summary;
            }
        };

        let (parsed, parse_errors) = parse_stream(text);
        for error in parse_errors {
            warn!(%error, "dropping malformed output line");
            summary.warnings.push(error.to_string());
        }

        let mut accepted: BTreeMap<SafeOutputKind, usize> = BTreeMap::new();
        let mut refs = TemporaryIdMap::new();
        let mut staged_ids = 0u64;

        for parsed_line in parsed {
            let line = parsed_line.line;
            let mut item = parsed_line.item;
            let kind = item.kind();

            let Some(policy) = self.config.policy(kind) else {
                summary
                    .warnings
                    .push(format!("line {line}: {kind} is not enabled for this workflow"));
                summary.items.push(ProcessedItem::new(
                    line,
                    kind,
                    ItemState::Skipped,
                    "output kind not enabled",
                ));
                continue;
            };

            // Stage 1: sanitize every free-text field.
            for field in item.text_fields_mut() {
                let (clean, entries) = self.sanitizer.sanitize(field);
                *field = clean;
                summary.audit.extend(entries);
            }

            // Stage 2a: required fields.
            if let Err(error) = item.validate() {
                summary.warnings.push(format!("line {line}: {error}"));
                summary.items.push(ProcessedItem::new(
                    line,
                    kind,
                    ItemState::Skipped,
                    &error.to_string(),
                ));
                continue;
            }

            // Stage 2b: rate limit. Excess items drop; nothing queues.
            let count = accepted.entry(kind).or_insert(0);
            if *count >= policy.max {
                warn!(%kind, line, max = policy.max, "rate limit exceeded");
                summary.warnings.push(format!(
                    "line {line}: {kind} limit of {} reached; item dropped",
                    policy.max
                ));
                summary.items.push(ProcessedItem::new(
                    line,
                    kind,
                    ItemState::RateLimited,
                    &format!("limit {} reached", policy.max),
                ));
                continue;
            }

            // Stage 2c: configured filters.
            if !policy.labels.is_empty() && !item.labels().is_empty() {
                let matches = item
                    .labels()
                    .iter()
                    .any(|label| policy.labels.contains(label));
                if !matches {
                    summary.warnings.push(format!(
                        "line {line}: {kind} labels do not satisfy the configured filter"
                    ));
                    summary.items.push(ProcessedItem::new(
                        line,
                        kind,
                        ItemState::FilteredOut,
                        "label filter not satisfied",
                    ));
                    continue;
                }
            }
            if let (Some(prefix), Some(title)) = (&policy.title_prefix, item.title()) {
                if !title.starts_with(prefix.as_str()) {
                    summary.warnings.push(format!(
                        "line {line}: {kind} title does not carry prefix '{prefix}'"
                    ));
                    summary.items.push(ProcessedItem::new(
                        line,
                        kind,
                        ItemState::FilteredOut,
                        "title filter not satisfied",
                    ));
                    continue;
                }
            }

            *count += 1;

            // Stage 3: resolve cross-references. Forward references fail
            // here because their targets have not been applied yet.
            let mut unresolved = None;
            for reference in item.reference_fields_mut() {
                if let Err(error) = refs.resolve(reference) {
                    unresolved = Some(error);
                    break;
                }
            }
            if let Some(error) = unresolved {
                summary.warnings.push(format!("line {line}: {error}"));
                summary.items.push(ProcessedItem::new(
                    line,
                    kind,
                    ItemState::UnresolvedReference,
                    &error.to_string(),
                ));
                continue;
            }

            // Stage 4: dispatch, in emission order.
            if self.config.staged {
                let preview = render_preview(&item);
                if let Some(placeholder) = item.temporary_id() {
                    // Staged creations register a synthetic id so later
                    // previews in the same run still resolve.
                    staged_ids += 1;
                    if let Err(error) = refs.register(placeholder, "staged", staged_ids) {
                        summary.warnings.push(format!("line {line}: {error}"));
                    }
                }
                summary.previews.push(preview);
                summary.items.push(ProcessedItem::new(
                    line,
                    kind,
                    ItemState::StagedPreview,
                    "staged: preview only",
                ));
                continue;
            }

            match self.handlers.for_kind(kind).apply(&item, &self.ctx).await {
                Ok(outcome) => {
                    if let (Some(placeholder), Some(id)) = (item.temporary_id(), outcome.created_id)
                    {
                        if let Err(error) = refs.register(placeholder, &self.ctx.target_repo, id) {
                            summary.warnings.push(format!("line {line}: {error}"));
                        }
                    }
                    summary.items.push(ProcessedItem::new(
                        line,
                        kind,
                        ItemState::Applied,
                        &outcome.detail,
                    ));
                }
                Err(error) => {
                    warn!(%kind, line, %error, "handler failed; continuing with remaining items");
                    summary.warnings.push(format!("line {line}: {error}"));
                    summary.items.push(ProcessedItem::new(
                        line,
                        kind,
                        ItemState::HandlerFailed,
                        &error.to_string(),
                    ));
                }
            }
        }

        debug!(
            items = summary.items.len(),
            warnings = summary.warnings.len(),
            "pipeline finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{FailingHandler, RecordingHandler};
    use crate::item::SafeOutputItem;
    use std::sync::Arc;

    fn config(yaml: &str) -> SafeOutputsConfig {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
        SafeOutputsConfig::parse("wf.md", &value).unwrap()
    }

    fn processor(yaml: &str) -> (OutputProcessor, Arc<RecordingHandler>) {
        let handler = Arc::new(RecordingHandler::new());
        let processor = OutputProcessor::new(
            config(yaml),
            HandlerSet::uniform(handler.clone() as Arc<dyn crate::handler::SafeOutputHandler>),
        );
        (processor, handler)
    }

    #[tokio::test]
    async fn test_neutral_skip_on_empty_output() {
        let (processor, _) = processor("add_comment:\n");
        let summary = processor.process(None).await;
        assert!(summary.neutral_skip);
        let summary = processor.process(Some("  \n")).await;
        assert!(summary.neutral_skip);
    }

    #[tokio::test]
    async fn test_rate_limit_property() {
        // Max 2, submit 5: exactly 2 applied, 3 rate-limited.
        let (processor, handler) = processor("add_comment:\n  max: 2\n");
        let stream = (0..5)
            .map(|i| format!("{{\"type\":\"add_comment\",\"body\":\"comment {i}\"}}"))
            .collect::<Vec<_>>()
            .join("\n");
        let summary = processor.process(Some(&stream)).await;
        assert_eq!(summary.count(ItemState::Applied), 2);
        assert_eq!(summary.count(ItemState::RateLimited), 3);
        assert_eq!(handler.applied().len(), 2);
    }

    #[tokio::test]
    async fn test_cross_reference_scenario() {
        let (processor, _) = processor("create_issue:\nlink_sub_issue:\n");
        let stream = "{\"type\":\"create_issue\",\"title\":\"Parent\",\"temporary-id\":\"A\"}\n{\"type\":\"link_sub_issue\",\"parent\":\"A\",\"sub\":5}";
        let summary = processor.process(Some(stream)).await;
        assert_eq!(summary.count(ItemState::Applied), 2);
        // The link item dispatched with the parent's real identifier.
        let states: Vec<_> = summary.items.iter().map(|i| i.state).collect();
        assert_eq!(states, vec![ItemState::Applied, ItemState::Applied]);
    }

    #[tokio::test]
    async fn test_forward_reference_fails() {
        let (processor, _) = processor("create_issue:\nlink_sub_issue:\n");
        let stream = "{\"type\":\"link_sub_issue\",\"parent\":\"A\",\"sub\":5}\n{\"type\":\"create_issue\",\"title\":\"Parent\",\"temporary-id\":\"A\"}";
        let summary = processor.process(Some(stream)).await;
        assert_eq!(summary.items[0].state, ItemState::UnresolvedReference);
        assert_eq!(summary.items[1].state, ItemState::Applied);
    }

    #[tokio::test]
    async fn test_handler_failure_is_isolated() {
        let recording = Arc::new(RecordingHandler::new());
        let mut handlers =
            HandlerSet::uniform(recording.clone() as Arc<dyn crate::handler::SafeOutputHandler>);
        handlers.create_issue = Arc::new(FailingHandler);
        let processor = OutputProcessor::new(config("create_issue:\nadd_comment:\n"), handlers);

        let stream = "{\"type\":\"create_issue\",\"title\":\"T\"}\n{\"type\":\"add_comment\",\"body\":\"still runs\"}";
        let summary = processor.process(Some(stream)).await;
        assert_eq!(summary.items[0].state, ItemState::HandlerFailed);
        assert_eq!(summary.items[1].state, ItemState::Applied);
        assert_eq!(recording.applied().len(), 1);
    }

    #[tokio::test]
    async fn test_staged_mode_previews_without_mutation() {
        let (processor, handler) = processor("staged: true\ncreate_issue:\nlink_sub_issue:\n");
        let stream = "{\"type\":\"create_issue\",\"title\":\"T\",\"temporary-id\":\"A\"}\n{\"type\":\"link_sub_issue\",\"parent\":\"A\",\"sub\":2}";
        let summary = processor.process(Some(stream)).await;
        assert_eq!(summary.count(ItemState::StagedPreview), 2);
        assert_eq!(summary.previews.len(), 2);
        assert!(handler.applied().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_kind_is_skipped() {
        let (processor, handler) = processor("add_comment:\n");
        let stream = "{\"type\":\"create_issue\",\"title\":\"T\"}";
        let summary = processor.process(Some(stream)).await;
        assert_eq!(summary.items[0].state, ItemState::Skipped);
        assert!(handler.applied().is_empty());
    }

    #[tokio::test]
    async fn test_label_filter() {
        let (processor, _) = processor("create_issue:\n  max: 5\n  labels: [triage]\n");
        let stream = "{\"type\":\"create_issue\",\"title\":\"A\",\"labels\":[\"triage\"]}\n{\"type\":\"create_issue\",\"title\":\"B\",\"labels\":[\"other\"]}";
        let summary = processor.process(Some(stream)).await;
        assert_eq!(summary.items[0].state, ItemState::Applied);
        assert_eq!(summary.items[1].state, ItemState::FilteredOut);
    }

    #[tokio::test]
    async fn test_sanitization_feeds_audit_trail() {
        let (processor, handler) = processor("add_comment:\n");
        let stream = "{\"type\":\"add_comment\",\"body\":\"fixes #9 cc @octocat\"}";
        let summary = processor.process(Some(stream)).await;
        assert!(!summary.audit.is_empty());
        match &handler.applied()[0] {
            SafeOutputItem::AddComment { body, .. } => {
                assert!(body.contains("`fixes #9`"));
                assert!(body.contains("`@octocat`"));
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_line_does_not_abort_stream() {
        let (processor, _) = processor("add_comment:\n");
        let stream = "this is not json\n{\"type\":\"add_comment\",\"body\":\"ok\"}";
        let summary = processor.process(Some(stream)).await;
        assert_eq!(summary.count(ItemState::Applied), 1);
        assert_eq!(summary.warnings.len(), 1);
    }
}
