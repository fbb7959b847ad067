//! Workspace-wide constants
//!
//! Job names, content budgets, and expression bounds used by both the
//! compiler and the safe-output pipeline.

/// Name of the activation (gating) job in every emitted workflow.
pub const ACTIVATION_JOB_NAME: &str = "activation";

/// Name of the main agent execution job.
pub const AGENT_JOB_NAME: &str = "agent";

/// Name of the always-run conclusion job.
pub const CONCLUSION_JOB_NAME: &str = "conclusion";

/// Output declared by the activation job once all gates pass.
pub const ACTIVATED_OUTPUT: &str = "activated";

/// Output declared by the agent job pointing at its collected ndjson output.
pub const AGENT_OUTPUT: &str = "output";

/// Default runner image for emitted jobs.
pub const DEFAULT_RUNNER: &str = "ubuntu-latest";

/// Where the agent job writes its collected ndjson output.
pub const AGENT_OUTPUT_PATH: &str = "/tmp/warden/outputs.jsonl";

/// Artifact name carrying the agent output between jobs.
pub const AGENT_OUTPUT_ARTIFACT: &str = "agent-output";

/// Maximum byte length of a single sanitized text field.
pub const MAX_CONTENT_BYTES: usize = 524_288;

/// Maximum number of lines in a single sanitized text field.
pub const MAX_CONTENT_LINES: usize = 65_000;

/// Marker appended to content cut off by the sanitizer.
pub const TRUNCATION_MARKER: &str = "\n[truncated]";

/// Maximum depth of a condition expression tree.
pub const MAX_CONDITION_DEPTH: usize = 16;

/// Maximum node count of a condition expression tree.
pub const MAX_CONDITION_NODES: usize = 256;

/// Expressions longer than this are rendered in YAML folded style.
pub const MAX_EXPRESSION_LINE_LENGTH: usize = 120;
