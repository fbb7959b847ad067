//! Workflow compiler for Warden
//!
//! Compiles a validated [`WorkflowSpec`] into a deterministic CI workflow
//! artifact:
//! - Condition trees for job gating (trigger, actor role, fork origin,
//!   lock state), rendered only at emission time
//! - A structurally validated job dependency graph with least-privilege
//!   permissions per job
//! - A byte-stable YAML emitter, so generated artifacts are diff-reviewable
//!
//! Compilation is single-pass, synchronous, and shares no mutable state
//! between invocations; compiling many documents in parallel needs no
//! coordination.

pub mod assembler;
pub mod conditions;
pub mod emitter;
pub mod error;
pub mod graph;
pub mod job;

pub use assembler::assemble;
pub use conditions::{build_activation_condition, ConditionNode};
pub use emitter::emit;
pub use error::{CompileError, CompilerError, Result};
pub use graph::{GraphError, JobGraph};
pub use job::{Job, Step};

use tracing::info;
use warden_config::{parse_document, ImportResolver, WorkflowSpec};

/// The result of one compile invocation.
#[derive(Debug, Clone)]
pub struct CompiledWorkflow {
    pub spec: WorkflowSpec,
    pub yaml: String,
}

/// Compile a workflow document end to end: parse, assemble, emit.
pub fn compile_document(
    file: &str,
    text: &str,
    resolver: &dyn ImportResolver,
) -> std::result::Result<CompiledWorkflow, CompileError> {
    let spec = parse_document(file, text, resolver)?;
    let graph = assemble(&spec)?;
    let yaml = emit(&spec, &graph);
    info!(workflow = %spec.name, bytes = yaml.len(), "compiled workflow");
    Ok(CompiledWorkflow { spec, yaml })
}
