//! Configuration parser for Warden agentic workflows
//!
//! Turns a workflow document (YAML front matter plus free-form
//! instruction text) into a validated [`WorkflowSpec`]:
//! - Front matter extraction with document-line error mapping
//! - Closed schema: unknown fields fail with field, file, and line
//! - Typed triggers, engine selection, network policy, and tool allow-lists
//! - Safe-outputs policy with artifact and environment-map constructors
//! - Recursive import resolution with cycle detection and conflict-checked
//!   merging

pub mod error;
pub mod frontmatter;
pub mod imports;
pub mod parser;
pub mod safe_outputs;
pub mod spec;
pub mod triggers;

pub use error::{ConfigError, ConfigReport};
pub use imports::{FsImportResolver, ImportResolver, MemoryImportResolver};
pub use parser::{parse_document, parse_partial};
pub use safe_outputs::{OutputPolicy, SafeOutputsConfig, TargetMode};
pub use spec::{EngineConfig, EngineId, NetworkPolicy, ToolPolicy, WorkflowSpec};
pub use triggers::{CommandConfig, EventConfig, ForkPolicy, TriggerConfig};
