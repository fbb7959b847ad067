//! Safe-output contract runtime for Warden
//!
//! Implements the processing pipeline that generated handler jobs run
//! against the agent's ordered ndjson output stream:
//! - Item wire format (`type`-discriminated, one JSON object per line)
//! - Content sanitization with a full audit trail
//! - Per-kind validation, rate limiting, and configured filters
//! - Temporary-id reference resolution (forward references are errors)
//! - Strictly ordered dispatch with staged previews and partial-failure
//!   isolation
//!
//! The crate performs no privileged API calls itself; it defines the
//! handler trait and ships the recording and preview implementations.

pub mod audit;
pub mod error;
pub mod handler;
pub mod item;
pub mod pipeline;
pub mod refs;
pub mod sanitize;
pub mod summary;

pub use audit::{AuditLog, SanitizationAuditEntry, SanitizeCategory};
pub use error::{Result, SafeOutputError};
pub use handler::{
    render_preview, ApplyOutcome, FailingHandler, HandlerContext, HandlerSet, RecordingHandler,
    SafeOutputHandler,
};
pub use item::{parse_stream, EntityRef, ParsedLine, SafeOutputItem};
pub use pipeline::OutputProcessor;
pub use refs::{ResolvedRef, TemporaryIdMap};
pub use sanitize::Sanitizer;
pub use summary::{ItemState, ProcessedItem, RunSummary};
