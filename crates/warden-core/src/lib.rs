//! Core types for the Warden agentic workflow compiler
//!
//! This crate provides the vocabulary shared between the compile-time crates
//! (configuration parsing, job graph assembly, YAML emission) and the
//! run-time safe-output pipeline:
//! - Permission scopes and levels with least-privilege merging
//! - The closed set of safe-output kinds and their minimal permission sets
//! - The environment-variable naming contract between emitted workflows
//!   and generated handler code
//! - Workspace-wide constants (job names, content budgets)

pub mod constants;
pub mod env;
pub mod kinds;
pub mod permissions;

pub use env::EnvContract;
pub use kinds::SafeOutputKind;
pub use permissions::{PermissionLevel, PermissionScope, Permissions};
