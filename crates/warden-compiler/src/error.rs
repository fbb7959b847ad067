//! Compiler error taxonomy

use crate::graph::GraphError;
use thiserror::Error;
use warden_config::ConfigReport;

/// Fatal compilation failures past the parsing stage.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompilerError {
    #[error("condition tree exceeds bounds (depth {depth}, nodes {nodes})")]
    ConditionTooComplex { depth: usize, nodes: usize },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

pub type Result<T> = std::result::Result<T, CompilerError>;

/// End-to-end compile failure: configuration or graph/condition stage.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Config(#[from] ConfigReport),

    #[error(transparent)]
    Compiler(#[from] CompilerError),
}
