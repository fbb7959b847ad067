//! Configuration error taxonomy
//!
//! Every error carries enough context to point at the offending field,
//! file, and line, plus a remediation hint where one exists. Errors are
//! fatal to compilation; when a pass can keep validating it accumulates
//! them into a [`ConfigReport`] so one run surfaces every problem.

use std::fmt;
use thiserror::Error;

/// Category used for grouping collected errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigErrorCategory {
    Schema,
    Trigger,
    SafeOutputs,
    Imports,
    Io,
}

impl fmt::Display for ConfigErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfigErrorCategory::Schema => "schema",
            ConfigErrorCategory::Trigger => "trigger",
            ConfigErrorCategory::SafeOutputs => "safe-outputs",
            ConfigErrorCategory::Imports => "imports",
            ConfigErrorCategory::Io => "io",
        };
        f.write_str(name)
    }
}

/// A fatal configuration error.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("{file}:{line}: unknown field '{field}' (remove it or check its spelling)")]
    UnknownField {
        field: String,
        file: String,
        line: usize,
    },

    #[error("{file}:{line}: invalid value for '{field}': {reason}")]
    InvalidValue {
        field: String,
        file: String,
        line: usize,
        reason: String,
    },

    #[error("{file}: missing front matter block (expected a '---' delimited YAML header)")]
    MissingFrontmatter { file: String },

    #[error("{file}:{line}: malformed front matter: {reason}")]
    MalformedFrontmatter {
        file: String,
        line: usize,
        reason: String,
    },

    #[error("{file}: no trigger configured (add an 'on:' section)")]
    NoTriggers { file: String },

    #[error("{file}: unknown trigger event '{event}'")]
    UnknownTriggerEvent { event: String, file: String },

    #[error("import cycle detected: {chain}")]
    ImportCycle { chain: String },

    #[error("{file}: import '{path}' could not be resolved: {reason}")]
    UnresolvedImport {
        path: String,
        file: String,
        reason: String,
    },

    #[error("'{entity}' is defined by both {first} and {second} with different values")]
    MergeConflict {
        entity: String,
        first: String,
        second: String,
    },

    #[error("{file}: {reason}")]
    Invalid { file: String, reason: String },
}

impl ConfigError {
    /// Category for report grouping.
    pub fn category(&self) -> ConfigErrorCategory {
        match self {
            ConfigError::UnknownField { .. }
            | ConfigError::InvalidValue { .. }
            | ConfigError::MissingFrontmatter { .. }
            | ConfigError::MalformedFrontmatter { .. }
            | ConfigError::Invalid { .. } => ConfigErrorCategory::Schema,
            ConfigError::NoTriggers { .. } | ConfigError::UnknownTriggerEvent { .. } => {
                ConfigErrorCategory::Trigger
            }
            ConfigError::ImportCycle { .. }
            | ConfigError::UnresolvedImport { .. }
            | ConfigError::MergeConflict { .. } => ConfigErrorCategory::Imports,
        }
    }

    /// Lower ranks are reported first. Structural problems come before
    /// field-level ones so the root cause leads the report.
    pub fn severity_rank(&self) -> u8 {
        match self {
            ConfigError::MissingFrontmatter { .. } | ConfigError::MalformedFrontmatter { .. } => 0,
            ConfigError::ImportCycle { .. } | ConfigError::UnresolvedImport { .. } => 1,
            ConfigError::MergeConflict { .. } => 2,
            ConfigError::UnknownField { .. } => 3,
            ConfigError::UnknownTriggerEvent { .. } => 4,
            ConfigError::InvalidValue { .. } | ConfigError::Invalid { .. } => 5,
            ConfigError::NoTriggers { .. } => 6,
        }
    }
}

/// A batch of configuration errors collected in one pass, sorted by
/// severity then category so reports are stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigReport {
    errors: Vec<ConfigError>,
}

impl ConfigReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ConfigError) {
        self.errors.push(error);
    }

    pub fn extend(&mut self, other: ConfigReport) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Errors in report order: severity rank, then category, then
    /// insertion order.
    pub fn sorted(&self) -> Vec<&ConfigError> {
        let mut out: Vec<&ConfigError> = self.errors.iter().collect();
        out.sort_by_key(|e| (e.severity_rank(), e.category()));
        out
    }

    /// Consume the report, returning `value` when no error was collected.
    pub fn into_result<T>(self, value: T) -> std::result::Result<T, ConfigReport> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ConfigReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} configuration error(s):", self.errors.len())?;
        for error in self.sorted() {
            writeln!(f, "  [{}] {}", error.category(), error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigReport {}

impl From<ConfigError> for ConfigReport {
    fn from(error: ConfigError) -> Self {
        let mut report = ConfigReport::new();
        report.push(error);
        report
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
