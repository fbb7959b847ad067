//! Temporary-id reference resolution
//!
//! Creation items may carry an agent-chosen placeholder; later items
//! reference it where a real identifier is expected. Placeholders are
//! registered only when the creating item is successfully applied, so a
//! reference resolves only if its target appears *earlier* in the stream;
//! forward references are a hard error for the referencing item.

use crate::error::SafeOutputError;
use crate::item::EntityRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Where a resolved identifier lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRef {
    /// Repository slug (`owner/repo`) the entity was created in, empty for
    /// the current repository.
    pub location: String,
    /// The real identifier.
    pub id: u64,
}

/// Placeholder → resolved identifier, populated in stream order.
#[derive(Debug, Clone, Default)]
pub struct TemporaryIdMap {
    entries: HashMap<String, ResolvedRef>,
}

impl TemporaryIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a placeholder once its item has been applied. The first
    /// registration wins; a duplicate is reported for the run log.
    pub fn register(&mut self, placeholder: &str, location: &str, id: u64) -> Result<(), SafeOutputError> {
        if self.entries.contains_key(placeholder) {
            return Err(SafeOutputError::DuplicateTemporaryId {
                placeholder: placeholder.to_string(),
            });
        }
        debug!(placeholder, id, "registered temporary id");
        self.entries.insert(
            placeholder.to_string(),
            ResolvedRef {
                location: location.to_string(),
                id,
            },
        );
        Ok(())
    }

    pub fn lookup(&self, placeholder: &str) -> Option<&ResolvedRef> {
        self.entries.get(placeholder)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a reference field in place: numeric references pass
    /// through, placeholders rewrite to their registered identifier.
    pub fn resolve(&self, reference: &mut EntityRef) -> Result<(), SafeOutputError> {
        if reference.as_number().is_some() {
            return Ok(());
        }
        match self.entries.get(&reference.0) {
            Some(resolved) => {
                reference.0 = resolved.id.to_string();
                Ok(())
            }
            None => Err(SafeOutputError::UnresolvedReference {
                placeholder: reference.0.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_reference_passes_through() {
        let map = TemporaryIdMap::new();
        let mut reference = EntityRef("42".to_string());
        map.resolve(&mut reference).unwrap();
        assert_eq!(reference.0, "42");
    }

    #[test]
    fn test_registered_placeholder_resolves() {
        let mut map = TemporaryIdMap::new();
        map.register("A", "", 314).unwrap();
        let mut reference = EntityRef("A".to_string());
        map.resolve(&mut reference).unwrap();
        assert_eq!(reference.as_number(), Some(314));
    }

    #[test]
    fn test_unregistered_placeholder_fails() {
        let map = TemporaryIdMap::new();
        let mut reference = EntityRef("B".to_string());
        let err = map.resolve(&mut reference).unwrap_err();
        assert!(matches!(
            err,
            SafeOutputError::UnresolvedReference { ref placeholder } if placeholder == "B"
        ));
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let mut map = TemporaryIdMap::new();
        map.register("A", "", 1).unwrap();
        assert!(map.register("A", "", 2).is_err());
        assert_eq!(map.lookup("A").unwrap().id, 1);
    }
}
