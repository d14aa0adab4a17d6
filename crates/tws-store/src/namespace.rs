//! The cross-module publication namespace.
//!
//! Inside the workspace every value is addressed by a typed [`FieldKey`].
//! Collaborators that only speak strings (UI bindings, CSV import/export, a
//! "run everything" coordinator) use one rule: the bare field name is the
//! Target universe, the prefixed name is the Reference universe.

use crate::error::StoreError;
use tws_core::{FieldKey, Universe};

/// Default prefix marking a Reference-universe key.
pub const DEFAULT_REFERENCE_PREFIX: &str = "ref_";

/// Maps typed keys to and from namespaced strings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyNamespace {
    reference_prefix: String,
}

impl KeyNamespace {
    pub fn new(reference_prefix: impl Into<String>) -> Self {
        Self {
            reference_prefix: reference_prefix.into(),
        }
    }

    pub fn reference_prefix(&self) -> &str {
        &self.reference_prefix
    }

    /// Namespaced string for `key`.
    pub fn render(&self, key: &FieldKey) -> String {
        match key.universe() {
            Universe::Target => key.field().to_string(),
            Universe::Reference => format!("{}{}", self.reference_prefix, key.field()),
        }
    }

    /// Typed key for a namespaced string.
    pub fn parse(&self, name: &str) -> FieldKey {
        match name.strip_prefix(self.reference_prefix.as_str()) {
            Some(field) if !field.is_empty() && !self.reference_prefix.is_empty() => {
                FieldKey::reference(field)
            }
            _ => FieldKey::target(name),
        }
    }

    /// Reject field names that could not round-trip through the namespace.
    ///
    /// A bare name that already starts with the prefix would be read back as
    /// a Reference key.
    pub fn check_field_name(&self, field: &str) -> Result<(), StoreError> {
        if field.is_empty() {
            return Err(StoreError::EmptyFieldName);
        }
        if !self.reference_prefix.is_empty() && field.starts_with(&self.reference_prefix) {
            return Err(StoreError::AmbiguousFieldName {
                field: field.to_string(),
                prefix: self.reference_prefix.clone(),
            });
        }
        Ok(())
    }
}

impl Default for KeyNamespace {
    fn default() -> Self {
        Self::new(DEFAULT_REFERENCE_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_and_parse() {
        let ns = KeyNamespace::default();
        assert_eq!(ns.render(&FieldKey::target("dailyHours")), "dailyHours");
        assert_eq!(ns.render(&FieldKey::reference("dailyHours")), "ref_dailyHours");
        assert_eq!(ns.parse("ref_dailyHours"), FieldKey::reference("dailyHours"));
        assert_eq!(ns.parse("dailyHours"), FieldKey::target("dailyHours"));
    }

    #[test]
    fn test_bare_prefix_is_a_target_key() {
        let ns = KeyNamespace::default();
        assert_eq!(ns.parse("ref_"), FieldKey::target("ref_"));
    }

    #[test]
    fn test_custom_prefix() {
        let ns = KeyNamespace::new("baseline.");
        let key = FieldKey::reference("cop");
        assert_eq!(ns.render(&key), "baseline.cop");
        assert_eq!(ns.parse("baseline.cop"), key);
    }

    #[test]
    fn test_ambiguous_names_rejected() {
        let ns = KeyNamespace::default();
        assert!(ns.check_field_name("occupants").is_ok());
        assert!(matches!(
            ns.check_field_name("ref_area"),
            Err(StoreError::AmbiguousFieldName { .. })
        ));
        assert!(matches!(
            ns.check_field_name(""),
            Err(StoreError::EmptyFieldName)
        ));
    }
}
