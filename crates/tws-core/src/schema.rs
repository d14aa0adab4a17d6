//! Field declarations and per-module schemas.
//!
//! A module declares its fields once; the same declarations seed both
//! universes, with optional Reference-specific defaults (code-minimum values
//! instead of user defaults).

use crate::universe::Universe;
use crate::value::{FieldKind, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Errors raised while building or querying a schema.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Duplicate field: {0}")]
    DuplicateField(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Default of {field} is not a valid {kind}")]
    InvalidDefault { field: String, kind: String },

    #[error("Field {0} depends on itself")]
    SelfDependency(String),
}

/// Whether a field is edited by the user or produced by the module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldRole {
    Input,
    Derived,
}

/// Declaration of a single field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub kind: FieldKind,
    pub default: Value,
    /// Override used when seeding the Reference universe.
    pub reference_default: Option<Value>,
    /// Substituted when input cannot be read as this field's kind.
    pub fallback: Option<Value>,
    pub role: FieldRole,
    /// Upstream field names this field is computed from.
    pub depends_on: Vec<String>,
    pub description: String,
}

impl FieldDecl {
    fn with_kind(name: impl Into<String>, kind: FieldKind, default: Value) -> Self {
        Self {
            name: name.into(),
            kind,
            default,
            reference_default: None,
            fallback: None,
            role: FieldRole::Input,
            depends_on: Vec::new(),
            description: String::new(),
        }
    }

    pub fn number(name: impl Into<String>, default: f64) -> Self {
        Self::with_kind(name, FieldKind::Number, Value::Number(default))
    }

    pub fn choice<I, S>(name: impl Into<String>, options: I, default: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let options = options.into_iter().map(Into::into).collect();
        Self::with_kind(name, FieldKind::Choice(options), Value::Choice(default.into()))
    }

    pub fn text(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::Text, Value::Text(default.into()))
    }

    pub fn reference_default(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.reference_default = Some(self.kind.coerce(&value).unwrap_or(value));
        self
    }

    pub fn fallback(mut self, value: impl Into<Value>) -> Self {
        self.fallback = Some(value.into());
        self
    }

    /// Mark the field as computed by the module.
    pub fn derived(mut self) -> Self {
        self.role = FieldRole::Derived;
        self
    }

    pub fn depends_on<I, S>(mut self, upstream: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(upstream.into_iter().map(Into::into));
        self
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    pub fn is_derived(&self) -> bool {
        self.role == FieldRole::Derived
    }

    /// The seed value for `universe`.
    pub fn default_for(&self, universe: Universe) -> &Value {
        match (universe, &self.reference_default) {
            (Universe::Reference, Some(value)) => value,
            _ => &self.default,
        }
    }

    /// Value used when input for this field is unreadable.
    ///
    /// Numbers fall back to zero unless a fallback is declared; other kinds
    /// fall back to their default.
    pub fn fallback_value(&self) -> Value {
        match (&self.fallback, &self.kind) {
            (Some(value), _) => value.clone(),
            (None, FieldKind::Number) => Value::Number(0.0),
            (None, _) => self.default.clone(),
        }
    }

    /// Value a derived field publishes when its pass fails.
    pub fn zero_value(&self) -> Value {
        match self.kind {
            FieldKind::Number => Value::Number(0.0),
            _ => self.default.clone(),
        }
    }

    /// Read `value` as this field's kind, substituting the fallback.
    pub fn coerce_or_fallback(&self, value: &Value) -> Value {
        self.kind
            .coerce(value)
            .unwrap_or_else(|| self.fallback_value())
    }
}

/// The ordered field declarations of one module.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schema {
    fields: Vec<FieldDecl>,
    index: HashMap<String, usize>,
}

impl Schema {
    /// Build a schema, validating names and defaults.
    pub fn new(fields: Vec<FieldDecl>) -> Result<Self, SchemaError> {
        let mut index = HashMap::with_capacity(fields.len());
        for (i, decl) in fields.iter().enumerate() {
            if index.insert(decl.name.clone(), i).is_some() {
                return Err(SchemaError::DuplicateField(decl.name.clone()));
            }
            if decl.depends_on.iter().any(|d| *d == decl.name) {
                return Err(SchemaError::SelfDependency(decl.name.clone()));
            }
            for universe in Universe::ALL {
                if !decl.kind.accepts(decl.default_for(universe)) {
                    return Err(SchemaError::InvalidDefault {
                        field: decl.name.clone(),
                        kind: decl.kind.name().to_string(),
                    });
                }
            }
        }
        Ok(Self { fields, index })
    }

    pub fn get(&self, name: &str) -> Option<&FieldDecl> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    pub fn require(&self, name: &str) -> Result<&FieldDecl, SchemaError> {
        self.get(name)
            .ok_or_else(|| SchemaError::UnknownField(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }

    pub fn inputs(&self) -> impl Iterator<Item = &FieldDecl> {
        self.fields.iter().filter(|f| !f.is_derived())
    }

    pub fn derived(&self) -> impl Iterator<Item = &FieldDecl> {
        self.fields.iter().filter(|f| f.is_derived())
    }

    /// Dependencies that no field of this schema declares; they are
    /// published by other modules.
    pub fn external_dependencies(&self) -> BTreeSet<String> {
        self.fields
            .iter()
            .flat_map(|f| f.depends_on.iter())
            .filter(|d| !self.contains(d))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
