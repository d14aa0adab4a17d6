//! Universes and universe-qualified field keys.
//!
//! Every value in the store lives in exactly one of two parallel universes.
//! A [`FieldKey`] always carries its universe next to the field name, so a
//! read or write that forgets which universe it targets does not compile.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two isolated evaluation universes.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Universe {
    /// The user's design scenario.
    #[default]
    Target,
    /// The baseline / code-minimum scenario.
    Reference,
}

impl Universe {
    /// Both universes, in pass order.
    pub const ALL: [Universe; 2] = [Universe::Target, Universe::Reference];

    /// The opposite universe.
    pub fn other(self) -> Self {
        match self {
            Universe::Target => Universe::Reference,
            Universe::Reference => Universe::Target,
        }
    }

    /// Lowercase name, used in slot names and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Universe::Target => "target",
            Universe::Reference => "reference",
        }
    }

    pub fn is_reference(self) -> bool {
        matches!(self, Universe::Reference)
    }
}

impl fmt::Display for Universe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Universe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "target" | "t" => Ok(Universe::Target),
            "reference" | "ref" | "r" => Ok(Universe::Reference),
            other => Err(format!("unknown universe: {}", other)),
        }
    }
}

/// A field name qualified by the universe it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldKey {
    universe: Universe,
    field: String,
}

impl FieldKey {
    pub fn new(universe: Universe, field: impl Into<String>) -> Self {
        Self {
            universe,
            field: field.into(),
        }
    }

    pub fn target(field: impl Into<String>) -> Self {
        Self::new(Universe::Target, field)
    }

    pub fn reference(field: impl Into<String>) -> Self {
        Self::new(Universe::Reference, field)
    }

    pub fn universe(&self) -> Universe {
        self.universe
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// The same field in the other universe.
    pub fn mirrored(&self) -> Self {
        Self::new(self.universe.other(), self.field.clone())
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.universe, self.field)
    }
}
