//! Field values, kinds and provenance tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A value held by a field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Floating point quantity.
    Number(f64),
    /// One entry of an enumerated option list.
    Choice(String),
    /// Free text.
    Text(String),
}

impl Value {
    pub fn number(n: f64) -> Self {
        Value::Number(n)
    }

    pub fn choice(s: impl Into<String>) -> Self {
        Value::Choice(s.into())
    }

    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Numeric reading of the value.
    ///
    /// Text and choices are parsed (thousands separators are ignored).
    /// Non-finite results count as unparsable.
    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            Value::Number(n) => *n,
            Value::Choice(s) | Value::Text(s) => parse_number(s)?,
        };
        n.is_finite().then_some(n)
    }

    /// Numeric reading, or `fallback` when the value is not numeric.
    pub fn number_or(&self, fallback: f64) -> f64 {
        self.as_number().unwrap_or(fallback)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Choice(s) | Value::Text(s) => Some(s),
            Value::Number(_) => None,
        }
    }

    /// Render the value for flat string maps.
    pub fn to_plain_string(&self) -> String {
        match self {
            Value::Number(n) => n.to_string(),
            Value::Choice(s) | Value::Text(s) => s.clone(),
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_plain_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.contains(',') {
        trimmed.replace(',', "").parse().ok()
    } else {
        trimmed.parse().ok()
    }
}

/// The declared type of a field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Number,
    /// Enumerated string; an empty option list accepts any string.
    Choice(Vec<String>),
    Text,
}

impl FieldKind {
    /// Convert a loosely typed value into this kind.
    ///
    /// Returns `None` when the value cannot represent the kind (unparsable
    /// number, choice outside the option list).
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        match self {
            FieldKind::Number => value.as_number().map(Value::Number),
            FieldKind::Choice(options) => {
                let raw = value.to_plain_string();
                (options.is_empty() || options.iter().any(|o| *o == raw))
                    .then_some(Value::Choice(raw))
            }
            FieldKind::Text => Some(Value::Text(value.to_plain_string())),
        }
    }

    /// Whether `value` already has exactly this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldKind::Number, Value::Number(n)) => n.is_finite(),
            (FieldKind::Choice(options), Value::Choice(s)) => {
                options.is_empty() || options.contains(s)
            }
            (FieldKind::Text, Value::Text(_)) => true,
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Number => "number",
            FieldKind::Choice(_) => "choice",
            FieldKind::Text => "text",
        }
    }
}

/// How a stored value was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    /// Seeded from a field declaration.
    Default,
    /// Entered by the user.
    User,
    /// Produced by a recomputation pass.
    Computed,
    /// Re-asserted computed output that must survive interleaved writes.
    ComputedPersistent,
}

impl Provenance {
    pub fn is_computed(self) -> bool {
        matches!(self, Provenance::Computed | Provenance::ComputedPersistent)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::Default => "default",
            Provenance::User => "user",
            Provenance::Computed => "computed",
            Provenance::ComputedPersistent => "computed-persistent",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value together with its provenance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredValue {
    pub value: Value,
    pub provenance: Provenance,
}

impl StoredValue {
    pub fn new(value: Value, provenance: Provenance) -> Self {
        Self { value, provenance }
    }

    /// A computed value only yields to another computed or a user write.
    pub fn accepts_write(&self, incoming: Provenance) -> bool {
        !(self.provenance.is_computed() && incoming == Provenance::Default)
    }
}

/// Result of a single write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The key had no value before.
    Inserted,
    /// An existing value was replaced.
    Updated,
    /// The overwrite rule refused the write; nothing changed.
    Rejected,
}

impl WriteOutcome {
    pub fn is_stored(self) -> bool {
        !matches!(self, WriteOutcome::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_parsing() {
        assert_eq!(Value::text("12").as_number(), Some(12.0));
        assert_eq!(Value::text(" 1,200.5 ").as_number(), Some(1200.5));
        assert_eq!(Value::text("abc").as_number(), None);
        assert_eq!(Value::text("").number_or(7.0), 7.0);
        assert_eq!(Value::Number(f64::NAN).as_number(), None);
    }

    #[test]
    fn test_plain_string() {
        assert_eq!(Value::Number(4380.0).to_plain_string(), "4380");
        assert_eq!(Value::Number(0.25).to_plain_string(), "0.25");
        assert_eq!(Value::choice("Heatpump").to_plain_string(), "Heatpump");
    }

    #[test]
    fn test_coerce_choice() {
        let kind = FieldKind::Choice(vec!["Gas".into(), "Heatpump".into()]);
        assert_eq!(
            kind.coerce(&Value::text("Gas")),
            Some(Value::Choice("Gas".into()))
        );
        assert_eq!(kind.coerce(&Value::text("Oil")), None);
        assert!(kind.accepts(&Value::choice("Heatpump")));
        assert!(!kind.accepts(&Value::text("Heatpump")));
    }

    #[test]
    fn test_coerce_number() {
        assert_eq!(
            FieldKind::Number.coerce(&Value::text("8")),
            Some(Value::Number(8.0))
        );
        assert_eq!(FieldKind::Number.coerce(&Value::choice("n/a")), None);
    }

    #[test]
    fn test_overwrite_rule() {
        let computed = StoredValue::new(Value::Number(1.0), Provenance::Computed);
        assert!(!computed.accepts_write(Provenance::Default));
        assert!(computed.accepts_write(Provenance::User));
        assert!(computed.accepts_write(Provenance::ComputedPersistent));

        let user = StoredValue::new(Value::Number(1.0), Provenance::User);
        assert!(user.accepts_write(Provenance::Default));
    }
}
