//! Property-based tests for the value model.
//!
//! - Plain-string rendering of a finite number parses back to the same number
//! - Coercion into a kind is idempotent
//! - Mirroring a key twice is the identity, and never equals the original

use proptest::prelude::*;
use tws_core::{FieldKey, FieldKind, Universe, Value};

fn universe_strategy() -> impl Strategy<Value = Universe> {
    prop_oneof![Just(Universe::Target), Just(Universe::Reference)]
}

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        (-1.0e9f64..1.0e9).prop_map(Value::Number),
        "[a-zA-Z0-9 ,.]{0,12}".prop_map(Value::Text),
        prop::sample::select(vec!["Gas", "Heatpump", "Electric"])
            .prop_map(|s| Value::Choice(s.to_string())),
    ]
}

proptest! {
    #[test]
    fn rendered_numbers_parse_back(n in -1.0e12f64..1.0e12) {
        let rendered = Value::Number(n).to_plain_string();
        prop_assert_eq!(Value::Text(rendered).as_number(), Some(n));
    }

    #[test]
    fn coercion_is_idempotent(value in value_strategy()) {
        let kinds = [
            FieldKind::Number,
            FieldKind::Text,
            FieldKind::Choice(vec!["Gas".into(), "Heatpump".into()]),
        ];
        for kind in kinds {
            if let Some(once) = kind.coerce(&value) {
                prop_assert!(kind.accepts(&once));
                prop_assert_eq!(kind.coerce(&once), Some(once.clone()));
            }
        }
    }

    #[test]
    fn mirrored_key_is_involution(universe in universe_strategy(), field in "[a-z]{1,10}") {
        let key = FieldKey::new(universe, field);
        prop_assert_ne!(&key.mirrored(), &key);
        prop_assert_eq!(key.mirrored().mirrored(), key);
    }

    #[test]
    fn universe_roundtrips_through_serde(universe in universe_strategy()) {
        let json = serde_json::to_string(&universe).unwrap();
        let back: Universe = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, universe);
    }
}
