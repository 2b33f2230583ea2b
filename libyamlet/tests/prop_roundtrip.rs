//! Property-based round-trip tests: serialize then parse gives back the tree.

use libyamlet::{parse, serialize_value, Mapping, Value};
use num_bigint::BigInt;
use proptest::prelude::*;

fn text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[ -~]{0,16}",
        "[a-z :#\\-?\\n\\t'\"\\[\\]{},.!&*|>%@`~]{0,12}",
        "[a-zé€\u{1F600}\u{A0}\u{85}\u{2028}\u{FEFF} \\n]{0,8}",
    ]
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        any::<i128>().prop_map(|n| Value::Integer(BigInt::from(n))),
        any::<f64>().prop_map(Value::Float),
        text().prop_map(Value::String),
    ]
}

fn tree() -> impl Strategy<Value = Value> {
    scalar().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Sequence),
            prop::collection::vec((scalar(), inner), 0..6)
                .prop_map(|pairs| Value::Mapping(pairs.into_iter().collect::<Mapping>())),
        ]
    })
}

proptest! {
    /// parse(serialize(v)) == v for trees without dates, binaries or handles
    #[test]
    fn prop_value_round_trip(value in tree()) {
        let text = serialize_value(&value).unwrap();
        let doc = parse(&text).map_err(|e| TestCaseError::fail(format!("{}\n{}", e, text)))?;
        prop_assert_eq!(doc.root(), &value, "serialized as:\n{}", text);
    }

    /// Serializing a reparsed tree reproduces the same text
    #[test]
    fn prop_serialization_is_stable(value in tree()) {
        let text = serialize_value(&value).unwrap();
        let doc = parse(&text).unwrap();
        prop_assert_eq!(serialize_value(doc.root()).unwrap(), text);
    }

    /// Arbitrary strings survive as mapping keys and values
    #[test]
    fn prop_string_entries(key in text(), value in text()) {
        let map: Mapping = [(Value::from(key), Value::from(value))].into_iter().collect();
        let value = Value::Mapping(map);
        let text = serialize_value(&value).unwrap();
        let doc = parse(&text).unwrap();
        prop_assert_eq!(doc.root(), &value, "serialized as:\n{}", text);
    }
}
