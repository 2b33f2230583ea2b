//! End-to-end scenarios through the public API.

use libyamlet::{
    parse, parse_with_options, serialize, serialize_value, Document, Mapping, ParseOptions,
    Value,
};

fn strings(items: &[&str]) -> Value {
    Value::Sequence(items.iter().map(|s| Value::from(*s)).collect())
}

#[test]
fn test_person_document() {
    let doc = parse(
        "---\nname: John Doe\nage: 30\nhobbies:\n  - reading\n  - swimming\naddress:\n  street: 123 Main St\n  city: Anytown\n  country: USA\n",
    )
    .unwrap();

    assert_eq!(doc.get("name"), Some(&Value::from("John Doe")));
    assert_eq!(doc.get("age"), Some(&Value::from(30)));
    assert_eq!(doc.get("hobbies"), Some(&strings(&["reading", "swimming"])));

    let address: Mapping = [
        ("street", "123 Main St"),
        ("city", "Anytown"),
        ("country", "USA"),
    ]
    .into_iter()
    .map(|(k, v)| (Value::from(k), Value::from(v)))
    .collect();
    assert_eq!(doc.get("address"), Some(&Value::Mapping(address)));
}

#[test]
fn test_invalid_flow_is_an_error() {
    let err = parse("{ invalid: yaml: content }").unwrap_err();
    assert!(err.is_parse());
    assert_eq!(err.location().map(|l| (l.line, l.column)), Some((1, 16)));
}

#[test]
fn test_key_order_is_source_order() {
    let ab = parse("{a: 1, b: 2}").unwrap();
    let ba = parse("{b: 2, a: 1}").unwrap();
    let keys = |doc: &Document| -> Vec<String> {
        doc.root()
            .as_mapping()
            .unwrap()
            .keys()
            .map(|k| k.as_str().unwrap().to_string())
            .collect()
    };
    assert_eq!(keys(&ab), ["a", "b"]);
    assert_eq!(keys(&ba), ["b", "a"]);
    assert_eq!(ab, ba);
    assert_eq!(serialize(&ba).unwrap(), "b: 2\na: 1\n");
}

#[test]
fn test_dates() {
    let implicit = parse("2023-04-14").unwrap();
    let explicit = parse("!timestamp 2023-04-14").unwrap();
    let expected = Value::date(2023, 4, 14).unwrap();
    assert_eq!(implicit.root(), &expected);
    assert_eq!(explicit.root(), &expected);

    assert_eq!(parse("'2023-04-14'").unwrap().root(), &Value::from("2023-04-14"));
    assert_eq!(parse("2023-02-30").unwrap().root(), &Value::from("2023-02-30"));
    assert!(parse("!!timestamp 2023-02-30").unwrap_err().is_tag());
}

#[test]
fn test_binary_keeps_base64_text() {
    let doc = parse("!binary SGVsbG8sIFdvcmxkIQ==").unwrap();
    let tagged = doc.root().as_tagged().unwrap();
    assert_eq!(tagged.tag.to_string(), "!binary");
    assert_eq!(tagged.value, Value::from("SGVsbG8sIFdvcmxkIQ=="));
    assert_eq!(tagged.decode_binary().unwrap(), b"Hello, World!");
    assert_eq!(serialize(&doc).unwrap(), "!binary SGVsbG8sIFdvcmxkIQ==\n");

    // Raw bytes serialize to the same syntax and come back in tagged form.
    let text = serialize_value(&Value::Binary(b"Hello, World!".to_vec())).unwrap();
    assert_eq!(text, "!binary SGVsbG8sIFdvcmxkIQ==\n");
    assert_eq!(parse(&text).unwrap(), doc);
}

#[test]
fn test_core_tags() {
    assert_eq!(parse("!!str 42").unwrap().root(), &Value::from("42"));
    assert_eq!(parse("!!float 1").unwrap().root(), &Value::Float(1.0));
    assert_eq!(parse("! true").unwrap().root(), &Value::from("true"));
    assert!(parse("!!int x").unwrap_err().is_tag());
    assert!(parse("!!map [1]").unwrap_err().is_tag());
}

#[test]
fn test_rejections() {
    assert!(parse("a: 1\na: 2\n").unwrap_err().is_parse());
    assert!(parse("- *ghost\n").unwrap_err().is_parse());
    assert!(parse("one\n---\ntwo\n").unwrap_err().is_parse());
    assert!(parse("a: \"open\n").unwrap_err().is_lex());
}

#[test]
fn test_aliases_share_one_node() {
    let doc = parse("base: &b {x: 1}\ncopy: *b\nother: {x: 1}\n").unwrap();
    let base = doc.root().get("base").unwrap();
    let copy = doc.root().get("copy").unwrap();
    assert_eq!(base.as_shared(), copy.as_shared());
    assert!(doc.root().get("other").unwrap().as_shared().is_none());
    assert_eq!(doc.resolve(copy), doc.get("other").unwrap());

    let text = serialize(&doc).unwrap();
    assert_eq!(text, "base: &b\n  x: 1\ncopy: *b\nother:\n  x: 1\n");
    assert_eq!(parse(&text).unwrap(), doc);
}

#[test]
fn test_cycles_round_trip() {
    let doc = parse("&node\nname: root\nchildren:\n  - *node\n").unwrap();
    let text = serialize(&doc).unwrap();
    assert_eq!(text, "&node\nname: root\nchildren:\n  - *node\n");
    assert_eq!(parse(&text).unwrap(), doc);
    assert!(doc.expand().unwrap_err().is_serialize());
}

#[test]
fn test_expand_inlines_aliases() {
    let doc = parse("- &a [1, 2]\n- *a\n").unwrap();
    let pair = Value::Sequence(vec![Value::from(1), Value::from(2)]);
    assert_eq!(
        doc.expand().unwrap(),
        Value::Sequence(vec![pair.clone(), pair])
    );
}

#[test]
fn test_depth_limit() {
    let deep = format!("{}{}", "[".repeat(10), "]".repeat(10));
    assert!(parse(&deep).is_ok());
    let options = ParseOptions::new().max_depth(5);
    assert!(parse_with_options(&deep, &options).unwrap_err().is_parse());
}

#[test]
fn test_multiline_strings_round_trip() {
    for text in ["\n \u{e9}", "\n\n  indented\nnext\n", "\nplain\n", "a\n\n b\n\n"] {
        let value = Value::Mapping([(Value::Null, Value::from(text))].into_iter().collect());
        let yaml = serialize_value(&value).unwrap();
        let doc = parse(&yaml).unwrap();
        assert_eq!(doc.root(), &value, "serialized as:\n{}", yaml);
    }
}
