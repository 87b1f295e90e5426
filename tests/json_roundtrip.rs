use slabkit::fiobj::{format, parse_value, parse_value_with, FioValue, ParserOptions};
use slabkit::ByteString;

/// Finds `key` among a hash's direct entries (a clone, since `each` only
/// ever hands out short-lived borrows scoped to the closure).
fn field(hash: &slabkit::OrderedMap<ByteString, FioValue>, key: &str) -> Option<FioValue> {
    let mut found = None;
    hash.each(|k, v| {
        if found.is_none() && k.as_bytes() == key.as_bytes() {
            found = Some(v.clone());
        }
    });
    found
}

fn expect_hash(value: &FioValue) -> &slabkit::OrderedMap<ByteString, FioValue> {
    match value {
        FioValue::Hash(h) => h,
        other => panic!("expected object, got {other:?}"),
    }
}

#[test]
fn nested_document_round_trips_through_format() {
    let source = br#"{
        "name": "widget",
        "count": 3,
        "tags": ["a", "b", "c"],
        "meta": {"active": true, "ratio": 0.5, "owner": null}
    }"#;

    let (value, _) = parse_value(source).unwrap();

    let top = expect_hash(&value);
    let meta_value = field(top, "meta").expect("meta key present");
    let meta = expect_hash(&meta_value);
    assert_eq!(meta.count(), 3);
    assert!(matches!(field(meta, "active"), Some(FioValue::True)));
    assert!(matches!(field(meta, "owner"), Some(FioValue::Null)));

    let compact = format(&value, false);
    let (reparsed, _) = parse_value(compact.as_bytes()).unwrap();
    assert!(value.deep_eq(&reparsed));
    let reparsed_meta_value = field(expect_hash(&reparsed), "meta").expect("meta key present after reparse");
    let reparsed_meta = expect_hash(&reparsed_meta_value);
    assert_eq!(reparsed_meta.count(), 3);
    assert!(matches!(field(reparsed_meta, "active"), Some(FioValue::True)));

    let pretty = format(&value, true);
    let (reparsed_pretty, _) = parse_value(pretty.as_bytes()).unwrap();
    assert!(value.deep_eq(&reparsed_pretty));
}

#[test]
fn lenient_extensions_can_be_turned_off() {
    let strict = ParserOptions {
        allow_trailing_commas: false,
        allow_comments: false,
        allow_nan_infinity: false,
        allow_radix_literals: false,
    };

    assert!(parse_value_with(b"[1, 2,]", strict).is_err());
    assert!(parse_value_with(b"NaN", strict).is_err());
    assert!(parse_value_with(b"0x1F", strict).is_err());

    // Still works with the lenient default.
    assert!(parse_value(b"[1, 2,]").is_ok());
}

#[test]
fn deeply_nested_array_is_rejected_past_max_depth() {
    let mut text = String::new();
    for _ in 0..600 {
        text.push('[');
    }
    text.push('1');
    for _ in 0..600 {
        text.push(']');
    }
    assert!(parse_value(text.as_bytes()).is_err());
}

#[test]
fn array_of_objects_preserves_key_order_per_object() {
    let (value, _) = parse_value(br#"[{"z":1,"a":2},{"m":3}]"#).unwrap();
    let FioValue::Array(items) = value else {
        panic!("expected array");
    };
    let mut orders = Vec::new();
    items.each(0, |item| {
        let FioValue::Hash(h) = item else {
            panic!("expected hash element");
        };
        let mut keys = Vec::new();
        h.each(|k, _| keys.push(String::from_utf8(k.as_bytes().to_vec()).unwrap()));
        orders.push(keys);
    });
    assert_eq!(orders, vec![vec!["z".to_string(), "a".to_string()], vec!["m".to_string()]]);
}
