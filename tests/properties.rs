use std::collections::HashMap;

use proptest::prelude::*;

use slabkit::collections::hash::risky_hash;
use slabkit::fiobj::{format, parse_value};
use slabkit::{Array, ByteString, OrderedMap};

fn h(key: &str) -> u64 {
    risky_hash(0, key.as_bytes())
}

proptest! {
    #[test]
    fn array_push_pop_round_trips(values in proptest::collection::vec(any::<i32>(), 0..200)) {
        let mut a: Array<i32> = Array::new();
        for v in &values {
            a.push(*v);
        }
        let mut popped = Vec::new();
        while let Some(v) = a.pop() {
            popped.push(v);
        }
        popped.reverse();
        prop_assert_eq!(popped, values);
    }

    #[test]
    fn array_unshift_shift_round_trips(values in proptest::collection::vec(any::<i32>(), 0..200)) {
        let mut a: Array<i32> = Array::new();
        for v in &values {
            a.unshift(*v);
        }
        let mut shifted = Vec::new();
        while let Some(v) = a.shift() {
            shifted.push(v);
        }
        shifted.reverse();
        prop_assert_eq!(shifted, values);
    }

    #[test]
    fn ordered_map_matches_std_hash_map(
        ops in proptest::collection::vec(
            prop_oneof![
                (0u32..50, any::<i32>()).prop_map(|(k, v)| (k, Some(v))),
                (0u32..50).prop_map(|k| (k, None)),
            ],
            1..200,
        )
    ) {
        let mut model: HashMap<u32, i32> = HashMap::new();
        let mut map: OrderedMap<u32, i32> = OrderedMap::new();

        for (key, value) in ops {
            match value {
                Some(v) => {
                    let expected = model.insert(key, v);
                    let actual = map.set(h(&key.to_string()), key, v);
                    prop_assert_eq!(actual, expected);
                }
                None => {
                    let expected = model.remove(&key);
                    let actual = map.remove(h(&key.to_string()), &key);
                    prop_assert_eq!(actual, expected);
                }
            }
        }

        prop_assert_eq!(map.count(), model.len());
        for (key, value) in &model {
            prop_assert_eq!(map.get(h(&key.to_string()), key), Some(value));
        }
    }

    #[test]
    fn byte_string_escape_unescape_round_trips(bytes in proptest::collection::vec(any::<u8>(), 0..100)) {
        let mut escaped = ByteString::new();
        escaped.write_escape(&bytes);
        let mut unescaped = ByteString::new();
        unescaped.write_unescape(escaped.as_bytes());
        prop_assert_eq!(unescaped.as_bytes(), bytes.as_slice());
    }

    #[test]
    fn json_ints_and_strings_round_trip_through_format(
        ints in proptest::collection::vec(any::<i32>(), 0..30),
        text in "[a-zA-Z0-9 ]{0,40}",
    ) {
        let mut arr: Array<slabkit::FioValue> = Array::new();
        for i in &ints {
            arr.push(slabkit::FioValue::Int(*i as i64));
        }
        arr.push(slabkit::FioValue::from(text.as_str()));
        let value = slabkit::FioValue::Array(arr);

        let rendered = format(&value, false);
        let (reparsed, _) = parse_value(rendered.as_bytes()).unwrap();
        prop_assert!(value.deep_eq(&reparsed));
    }
}
