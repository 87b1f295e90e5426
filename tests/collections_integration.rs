use slabkit::collections::hash::risky_hash;
use slabkit::{Array, ByteString, OrderedMap, UnorderedMap};

fn h(key: &str) -> u64 {
    risky_hash(0, key.as_bytes())
}

#[test]
fn array_head_and_tail_growth_stay_symmetric() {
    let mut a: Array<i32> = Array::new();
    for i in 0..50 {
        if i % 2 == 0 {
            a.push(i);
        } else {
            a.unshift(i);
        }
    }
    assert_eq!(a.count(), 50);
    a.compact();
    assert_eq!(a.count(), 50);
}

#[test]
fn ordered_map_lru_eviction_survives_compaction() {
    let mut m: OrderedMap<String, i32> = OrderedMap::with_lru();
    for i in 0..40 {
        m.set(h(&i.to_string()), i.to_string(), i);
    }
    for i in 0..20 {
        m.get(h(&i.to_string()), &i.to_string());
    }
    m.evict(10);
    m.compact();
    assert_eq!(m.count(), 30);
}

#[test]
fn unordered_map_flags_under_attack_on_forced_collisions() {
    // Every key below shares the same fingerprint byte (top 8 bits of the
    // hash), forcing the map down the full-collision path repeatedly.
    let mut m: UnorderedMap<u64, u64> = UnorderedMap::new();
    let base = h("collide");
    let fingerprint_bits = base & 0xFF00_0000_0000_0000;
    for i in 0..64u64 {
        let hash = fingerprint_bits | i;
        m.set(hash, hash, i);
    }
    assert!(m.is_under_attack());
}

#[test]
fn byte_string_promotes_and_demotes_around_inline_threshold() {
    let mut s = ByteString::new();
    s.write(b"short");
    assert_eq!(s.as_bytes(), b"short");

    s.write(&vec![b'x'; 64]);
    assert!(s.len() > 22);

    s.resize(3);
    s.compact();
    assert_eq!(s.as_bytes(), b"sho");
}

#[test]
fn hash_key_from_byte_string_matches_direct_risky_hash() {
    let s = ByteString::from_bytes(b"consistent");
    assert_eq!(s.hash(7), risky_hash(7, b"consistent"));
}
