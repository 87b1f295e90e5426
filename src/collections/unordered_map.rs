//! Flat open-addressing hash map optimized for cache locality.
//!
//! Two parallel arrays: `imap[i]` is a one-byte fingerprint (`0` empty,
//! `255` tombstone, anything else a live slot), `entries[i]` the full
//! key/value/hash/LRU-link record. Probing walks fixed-size groups; an
//! 8-wide SIMD-style byte test is expressed here as a plain loop over a
//! `[u8; GROUP]` window — same algorithm, scalar instead of vector.

use super::hash::normalize;
use super::list::{IndexedList, Link};

const EMPTY: u8 = 0;
const TOMBSTONE: u8 = 255;
const GROUP: usize = 8;
const MAX_SEEK_GROUPS: usize = 64;
const MAX_FULL_COLLISIONS: usize = 16;

struct Entry<K, V> {
    hash: u64,
    key: K,
    value: V,
    link: Link,
}

/// A hash map resilient to adversarial hash-flooding: once a bucket set
/// sees too many verified full-hash collisions, it flags itself
/// `under_attack` rather than degrading to linear-scan behavior silently.
pub struct UnorderedMap<K, V> {
    imap: Vec<u8>,
    entries: Vec<Option<Entry<K, V>>>,
    bits: u32,
    len: usize,
    lru_enabled: bool,
    lru: IndexedList,
    under_attack: bool,
}

fn fingerprint(hash: u64) -> u8 {
    let fp = (hash >> 56) as u8;
    match fp {
        EMPTY => 1,
        TOMBSTONE => 254,
        other => other,
    }
}

impl<K: PartialEq, V> UnorderedMap<K, V> {
    pub fn new() -> Self {
        Self::with_bits(4, false)
    }

    pub fn with_lru() -> Self {
        Self::with_bits(4, true)
    }

    fn with_bits(bits: u32, lru_enabled: bool) -> Self {
        let capa = 1usize << bits;
        Self {
            imap: vec![EMPTY; capa],
            entries: (0..capa).map(|_| None).collect(),
            bits,
            len: 0,
            lru_enabled,
            lru: IndexedList::new(),
            under_attack: false,
        }
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn capa(&self) -> usize {
        self.imap.len()
    }

    #[inline]
    pub fn is_under_attack(&self) -> bool {
        self.under_attack
    }

    fn mask(&self) -> usize {
        self.imap.len() - 1
    }

    fn links_mut(&mut self) -> Vec<Link> {
        self.entries
            .iter()
            .map(|e| e.as_ref().map(|e| e.link).unwrap_or(Link::detached()))
            .collect()
    }

    fn sync_links(&mut self, links: Vec<Link>) {
        for (slot, link) in self.entries.iter_mut().zip(links) {
            if let Some(entry) = slot {
                entry.link = link;
            }
        }
    }

    fn touch(&mut self, idx: usize) {
        if !self.lru_enabled {
            return;
        }
        let mut links = self.links_mut();
        self.lru.move_to_front(&mut links, idx);
        self.sync_links(links);
    }

    /// Returns the slot index holding `key` under `hash`, if present.
    fn find_slot(&self, hash: u64, key: &K) -> Option<usize> {
        let hash = normalize(hash);
        let fp = fingerprint(hash);
        let mask = self.mask();
        let home = (hash as usize) & mask;

        for group in 0..MAX_SEEK_GROUPS {
            let base = (home + group * GROUP) & mask;
            let mut full_collisions = 0;
            for i in 0..GROUP {
                let idx = (base + i) & mask;
                match self.imap[idx] {
                    EMPTY => return None,
                    TOMBSTONE => continue,
                    byte if byte == fp => {
                        if let Some(entry) = &self.entries[idx] {
                            if entry.hash == hash {
                                full_collisions += 1;
                                if entry.key == *key {
                                    return Some(idx);
                                }
                                if full_collisions >= MAX_FULL_COLLISIONS {
                                    return None;
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        None
    }

    pub fn get(&mut self, hash: u64, key: &K) -> Option<&V> {
        let idx = self.find_slot(hash, key)?;
        self.touch(idx);
        self.entries[idx].as_ref().map(|e| &e.value)
    }

    /// Inserts or updates `key`, returning the previous value if any.
    pub fn set(&mut self, hash: u64, key: K, value: V) -> Option<V> {
        if let Some(idx) = self.find_slot(hash, &key) {
            self.touch(idx);
            return self.entries[idx]
                .as_mut()
                .map(|e| std::mem::replace(&mut e.value, value));
        }

        if self.len * 2 >= self.imap.len() {
            self.grow();
        }
        self.insert_fresh(normalize(hash), key, value);
        None
    }

    /// Inserts `key` only if absent; returns `true` if it was inserted.
    pub fn set_if_missing(&mut self, hash: u64, key: K, value: V) -> bool
    where
        V: Default,
    {
        if self.find_slot(hash, &key).is_some() {
            return false;
        }
        self.set(hash, key, value);
        true
    }

    fn insert_fresh(&mut self, hash: u64, key: K, value: V) {
        let fp = fingerprint(hash);
        let mask = self.mask();
        let home = (hash as usize) & mask;
        let mut tombstone_target = None;
        let mut full_collision_count = 0;

        'outer: for group in 0..MAX_SEEK_GROUPS {
            let base = (home + group * GROUP) & mask;
            for i in 0..GROUP {
                let idx = (base + i) & mask;
                match self.imap[idx] {
                    EMPTY => {
                        let target = tombstone_target.unwrap_or(idx);
                        self.place(target, fp, hash, key, value);
                        break 'outer;
                    }
                    TOMBSTONE => {
                        if tombstone_target.is_none() {
                            tombstone_target = Some(idx);
                        }
                    }
                    byte if byte == fp => {
                        full_collision_count += 1;
                    }
                    _ => {}
                }
            }
        }

        if full_collision_count >= MAX_FULL_COLLISIONS && !self.under_attack {
            #[cfg(feature = "tracing")]
            tracing::warn!(full_collision_count, "hash map flagged under_attack");
            self.under_attack = true;
        }
    }

    fn place(&mut self, idx: usize, fp: u8, hash: u64, key: K, value: V) {
        self.imap[idx] = fp;
        self.entries[idx] = Some(Entry {
            hash,
            key,
            value,
            link: Link::detached(),
        });
        self.len += 1;
        if self.lru_enabled {
            let mut links = self.links_mut();
            self.lru.push_front(&mut links, idx);
            self.sync_links(links);
        }
    }

    pub fn remove(&mut self, hash: u64, key: &K) -> Option<V> {
        let idx = self.find_slot(hash, key)?;
        self.imap[idx] = TOMBSTONE;
        let entry = self.entries[idx].take().unwrap();
        self.len -= 1;
        if self.lru_enabled {
            let mut links = self.links_mut();
            self.lru.unlink(&mut links, idx);
            self.sync_links(links);
        }
        Some(entry.value)
    }

    fn grow(&mut self) {
        let old_entries = std::mem::take(&mut self.entries);
        let old_imap = std::mem::take(&mut self.imap);
        self.bits += 1;
        let capa = 1usize << self.bits;
        self.imap = vec![EMPTY; capa];
        self.entries = (0..capa).map(|_| None).collect();
        self.len = 0;
        self.lru = IndexedList::new();

        for (slot, entry) in old_imap.into_iter().zip(old_entries) {
            if slot != EMPTY && slot != TOMBSTONE {
                if let Some(entry) = entry {
                    self.insert_fresh(entry.hash, entry.key, entry.value);
                }
            }
        }
    }

    /// Evicts up to `n` entries: least-recently-used first if LRU is
    /// enabled, otherwise in table scan order (deterministic, but
    /// unspecified relative to insertion order).
    pub fn evict(&mut self, n: usize) -> usize {
        let mut evicted = 0;
        if self.lru_enabled {
            let mut links = self.links_mut();
            while evicted < n {
                let Some(idx) = self.lru.pop_back(&mut links) else {
                    break;
                };
                self.imap[idx] = TOMBSTONE;
                self.entries[idx] = None;
                self.len -= 1;
                evicted += 1;
            }
            self.sync_links(links);
        } else {
            for idx in 0..self.imap.len() {
                if evicted >= n {
                    break;
                }
                if self.imap[idx] != EMPTY && self.imap[idx] != TOMBSTONE {
                    self.imap[idx] = TOMBSTONE;
                    self.entries[idx] = None;
                    self.len -= 1;
                    evicted += 1;
                }
            }
        }
        evicted
    }

    pub fn clear(&mut self) {
        for slot in self.imap.iter_mut() {
            *slot = EMPTY;
        }
        for entry in self.entries.iter_mut() {
            *entry = None;
        }
        self.len = 0;
        self.lru = IndexedList::new();
    }

    pub fn each<F: FnMut(&K, &V)>(&self, mut task: F) {
        for entry in self.entries.iter().flatten() {
            task(&entry.key, &entry.value);
        }
    }
}

impl<K: PartialEq, V> Default for UnorderedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::hash::risky_hash;

    fn h(key: &str) -> u64 {
        risky_hash(0, key.as_bytes())
    }

    #[test]
    fn set_then_get_roundtrips() {
        let mut m = UnorderedMap::new();
        m.set(h("a"), "a".to_string(), 1);
        m.set(h("b"), "b".to_string(), 2);
        assert_eq!(m.get(h("a"), &"a".to_string()), Some(&1));
        assert_eq!(m.get(h("b"), &"b".to_string()), Some(&2));
        assert_eq!(m.get(h("c"), &"c".to_string()), None);
    }

    #[test]
    fn set_overwrites_existing_key() {
        let mut m = UnorderedMap::new();
        m.set(h("a"), "a".to_string(), 1);
        let old = m.set(h("a"), "a".to_string(), 2);
        assert_eq!(old, Some(1));
        assert_eq!(m.get(h("a"), &"a".to_string()), Some(&2));
    }

    #[test]
    fn remove_then_reinsert_reuses_tombstone() {
        let mut m = UnorderedMap::new();
        m.set(h("a"), "a".to_string(), 1);
        assert_eq!(m.remove(h("a"), &"a".to_string()), Some(1));
        assert_eq!(m.get(h("a"), &"a".to_string()), None);
        m.set(h("a"), "a".to_string(), 9);
        assert_eq!(m.get(h("a"), &"a".to_string()), Some(&9));
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut m = UnorderedMap::new();
        for i in 0..200 {
            m.set(h(&i.to_string()), i.to_string(), i);
        }
        assert_eq!(m.count(), 200);
        for i in 0..200 {
            assert_eq!(m.get(h(&i.to_string()), &i.to_string()), Some(&i));
        }
    }

    #[test]
    fn lru_evict_drops_least_recently_used() {
        let mut m = UnorderedMap::with_lru();
        m.set(h("a"), "a".to_string(), 1);
        m.set(h("b"), "b".to_string(), 2);
        m.set(h("c"), "c".to_string(), 3);
        m.get(h("a"), &"a".to_string());
        let evicted = m.evict(1);
        assert_eq!(evicted, 1);
        assert_eq!(m.get(h("b"), &"b".to_string()), None);
        assert_eq!(m.get(h("a"), &"a".to_string()), Some(&1));
        assert_eq!(m.get(h("c"), &"c".to_string()), Some(&3));
    }

    #[test]
    fn clear_empties_the_map() {
        let mut m = UnorderedMap::new();
        m.set(h("a"), "a".to_string(), 1);
        m.clear();
        assert_eq!(m.count(), 0);
        assert_eq!(m.get(h("a"), &"a".to_string()), None);
    }
}
