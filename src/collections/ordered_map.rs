//! Insertion-order-preserving hash map with optional LRU eviction.
//!
//! Entries live in a contiguous array in insertion order, with holes left
//! by deletion; a separate power-of-two index table maps hash fragments to
//! positions in that array. Lookup probes cuckoo-style groups of
//! neighboring slots in the index table rather than the entry array
//! itself — the entry array is never touched until a candidate fragment
//! matches.

use super::hash::normalize;
use super::list::{IndexedList, Link};

const GROUP: usize = 5;
const MAX_SEEK_GROUPS: usize = 64;

/// One slot in the index table: `None` if empty, else a hash fragment
/// paired with the entry array position it points at.
#[derive(Clone, Copy)]
struct IndexSlot {
    fragment: u32,
    data_index: u32,
}

const NO_SLOT: u32 = u32::MAX;

struct Entry<K, V> {
    hash: u64,
    key: K,
    value: V,
    link: Link,
}

/// Insertion-ordered associative container. Deleted entries leave `None`
/// holes in `entries` so that other entries' positions (and therefore the
/// index table's `data_index` values) never need to move.
pub struct OrderedMap<K, V> {
    index: Vec<Option<IndexSlot>>,
    entries: Vec<Option<Entry<K, V>>>,
    index_bits: u32,
    len: usize,
    holes: usize,
    lru_enabled: bool,
    lru: IndexedList,
}

fn fragment_of(hash: u64) -> u32 {
    (hash >> 32) as u32
}

impl<K: PartialEq, V> OrderedMap<K, V> {
    pub fn new() -> Self {
        Self::with_bits(4, false)
    }

    pub fn with_lru() -> Self {
        Self::with_bits(4, true)
    }

    fn with_bits(bits: u32, lru_enabled: bool) -> Self {
        Self {
            index: vec![None; 1 << bits],
            entries: Vec::new(),
            index_bits: bits,
            len: 0,
            holes: 0,
            lru_enabled,
            lru: IndexedList::new(),
        }
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn capa(&self) -> usize {
        self.index.len()
    }

    fn index_mask(&self) -> usize {
        self.index.len() - 1
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

    fn touch(&mut self, data_index: usize) {
        if !self.lru_enabled {
            return;
        }
        let mut links = self.links_mut();
        self.lru.move_to_front(&mut links, data_index);
        self.sync_links(links);
    }

    /// Searches the index table for `key`. Returns `(slot_position,
    /// data_index)` on a hit.
    fn find(&self, hash: u64, key: &K) -> Option<(usize, usize)> {
        let hash = normalize(hash);
        let fragment = fragment_of(hash);
        let mask = self.index_mask();
        let home = (hash as usize) & mask;

        for group in 0..MAX_SEEK_GROUPS {
            let base = (home + group * GROUP) & mask;
            for i in 0..GROUP {
                let pos = (base + i) & mask;
                match self.index[pos] {
                    None => return None,
                    Some(slot) if slot.fragment == fragment => {
                        let data_index = slot.data_index as usize;
                        if let Some(entry) = &self.entries[data_index] {
                            if entry.hash == hash && entry.key == *key {
                                return Some((pos, data_index));
                            }
                        }
                    }
                    Some(_) => {}
                }
            }
        }
        None
    }

    pub fn get(&mut self, hash: u64, key: &K) -> Option<&V> {
        let (_, data_index) = self.find(hash, key)?;
        self.touch(data_index);
        self.entries[data_index].as_ref().map(|e| &e.value)
    }

    /// Looks up `key` without promoting it in the LRU chain.
    pub fn peek(&self, hash: u64, key: &K) -> Option<&V> {
        let (_, data_index) = self.find(hash, key)?;
        self.entries[data_index].as_ref().map(|e| &e.value)
    }

    pub fn set(&mut self, hash: u64, key: K, value: V) -> Option<V> {
        let hash = normalize(hash);
        if let Some((_, data_index)) = self.find(hash, &key) {
            self.touch(data_index);
            return self.entries[data_index]
                .as_mut()
                .map(|e| std::mem::replace(&mut e.value, value));
        }

        if (self.len + 1) * 2 >= self.index.len() || self.holes * 4 > self.entries.len().max(1) {
            self.rehash();
        }
        self.insert_fresh(hash, key, value);
        None
    }

    pub fn set_if_missing(&mut self, hash: u64, key: K, value: V) -> bool {
        let hash = normalize(hash);
        if self.find(hash, &key).is_some() {
            return false;
        }
        self.set(hash, key, value);
        true
    }

    fn insert_fresh(&mut self, hash: u64, key: K, value: V) {
        let data_index = self.entries.len();
        self.entries.push(Some(Entry {
            hash,
            key,
            value,
            link: Link::detached(),
        }));
        self.len += 1;
        self.place_index(hash, data_index);
        if self.lru_enabled {
            let mut links = self.links_mut();
            self.lru.push_front(&mut links, data_index);
            self.sync_links(links);
        }
    }

    fn place_index(&mut self, hash: u64, data_index: usize) {
        let fragment = fragment_of(hash);
        let mask = self.index_mask();
        let home = (hash as usize) & mask;

        for group in 0..MAX_SEEK_GROUPS {
            let base = (home + group * GROUP) & mask;
            for i in 0..GROUP {
                let pos = (base + i) & mask;
                if self.index[pos].is_none() {
                    self.index[pos] = Some(IndexSlot {
                        fragment,
                        data_index: data_index as u32,
                    });
                    return;
                }
            }
        }
        // Exhausted the probe horizon: grow and retry once.
        self.rehash();
        self.place_index(hash, data_index);
    }

    pub fn remove(&mut self, hash: u64, key: &K) -> Option<V> {
        let hash = normalize(hash);
        let (pos, data_index) = self.find(hash, key)?;
        self.index[pos] = None;
        let entry = self.entries[data_index].take().unwrap();
        self.len -= 1;
        self.holes += 1;
        if self.lru_enabled {
            let mut links = self.links_mut();
            self.lru.unlink(&mut links, data_index);
            self.sync_links(links);
        }
        Some(entry.value)
    }

    fn rehash(&mut self) {
        self.index_bits += 1;
        self.index = vec![None; 1 << self.index_bits];
        for (data_index, entry) in self.entries.iter().enumerate() {
            if let Some(entry) = entry {
                let fragment = fragment_of(entry.hash);
                self.reinsert_index(entry.hash, fragment, data_index);
            }
        }

        if self.holes > 0 {
            self.compact();
        }
    }

    fn reinsert_index(&mut self, hash: u64, fragment: u32, data_index: usize) {
        let mask = self.index_mask();
        let home = (hash as usize) & mask;
        for group in 0.. {
            let base = (home + group * GROUP) & mask;
            for i in 0..GROUP {
                let pos = (base + i) & mask;
                if self.index[pos].is_none() {
                    self.index[pos] = Some(IndexSlot {
                        fragment,
                        data_index: data_index as u32,
                    });
                    return;
                }
            }
            if group > self.index.len() {
                unreachable!("index table too small to reinsert every live entry");
            }
        }
    }

    /// Drops `None` holes out of the entry array, reassigning
    /// `data_index`es (and LRU links, if enabled) to match.
    pub fn compact(&mut self) {
        if self.holes == 0 {
            return;
        }

        let old_lru_order: Vec<usize> = if self.lru_enabled {
            let links = self.links_mut();
            self.lru.iter(&links).collect()
        } else {
            Vec::new()
        };

        let mut remap = vec![NO_SLOT; self.entries.len()];
        let mut fresh = Vec::with_capacity(self.len);
        for (old_idx, entry) in self.entries.drain(..).enumerate() {
            if let Some(entry) = entry {
                remap[old_idx] = fresh.len() as u32;
                fresh.push(Some(entry));
            }
        }
        self.entries = fresh;
        self.holes = 0;

        for slot in self.index.iter_mut().flatten() {
            slot.data_index = remap[slot.data_index as usize];
        }

        if self.lru_enabled {
            let mut links = vec![Link::detached(); self.entries.len()];
            self.lru = IndexedList::new();
            for old_idx in old_lru_order.into_iter().rev() {
                let new_idx = remap[old_idx] as usize;
                self.lru.push_front(&mut links, new_idx);
            }
            self.sync_links(links);
        }
    }

    pub fn clear(&mut self) {
        self.index = vec![None; self.index.len()];
        self.entries.clear();
        self.len = 0;
        self.holes = 0;
        self.lru = IndexedList::new();
    }

    pub fn reserve(&mut self, additional: usize) {
        self.entries.reserve(additional);
    }

    pub fn evict(&mut self, n: usize) -> usize {
        let mut evicted = 0;
        if self.lru_enabled {
            let mut links = self.links_mut();
            let mut to_remove = Vec::new();
            while evicted < n {
                let Some(idx) = self.lru.pop_back(&mut links) else {
                    break;
                };
                to_remove.push(idx);
                evicted += 1;
            }
            self.sync_links(links);
            for idx in to_remove {
                if let Some(entry) = self.entries[idx].as_ref() {
                    let pos = self.find(entry.hash, &entry.key).map(|(pos, _)| pos);
                    self.entries[idx] = None;
                    if let Some(pos) = pos {
                        self.index[pos] = None;
                    }
                    self.len -= 1;
                    self.holes += 1;
                }
            }
        } else {
            for idx in 0..self.entries.len() {
                if evicted >= n {
                    break;
                }
                if let Some(entry) = self.entries[idx].as_ref() {
                    let pos = self.find(entry.hash, &entry.key).map(|(pos, _)| pos);
                    self.entries[idx] = None;
                    if let Some(pos) = pos {
                        self.index[pos] = None;
                    }
                    self.len -= 1;
                    self.holes += 1;
                    evicted += 1;
                }
            }
        }
        evicted
    }

    pub fn each<F: FnMut(&K, &V)>(&self, mut task: F) {
        for entry in self.entries.iter().flatten() {
            task(&entry.key, &entry.value);
        }
    }
}

impl<K: PartialEq, V> Default for OrderedMap<K, V> {
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
    fn insertion_order_preserved_through_each() {
        let mut m = OrderedMap::new();
        m.set(h("z"), "z".to_string(), 1);
        m.set(h("a"), "a".to_string(), 2);
        m.set(h("m"), "m".to_string(), 3);
        let mut seen = Vec::new();
        m.each(|k, _| seen.push(k.clone()));
        assert_eq!(seen, vec!["z", "a", "m"]);
    }

    #[test]
    fn get_after_set_and_remove() {
        let mut m = OrderedMap::new();
        m.set(h("a"), "a".to_string(), 1);
        assert_eq!(m.get(h("a"), &"a".to_string()), Some(&1));
        assert_eq!(m.remove(h("a"), &"a".to_string()), Some(1));
        assert_eq!(m.get(h("a"), &"a".to_string()), None);
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut m = OrderedMap::new();
        for i in 0..300 {
            m.set(h(&i.to_string()), i.to_string(), i);
        }
        assert_eq!(m.count(), 300);
        for i in 0..300 {
            assert_eq!(m.get(h(&i.to_string()), &i.to_string()), Some(&i));
        }
    }

    #[test]
    fn compact_preserves_values_after_removals() {
        let mut m = OrderedMap::new();
        for i in 0..20 {
            m.set(h(&i.to_string()), i.to_string(), i);
        }
        for i in (0..20).step_by(2) {
            m.remove(h(&i.to_string()), &i.to_string());
        }
        m.compact();
        for i in (1..20).step_by(2) {
            assert_eq!(m.get(h(&i.to_string()), &i.to_string()), Some(&i));
        }
    }

    #[test]
    fn lru_evict_removes_least_recently_touched() {
        let mut m = OrderedMap::with_lru();
        m.set(h("a"), "a".to_string(), 1);
        m.set(h("b"), "b".to_string(), 2);
        m.set(h("c"), "c".to_string(), 3);
        m.get(h("a"), &"a".to_string());
        m.evict(1);
        assert_eq!(m.get(h("b"), &"b".to_string()), None);
        assert_eq!(m.get(h("a"), &"a".to_string()), Some(&1));
    }
}
