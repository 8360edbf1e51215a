use std::mem;

use log::debug;

use crate::record::Record;

/// Starting bucket count of a fresh registry.
const INITIAL_CAPACITY: usize = 7;

/// Highest entries-per-bucket ratio tolerated before the bucket array is
/// doubled. The check runs against the pre-insert ratio, so it can lag by
/// the one entry being inserted.
const LOAD_FACTOR: f64 = 0.86;

/// Mixes an address through a fixed avalanche transform so that nearby
/// heap addresses land in unrelated buckets.
fn hash_address(addr: usize) -> usize {
    let mut key = addr as u64;
    key = (!key).wrapping_add(key << 18);
    key ^= key >> 31;
    key = key.wrapping_mul(21);
    key ^= key >> 11;
    key = key.wrapping_add(key << 6);
    key ^= key >> 22;
    (key as i32).unsigned_abs() as usize
}

/// Address-keyed table of the blocks currently tracked by the collector.
///
/// Collisions are resolved by separate chaining: the first [`Record`]
/// hashed to a bucket sits inline in the slot, later ones are appended to
/// the chain behind it (see the layout diagram on [`Record`]). Traversal
/// order is deterministic: ascending bucket index, then chain order.
///
/// The mark phase also builds a throwaway `Registry` as its candidate
/// address set. All storage here is ordinary owned Rust memory, never a
/// tracked block, so building that set cannot re-enter the allocation path
/// mid-collection.
pub(crate) struct Registry {
    /// Bucket array: an empty slot, one inline record, or a chain head.
    buckets: Vec<Option<Record>>,
    /// Number of records currently stored across all chains.
    len: usize,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            buckets: (0..INITIAL_CAPACITY).map(|_| None).collect(),
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn bucket_index(&self, addr: usize) -> usize {
        hash_address(addr) % self.buckets.len()
    }

    /// Inserts `record`, doubling the bucket array first if the table is
    /// already past its load factor. Returns `false` and changes nothing
    /// if the record's address is already tracked.
    pub fn insert(&mut self, record: Record) -> bool {
        if self.len as f64 / self.buckets.len() as f64 > LOAD_FACTOR {
            self.grow();
        }

        self.place(record)
    }

    /// Inserts without the load-factor check. This is the whole insert
    /// logic; [`Registry::insert`] only adds the growth trigger, and the
    /// rehash in [`Registry::grow`] comes straight here so that re-placing
    /// old entries can never trigger another resize.
    fn place(&mut self, mut record: Record) -> bool {
        record.next = None;

        let index = self.bucket_index(record.addr);

        let Some(head) = self.buckets[index].as_mut() else {
            self.buckets[index] = Some(record);
            self.len += 1;
            return true;
        };

        if head.addr == record.addr {
            return false;
        }

        // Walk to the chain tail, rejecting duplicates along the way.
        let mut link = &mut head.next;
        while let Some(node) = link {
            if node.addr == record.addr {
                return false;
            }
            link = &mut node.next;
        }

        *link = Some(Box::new(record));
        self.len += 1;
        true
    }

    /// Doubles the bucket array and rehashes every record. Flattens each
    /// chain and re-places the records one by one; this is the only
    /// operation that reallocates the buckets.
    fn grow(&mut self) {
        let doubled = self.buckets.len() * 2;
        let old_buckets = mem::replace(&mut self.buckets, (0..doubled).map(|_| None).collect());
        self.len = 0;

        for slot in old_buckets {
            let mut current = slot.map(Box::new);
            while let Some(mut record) = current {
                current = record.next.take();
                let _placed = self.place(*record);
                debug_assert!(_placed, "rehash re-placed a duplicate address");
            }
        }

        debug!("registry doubled to {} buckets", self.capacity());
    }

    /// Looks up the record tracking `addr`, if any.
    pub fn get(&self, addr: usize) -> Option<&Record> {
        let index = self.bucket_index(addr);

        let mut current = self.buckets[index].as_ref()?;
        loop {
            if current.addr == addr {
                return Some(current);
            }
            current = current.next.as_deref()?;
        }
    }

    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        self.get(addr).is_some()
    }

    /// Removes the record tracking `addr`. An inline hit promotes the
    /// chain head into the slot; a chained hit is spliced out. Returns
    /// `false` and changes nothing if the address is not tracked.
    pub fn remove(&mut self, addr: usize) -> bool {
        let index = self.bucket_index(addr);

        let Some(head) = self.buckets[index].as_mut() else {
            return false;
        };

        if head.addr == addr {
            let promoted = head.next.take();
            self.buckets[index] = promoted.map(|next| *next);
            self.len -= 1;
            return true;
        }

        let mut link = &mut head.next;
        loop {
            let hit = match link.as_ref() {
                None => return false,
                Some(node) => node.addr == addr,
            };

            if hit {
                if let Some(removed) = link.take() {
                    *link = removed.next;
                }
                self.len -= 1;
                return true;
            }

            if let Some(node) = link {
                link = &mut node.next;
            }
        }
    }

    /// Visits every record in bucket-then-chain order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            buckets: self.buckets.iter(),
            chain: None,
        }
    }

    /// Mutable visitor over every record in bucket-then-chain order. The
    /// mark and sweep passes use this to rewrite the `in_use` flags.
    pub fn for_each_mut(&mut self, mut visit: impl FnMut(&mut Record)) {
        for slot in &mut self.buckets {
            let mut current = slot.as_mut();
            while let Some(record) = current {
                visit(record);
                current = record.next.as_deref_mut();
            }
        }
    }
}

pub(crate) struct Iter<'a> {
    buckets: std::slice::Iter<'a, Option<Record>>,
    chain: Option<&'a Record>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Record;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.chain {
                self.chain = record.next.as_deref();
                return Some(record);
            }

            match self.buckets.next() {
                Some(slot) => self.chain = slot.as_ref(),
                None => return None,
            }
        }
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = &'a Record;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    /// Addresses that all land in the inline slot of one bucket of a
    /// fresh, capacity-7 table.
    fn colliding_addresses(count: usize) -> Vec<usize> {
        let base = 0x1000usize;
        let target = hash_address(base) % INITIAL_CAPACITY;

        let mut found = vec![base];
        let mut addr = base + 1;
        while found.len() < count {
            if hash_address(addr) % INITIAL_CAPACITY == target {
                found.push(addr);
            }
            addr += 1;
        }
        found
    }

    #[test]
    fn new_registry_is_empty() {
        let registry = Registry::new();

        assert_eq!(registry.len(), 0);
        assert_eq!(registry.capacity(), INITIAL_CAPACITY);
        assert!(registry.is_empty());
        assert!(registry.iter().next().is_none());
    }

    #[test]
    fn insert_then_get_roundtrip() {
        let mut registry = Registry::new();

        assert!(registry.insert(Record::new(0x2000, 64)));

        let record = registry.get(0x2000).expect("address should be tracked");
        assert_eq!(record.size, 64);
        assert!(!record.in_use);
        assert!(registry.get(0x2008).is_none());
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut registry = Registry::new();

        assert!(registry.insert(Record::new(0x2000, 64)));
        assert!(!registry.insert(Record::new(0x2000, 128)));

        assert_eq!(registry.len(), 1);
        // The first record survives the rejected insert untouched.
        assert_eq!(registry.get(0x2000).map(|r| r.size), Some(64));
    }

    #[test]
    fn duplicate_in_chain_is_rejected() {
        let addrs = colliding_addresses(3);
        let mut registry = Registry::new();

        for &addr in &addrs {
            assert!(registry.insert(Record::new(addr, 8)));
        }
        for &addr in &addrs {
            assert!(!registry.insert(Record::new(addr, 8)));
        }

        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn remove_missing_address_is_a_noop() {
        let mut registry = Registry::new();
        registry.insert(Record::new(0x2000, 64));

        assert!(!registry.remove(0x3000));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_inline_record_promotes_chain_head() {
        let addrs = colliding_addresses(3);
        let mut registry = Registry::new();
        for &addr in &addrs {
            registry.insert(Record::new(addr, 8));
        }

        // addrs[0] sits inline; removing it must pull addrs[1] into the
        // slot and keep addrs[2] reachable behind it.
        assert!(registry.remove(addrs[0]));

        assert_eq!(registry.len(), 2);
        assert!(!registry.contains(addrs[0]));
        assert!(registry.contains(addrs[1]));
        assert!(registry.contains(addrs[2]));
    }

    #[test]
    fn remove_mid_chain_record_splices() {
        let addrs = colliding_addresses(3);
        let mut registry = Registry::new();
        for &addr in &addrs {
            registry.insert(Record::new(addr, 8));
        }

        assert!(registry.remove(addrs[1]));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(addrs[0]));
        assert!(!registry.contains(addrs[1]));
        assert!(registry.contains(addrs[2]));

        // Removing it again reports failure without touching anything.
        assert!(!registry.remove(addrs[1]));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn traversal_visits_every_record_once() {
        let mut registry = Registry::new();
        let addrs: Vec<usize> = (0..20).map(|i| 0x4000 + i * 0x40).collect();
        for &addr in &addrs {
            registry.insert(Record::new(addr, 16));
        }

        let mut seen: Vec<usize> = registry.iter().map(|record| record.addr).collect();
        seen.sort_unstable();

        let mut expected = addrs.clone();
        expected.sort_unstable();
        assert_eq!(seen, expected);

        // Two traversals of an unchanged table agree exactly.
        let first: Vec<usize> = registry.iter().map(|record| record.addr).collect();
        let second: Vec<usize> = registry.iter().map(|record| record.addr).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn for_each_mut_reaches_chained_records() {
        let addrs = colliding_addresses(3);
        let mut registry = Registry::new();
        for &addr in &addrs {
            registry.insert(Record::new(addr, 8));
        }

        registry.for_each_mut(|record| record.in_use = true);

        assert!(registry.iter().all(|record| record.in_use));
    }

    #[test]
    fn growth_keeps_every_record_retrievable() {
        let mut registry = Registry::new();
        let addrs: Vec<usize> = (0..200).map(|i| 0x10_0000 + i * 0x30).collect();

        let mut capacity = registry.capacity();
        for &addr in &addrs {
            assert!(registry.insert(Record::new(addr, 8)));
            assert!(registry.capacity() >= capacity, "capacity shrank");
            capacity = registry.capacity();
        }

        assert!(capacity > INITIAL_CAPACITY);
        assert_eq!(registry.len(), addrs.len());
        for &addr in &addrs {
            assert!(registry.contains(addr));
        }
    }

    proptest! {
        #[test]
        fn random_addresses_survive_resizes(
            addrs in prop::collection::hash_set(1usize..usize::MAX, 1..300)
        ) {
            let mut registry = Registry::new();

            for &addr in &addrs {
                prop_assert!(registry.insert(Record::new(addr, 8)));
            }
            prop_assert_eq!(registry.len(), addrs.len());

            for &addr in &addrs {
                prop_assert!(registry.contains(addr));
                prop_assert!(!registry.insert(Record::new(addr, 8)));
            }
            prop_assert_eq!(registry.len(), addrs.len());

            for &addr in &addrs {
                prop_assert!(registry.remove(addr));
            }
            prop_assert!(registry.is_empty());
        }
    }
}
