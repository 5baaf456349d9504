//! Term dedup table
//!
//! `BytesRefHash` maps term bytes (stored in a `ByteBlockPool`) to dense
//! ordinals `0..len`. The table itself only owns its slot array; the column
//! that maps an ordinal back to its text start lives in a
//! [`BytesStartArray`] adapter, which decides how that column is allocated,
//! grown and released.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::Result;

use super::block_pool::ByteBlockPool;
use super::counter::Counter;

const EMPTY: i32 = -1;

/// Storage lifecycle of the ordinal → text-start column
pub trait BytesStartArray {
    /// Allocate the column with room for `capacity` ordinals.
    ///
    /// Does nothing if a column is already allocated.
    fn init(&mut self, capacity: usize);

    /// Grow the column (and anything parallel to it) to hold at least
    /// `min_capacity` ordinals, keeping existing entries.
    fn grow(&mut self, min_capacity: usize);

    /// Release the column. The table calls `init` again before reuse.
    fn clear(&mut self);

    /// Text starts by ordinal; empty while released
    fn starts(&self) -> &[u32];

    fn starts_mut(&mut self) -> &mut [u32];

    fn bytes_used(&self) -> &Counter;
}

/// Over-allocation policy for growing per-ordinal columns
pub fn oversize(min_target: usize) -> usize {
    min_target + (min_target >> 3).max(3)
}

/// Plain `Vec<u32>` column, for tables that need nothing but text starts
#[derive(Debug)]
pub struct DirectBytesStartArray {
    starts: Vec<u32>,
    allocated: bool,
    bytes_used: Counter,
}

impl DirectBytesStartArray {
    pub fn new(bytes_used: Counter) -> Self {
        Self {
            starts: Vec::new(),
            allocated: false,
            bytes_used,
        }
    }

    fn footprint(&self) -> i64 {
        (self.starts.len() * std::mem::size_of::<u32>()) as i64
    }
}

impl BytesStartArray for DirectBytesStartArray {
    fn init(&mut self, capacity: usize) {
        if !self.allocated {
            self.starts = vec![0; capacity];
            self.allocated = true;
            self.bytes_used.add_and_get(self.footprint());
        }
    }

    fn grow(&mut self, min_capacity: usize) {
        if !self.allocated {
            self.init(min_capacity);
            return;
        }
        let before = self.footprint();
        let new_size = oversize(min_capacity.max(self.starts.len() + 1));
        self.starts.resize(new_size, 0);
        self.bytes_used.add_and_get(self.footprint() - before);
    }

    fn clear(&mut self) {
        if self.allocated {
            self.bytes_used.add_and_get(-self.footprint());
            self.starts = Vec::new();
            self.allocated = false;
        }
    }

    fn starts(&self) -> &[u32] {
        &self.starts
    }

    fn starts_mut(&mut self) -> &mut [u32] {
        &mut self.starts
    }

    fn bytes_used(&self) -> &Counter {
        &self.bytes_used
    }
}

/// Outcome of adding a term
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Added {
    /// First occurrence; the term got this ordinal
    New(usize),
    /// Already present under this ordinal
    Existing(usize),
}

impl Added {
    pub fn ord(self) -> usize {
        match self {
            Added::New(ord) | Added::Existing(ord) => ord,
        }
    }

    pub fn is_new(self) -> bool {
        matches!(self, Added::New(_))
    }
}

fn hash_bytes(bytes: &[u8]) -> usize {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish() as usize
}

/// Open-addressing hash from term bytes to dense ordinals
#[derive(Debug)]
pub struct BytesRefHash<A: BytesStartArray> {
    hash_size: usize,
    hash_half_size: usize,
    hash_mask: usize,
    count: usize,
    ids: Vec<i32>,
    start_array: A,
    /// Whether `start_array` currently holds a column
    started: bool,
}

impl<A: BytesStartArray> BytesRefHash<A> {
    /// `capacity` must be a power of two of at least 2
    pub fn new(capacity: usize, mut start_array: A) -> Self {
        assert!(
            capacity >= 2 && capacity.is_power_of_two(),
            "hash capacity must be a power of two >= 2, got {}",
            capacity
        );
        start_array.init(capacity);
        Self {
            hash_size: capacity,
            hash_half_size: capacity / 2,
            hash_mask: capacity - 1,
            count: 0,
            ids: vec![EMPTY; capacity],
            start_array,
            started: true,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of hash slots
    pub fn capacity(&self) -> usize {
        self.hash_size
    }

    pub fn start_array(&self) -> &A {
        &self.start_array
    }

    pub fn start_array_mut(&mut self) -> &mut A {
        &mut self.start_array
    }

    pub fn text_start(&self, ord: usize) -> usize {
        self.start_array.starts()[ord] as usize
    }

    /// Bytes of the term with ordinal `ord`
    pub fn get<'p>(&self, pool: &'p ByteBlockPool, ord: usize) -> &'p [u8] {
        debug_assert!(ord < self.count);
        pool.term_at(self.text_start(ord))
    }

    fn ensure_started(&mut self) {
        if !self.started {
            self.start_array.init(self.hash_size);
            self.started = true;
        }
    }

    fn find_slot(&self, pool: &ByteBlockPool, bytes: &[u8]) -> usize {
        let mut code = hash_bytes(bytes);
        let mut pos = code & self.hash_mask;
        while self.ids[pos] != EMPTY && pool.term_at(self.text_start(self.ids[pos] as usize)) != bytes
        {
            code = code.wrapping_add(1);
            pos = code & self.hash_mask;
        }
        pos
    }

    /// Ordinal of `bytes`, if present
    pub fn find(&self, pool: &ByteBlockPool, bytes: &[u8]) -> Option<usize> {
        if !self.started {
            return None;
        }
        let id = self.ids[self.find_slot(pool, bytes)];
        (id != EMPTY).then_some(id as usize)
    }

    /// Intern `bytes`, appending them to `pool` on first sight.
    ///
    /// A term too long for the pool is rejected without changing the table.
    pub fn add(&mut self, pool: &mut ByteBlockPool, bytes: &[u8]) -> Result<Added> {
        self.ensure_started();
        let pos = self.find_slot(pool, bytes);
        let id = self.ids[pos];
        if id != EMPTY {
            return Ok(Added::Existing(id as usize));
        }

        let text_start = pool.append_term(bytes)?;
        let ord = self.push_ordinal(text_start);
        self.ids[pos] = ord as i32;

        if self.count == self.hash_half_size {
            self.rehash(2 * self.hash_size, Some(pool));
        }
        Ok(Added::New(ord))
    }

    /// Intern a term already stored in another table's pool, keyed by its
    /// text start instead of its bytes.
    pub fn add_by_text_start(&mut self, text_start: usize) -> Added {
        self.ensure_started();
        let mut code = text_start;
        let mut pos = code & self.hash_mask;
        while self.ids[pos] != EMPTY && self.text_start(self.ids[pos] as usize) != text_start {
            code = code.wrapping_add(1);
            pos = code & self.hash_mask;
        }
        let id = self.ids[pos];
        if id != EMPTY {
            return Added::Existing(id as usize);
        }

        let ord = self.push_ordinal(text_start);
        self.ids[pos] = ord as i32;

        if self.count == self.hash_half_size {
            self.rehash(2 * self.hash_size, None);
        }
        Added::New(ord)
    }

    fn push_ordinal(&mut self, text_start: usize) -> usize {
        if self.count >= self.start_array.starts().len() {
            self.start_array.grow(self.count + 1);
            assert!(
                self.count < self.start_array.starts().len(),
                "grow left ordinal {} uncovered (column length {})",
                self.count,
                self.start_array.starts().len()
            );
        }
        let ord = self.count;
        self.count += 1;
        self.start_array.starts_mut()[ord] = text_start as u32;
        ord
    }

    /// Re-slot every entry into a table of `new_size` slots.
    ///
    /// With a pool the slot is derived from the term bytes, otherwise from the
    /// text start (tables filled through `add_by_text_start`).
    fn rehash(&mut self, new_size: usize, pool: Option<&ByteBlockPool>) {
        let new_mask = new_size - 1;
        let mut new_ids = vec![EMPTY; new_size];

        for &id in &self.ids {
            if id == EMPTY {
                continue;
            }
            let start = self.text_start(id as usize);
            let mut code = match pool {
                Some(pool) => hash_bytes(pool.term_at(start)),
                None => start,
            };
            let mut pos = code & new_mask;
            while new_ids[pos] != EMPTY {
                code = code.wrapping_add(1);
                pos = code & new_mask;
            }
            new_ids[pos] = id;
        }

        self.hash_size = new_size;
        self.hash_half_size = new_size / 2;
        self.hash_mask = new_mask;
        self.ids = new_ids;
    }

    /// Ordinals sorted by term bytes
    pub fn sorted_ords(&self, pool: &ByteBlockPool) -> Vec<usize> {
        let mut ords: Vec<usize> = (0..self.count).collect();
        ords.sort_unstable_by(|&a, &b| self.get(pool, a).cmp(self.get(pool, b)));
        ords
    }

    /// Halve the slot array toward `target_size` entries.
    ///
    /// Only valid on an empty table. Returns whether the size changed.
    pub fn shrink(&mut self, target_size: usize) -> bool {
        assert!(self.count == 0, "shrink on a table holding {} terms", self.count);
        let mut new_size = self.hash_size;
        while new_size >= 8 && new_size / 4 > target_size {
            new_size /= 2;
        }
        if new_size == self.hash_size {
            return false;
        }
        self.hash_size = new_size;
        self.hash_half_size = new_size / 2;
        self.hash_mask = new_size - 1;
        self.ids = vec![EMPTY; new_size];
        true
    }

    /// Forget every term and release the backing column.
    ///
    /// The pool is left alone. Safe to call on an empty table.
    pub fn clear(&mut self) {
        let last_count = self.count;
        self.count = 0;
        if self.started {
            self.start_array.clear();
            self.started = false;
        }
        if !self.shrink(last_count) {
            self.ids.fill(EMPTY);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(counter: &Counter) -> (ByteBlockPool, BytesRefHash<DirectBytesStartArray>) {
        let pool = ByteBlockPool::new(Counter::new());
        let hash = BytesRefHash::new(4, DirectBytesStartArray::new(counter.clone()));
        (pool, hash)
    }

    #[test]
    fn test_add_assigns_dense_ordinals() {
        let counter = Counter::new();
        let (mut pool, mut hash) = table(&counter);

        assert_eq!(hash.add(&mut pool, b"apple").unwrap(), Added::New(0));
        assert_eq!(hash.add(&mut pool, b"banana").unwrap(), Added::New(1));
        assert_eq!(hash.add(&mut pool, b"apple").unwrap(), Added::Existing(0));
        assert_eq!(hash.len(), 2);
        assert_eq!(hash.get(&pool, 1), b"banana");
        assert_eq!(hash.find(&pool, b"banana"), Some(1));
        assert_eq!(hash.find(&pool, b"cherry"), None);
    }

    #[test]
    fn test_smallest_capacity_grows() {
        let counter = Counter::new();
        let mut pool = ByteBlockPool::new(Counter::new());
        let mut hash = BytesRefHash::new(2, DirectBytesStartArray::new(counter));
        for (i, term) in [&b"a"[..], b"b", b"c"].iter().enumerate() {
            assert_eq!(hash.add(&mut pool, term).unwrap(), Added::New(i));
        }
        assert_eq!(hash.find(&pool, b"c"), Some(2));
    }

    #[test]
    #[should_panic(expected = "power of two >= 2")]
    fn test_single_slot_capacity_panics() {
        BytesRefHash::new(1, DirectBytesStartArray::new(Counter::new()));
    }

    #[test]
    fn test_rehash_keeps_ordinals() {
        let counter = Counter::new();
        let (mut pool, mut hash) = table(&counter);

        let terms: Vec<String> = (0..500).map(|i| format!("term{}", i)).collect();
        for (i, term) in terms.iter().enumerate() {
            assert_eq!(hash.add(&mut pool, term.as_bytes()).unwrap(), Added::New(i));
        }
        assert!(hash.capacity() >= 1024);
        for (i, term) in terms.iter().enumerate() {
            assert_eq!(hash.find(&pool, term.as_bytes()), Some(i));
        }
    }

    #[test]
    fn test_add_by_text_start() {
        let counter = Counter::new();
        let mut pool = ByteBlockPool::new(Counter::new());
        let mut primary = BytesRefHash::new(4, DirectBytesStartArray::new(counter.clone()));
        let mut secondary = BytesRefHash::new(4, DirectBytesStartArray::new(counter));

        for i in 0..100 {
            let ord = primary.add(&mut pool, format!("t{}", i).as_bytes()).unwrap().ord();
            let start = primary.text_start(ord);
            assert_eq!(secondary.add_by_text_start(start), Added::New(i));
            assert_eq!(secondary.add_by_text_start(start), Added::Existing(i));
        }
        assert_eq!(secondary.get(&pool, 42), b"t42");
    }

    #[test]
    fn test_sorted_ords() {
        let counter = Counter::new();
        let (mut pool, mut hash) = table(&counter);
        for term in ["pear", "apple", "zucchini", "fig"] {
            hash.add(&mut pool, term.as_bytes()).unwrap();
        }
        let sorted: Vec<&[u8]> = hash
            .sorted_ords(&pool)
            .into_iter()
            .map(|ord| hash.get(&pool, ord))
            .collect();
        assert_eq!(
            sorted,
            vec![&b"apple"[..], &b"fig"[..], &b"pear"[..], &b"zucchini"[..]]
        );
    }

    #[test]
    fn test_clear_releases_column_and_reinits() {
        let counter = Counter::new();
        let (mut pool, mut hash) = table(&counter);
        assert_eq!(counter.get(), 16);

        for i in 0..50 {
            hash.add(&mut pool, format!("w{}", i).as_bytes()).unwrap();
        }
        assert!(counter.get() > 16);

        hash.clear();
        assert_eq!(counter.get(), 0);
        assert!(hash.is_empty());
        assert!(hash.start_array().starts().is_empty());

        // Idempotent
        hash.clear();
        assert_eq!(counter.get(), 0);

        assert_eq!(hash.add(&mut pool, b"again").unwrap(), Added::New(0));
        assert!(counter.get() > 0);
    }

    #[test]
    fn test_shrink_toward_target() {
        let counter = Counter::new();
        let (mut pool, mut hash) = table(&counter);
        for i in 0..200 {
            hash.add(&mut pool, format!("s{}", i).as_bytes()).unwrap();
        }
        let grown = hash.capacity();
        hash.clear();
        // Clearing shrinks toward the count that was just dropped
        assert!(hash.capacity() <= grown);

        assert!(hash.shrink(1));
        assert_eq!(hash.capacity(), 4);
        assert!(!hash.shrink(1));
    }
}
