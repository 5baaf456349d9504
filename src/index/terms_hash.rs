//! Per-field term builders
//!
//! A `TermsHash` owns the pools of one chain level for one indexing thread.
//! Each indexed field gets a `TermsHashPerField` per level: a dedup table
//! whose ordinals index a set of parallel columns, plus `stream_count` byte
//! streams per term written into the level's pools. The primary level stores
//! term text; the secondary (term vectors) level keys its table by the
//! primary's text starts.
//!
//! Pools are never stored inside a builder. Every operation that touches
//! them takes the owning `TermsHash` (or its pools) by reference.

use crate::error::Result;
use crate::util::{
    oversize, Added, ByteBlockPool, ByteSliceReader, BytesRefHash, BytesStartArray, Counter,
    IntBlockPool, FIRST_LEVEL_SIZE,
};

use super::postings_array::PostingsArray;
use super::term_vectors::TermVectorsConsumerPerField;
use super::types::{FieldInfo, FieldInvertState};

/// Pools of one chain level
#[derive(Debug)]
pub struct TermsHashPools {
    pub int_pool: IntBlockPool,
    pub byte_pool: ByteBlockPool,
}

impl TermsHashPools {
    fn new(bytes_used: &Counter) -> Self {
        Self {
            int_pool: IntBlockPool::new(bytes_used.clone()),
            byte_pool: ByteBlockPool::new(bytes_used.clone()),
        }
    }

    fn reset(&mut self) {
        self.int_pool.reset();
        self.byte_pool.reset();
    }
}

/// Pool owner for one chain level, optionally followed by the next level
#[derive(Debug)]
pub struct TermsHash {
    pools: TermsHashPools,
    bytes_used: Counter,
    next: Option<Box<TermsHash>>,
}

impl TermsHash {
    /// A primary level, followed by a term-vectors level if `with_vectors`
    pub fn new(bytes_used: Counter, with_vectors: bool) -> Self {
        let next = with_vectors.then(|| {
            Box::new(TermsHash {
                pools: TermsHashPools::new(&bytes_used),
                bytes_used: bytes_used.clone(),
                next: None,
            })
        });
        Self {
            pools: TermsHashPools::new(&bytes_used),
            bytes_used,
            next,
        }
    }

    pub fn pools(&self) -> &TermsHashPools {
        &self.pools
    }

    pub fn next(&self) -> Option<&TermsHash> {
        self.next.as_deref()
    }

    pub fn bytes_used(&self) -> &Counter {
        &self.bytes_used
    }

    /// Builder for the next level of `field`, if this level has one
    pub fn next_per_field(
        &self,
        field: &FieldInfo,
        hash_init_size: usize,
    ) -> Option<Box<TermsHashPerField<TermVectorsConsumerPerField>>> {
        self.next.as_deref().map(|next| {
            Box::new(TermsHashPerField::new(
                next,
                field,
                TermVectorsConsumerPerField::new(),
                hash_init_size,
            ))
        })
    }

    /// Release this level's pools; the next level is left alone
    pub fn reset(&mut self) {
        self.pools.reset();
    }

    /// Release the pools of every level
    pub fn abort(&mut self) {
        self.reset();
        if let Some(next) = self.next.as_mut() {
            next.abort();
        }
    }

    pub(crate) fn next_mut(&mut self) -> Option<&mut TermsHash> {
        self.next.as_deref_mut()
    }
}

/// Adapter that lets a dedup table use a postings array's text-start column
/// as its ordinal column
#[derive(Debug)]
pub struct PostingsBytesStartArray<P: PostingsArray> {
    /// Empty template while released
    postings: P,
    allocated: bool,
    bytes_used: Counter,
}

impl<P: PostingsArray> PostingsBytesStartArray<P> {
    pub fn new(template: P, bytes_used: Counter) -> Self {
        Self {
            postings: template.new_instance(0),
            allocated: false,
            bytes_used,
        }
    }

    pub fn postings(&self) -> &P {
        &self.postings
    }

    pub fn postings_mut(&mut self) -> &mut P {
        &mut self.postings
    }

    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    fn footprint(&self) -> i64 {
        (self.postings.size() * self.postings.bytes_per_posting()) as i64
    }
}

impl<P: PostingsArray> BytesStartArray for PostingsBytesStartArray<P> {
    fn init(&mut self, capacity: usize) {
        if self.allocated {
            return;
        }
        self.postings = self.postings.new_instance(capacity);
        self.allocated = true;
        self.bytes_used.add_and_get(self.footprint());
    }

    fn grow(&mut self, min_capacity: usize) {
        if !self.allocated {
            self.init(min_capacity);
            return;
        }
        let before = self.footprint();
        let new_size = oversize(min_capacity.max(self.postings.size() + 1));
        self.postings.grow_to(new_size);
        self.bytes_used.add_and_get(self.footprint() - before);
    }

    fn clear(&mut self) {
        if !self.allocated {
            return;
        }
        self.bytes_used.add_and_get(-self.footprint());
        self.postings = self.postings.new_instance(0);
        self.allocated = false;
    }

    fn starts(&self) -> &[u32] {
        &self.postings.base().text_starts
    }

    fn starts_mut(&mut self) -> &mut [u32] {
        &mut self.postings.base_mut().text_starts
    }

    fn bytes_used(&self) -> &Counter {
        &self.bytes_used
    }
}

/// Write access to the byte streams of one term
pub struct StreamCursor<'a> {
    int_pool: &'a mut IntBlockPool,
    byte_pool: &'a mut ByteBlockPool,
    /// Int-pool address of the term's per-stream write pointers
    int_start: usize,
}

impl<'a> StreamCursor<'a> {
    pub fn write_byte(&mut self, stream: usize, b: u8) {
        let pointer = self.int_start + stream;
        let mut upto = self.int_pool.get(pointer) as usize;
        if self.byte_pool.byte_at(upto) != 0 {
            // Hit the end marker
            upto = self.byte_pool.alloc_slice(upto);
        }
        self.byte_pool.set_byte(upto, b);
        self.int_pool.set(pointer, (upto + 1) as u32);
    }

    pub fn write_bytes(&mut self, stream: usize, bytes: &[u8]) {
        for &b in bytes {
            self.write_byte(stream, b);
        }
    }

    pub fn write_vint(&mut self, stream: usize, mut value: u32) {
        while value & !0x7f != 0 {
            self.write_byte(stream, ((value & 0x7f) | 0x80) as u8);
            value >>= 7;
        }
        self.write_byte(stream, value as u8);
    }
}

/// What a builder does with each term occurrence
pub trait TermsHashConsumerPerField {
    type Postings: PostingsArray;

    /// Byte streams needed per term
    fn stream_count(&self) -> usize;

    fn create_postings_array(&self, size: usize) -> Self::Postings;

    /// Called before a document's tokens for the field; returns whether this
    /// consumer takes part for that document
    fn start(&mut self, field: &FieldInfo, state: &FieldInvertState) -> bool;

    /// First occurrence of term `ord` since the last reset
    fn new_term(
        &mut self,
        ord: usize,
        postings: &mut Self::Postings,
        streams: &mut StreamCursor<'_>,
        state: &mut FieldInvertState,
    );

    /// Any later occurrence of term `ord`
    fn add_term(
        &mut self,
        ord: usize,
        postings: &mut Self::Postings,
        streams: &mut StreamCursor<'_>,
        state: &mut FieldInvertState,
    );

    /// Called after the field's last token in a document
    fn finish(&mut self, _state: &FieldInvertState) {}
}

/// Term builder for one field at one chain level
#[derive(Debug)]
pub struct TermsHashPerField<C: TermsHashConsumerPerField> {
    field_name: String,
    consumer: C,
    table: BytesRefHash<PostingsBytesStartArray<C::Postings>>,
    stream_count: usize,
    num_posting_int: usize,
    do_next_call: bool,
    next: Option<Box<TermsHashPerField<TermVectorsConsumerPerField>>>,
}

impl<C: TermsHashConsumerPerField> TermsHashPerField<C> {
    /// Builder for `field` charged to `terms_hash`'s counter; the next level
    /// is created through `terms_hash` when it has one
    pub fn new(terms_hash: &TermsHash, field: &FieldInfo, consumer: C, hash_init_size: usize) -> Self {
        let stream_count = consumer.stream_count();
        let start_array =
            PostingsBytesStartArray::new(consumer.create_postings_array(0), terms_hash.bytes_used.clone());
        Self {
            field_name: field.name.clone(),
            table: BytesRefHash::new(hash_init_size, start_array),
            consumer,
            stream_count,
            num_posting_int: 2 * stream_count,
            do_next_call: false,
            next: terms_hash.next_per_field(field, hash_init_size),
        }
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn stream_count(&self) -> usize {
        self.stream_count
    }

    pub fn num_posting_int(&self) -> usize {
        self.num_posting_int
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    pub fn consumer_mut(&mut self) -> &mut C {
        &mut self.consumer
    }

    pub fn table(&self) -> &BytesRefHash<PostingsBytesStartArray<C::Postings>> {
        &self.table
    }

    pub fn postings(&self) -> &C::Postings {
        self.table.start_array().postings()
    }

    pub fn num_terms(&self) -> usize {
        self.table.len()
    }

    pub fn next(&self) -> Option<&TermsHashPerField<TermVectorsConsumerPerField>> {
        self.next.as_deref()
    }

    pub fn next_mut(&mut self) -> Option<&mut TermsHashPerField<TermVectorsConsumerPerField>> {
        self.next.as_deref_mut()
    }

    /// Forget every term at this level and below. Pools are untouched.
    pub fn reset(&mut self) {
        self.table.clear();
        if let Some(next) = self.next.as_mut() {
            next.reset();
        }
    }

    /// Discard everything accumulated so far, down the whole chain
    pub fn abort(&mut self) {
        self.reset();
        if let Some(next) = self.next.as_mut() {
            next.abort();
        }
    }

    /// Bound the table's slot array after a flush
    pub fn shrink_hash(&mut self, target_size: usize) {
        self.table.clear();
        self.table.shrink(target_size);
    }

    /// Begin a document's tokens for this field
    pub fn start(&mut self, field: &FieldInfo, state: &FieldInvertState) -> bool {
        let do_call = self.consumer.start(field, state);
        self.do_next_call = match self.next.as_mut() {
            Some(next) => next.start(field, state),
            None => false,
        };
        do_call || self.do_next_call
    }

    /// End a document's tokens for this field
    pub fn finish(&mut self, state: &FieldInvertState) {
        self.consumer.finish(state);
        if self.do_next_call {
            if let Some(next) = self.next.as_mut() {
                next.finish(state);
            }
        }
    }

    /// Record one occurrence of `term` at `state.position`.
    ///
    /// The term text is interned into `terms_hash`'s byte pool. A term too
    /// long for a pool block is rejected and nothing changes.
    pub fn add(&mut self, terms_hash: &mut TermsHash, term: &[u8], state: &mut FieldInvertState) -> Result<()> {
        let TermsHash { pools, next, .. } = terms_hash;

        let added = self.table.add(&mut pools.byte_pool, term)?;
        self.record(pools, added, state);

        if self.do_next_call {
            if let (Some(next_field), Some(next_hash)) = (self.next.as_mut(), next.as_deref_mut()) {
                let text_start = self.table.text_start(added.ord());
                next_field.add_by_text_start(&mut next_hash.pools, text_start, state);
            }
        }
        Ok(())
    }

    /// Record one occurrence of a term already interned by the previous
    /// level, identified by its text start
    pub fn add_by_text_start(&mut self, pools: &mut TermsHashPools, text_start: usize, state: &mut FieldInvertState) {
        let added = self.table.add_by_text_start(text_start);
        self.record(pools, added, state);
    }

    fn record(&mut self, pools: &mut TermsHashPools, added: Added, state: &mut FieldInvertState) {
        match added {
            Added::New(ord) => {
                // All first-level slices of a term sit back to back in one block
                pools.byte_pool.reserve(self.num_posting_int * FIRST_LEVEL_SIZE);
                let int_start = pools.int_pool.alloc(self.stream_count);
                for stream in 0..self.stream_count {
                    let upto = pools.byte_pool.new_slice(FIRST_LEVEL_SIZE);
                    pools.int_pool.set(int_start + stream, upto as u32);
                }

                let postings = self.table.start_array_mut().postings_mut();
                let base = postings.base_mut();
                base.int_starts[ord] = int_start as u32;
                base.byte_starts[ord] = pools.int_pool.get(int_start);

                let mut streams = StreamCursor {
                    int_pool: &mut pools.int_pool,
                    byte_pool: &mut pools.byte_pool,
                    int_start,
                };
                self.consumer.new_term(ord, postings, &mut streams, state);
            }
            Added::Existing(ord) => {
                let postings = self.table.start_array_mut().postings_mut();
                let int_start = postings.base().int_starts[ord] as usize;
                let mut streams = StreamCursor {
                    int_pool: &mut pools.int_pool,
                    byte_pool: &mut pools.byte_pool,
                    int_start,
                };
                self.consumer.add_term(ord, postings, &mut streams, state);
            }
        }
    }

    /// Reader over everything written so far to `stream` of term `ord`;
    /// `pools` must be this level's pools
    pub fn stream_reader<'p>(&self, pools: &'p TermsHashPools, ord: usize, stream: usize) -> ByteSliceReader<'p> {
        debug_assert!(stream < self.stream_count);
        let base = self.postings().base();
        let start = base.byte_starts[ord] as usize + stream * FIRST_LEVEL_SIZE;
        let end = pools.int_pool.get(base.int_starts[ord] as usize + stream) as usize;
        ByteSliceReader::new(&pools.byte_pool, start, end)
    }

    /// Bytes of term `ord`, read from the primary level's byte pool
    pub fn term<'p>(&self, term_pool: &'p ByteBlockPool, ord: usize) -> &'p [u8] {
        self.table.get(term_pool, ord)
    }

    /// Ordinals ordered by term bytes
    pub fn sorted_term_ids(&self, term_pool: &ByteBlockPool) -> Vec<usize> {
        self.table.sorted_ords(term_pool)
    }
}
