//! Buffers one field's per-document values until flush
//!
//! Numeric and binary values are kept per document. Sorted and sorted-set
//! values are interned into a dedup table so each distinct value is stored
//! once; ordinals are remapped to sorted order at flush.

use std::mem;

use crate::codec::DocValuesConsumer;
use crate::error::{QuireError, Result};
use crate::util::{ByteBlockPool, BytesRefHash, Counter, DirectBytesStartArray};

use super::types::{DocId, DocValue, DocValuesType, FieldInfo};

const HASH_INIT_SIZE: usize = 16;

#[derive(Debug)]
enum Pending {
    Numeric(Vec<i64>),
    Binary(Vec<Vec<u8>>),
    Sorted {
        hash: BytesRefHash<DirectBytesStartArray>,
        pool: ByteBlockPool,
        /// Table ordinal per document, -1 without a value
        docs: Vec<i32>,
    },
    SortedSet {
        hash: BytesRefHash<DirectBytesStartArray>,
        pool: ByteBlockPool,
        docs: Vec<Vec<u32>>,
    },
}

#[derive(Debug)]
pub struct DocValuesWriter {
    field: String,
    pending: Pending,
    last_doc: Option<DocId>,
    bytes_used: Counter,
    /// Bytes this writer charged to `bytes_used` outside its pool and table
    charged: i64,
}

impl DocValuesWriter {
    pub fn new(field: &FieldInfo, bytes_used: Counter) -> Result<Self> {
        let interned = || {
            (
                BytesRefHash::new(HASH_INIT_SIZE, DirectBytesStartArray::new(bytes_used.clone())),
                ByteBlockPool::new(bytes_used.clone()),
            )
        };
        let pending = match field.doc_values_type {
            DocValuesType::Numeric => Pending::Numeric(Vec::new()),
            DocValuesType::Binary => Pending::Binary(Vec::new()),
            DocValuesType::Sorted => {
                let (hash, pool) = interned();
                Pending::Sorted { hash, pool, docs: Vec::new() }
            }
            DocValuesType::SortedSet => {
                let (hash, pool) = interned();
                Pending::SortedSet { hash, pool, docs: Vec::new() }
            }
            DocValuesType::None => {
                return Err(QuireError::IllegalArgument(format!(
                    "field {} has no doc values type",
                    field.name
                )))
            }
        };
        Ok(Self {
            field: field.name.clone(),
            pending,
            last_doc: None,
            bytes_used,
            charged: 0,
        })
    }

    fn charge(&mut self, bytes: usize) {
        self.charged += bytes as i64;
        self.bytes_used.add_and_get(bytes as i64);
    }

    /// Buffer `value` for `doc`. Documents arrive in increasing order; a
    /// single-valued field accepts one value per document.
    pub fn add_value(&mut self, doc: DocId, value: &DocValue) -> Result<()> {
        if let Some(last) = self.last_doc {
            if doc < last || (doc == last && !matches!(value, DocValue::SortedSet(_))) {
                return Err(QuireError::IllegalArgument(format!(
                    "field {} already has a doc value for document {}",
                    self.field, doc
                )));
            }
        }
        let slot = doc as usize;

        let charge = match (&mut self.pending, value) {
            (Pending::Numeric(values), DocValue::Numeric(v)) => {
                values.resize(slot, 0);
                values.push(*v);
                8
            }
            (Pending::Binary(values), DocValue::Binary(v)) => {
                values.resize(slot, Vec::new());
                values.push(v.clone());
                v.len() + mem::size_of::<Vec<u8>>()
            }
            (Pending::Sorted { hash, pool, docs }, DocValue::Sorted(v)) => {
                let ord = hash.add(pool, v)?.ord();
                docs.resize(slot, -1);
                docs.push(ord as i32);
                4
            }
            (Pending::SortedSet { hash, pool, docs }, DocValue::SortedSet(vs)) => {
                let mut ords = Vec::with_capacity(vs.len());
                for v in vs {
                    ords.push(hash.add(pool, v)?.ord() as u32);
                }
                docs.resize(slot + 1, Vec::new());
                docs[slot].extend(ords);
                4 * vs.len()
            }
            (_, other) => {
                return Err(QuireError::IllegalArgument(format!(
                    "field {} cannot take a {:?} doc value",
                    self.field,
                    other.doc_values_type()
                )))
            }
        };
        self.charge(charge);
        self.last_doc = Some(doc);
        Ok(())
    }

    /// Hand every document's value, `0..doc_count`, to `consumer`
    pub fn flush(&mut self, doc_count: u32, field: &mut FieldInfo, consumer: &mut dyn DocValuesConsumer) -> Result<()> {
        let doc_count = doc_count as usize;
        match &mut self.pending {
            Pending::Numeric(values) => {
                values.resize(doc_count, 0);
                consumer.add_numeric_field(field, values)?;
            }
            Pending::Binary(values) => {
                values.resize(doc_count, Vec::new());
                consumer.add_binary_field(field, values)?;
            }
            Pending::Sorted { hash, pool, docs } => {
                let (values, rank) = sorted_values(hash, pool);
                docs.resize(doc_count, -1);
                let doc_to_ord: Vec<i32> = docs
                    .iter()
                    .map(|&ord| if ord < 0 { -1 } else { rank[ord as usize] as i32 })
                    .collect();
                consumer.add_sorted_field(field, &values, &doc_to_ord)?;
            }
            Pending::SortedSet { hash, pool, docs } => {
                let (values, rank) = sorted_values(hash, pool);
                docs.resize(doc_count, Vec::new());
                let doc_ords: Vec<Vec<u64>> = docs
                    .iter()
                    .map(|ords| {
                        let mut sorted: Vec<u64> = ords.iter().map(|&o| rank[o as usize] as u64).collect();
                        sorted.sort_unstable();
                        sorted.dedup();
                        sorted
                    })
                    .collect();
                consumer.add_sorted_set_field(field, &values, &doc_ords)?;
            }
        }
        self.release();
        Ok(())
    }

    /// Drop everything buffered
    pub fn abort(&mut self) {
        self.release();
    }

    fn release(&mut self) {
        match &mut self.pending {
            Pending::Numeric(values) => values.clear(),
            Pending::Binary(values) => values.clear(),
            Pending::Sorted { hash, pool, docs } => {
                hash.clear();
                pool.reset();
                docs.clear();
            }
            Pending::SortedSet { hash, pool, docs } => {
                hash.clear();
                pool.reset();
                docs.clear();
            }
        }
        self.bytes_used.add_and_get(-self.charged);
        self.charged = 0;
        self.last_doc = None;
    }
}

/// Distinct values in byte order, and each table ordinal's rank in it
fn sorted_values(hash: &BytesRefHash<DirectBytesStartArray>, pool: &ByteBlockPool) -> (Vec<Vec<u8>>, Vec<usize>) {
    let sorted = hash.sorted_ords(pool);
    let mut rank = vec![0; sorted.len()];
    let values = sorted
        .iter()
        .enumerate()
        .map(|(i, &ord)| {
            rank[ord] = i;
            hash.get(pool, ord).to_vec()
        })
        .collect();
    (values, rank)
}
