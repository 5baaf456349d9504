//! Term vectors: the secondary chain level
//!
//! Collects, per document, the terms of each vector-enabled field together
//! with their in-document frequency and positions. The table is keyed by the
//! primary level's text starts and is emptied after every document.

use serde::{Deserialize, Serialize};

use crate::util::ByteBlockPool;

use super::postings_array::{ParallelPostingsArray, PostingsArray};
use super::terms_hash::{StreamCursor, TermsHashConsumerPerField, TermsHashPerField, TermsHashPools};
use super::types::{DocId, FieldInfo, FieldInvertState};

const U32_BYTES: usize = std::mem::size_of::<u32>();

/// One term of a field's vector
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermVector {
    pub term: Vec<u8>,
    pub freq: u32,
    pub positions: Vec<u32>,
}

/// Terms of one field in one document, sorted by term bytes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTermVectors {
    pub field: String,
    pub terms: Vec<TermVector>,
}

/// All vector-enabled fields of one document
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocTermVectors {
    pub doc: DocId,
    pub fields: Vec<FieldTermVectors>,
}

impl DocTermVectors {
    pub fn field(&self, name: &str) -> Option<&FieldTermVectors> {
        self.fields.iter().find(|f| f.field == name)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TermVectorsPostingsArray {
    base: ParallelPostingsArray,
    pub freqs: Vec<u32>,
    pub last_positions: Vec<u32>,
}

impl TermVectorsPostingsArray {
    pub fn new(size: usize) -> Self {
        Self {
            base: ParallelPostingsArray::new(size),
            freqs: vec![0; size],
            last_positions: vec![0; size],
        }
    }
}

impl PostingsArray for TermVectorsPostingsArray {
    fn new_instance(&self, size: usize) -> Self {
        Self::new(size)
    }

    fn base(&self) -> &ParallelPostingsArray {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ParallelPostingsArray {
        &mut self.base
    }

    fn bytes_per_posting(&self) -> usize {
        ParallelPostingsArray::BYTES_PER_POSTING + 2 * U32_BYTES
    }

    fn grow_to(&mut self, new_size: usize) {
        self.base.resize(new_size);
        self.freqs.resize(new_size, 0);
        self.last_positions.resize(new_size, 0);
    }
}

/// Writes position deltas for each term into a single stream
#[derive(Debug, Default)]
pub struct TermVectorsConsumerPerField {
    /// Whether the current document stores vectors for this field
    active: bool,
}

impl TermVectorsConsumerPerField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    fn write_prox(
        postings: &mut TermVectorsPostingsArray,
        ord: usize,
        streams: &mut StreamCursor<'_>,
        state: &FieldInvertState,
    ) {
        streams.write_vint(0, state.position - postings.last_positions[ord]);
        postings.last_positions[ord] = state.position;
    }
}

impl TermsHashConsumerPerField for TermVectorsConsumerPerField {
    type Postings = TermVectorsPostingsArray;

    fn stream_count(&self) -> usize {
        1
    }

    fn create_postings_array(&self, size: usize) -> TermVectorsPostingsArray {
        TermVectorsPostingsArray::new(size)
    }

    fn start(&mut self, field: &FieldInfo, _state: &FieldInvertState) -> bool {
        self.active = field.store_term_vectors && field.is_indexed();
        self.active
    }

    fn new_term(
        &mut self,
        ord: usize,
        postings: &mut TermVectorsPostingsArray,
        streams: &mut StreamCursor<'_>,
        state: &mut FieldInvertState,
    ) {
        postings.freqs[ord] = 1;
        postings.last_positions[ord] = 0;
        Self::write_prox(postings, ord, streams, state);
    }

    fn add_term(
        &mut self,
        ord: usize,
        postings: &mut TermVectorsPostingsArray,
        streams: &mut StreamCursor<'_>,
        state: &mut FieldInvertState,
    ) {
        postings.freqs[ord] += 1;
        Self::write_prox(postings, ord, streams, state);
    }
}

impl TermsHashPerField<TermVectorsConsumerPerField> {
    /// Drain the current document's vector for this field and reset the
    /// table. `pools` are this level's pools, `term_pool` the primary level's
    /// byte pool.
    pub fn finish_document(&mut self, pools: &TermsHashPools, term_pool: &ByteBlockPool) -> Option<FieldTermVectors> {
        if !self.consumer().is_active() {
            return None;
        }
        self.consumer_mut().active = false;

        let terms = self
            .sorted_term_ids(term_pool)
            .into_iter()
            .map(|ord| {
                let freq = self.postings().freqs[ord];
                let mut reader = self.stream_reader(pools, ord, 0);
                let mut position = 0;
                let positions = (0..freq)
                    .map(|_| {
                        position += reader.read_vint();
                        position
                    })
                    .collect();
                TermVector {
                    term: self.term(term_pool, ord).to_vec(),
                    freq,
                    positions,
                }
            })
            .collect::<Vec<_>>();

        self.reset();
        if terms.is_empty() {
            return None;
        }
        Some(FieldTermVectors {
            field: self.field_name().to_string(),
            terms,
        })
    }
}

/// Per-segment collection of finished documents' vectors
#[derive(Debug, Default)]
pub struct TermVectorsConsumer {
    docs: Vec<DocTermVectors>,
}

impl TermVectorsConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish_document(&mut self, doc: DocId, fields: Vec<FieldTermVectors>) {
        if !fields.is_empty() {
            self.docs.push(DocTermVectors { doc, fields });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// One entry per document `0..doc_count`; documents without vectors get
    /// an empty entry
    pub fn take_dense(&mut self, doc_count: u32) -> Vec<DocTermVectors> {
        let mut sparse = std::mem::take(&mut self.docs).into_iter().peekable();
        (0..doc_count)
            .map(|doc| match sparse.peek() {
                Some(next) if next.doc == doc => sparse.next().unwrap_or_default(),
                _ => DocTermVectors {
                    doc,
                    fields: Vec::new(),
                },
            })
            .collect()
    }

    pub fn abort(&mut self) {
        self.docs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::freq_prox::FreqProxTermsWriterPerField;
    use crate::index::terms_hash::TermsHash;
    use crate::index::types::IndexOptions;
    use crate::util::Counter;

    #[test]
    fn test_vectors_follow_primary_terms() {
        let mut terms_hash = TermsHash::new(Counter::new(), true);
        let field = FieldInfo::new("body", 0)
            .with_index_options(IndexOptions::DocsAndFreqsAndPositions)
            .with_term_vectors();
        let mut per_field = TermsHashPerField::new(
            &terms_hash,
            &field,
            FreqProxTermsWriterPerField::new(&field),
            4,
        );

        for doc in 0..2u32 {
            let mut state = FieldInvertState::default();
            state.reset(doc);
            per_field.start(&field, &state);
            for (pos, term) in ["to", "be", "or", "not", "to", "be"].iter().enumerate() {
                state.position = pos as u32;
                per_field.add(&mut terms_hash, term.as_bytes(), &mut state).unwrap();
            }
            per_field.finish(&state);

            let next_pools = terms_hash.next().map(|n| n.pools()).unwrap();
            let term_pool = &terms_hash.pools().byte_pool;
            let vectors = per_field
                .next_mut()
                .and_then(|tv| tv.finish_document(next_pools, term_pool))
                .unwrap();

            assert_eq!(vectors.field, "body");
            let summary: Vec<(&[u8], u32, Vec<u32>)> = vectors
                .terms
                .iter()
                .map(|t| (t.term.as_slice(), t.freq, t.positions.clone()))
                .collect();
            assert_eq!(
                summary,
                vec![
                    (&b"be"[..], 2, vec![1, 5]),
                    (&b"not"[..], 1, vec![3]),
                    (&b"or"[..], 1, vec![2]),
                    (&b"to"[..], 2, vec![0, 4]),
                ]
            );
            assert_eq!(per_field.next().map(|tv| tv.num_terms()), Some(0));
        }
        // Primary keeps accumulating across documents
        assert_eq!(per_field.num_terms(), 4);
    }

    #[test]
    fn test_take_dense_fills_gaps() {
        let mut consumer = TermVectorsConsumer::new();
        let field = FieldTermVectors {
            field: "f".to_string(),
            terms: vec![TermVector {
                term: b"x".to_vec(),
                freq: 1,
                positions: vec![0],
            }],
        };
        consumer.finish_document(1, vec![field.clone()]);
        consumer.finish_document(2, Vec::new());

        let dense = consumer.take_dense(3);
        assert_eq!(dense.len(), 3);
        assert!(dense[0].fields.is_empty());
        assert_eq!(dense[1].field("f"), Some(&field));
        assert!(dense[2].fields.is_empty());
        assert!(consumer.is_empty());
    }
}
