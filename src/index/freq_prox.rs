//! Document, frequency and position postings: the primary chain level
//!
//! Stream 0 carries doc codes: the doc delta shifted left once, with the low
//! bit set when the frequency is 1, otherwise followed by the frequency.
//! Fields without frequencies write plain doc deltas. Stream 1 carries
//! position deltas shifted left once (the low bit is reserved). The last
//! document of every term stays pending in the columns until flush.

use roaring::RoaringBitmap;
use tracing::debug;

use crate::codec::{FieldStats, TermStats, TermsConsumer};
use crate::error::Result;

use super::postings_array::{ParallelPostingsArray, PostingsArray};
use super::terms_hash::{StreamCursor, TermsHashConsumerPerField, TermsHashPerField, TermsHashPools};
use super::types::{DocId, FieldInfo, FieldInvertState};

const U32_BYTES: usize = std::mem::size_of::<u32>();

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FreqProxPostingsArray {
    base: ParallelPostingsArray,
    /// Frequency in the pending document
    pub term_freqs: Vec<u32>,
    /// Pending document
    pub last_doc_ids: Vec<DocId>,
    /// Code of the pending document, written once the next document arrives
    pub last_doc_codes: Vec<u32>,
    pub last_positions: Vec<u32>,
}

impl FreqProxPostingsArray {
    pub fn new(size: usize) -> Self {
        Self {
            base: ParallelPostingsArray::new(size),
            term_freqs: vec![0; size],
            last_doc_ids: vec![0; size],
            last_doc_codes: vec![0; size],
            last_positions: vec![0; size],
        }
    }
}

impl PostingsArray for FreqProxPostingsArray {
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
        ParallelPostingsArray::BYTES_PER_POSTING + 4 * U32_BYTES
    }

    fn grow_to(&mut self, new_size: usize) {
        self.base.resize(new_size);
        self.term_freqs.resize(new_size, 0);
        self.last_doc_ids.resize(new_size, 0);
        self.last_doc_codes.resize(new_size, 0);
        self.last_positions.resize(new_size, 0);
    }
}

/// Accumulates postings for one field; what is kept follows the field's
/// index options at construction
#[derive(Debug)]
pub struct FreqProxTermsWriterPerField {
    has_freq: bool,
    has_prox: bool,
}

impl FreqProxTermsWriterPerField {
    pub fn new(field: &FieldInfo) -> Self {
        Self {
            has_freq: field.index_options.has_freqs(),
            has_prox: field.index_options.has_positions(),
        }
    }

    pub fn has_freq(&self) -> bool {
        self.has_freq
    }

    pub fn has_prox(&self) -> bool {
        self.has_prox
    }

    fn write_prox(
        postings: &mut FreqProxPostingsArray,
        ord: usize,
        streams: &mut StreamCursor<'_>,
        state: &FieldInvertState,
        prox_code: u32,
    ) {
        streams.write_vint(1, prox_code << 1);
        postings.last_positions[ord] = state.position;
    }
}

impl TermsHashConsumerPerField for FreqProxTermsWriterPerField {
    type Postings = FreqProxPostingsArray;

    fn stream_count(&self) -> usize {
        if self.has_prox {
            2
        } else {
            1
        }
    }

    fn create_postings_array(&self, size: usize) -> FreqProxPostingsArray {
        FreqProxPostingsArray::new(size)
    }

    fn start(&mut self, field: &FieldInfo, _state: &FieldInvertState) -> bool {
        field.is_indexed()
    }

    fn new_term(
        &mut self,
        ord: usize,
        postings: &mut FreqProxPostingsArray,
        streams: &mut StreamCursor<'_>,
        state: &mut FieldInvertState,
    ) {
        let doc_id = state.doc_id;
        postings.last_doc_ids[ord] = doc_id;
        if !self.has_freq {
            postings.last_doc_codes[ord] = doc_id;
        } else {
            postings.last_doc_codes[ord] = doc_id << 1;
            postings.term_freqs[ord] = 1;
            if self.has_prox {
                Self::write_prox(postings, ord, streams, state, state.position);
            }
        }
        state.max_term_frequency = state.max_term_frequency.max(1);
        state.unique_term_count += 1;
    }

    fn add_term(
        &mut self,
        ord: usize,
        postings: &mut FreqProxPostingsArray,
        streams: &mut StreamCursor<'_>,
        state: &mut FieldInvertState,
    ) {
        let doc_id = state.doc_id;
        debug_assert!(postings.last_doc_ids[ord] <= doc_id);

        if !self.has_freq {
            if doc_id != postings.last_doc_ids[ord] {
                streams.write_vint(0, postings.last_doc_codes[ord]);
                postings.last_doc_codes[ord] = doc_id - postings.last_doc_ids[ord];
                postings.last_doc_ids[ord] = doc_id;
                state.unique_term_count += 1;
            }
        } else if doc_id != postings.last_doc_ids[ord] {
            // Term's first occurrence in this document: emit the pending one
            if postings.term_freqs[ord] == 1 {
                streams.write_vint(0, postings.last_doc_codes[ord] | 1);
            } else {
                streams.write_vint(0, postings.last_doc_codes[ord]);
                streams.write_vint(0, postings.term_freqs[ord]);
            }
            postings.term_freqs[ord] = 1;
            state.max_term_frequency = state.max_term_frequency.max(1);
            postings.last_doc_codes[ord] = (doc_id - postings.last_doc_ids[ord]) << 1;
            postings.last_doc_ids[ord] = doc_id;
            if self.has_prox {
                Self::write_prox(postings, ord, streams, state, state.position);
            }
            state.unique_term_count += 1;
        } else {
            postings.term_freqs[ord] += 1;
            state.max_term_frequency = state.max_term_frequency.max(postings.term_freqs[ord]);
            if self.has_prox {
                let delta = state.position - postings.last_positions[ord];
                Self::write_prox(postings, ord, streams, state, delta);
            }
        }
    }
}

impl TermsHashPerField<FreqProxTermsWriterPerField> {
    /// Replay every term, in term order, into `consumer`.
    ///
    /// `pools` must be the primary level's pools. The builder is left as is;
    /// callers reset or shrink it afterwards.
    pub fn flush(&self, pools: &TermsHashPools, field: &FieldInfo, consumer: &mut dyn TermsConsumer) -> Result<()> {
        let has_freq = self.consumer().has_freq();
        let has_prox = self.consumer().has_prox();
        let postings = self.postings();
        let term_pool = &pools.byte_pool;

        let mut visited_docs = RoaringBitmap::new();
        let mut sum_total_term_freq = 0u64;
        let mut sum_doc_freq = 0u64;

        for ord in self.sorted_term_ids(term_pool) {
            let term = self.term(term_pool, ord);
            let mut freq_reader = self.stream_reader(pools, ord, 0);
            let mut prox_reader = has_prox.then(|| self.stream_reader(pools, ord, 1));

            let mut last_doc_pending = true;
            let mut doc_id: DocId = 0;
            let mut doc_freq = 0u32;
            let mut total_term_freq = 0u64;

            let postings_consumer = consumer.start_term(term)?;
            loop {
                let term_freq;
                if freq_reader.eof() {
                    if !last_doc_pending {
                        break;
                    }
                    last_doc_pending = false;
                    doc_id = postings.last_doc_ids[ord];
                    term_freq = if has_freq { postings.term_freqs[ord] } else { 1 };
                } else {
                    let code = freq_reader.read_vint();
                    if !has_freq {
                        doc_id += code;
                        term_freq = 1;
                    } else {
                        doc_id += code >> 1;
                        term_freq = if code & 1 != 0 { 1 } else { freq_reader.read_vint() };
                    }
                    debug_assert!(doc_id != postings.last_doc_ids[ord]);
                }

                doc_freq += 1;
                total_term_freq += u64::from(term_freq);
                visited_docs.insert(doc_id);

                postings_consumer.start_doc(doc_id, term_freq)?;
                if let Some(prox) = prox_reader.as_mut() {
                    let mut position = 0;
                    for _ in 0..term_freq {
                        position += prox.read_vint() >> 1;
                        postings_consumer.add_position(position)?;
                    }
                }
                postings_consumer.finish_doc()?;
            }

            consumer.finish_term(
                term,
                TermStats {
                    doc_freq,
                    total_term_freq: has_freq.then_some(total_term_freq),
                },
            )?;
            sum_total_term_freq += total_term_freq;
            sum_doc_freq += u64::from(doc_freq);
        }

        let stats = FieldStats {
            sum_total_term_freq: has_freq.then_some(sum_total_term_freq),
            sum_doc_freq,
            doc_count: visited_docs.len() as u32,
        };
        debug!("Flushed {} terms of field {}: {:?}", self.num_terms(), field.name, stats);
        consumer.finish(stats)
    }
}
