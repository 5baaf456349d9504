//! Per-thread segment indexer
//!
//! Owns the pools, one term builder per indexed field (freq/prox primary,
//! term-vectors secondary) and one doc-values buffer per doc-values field.
//! Documents arrive already tokenized. `flush` writes the buffered segment
//! through the codec and starts the next one.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::codec::{
    write_field_infos, write_segment_info, Codec, SegmentWriteState, SEGMENT_INFO_EXTENSION,
};
use crate::config::IndexingConfig;
use crate::error::{QuireError, Result};
use crate::store::{Directory, TrackingDirectory};
use crate::util::{Counter, MAX_TERM_LENGTH};

use super::commit_info::SegmentCommitInfo;
use super::doc_values_writer::DocValuesWriter;
use super::file_names::{segment_file_name, segment_name};
use super::freq_prox::FreqProxTermsWriterPerField;
use super::segment_info::SegmentInfo;
use super::term_vectors::TermVectorsConsumer;
use super::terms_hash::{TermsHash, TermsHashPerField};
use super::types::{DocId, DocValue, DocValuesType, FieldInfos, FieldInvertState, IndexOptions, IndexableField};

/// Result of a successful flush
#[derive(Debug)]
pub struct FlushedSegment {
    pub commit: SegmentCommitInfo,
    pub field_infos: FieldInfos,
}

/// Buffers of one field, indexed by field number
#[derive(Debug, Default)]
struct PerField {
    terms: Option<TermsHashPerField<FreqProxTermsWriterPerField>>,
    doc_values: Option<DocValuesWriter>,
    state: FieldInvertState,
}

#[derive(Debug)]
pub struct SegmentIndexer {
    directory: Arc<dyn Directory>,
    codec: Arc<dyn Codec>,
    config: IndexingConfig,
    bytes_used: Counter,
    terms_hash: TermsHash,
    field_infos: FieldInfos,
    fields: Vec<PerField>,
    term_vectors: TermVectorsConsumer,
    num_docs: u32,
    segment_counter: u64,
    segment_name: String,
}

impl SegmentIndexer {
    pub fn new(directory: Arc<dyn Directory>, codec: Arc<dyn Codec>, config: IndexingConfig) -> Result<Self> {
        if config.hash_init_size < 2 || !config.hash_init_size.is_power_of_two() {
            return Err(QuireError::Config(format!(
                "hash_init_size must be a power of two >= 2, got {}",
                config.hash_init_size
            )));
        }
        let bytes_used = Counter::new();
        Ok(Self {
            directory,
            codec,
            config,
            terms_hash: TermsHash::new(bytes_used.clone(), true),
            bytes_used,
            field_infos: FieldInfos::new(),
            fields: Vec::new(),
            term_vectors: TermVectorsConsumer::new(),
            num_docs: 0,
            segment_counter: 0,
            segment_name: segment_name(0),
        })
    }

    /// Name the next flush will write
    pub fn segment_name(&self) -> &str {
        &self.segment_name
    }

    /// Documents buffered since the last flush
    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    /// Bytes held by pools, tables and doc-values buffers
    pub fn bytes_used(&self) -> i64 {
        self.bytes_used.get()
    }

    /// Whether the buffered segment has reached a configured limit
    pub fn needs_flush(&self) -> bool {
        self.num_docs as usize >= self.config.max_buffered_docs
            || self.bytes_used() >= self.config.max_buffered_bytes as i64
    }

    /// Index one document and return its number in the current segment.
    ///
    /// Invalid documents are rejected before anything is buffered. A failure
    /// after that point discards the whole buffered segment.
    pub fn add_document(&mut self, doc: &[IndexableField]) -> Result<DocId> {
        self.validate(doc)?;
        let doc_id = self.num_docs;
        if let Err(e) = self.invert(doc_id, doc) {
            warn!("Aborting segment {} after failure in document {}: {}", self.segment_name, doc_id, e);
            self.abort();
            return Err(e);
        }
        self.num_docs += 1;
        Ok(doc_id)
    }

    fn validate(&self, doc: &[IndexableField]) -> Result<()> {
        let mut options: HashMap<&str, IndexOptions> = HashMap::new();
        let mut dv_types: HashMap<&str, DocValuesType> = HashMap::new();
        let mut single_values: HashMap<&str, u32> = HashMap::new();
        let mut has_tokens: HashMap<&str, bool> = HashMap::new();

        for field in doc {
            let name = field.name.as_str();
            let known = self.field_infos.get(name);

            if !field.tokens.is_empty() && !field.index_options.is_indexed() {
                return Err(illegal(format!("field {} has tokens but is not indexed", name)));
            }
            if field.index_options.is_indexed() {
                let previous = options
                    .get(name)
                    .copied()
                    .or_else(|| known.map(|f| f.index_options).filter(|o| o.is_indexed()));
                if let Some(previous) = previous {
                    if previous != field.index_options {
                        return Err(illegal(format!(
                            "field {} indexed with {:?}, previously {:?}",
                            name, field.index_options, previous
                        )));
                    }
                }
                options.insert(name, field.index_options);
            }

            let seen_tokens = has_tokens.entry(name).or_insert(false);
            for token in &field.tokens {
                if !*seen_tokens && token.position_increment == 0 {
                    return Err(illegal(format!(
                        "first position increment must be > 0 (got 0) for field {}",
                        name
                    )));
                }
                *seen_tokens = true;
            }

            if let Some(value) = &field.doc_value {
                let dv_type = value.doc_values_type();
                let previous = dv_types
                    .get(name)
                    .copied()
                    .or_else(|| known.map(|f| f.doc_values_type).filter(|t| *t != DocValuesType::None));
                if let Some(previous) = previous {
                    if previous != dv_type {
                        return Err(illegal(format!(
                            "field {} has {:?} doc values, previously {:?}",
                            name, dv_type, previous
                        )));
                    }
                }
                dv_types.insert(name, dv_type);

                match value {
                    DocValue::SortedSet(values) => check_value_lengths(values)?,
                    DocValue::Sorted(v) => check_value_lengths(std::slice::from_ref(v))?,
                    _ => {}
                }
                if dv_type != DocValuesType::SortedSet {
                    let count = single_values.entry(name).or_insert(0);
                    *count += 1;
                    if *count > 1 {
                        return Err(illegal(format!(
                            "field {} has more than one {:?} doc value",
                            name, dv_type
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn invert(&mut self, doc_id: DocId, doc: &[IndexableField]) -> Result<()> {
        let mut touched: Vec<usize> = Vec::new();

        for field in doc {
            let info = self.field_infos.get_or_add(&field.name);
            if !info.is_indexed() {
                info.index_options = field.index_options;
            }
            info.store_term_vectors |= field.store_term_vectors;
            if let Some(value) = &field.doc_value {
                info.doc_values_type = value.doc_values_type();
            }

            let number = info.number as usize;
            if self.fields.len() <= number {
                self.fields.resize_with(number + 1, PerField::default);
            }
            let per_field = &mut self.fields[number];

            if info.is_indexed() && !field.tokens.is_empty() {
                let terms = per_field.terms.get_or_insert_with(|| {
                    TermsHashPerField::new(
                        &self.terms_hash,
                        info,
                        FreqProxTermsWriterPerField::new(info),
                        self.config.hash_init_size,
                    )
                });
                if !touched.contains(&number) {
                    per_field.state.reset(doc_id);
                    terms.start(info, &per_field.state);
                    touched.push(number);
                }

                let state = &mut per_field.state;
                for token in &field.tokens {
                    let mut position = state.position + token.position_increment;
                    if position > 0 {
                        position -= 1;
                    }
                    state.position = position;

                    match terms.add(&mut self.terms_hash, &token.term, state) {
                        Err(QuireError::TermTooLong { length, max }) => {
                            warn!(
                                "Skipping term of {} bytes (max {}) in field {} of document {}",
                                length, max, field.name, doc_id
                            );
                        }
                        other => other?,
                    }
                    state.length += 1;
                    state.position += 1;
                }
            }

            if let Some(value) = &field.doc_value {
                if per_field.doc_values.is_none() {
                    per_field.doc_values = Some(DocValuesWriter::new(info, self.bytes_used.clone())?);
                }
                if let Some(writer) = per_field.doc_values.as_mut() {
                    writer.add_value(doc_id, value)?;
                }
            }
        }

        let mut vectors = Vec::new();
        for &number in &touched {
            let per_field = &mut self.fields[number];
            let Some(terms) = per_field.terms.as_mut() else {
                continue;
            };
            terms.finish(&per_field.state);

            let term_pool = &self.terms_hash.pools().byte_pool;
            if let (Some(tv), Some(next)) = (terms.next_mut(), self.terms_hash.next()) {
                if let Some(field_vectors) = tv.finish_document(next.pools(), term_pool) {
                    vectors.push(field_vectors);
                }
            }
        }
        vectors.sort_by(|a, b| a.field.cmp(&b.field));
        self.term_vectors.finish_document(doc_id, vectors);
        if let Some(next) = self.terms_hash.next_mut() {
            next.reset();
        }
        Ok(())
    }

    /// Write the buffered documents as a segment.
    ///
    /// On failure every file written so far is deleted and the buffered
    /// documents are discarded.
    pub fn flush(&mut self) -> Result<FlushedSegment> {
        if self.num_docs == 0 {
            return Err(illegal(format!("segment {} has no documents to flush", self.segment_name)));
        }

        let tracking = Arc::new(TrackingDirectory::new(Arc::clone(&self.directory)));
        match self.write_segment(&tracking) {
            Ok(flushed) => {
                info!(
                    "Flushed segment {} with {} docs and {} files",
                    self.segment_name,
                    self.num_docs,
                    flushed.commit.info().files().len()
                );
                self.release();
                self.segment_counter += 1;
                self.segment_name = segment_name(self.segment_counter);
                Ok(flushed)
            }
            Err(e) => {
                warn!("Flush of segment {} failed: {}", self.segment_name, e);
                for file in tracking.created_files() {
                    if !self.directory.file_exists(&file) {
                        continue;
                    }
                    if let Err(cleanup) = self.directory.delete_file(&file) {
                        warn!("Failed to remove {} after failed flush: {}", file, cleanup);
                    }
                }
                self.abort();
                Err(e)
            }
        }
    }

    fn write_segment(&mut self, tracking: &Arc<TrackingDirectory>) -> Result<FlushedSegment> {
        let dir: Arc<dyn Directory> = tracking.clone();
        let state = SegmentWriteState::new(Arc::clone(&dir), self.segment_name.clone(), self.num_docs);

        let mut by_name: Vec<(String, usize)> = self
            .field_infos
            .iter()
            .map(|f| (f.name.clone(), f.number as usize))
            .collect();
        by_name.sort();

        if self.field_infos.has_postings() {
            let mut consumer = self.codec.postings_format().fields_consumer(&state)?;
            for (name, number) in &by_name {
                let Some(terms) = self.fields.get(*number).and_then(|pf| pf.terms.as_ref()) else {
                    continue;
                };
                if terms.num_terms() == 0 {
                    continue;
                }
                let Some(info) = self.field_infos.get_mut(name) else {
                    continue;
                };
                let mut terms_consumer = consumer.add_field(info)?;
                terms.flush(self.terms_hash.pools(), info, terms_consumer.as_mut())?;
            }
            consumer.close()?;
        }

        if self.field_infos.has_doc_values() {
            let mut consumer = self.codec.doc_values_format().fields_consumer(&state)?;
            for (name, number) in &by_name {
                let Some(writer) = self.fields.get_mut(*number).and_then(|pf| pf.doc_values.as_mut()) else {
                    continue;
                };
                let Some(info) = self.field_infos.get_mut(name) else {
                    continue;
                };
                writer.flush(self.num_docs, info, consumer.as_mut())?;
            }
            consumer.close()?;
        }

        if self.field_infos.has_vectors() {
            let docs = self.term_vectors.take_dense(self.num_docs);
            self.codec.term_vectors_format().write(&state, &docs)?;
        }

        write_field_infos(dir.as_ref(), &self.segment_name, &self.field_infos)?;

        let mut info = SegmentInfo::new(
            Arc::clone(&self.directory),
            self.segment_name.clone(),
            self.num_docs,
            Arc::clone(&self.codec),
        );
        info.put_diagnostic("source", "flush");
        info.put_diagnostic("quire.version", crate::VERSION);
        info.set_files(tracking.created_files());
        info.add_file(segment_file_name(&self.segment_name, "", SEGMENT_INFO_EXTENSION));
        write_segment_info(dir.as_ref(), &info)?;

        Ok(FlushedSegment {
            commit: SegmentCommitInfo::new(Arc::new(info)),
            field_infos: self.field_infos.clone(),
        })
    }

    /// Discard every buffered document. The segment name is kept.
    pub fn abort(&mut self) {
        debug!("Discarding {} buffered docs of segment {}", self.num_docs, self.segment_name);
        self.release();
    }

    /// Drop all per-segment state, returning every charged byte
    fn release(&mut self) {
        for per_field in &mut self.fields {
            if let Some(terms) = per_field.terms.as_mut() {
                terms.abort();
            }
            if let Some(writer) = per_field.doc_values.as_mut() {
                writer.abort();
            }
        }
        self.fields.clear();
        self.terms_hash.abort();
        self.term_vectors.abort();
        self.field_infos = FieldInfos::new();
        self.num_docs = 0;
    }
}

fn illegal(message: String) -> QuireError {
    QuireError::IllegalArgument(message)
}

fn check_value_lengths(values: &[Vec<u8>]) -> Result<()> {
    match values.iter().find(|v| v.len() > MAX_TERM_LENGTH) {
        Some(v) => Err(QuireError::TermTooLong {
            length: v.len(),
            max: MAX_TERM_LENGTH,
        }),
        None => Ok(()),
    }
}
