//! Codec contracts
//!
//! A segment is written and read through three kinds of formats: postings
//! (`PostingsFormat`), per-document values (`DocValuesFormat`) and deleted
//! documents (`LiveDocsFormat`), plus term vectors. A `Codec` bundles one of
//! each. Formats only see a `Directory`, a segment name and a suffix that
//! keeps their files apart from other formats writing into the same segment.

use std::fmt::Debug;
use std::sync::Arc;

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::{
    segment_file_name, DocId, DocTermVectors, FieldInfo, FieldInfos, SegmentCommitInfo, SegmentInfo,
};
use crate::store::Directory;

/// Everything a format needs to write its files for one segment
#[derive(Clone, Debug)]
pub struct SegmentWriteState {
    pub directory: Arc<dyn Directory>,
    pub segment_name: String,
    pub doc_count: u32,
    /// Empty unless the format is written on behalf of a dispatcher
    pub segment_suffix: String,
}

impl SegmentWriteState {
    pub fn new(directory: Arc<dyn Directory>, segment_name: impl Into<String>, doc_count: u32) -> Self {
        Self {
            directory,
            segment_name: segment_name.into(),
            doc_count,
            segment_suffix: String::new(),
        }
    }

    /// Same segment, different suffix
    pub fn with_suffix(&self, segment_suffix: impl Into<String>) -> Self {
        Self {
            segment_suffix: segment_suffix.into(),
            ..self.clone()
        }
    }

    pub fn file_name(&self, ext: &str) -> String {
        segment_file_name(&self.segment_name, &self.segment_suffix, ext)
    }
}

/// Everything a format needs to open its files for one segment
#[derive(Clone, Debug)]
pub struct SegmentReadState<'a> {
    pub directory: Arc<dyn Directory>,
    pub segment_info: &'a SegmentInfo,
    pub field_infos: &'a FieldInfos,
    pub segment_suffix: String,
}

impl<'a> SegmentReadState<'a> {
    pub fn new(directory: Arc<dyn Directory>, segment_info: &'a SegmentInfo, field_infos: &'a FieldInfos) -> Self {
        Self {
            directory,
            segment_info,
            field_infos,
            segment_suffix: String::new(),
        }
    }

    pub fn with_suffix(&self, segment_suffix: impl Into<String>) -> Self {
        Self {
            segment_suffix: segment_suffix.into(),
            ..self.clone()
        }
    }

    pub fn file_name(&self, ext: &str) -> String {
        segment_file_name(&self.segment_info.name, &self.segment_suffix, ext)
    }
}

/// Per-term statistics reported at the end of a term
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermStats {
    pub doc_freq: u32,
    /// `None` when the field does not index frequencies
    pub total_term_freq: Option<u64>,
}

/// Per-field statistics reported at the end of a field
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldStats {
    pub sum_total_term_freq: Option<u64>,
    pub sum_doc_freq: u64,
    /// Documents with at least one term
    pub doc_count: u32,
}

/// One document of a term's postings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocPostings {
    pub doc: DocId,
    pub freq: u32,
    pub positions: Vec<u32>,
}

/// Receives the documents of one term, in doc order
pub trait PostingsConsumer {
    fn start_doc(&mut self, doc: DocId, freq: u32) -> Result<()>;

    fn add_position(&mut self, position: u32) -> Result<()>;

    fn finish_doc(&mut self) -> Result<()>;
}

/// Receives the terms of one field, in term order
pub trait TermsConsumer {
    fn start_term(&mut self, term: &[u8]) -> Result<&mut dyn PostingsConsumer>;

    fn finish_term(&mut self, term: &[u8], stats: TermStats) -> Result<()>;

    fn finish(&mut self, stats: FieldStats) -> Result<()>;
}

/// Write side of a postings format for one segment
pub trait FieldsConsumer: Send {
    /// Start writing `field`. Dispatchers may record routing attributes on it.
    fn add_field<'a>(&'a mut self, field: &mut FieldInfo) -> Result<Box<dyn TermsConsumer + 'a>>;

    /// Persist everything added. Called once.
    fn close(&mut self) -> Result<()>;
}

/// Read access to one field's terms
pub trait Terms: Debug {
    /// Number of distinct terms
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stats(&self) -> FieldStats;

    /// All terms in order
    fn terms(&self) -> Box<dyn Iterator<Item = &[u8]> + '_>;

    fn term_stats(&self, term: &[u8]) -> Option<TermStats>;

    fn postings(&self, term: &[u8]) -> Option<&[DocPostings]>;
}

/// Read side of a postings format for one segment
pub trait FieldsProducer: Send + Sync + Debug {
    /// Terms of `field`, if this producer holds it
    fn terms(&self, field: &str) -> Result<Option<&dyn Terms>>;

    /// Release resources. Safe to call more than once.
    fn close(&mut self) -> Result<()>;
}

pub trait PostingsFormat: Send + Sync + Debug {
    /// Registered name, written into field metadata by dispatchers
    fn name(&self) -> &str;

    fn fields_consumer(&self, state: &SegmentWriteState) -> Result<Box<dyn FieldsConsumer>>;

    fn fields_producer(&self, state: &SegmentReadState<'_>) -> Result<Box<dyn FieldsProducer>>;
}

/// Write side of a doc-values format for one segment.
///
/// Every slice has one entry per document of the segment.
pub trait DocValuesConsumer: Send {
    fn add_numeric_field(&mut self, field: &mut FieldInfo, values: &[i64]) -> Result<()>;

    fn add_binary_field(&mut self, field: &mut FieldInfo, values: &[Vec<u8>]) -> Result<()>;

    /// `values` are sorted and unique; `doc_to_ord` holds -1 for documents
    /// without a value
    fn add_sorted_field(&mut self, field: &mut FieldInfo, values: &[Vec<u8>], doc_to_ord: &[i32]) -> Result<()>;

    /// `values` are sorted and unique; `doc_ords` holds each document's
    /// sorted ordinals
    fn add_sorted_set_field(&mut self, field: &mut FieldInfo, values: &[Vec<u8>], doc_ords: &[Vec<u64>]) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

pub trait NumericDocValues: Debug {
    fn get(&self, doc: DocId) -> i64;
}

pub trait BinaryDocValues: Debug {
    fn get(&self, doc: DocId) -> &[u8];
}

pub trait SortedDocValues: Debug {
    /// Ordinal of the document's value, -1 if it has none
    fn ord(&self, doc: DocId) -> i32;

    fn lookup_ord(&self, ord: i32) -> &[u8];

    fn value_count(&self) -> usize;

    fn get(&self, doc: DocId) -> Option<&[u8]> {
        let ord = self.ord(doc);
        (ord >= 0).then(|| self.lookup_ord(ord))
    }
}

pub trait SortedSetDocValues: Debug {
    fn ords(&self, doc: DocId) -> &[u64];

    fn lookup_ord(&self, ord: u64) -> &[u8];

    fn value_count(&self) -> usize;
}

/// Read side of a doc-values format for one segment
pub trait DocValuesProducer: Send + Sync + Debug {
    fn numeric(&self, field: &str) -> Result<Option<&dyn NumericDocValues>>;

    fn binary(&self, field: &str) -> Result<Option<&dyn BinaryDocValues>>;

    fn sorted(&self, field: &str) -> Result<Option<&dyn SortedDocValues>>;

    fn sorted_set(&self, field: &str) -> Result<Option<&dyn SortedSetDocValues>>;

    fn close(&mut self) -> Result<()>;
}

pub trait DocValuesFormat: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn fields_consumer(&self, state: &SegmentWriteState) -> Result<Box<dyn DocValuesConsumer>>;

    fn fields_producer(&self, state: &SegmentReadState<'_>) -> Result<Box<dyn DocValuesProducer>>;
}

/// Deleted-document files, one per delete generation
pub trait LiveDocsFormat: Send + Sync + Debug {
    /// Write `deleted` as generation `commit.next_write_del_gen()`
    fn write_live_docs(&self, dir: &dyn Directory, commit: &SegmentCommitInfo, deleted: &RoaringBitmap) -> Result<()>;

    /// Deleted documents of the current generation
    fn read_live_docs(&self, dir: &dyn Directory, commit: &SegmentCommitInfo) -> Result<RoaringBitmap>;

    /// File holding generation `gen` of `segment`; `None` for -1
    fn file_name(&self, segment: &str, gen: i64) -> Option<String>;

    /// Files of the current generation, if any
    fn files(&self, commit: &SegmentCommitInfo) -> Vec<String> {
        self.file_name(&commit.info().name, commit.del_gen())
            .into_iter()
            .collect()
    }
}

pub trait TermVectorsFormat: Send + Sync + Debug {
    /// `docs` holds one entry per document. Returns the file written.
    fn write(&self, state: &SegmentWriteState, docs: &[DocTermVectors]) -> Result<String>;

    fn read(&self, state: &SegmentReadState<'_>) -> Result<Vec<DocTermVectors>>;
}

/// A named bundle of formats
pub trait Codec: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn postings_format(&self) -> Arc<dyn PostingsFormat>;

    fn doc_values_format(&self) -> Arc<dyn DocValuesFormat>;

    fn live_docs_format(&self) -> Arc<dyn LiveDocsFormat>;

    fn term_vectors_format(&self) -> Arc<dyn TermVectorsFormat>;
}
