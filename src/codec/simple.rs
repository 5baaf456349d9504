//! Bundled reference formats
//!
//! Each format keeps one segment's data in memory while writing and stores
//! it as a single checksummed bincode file on close:
//!
//! - `SimplePostingsFormat`: `<segment>[_<suffix>].pst`
//! - `SimpleDocValuesFormat`: `<segment>[_<suffix>].dvs`
//! - `SimpleTermVectorsFormat`: `<segment>.tvs`

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{QuireError, Result};
use crate::index::{DocId, DocTermVectors, FieldInfo};

use super::format::{
    BinaryDocValues, DocPostings, DocValuesConsumer, DocValuesFormat, DocValuesProducer, FieldStats,
    FieldsConsumer, FieldsProducer, NumericDocValues, PostingsConsumer, PostingsFormat, SegmentReadState,
    SegmentWriteState, SortedDocValues, SortedSetDocValues, TermStats, Terms, TermVectorsFormat, TermsConsumer,
};
use super::io::{read_checked, write_checked};

pub const POSTINGS_EXTENSION: &str = "pst";
pub const DOC_VALUES_EXTENSION: &str = "dvs";
pub const TERM_VECTORS_EXTENSION: &str = "tvs";

const VERSION: u32 = 1;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct StoredTerm {
    term: Vec<u8>,
    stats: TermStats,
    postings: Vec<DocPostings>,
}

/// Terms of one field, sorted
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimpleTerms {
    terms: Vec<StoredTerm>,
    stats: FieldStats,
}

impl SimpleTerms {
    fn find(&self, term: &[u8]) -> Option<&StoredTerm> {
        self.terms
            .binary_search_by(|t| t.term.as_slice().cmp(term))
            .ok()
            .map(|i| &self.terms[i])
    }
}

impl Terms for SimpleTerms {
    fn len(&self) -> usize {
        self.terms.len()
    }

    fn stats(&self) -> FieldStats {
        self.stats
    }

    fn terms(&self) -> Box<dyn Iterator<Item = &[u8]> + '_> {
        Box::new(self.terms.iter().map(|t| t.term.as_slice()))
    }

    fn term_stats(&self, term: &[u8]) -> Option<TermStats> {
        self.find(term).map(|t| t.stats)
    }

    fn postings(&self, term: &[u8]) -> Option<&[DocPostings]> {
        self.find(term).map(|t| t.postings.as_slice())
    }
}

/// Postings kept whole in one file per segment and suffix
#[derive(Debug)]
pub struct SimplePostingsFormat {
    name: String,
}

impl SimplePostingsFormat {
    pub const NAME: &'static str = "Simple";

    pub fn new() -> Self {
        Self::named(Self::NAME)
    }

    /// Same layout under another registered name
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for SimplePostingsFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl PostingsFormat for SimplePostingsFormat {
    fn name(&self) -> &str {
        &self.name
    }

    fn fields_consumer(&self, state: &SegmentWriteState) -> Result<Box<dyn FieldsConsumer>> {
        Ok(Box::new(SimpleFieldsConsumer {
            state: state.clone(),
            fields: BTreeMap::new(),
            closed: false,
        }))
    }

    fn fields_producer(&self, state: &SegmentReadState<'_>) -> Result<Box<dyn FieldsProducer>> {
        let name = state.file_name(POSTINGS_EXTENSION);
        let fields: BTreeMap<String, SimpleTerms> = read_checked(state.directory.as_ref(), &name, VERSION)?;
        debug!("Opened postings {} with {} fields", name, fields.len());
        Ok(Box::new(SimpleFieldsProducer { fields }))
    }
}

struct SimpleFieldsConsumer {
    state: SegmentWriteState,
    fields: BTreeMap<String, SimpleTerms>,
    closed: bool,
}

impl FieldsConsumer for SimpleFieldsConsumer {
    fn add_field<'a>(&'a mut self, field: &mut FieldInfo) -> Result<Box<dyn TermsConsumer + 'a>> {
        if self.closed {
            return Err(QuireError::IllegalArgument("postings consumer already closed".to_string()));
        }
        let terms = self.fields.entry(field.name.clone()).or_default();
        Ok(Box::new(SimpleTermsWriter {
            terms,
            current: StoredTerm::default(),
        }))
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let name = self.state.file_name(POSTINGS_EXTENSION);
        write_checked(self.state.directory.as_ref(), &name, VERSION, &self.fields)?;
        debug!("Wrote postings {} with {} fields", name, self.fields.len());
        Ok(())
    }
}

struct SimpleTermsWriter<'a> {
    terms: &'a mut SimpleTerms,
    current: StoredTerm,
}

impl PostingsConsumer for SimpleTermsWriter<'_> {
    fn start_doc(&mut self, doc: DocId, freq: u32) -> Result<()> {
        self.current.postings.push(DocPostings {
            doc,
            freq,
            positions: Vec::new(),
        });
        Ok(())
    }

    fn add_position(&mut self, position: u32) -> Result<()> {
        match self.current.postings.last_mut() {
            Some(doc) => {
                doc.positions.push(position);
                Ok(())
            }
            None => Err(QuireError::IllegalArgument("position before first document".to_string())),
        }
    }

    fn finish_doc(&mut self) -> Result<()> {
        Ok(())
    }
}

impl TermsConsumer for SimpleTermsWriter<'_> {
    fn start_term(&mut self, term: &[u8]) -> Result<&mut dyn PostingsConsumer> {
        self.current = StoredTerm {
            term: term.to_vec(),
            ..StoredTerm::default()
        };
        Ok(self)
    }

    fn finish_term(&mut self, term: &[u8], stats: TermStats) -> Result<()> {
        debug_assert_eq!(self.current.term, term);
        if let Some(last) = self.terms.terms.last() {
            if last.term.as_slice() >= term {
                return Err(QuireError::IllegalArgument(format!(
                    "terms out of order: {:?} after {:?}",
                    String::from_utf8_lossy(term),
                    String::from_utf8_lossy(&last.term)
                )));
            }
        }
        let mut current = std::mem::take(&mut self.current);
        current.stats = stats;
        self.terms.terms.push(current);
        Ok(())
    }

    fn finish(&mut self, stats: FieldStats) -> Result<()> {
        self.terms.stats = stats;
        Ok(())
    }
}

#[derive(Debug)]
struct SimpleFieldsProducer {
    fields: BTreeMap<String, SimpleTerms>,
}

impl FieldsProducer for SimpleFieldsProducer {
    fn terms(&self, field: &str) -> Result<Option<&dyn Terms>> {
        Ok(self.fields.get(field).map(|t| t as &dyn Terms))
    }

    fn close(&mut self) -> Result<()> {
        self.fields.clear();
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimpleNumeric(Vec<i64>);

impl NumericDocValues for SimpleNumeric {
    fn get(&self, doc: DocId) -> i64 {
        self.0.get(doc as usize).copied().unwrap_or(0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimpleBinary(Vec<Vec<u8>>);

impl BinaryDocValues for SimpleBinary {
    fn get(&self, doc: DocId) -> &[u8] {
        self.0.get(doc as usize).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimpleSorted {
    values: Vec<Vec<u8>>,
    doc_to_ord: Vec<i32>,
}

impl SortedDocValues for SimpleSorted {
    fn ord(&self, doc: DocId) -> i32 {
        self.doc_to_ord.get(doc as usize).copied().unwrap_or(-1)
    }

    fn lookup_ord(&self, ord: i32) -> &[u8] {
        &self.values[ord as usize]
    }

    fn value_count(&self) -> usize {
        self.values.len()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimpleSortedSet {
    values: Vec<Vec<u8>>,
    doc_ords: Vec<Vec<u64>>,
}

impl SortedSetDocValues for SimpleSortedSet {
    fn ords(&self, doc: DocId) -> &[u64] {
        self.doc_ords.get(doc as usize).map(Vec::as_slice).unwrap_or(&[])
    }

    fn lookup_ord(&self, ord: u64) -> &[u8] {
        &self.values[ord as usize]
    }

    fn value_count(&self) -> usize {
        self.values.len()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
enum StoredDocValues {
    Numeric(SimpleNumeric),
    Binary(SimpleBinary),
    Sorted(SimpleSorted),
    SortedSet(SimpleSortedSet),
}

/// Per-document values kept whole in one file per segment and suffix
#[derive(Debug)]
pub struct SimpleDocValuesFormat {
    name: String,
}

impl SimpleDocValuesFormat {
    pub const NAME: &'static str = "SimpleDV";

    pub fn new() -> Self {
        Self::named(Self::NAME)
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for SimpleDocValuesFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl DocValuesFormat for SimpleDocValuesFormat {
    fn name(&self) -> &str {
        &self.name
    }

    fn fields_consumer(&self, state: &SegmentWriteState) -> Result<Box<dyn DocValuesConsumer>> {
        Ok(Box::new(SimpleDocValuesConsumer {
            state: state.clone(),
            fields: BTreeMap::new(),
            closed: false,
        }))
    }

    fn fields_producer(&self, state: &SegmentReadState<'_>) -> Result<Box<dyn DocValuesProducer>> {
        let name = state.file_name(DOC_VALUES_EXTENSION);
        let fields: BTreeMap<String, StoredDocValues> = read_checked(state.directory.as_ref(), &name, VERSION)?;
        debug!("Opened doc values {} with {} fields", name, fields.len());
        Ok(Box::new(SimpleDocValuesProducer { fields }))
    }
}

struct SimpleDocValuesConsumer {
    state: SegmentWriteState,
    fields: BTreeMap<String, StoredDocValues>,
    closed: bool,
}

impl SimpleDocValuesConsumer {
    fn put(&mut self, field: &FieldInfo, values: StoredDocValues) -> Result<()> {
        if self.closed {
            return Err(QuireError::IllegalArgument("doc values consumer already closed".to_string()));
        }
        if self.fields.insert(field.name.clone(), values).is_some() {
            return Err(QuireError::IllegalArgument(format!(
                "doc values for field {} added twice",
                field.name
            )));
        }
        Ok(())
    }
}

impl DocValuesConsumer for SimpleDocValuesConsumer {
    fn add_numeric_field(&mut self, field: &mut FieldInfo, values: &[i64]) -> Result<()> {
        self.put(field, StoredDocValues::Numeric(SimpleNumeric(values.to_vec())))
    }

    fn add_binary_field(&mut self, field: &mut FieldInfo, values: &[Vec<u8>]) -> Result<()> {
        self.put(field, StoredDocValues::Binary(SimpleBinary(values.to_vec())))
    }

    fn add_sorted_field(&mut self, field: &mut FieldInfo, values: &[Vec<u8>], doc_to_ord: &[i32]) -> Result<()> {
        self.put(
            field,
            StoredDocValues::Sorted(SimpleSorted {
                values: values.to_vec(),
                doc_to_ord: doc_to_ord.to_vec(),
            }),
        )
    }

    fn add_sorted_set_field(&mut self, field: &mut FieldInfo, values: &[Vec<u8>], doc_ords: &[Vec<u64>]) -> Result<()> {
        self.put(
            field,
            StoredDocValues::SortedSet(SimpleSortedSet {
                values: values.to_vec(),
                doc_ords: doc_ords.to_vec(),
            }),
        )
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let name = self.state.file_name(DOC_VALUES_EXTENSION);
        write_checked(self.state.directory.as_ref(), &name, VERSION, &self.fields)?;
        debug!("Wrote doc values {} with {} fields", name, self.fields.len());
        Ok(())
    }
}

#[derive(Debug)]
struct SimpleDocValuesProducer {
    fields: BTreeMap<String, StoredDocValues>,
}

fn wrong_type(field: &str, wanted: &str) -> QuireError {
    QuireError::IllegalArgument(format!("field {} has no {} doc values", field, wanted))
}

impl DocValuesProducer for SimpleDocValuesProducer {
    fn numeric(&self, field: &str) -> Result<Option<&dyn NumericDocValues>> {
        match self.fields.get(field) {
            None => Ok(None),
            Some(StoredDocValues::Numeric(values)) => Ok(Some(values as &dyn NumericDocValues)),
            Some(_) => Err(wrong_type(field, "numeric")),
        }
    }

    fn binary(&self, field: &str) -> Result<Option<&dyn BinaryDocValues>> {
        match self.fields.get(field) {
            None => Ok(None),
            Some(StoredDocValues::Binary(values)) => Ok(Some(values as &dyn BinaryDocValues)),
            Some(_) => Err(wrong_type(field, "binary")),
        }
    }

    fn sorted(&self, field: &str) -> Result<Option<&dyn SortedDocValues>> {
        match self.fields.get(field) {
            None => Ok(None),
            Some(StoredDocValues::Sorted(values)) => Ok(Some(values as &dyn SortedDocValues)),
            Some(_) => Err(wrong_type(field, "sorted")),
        }
    }

    fn sorted_set(&self, field: &str) -> Result<Option<&dyn SortedSetDocValues>> {
        match self.fields.get(field) {
            None => Ok(None),
            Some(StoredDocValues::SortedSet(values)) => Ok(Some(values as &dyn SortedSetDocValues)),
            Some(_) => Err(wrong_type(field, "sorted set")),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.fields.clear();
        Ok(())
    }
}

/// All term vectors of a segment in one file
#[derive(Debug, Default)]
pub struct SimpleTermVectorsFormat;

impl TermVectorsFormat for SimpleTermVectorsFormat {
    fn write(&self, state: &SegmentWriteState, docs: &[DocTermVectors]) -> Result<String> {
        debug_assert_eq!(docs.len(), state.doc_count as usize);
        let name = state.file_name(TERM_VECTORS_EXTENSION);
        write_checked(state.directory.as_ref(), &name, VERSION, &docs)?;
        Ok(name)
    }

    fn read(&self, state: &SegmentReadState<'_>) -> Result<Vec<DocTermVectors>> {
        let name = state.file_name(TERM_VECTORS_EXTENSION);
        let docs: Vec<DocTermVectors> = read_checked(state.directory.as_ref(), &name, VERSION)?;
        if docs.len() != state.segment_info.doc_count as usize {
            return Err(QuireError::Corruption(format!(
                "{}: {} documents, segment has {}",
                name,
                docs.len(),
                state.segment_info.doc_count
            )));
        }
        Ok(docs)
    }
}
