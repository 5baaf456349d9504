use std::fmt;
use std::sync::Arc;

use crate::codec::format::{
    BinaryDocValues, DocValuesConsumer, DocValuesFormat, DocValuesProducer, NumericDocValues, SegmentReadState,
    SegmentWriteState, SortedDocValues, SortedSetDocValues,
};
use crate::codec::registry::FormatRegistry;
use crate::error::{QuireError, Result};
use crate::index::FieldInfo;

use super::{close_all, put_write_once, ReadRouting, WriteRouting, DOC_VALUES_FORMAT_KEY, DOC_VALUES_SUFFIX_KEY};

/// Picks the doc-values format of a field by name
pub type DocValuesFormatResolver = Arc<dyn Fn(&str) -> Option<Arc<dyn DocValuesFormat>> + Send + Sync>;

/// Doc-values counterpart of `PerFieldPostingsFormat`
#[derive(Clone)]
pub struct PerFieldDocValuesFormat {
    resolver: DocValuesFormatResolver,
    registry: Arc<FormatRegistry>,
}

impl PerFieldDocValuesFormat {
    pub const NAME: &'static str = "PerFieldDV40";

    pub fn new(resolver: DocValuesFormatResolver, registry: Arc<FormatRegistry>) -> Self {
        Self { resolver, registry }
    }
}

impl fmt::Debug for PerFieldDocValuesFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerFieldDocValuesFormat")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl DocValuesFormat for PerFieldDocValuesFormat {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn fields_consumer(&self, state: &SegmentWriteState) -> Result<Box<dyn DocValuesConsumer>> {
        Ok(Box::new(PerFieldDocValuesWriter::new(
            Arc::clone(&self.resolver),
            state.clone(),
        )))
    }

    fn fields_producer(&self, state: &SegmentReadState<'_>) -> Result<Box<dyn DocValuesProducer>> {
        Ok(Box::new(PerFieldDocValuesReader::open(state, &self.registry)?))
    }
}

pub struct PerFieldDocValuesWriter {
    resolver: DocValuesFormatResolver,
    state: SegmentWriteState,
    routing: WriteRouting<dyn DocValuesFormat, Box<dyn DocValuesConsumer>>,
}

impl PerFieldDocValuesWriter {
    pub fn new(resolver: DocValuesFormatResolver, state: SegmentWriteState) -> Self {
        Self {
            resolver,
            state,
            routing: WriteRouting::new(),
        }
    }

    pub fn consumer_count(&self) -> usize {
        self.routing.len()
    }

    /// Delegate consumer for `field`, recording its routing attributes
    fn consumer(&mut self, field: &mut FieldInfo) -> Result<&mut Box<dyn DocValuesConsumer>> {
        let format = (self.resolver)(&field.name)
            .ok_or_else(|| QuireError::Config(format!("no doc values format for field {}", field.name)))?;
        let format_name = format.name().to_string();

        let state = &self.state;
        let entry = self.routing.route(&format, &format_name, field, &state.segment_suffix, |suffix| {
            format.fields_consumer(&state.with_suffix(suffix))
        })?;

        put_write_once(field, DOC_VALUES_FORMAT_KEY, format_name);
        put_write_once(field, DOC_VALUES_SUFFIX_KEY, entry.suffix.to_string());
        Ok(&mut entry.consumer)
    }
}

impl DocValuesConsumer for PerFieldDocValuesWriter {
    fn add_numeric_field(&mut self, field: &mut FieldInfo, values: &[i64]) -> Result<()> {
        self.consumer(field)?.add_numeric_field(field, values)
    }

    fn add_binary_field(&mut self, field: &mut FieldInfo, values: &[Vec<u8>]) -> Result<()> {
        self.consumer(field)?.add_binary_field(field, values)
    }

    fn add_sorted_field(&mut self, field: &mut FieldInfo, values: &[Vec<u8>], doc_to_ord: &[i32]) -> Result<()> {
        self.consumer(field)?.add_sorted_field(field, values, doc_to_ord)
    }

    fn add_sorted_set_field(&mut self, field: &mut FieldInfo, values: &[Vec<u8>], doc_ords: &[Vec<u64>]) -> Result<()> {
        self.consumer(field)?.add_sorted_set_field(field, values, doc_ords)
    }

    fn close(&mut self) -> Result<()> {
        close_all(self.routing.consumers_mut().map(|c| c.close()), "doc values consumer")
    }
}

#[derive(Debug)]
pub struct PerFieldDocValuesReader {
    routing: ReadRouting<Box<dyn DocValuesProducer>>,
}

impl PerFieldDocValuesReader {
    pub fn open(state: &SegmentReadState<'_>, registry: &FormatRegistry) -> Result<Self> {
        let routing = ReadRouting::open(
            state,
            FieldInfo::has_doc_values,
            DOC_VALUES_FORMAT_KEY,
            DOC_VALUES_SUFFIX_KEY,
            |name, state| registry.doc_values(name)?.fields_producer(state),
            |producer| producer.close(),
        )?;
        Ok(Self { routing })
    }

    pub fn producer_count(&self) -> usize {
        self.routing.len()
    }
}

impl DocValuesProducer for PerFieldDocValuesReader {
    fn numeric(&self, field: &str) -> Result<Option<&dyn NumericDocValues>> {
        match self.routing.producer(field) {
            Some(producer) => producer.numeric(field),
            None => Ok(None),
        }
    }

    fn binary(&self, field: &str) -> Result<Option<&dyn BinaryDocValues>> {
        match self.routing.producer(field) {
            Some(producer) => producer.binary(field),
            None => Ok(None),
        }
    }

    fn sorted(&self, field: &str) -> Result<Option<&dyn SortedDocValues>> {
        match self.routing.producer(field) {
            Some(producer) => producer.sorted(field),
            None => Ok(None),
        }
    }

    fn sorted_set(&self, field: &str) -> Result<Option<&dyn SortedSetDocValues>> {
        match self.routing.producer(field) {
            Some(producer) => producer.sorted_set(field),
            None => Ok(None),
        }
    }

    fn close(&mut self) -> Result<()> {
        close_all(self.routing.producers_mut().map(|p| p.close()), "doc values producer")
    }
}
