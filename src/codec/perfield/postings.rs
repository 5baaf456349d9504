use std::fmt;
use std::sync::Arc;

use crate::codec::format::{
    FieldsConsumer, FieldsProducer, PostingsFormat, SegmentReadState, SegmentWriteState, Terms, TermsConsumer,
};
use crate::codec::registry::FormatRegistry;
use crate::error::{QuireError, Result};
use crate::index::FieldInfo;

use super::{close_all, put_write_once, ReadRouting, WriteRouting, POSTINGS_FORMAT_KEY, POSTINGS_SUFFIX_KEY};

/// Picks the postings format of a field by name
pub type PostingsFormatResolver = Arc<dyn Fn(&str) -> Option<Arc<dyn PostingsFormat>> + Send + Sync>;

/// Postings format that delegates each field to the format its resolver
/// names. Fields resolving to the same instance share one consumer and one
/// set of files.
#[derive(Clone)]
pub struct PerFieldPostingsFormat {
    resolver: PostingsFormatResolver,
    registry: Arc<FormatRegistry>,
}

impl PerFieldPostingsFormat {
    pub const NAME: &'static str = "PerField40";

    pub fn new(resolver: PostingsFormatResolver, registry: Arc<FormatRegistry>) -> Self {
        Self { resolver, registry }
    }
}

impl fmt::Debug for PerFieldPostingsFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerFieldPostingsFormat")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl PostingsFormat for PerFieldPostingsFormat {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn fields_consumer(&self, state: &SegmentWriteState) -> Result<Box<dyn FieldsConsumer>> {
        Ok(Box::new(PerFieldPostingsWriter::new(
            Arc::clone(&self.resolver),
            state.clone(),
        )))
    }

    fn fields_producer(&self, state: &SegmentReadState<'_>) -> Result<Box<dyn FieldsProducer>> {
        Ok(Box::new(PerFieldPostingsReader::open(state, &self.registry)?))
    }
}

pub struct PerFieldPostingsWriter {
    resolver: PostingsFormatResolver,
    state: SegmentWriteState,
    routing: WriteRouting<dyn PostingsFormat, Box<dyn FieldsConsumer>>,
}

impl PerFieldPostingsWriter {
    pub fn new(resolver: PostingsFormatResolver, state: SegmentWriteState) -> Self {
        Self {
            resolver,
            state,
            routing: WriteRouting::new(),
        }
    }

    /// Distinct delegate consumers opened so far
    pub fn consumer_count(&self) -> usize {
        self.routing.len()
    }
}

impl FieldsConsumer for PerFieldPostingsWriter {
    fn add_field<'a>(&'a mut self, field: &mut FieldInfo) -> Result<Box<dyn TermsConsumer + 'a>> {
        let format = (self.resolver)(&field.name)
            .ok_or_else(|| QuireError::Config(format!("no postings format for field {}", field.name)))?;
        let format_name = format.name().to_string();

        let state = &self.state;
        let entry = self.routing.route(&format, &format_name, field, &state.segment_suffix, |suffix| {
            format.fields_consumer(&state.with_suffix(suffix))
        })?;

        put_write_once(field, POSTINGS_FORMAT_KEY, format_name);
        put_write_once(field, POSTINGS_SUFFIX_KEY, entry.suffix.to_string());
        entry.consumer.add_field(field)
    }

    fn close(&mut self) -> Result<()> {
        close_all(self.routing.consumers_mut().map(|c| c.close()), "postings consumer")
    }
}

/// Read side: one producer per `(format, suffix)` recorded on the fields
#[derive(Debug)]
pub struct PerFieldPostingsReader {
    routing: ReadRouting<Box<dyn FieldsProducer>>,
}

impl PerFieldPostingsReader {
    pub fn open(state: &SegmentReadState<'_>, registry: &FormatRegistry) -> Result<Self> {
        let routing = ReadRouting::open(
            state,
            FieldInfo::is_indexed,
            POSTINGS_FORMAT_KEY,
            POSTINGS_SUFFIX_KEY,
            |name, state| registry.postings(name)?.fields_producer(state),
            |producer| producer.close(),
        )?;
        Ok(Self { routing })
    }

    /// Distinct delegate producers opened
    pub fn producer_count(&self) -> usize {
        self.routing.len()
    }
}

impl FieldsProducer for PerFieldPostingsReader {
    fn terms(&self, field: &str) -> Result<Option<&dyn Terms>> {
        match self.routing.producer(field) {
            Some(producer) => producer.terms(field),
            None => Ok(None),
        }
    }

    fn close(&mut self) -> Result<()> {
        close_all(self.routing.producers_mut().map(|p| p.close()), "postings producer")
    }
}
