//! Read access to one flushed segment

use std::sync::Arc;

use roaring::RoaringBitmap;
use tracing::{debug, warn};

use crate::codec::{
    read_field_infos, BinaryDocValues, DocValuesProducer, FieldsProducer, NumericDocValues, SegmentReadState,
    SortedDocValues, SortedSetDocValues, Terms,
};
use crate::error::Result;

use super::commit_info::SegmentCommitInfo;
use super::segment_info::SegmentInfo;
use super::term_vectors::DocTermVectors;
use super::types::{DocId, FieldInfos};

/// Opened producers of a segment, at the commit's delete generation
#[derive(Debug)]
pub struct SegmentReader {
    info: Arc<SegmentInfo>,
    field_infos: FieldInfos,
    postings: Option<Box<dyn FieldsProducer>>,
    doc_values: Option<Box<dyn DocValuesProducer>>,
    term_vectors: Vec<DocTermVectors>,
    deleted: RoaringBitmap,
}

impl SegmentReader {
    /// Open every part of `commit`'s segment. Parts already opened are
    /// closed again if a later one fails.
    pub fn open(commit: &SegmentCommitInfo) -> Result<Self> {
        let info = Arc::clone(commit.info());
        let dir = Arc::clone(&info.directory);
        let codec = Arc::clone(info.codec());
        let field_infos = read_field_infos(dir.as_ref(), &info.name)?;

        let mut reader = Self {
            info: Arc::clone(&info),
            field_infos: FieldInfos::new(),
            postings: None,
            doc_values: None,
            term_vectors: Vec::new(),
            deleted: RoaringBitmap::new(),
        };

        let opened = (|| -> Result<()> {
            let state = SegmentReadState::new(Arc::clone(&dir), &info, &field_infos);
            if field_infos.has_postings() {
                reader.postings = Some(codec.postings_format().fields_producer(&state)?);
            }
            if field_infos.has_doc_values() {
                reader.doc_values = Some(codec.doc_values_format().fields_producer(&state)?);
            }
            if field_infos.has_vectors() {
                reader.term_vectors = codec.term_vectors_format().read(&state)?;
            }
            if commit.has_deletions() {
                reader.deleted = codec.live_docs_format().read_live_docs(dir.as_ref(), commit)?;
            }
            Ok(())
        })();

        if let Err(e) = opened {
            warn!("Failed to open segment {}: {}", info.name, e);
            if let Err(suppressed) = reader.close() {
                debug!("Suppressed failure closing segment {}: {}", info.name, suppressed);
            }
            return Err(e);
        }

        reader.field_infos = field_infos;
        debug!("Opened segment {}", commit);
        Ok(reader)
    }

    pub fn info(&self) -> &Arc<SegmentInfo> {
        &self.info
    }

    pub fn field_infos(&self) -> &FieldInfos {
        &self.field_infos
    }

    /// Documents in the segment, deleted ones included
    pub fn max_doc(&self) -> u32 {
        self.info.doc_count
    }

    /// Documents not deleted
    pub fn num_docs(&self) -> u32 {
        self.max_doc() - self.deleted.len() as u32
    }

    pub fn is_deleted(&self, doc: DocId) -> bool {
        self.deleted.contains(doc)
    }

    pub fn terms(&self, field: &str) -> Result<Option<&dyn Terms>> {
        match &self.postings {
            Some(postings) => postings.terms(field),
            None => Ok(None),
        }
    }

    pub fn numeric(&self, field: &str) -> Result<Option<&dyn NumericDocValues>> {
        match &self.doc_values {
            Some(dv) => dv.numeric(field),
            None => Ok(None),
        }
    }

    pub fn binary(&self, field: &str) -> Result<Option<&dyn BinaryDocValues>> {
        match &self.doc_values {
            Some(dv) => dv.binary(field),
            None => Ok(None),
        }
    }

    pub fn sorted(&self, field: &str) -> Result<Option<&dyn SortedDocValues>> {
        match &self.doc_values {
            Some(dv) => dv.sorted(field),
            None => Ok(None),
        }
    }

    pub fn sorted_set(&self, field: &str) -> Result<Option<&dyn SortedSetDocValues>> {
        match &self.doc_values {
            Some(dv) => dv.sorted_set(field),
            None => Ok(None),
        }
    }

    /// Stored vectors of `doc`; `None` if the segment keeps none
    pub fn term_vectors(&self, doc: DocId) -> Option<&DocTermVectors> {
        self.term_vectors.get(doc as usize)
    }

    /// Close every producer; the first failure is returned
    pub fn close(&mut self) -> Result<()> {
        let postings = self.postings.as_mut().map_or(Ok(()), |p| p.close());
        let doc_values = self.doc_values.as_mut().map_or(Ok(()), |p| p.close());
        if let (Err(_), Err(e)) = (&postings, &doc_values) {
            warn!("Additional failure closing segment {}: {}", self.info.name, e);
        }
        postings.and(doc_values)
    }
}
