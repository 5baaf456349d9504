//! Immutable description of a flushed segment

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::codec::Codec;
use crate::store::Directory;

/// Name, size, codec and files of one segment. Never changes once the
/// segment is written; commit-time state lives in `SegmentCommitInfo`.
#[derive(Debug)]
pub struct SegmentInfo {
    pub name: String,
    pub doc_count: u32,
    pub directory: Arc<dyn Directory>,
    codec: Arc<dyn Codec>,
    files: BTreeSet<String>,
    diagnostics: BTreeMap<String, String>,
}

impl SegmentInfo {
    pub fn new(directory: Arc<dyn Directory>, name: impl Into<String>, doc_count: u32, codec: Arc<dyn Codec>) -> Self {
        Self {
            name: name.into(),
            doc_count,
            directory,
            codec,
            files: BTreeSet::new(),
            diagnostics: BTreeMap::new(),
        }
    }

    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    /// Files written when the segment was created, sorted
    pub fn files(&self) -> &BTreeSet<String> {
        &self.files
    }

    pub fn set_files<I: IntoIterator<Item = String>>(&mut self, files: I) {
        self.files = files.into_iter().collect();
    }

    pub fn add_file(&mut self, file: impl Into<String>) {
        self.files.insert(file.into());
    }

    pub fn diagnostics(&self) -> &BTreeMap<String, String> {
        &self.diagnostics
    }

    pub fn put_diagnostic(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.diagnostics.insert(key.into(), value.into());
    }

    pub(crate) fn set_diagnostics(&mut self, diagnostics: BTreeMap<String, String>) {
        self.diagnostics = diagnostics;
    }
}
