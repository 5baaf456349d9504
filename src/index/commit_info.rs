//! Commit-time state of a segment
//!
//! A `SegmentCommitInfo` layers the mutable, versioned bookkeeping of a
//! commit over an immutable `SegmentInfo`: how many documents are deleted,
//! which delete generation is current, which generation the next delete
//! write uses, and a cached total size of the segment's files.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use roaring::RoaringBitmap;
use tracing::{debug, warn};

use crate::error::{QuireError, Result};

use super::segment_info::SegmentInfo;

/// Delete generation of a segment that never had deletes committed
pub const NO_DELETES: i64 = -1;

const SIZE_UNSET: i64 = -1;

#[derive(Debug)]
pub struct SegmentCommitInfo {
    info: Arc<SegmentInfo>,
    del_count: u32,
    del_gen: i64,
    /// Generation the next delete write will use; a failed write skips it
    next_write_del_gen: i64,
    size_in_bytes: AtomicI64,
    /// In-memory only, never persisted
    buffered_deletes_gen: i64,
}

impl SegmentCommitInfo {
    /// A freshly flushed segment: no deletes
    pub fn new(info: Arc<SegmentInfo>) -> Self {
        Self::with_del_gen(info, 0, NO_DELETES)
    }

    /// Restore a persisted record
    pub fn with_del_gen(info: Arc<SegmentInfo>, del_count: u32, del_gen: i64) -> Self {
        assert!(del_gen >= NO_DELETES, "invalid delete generation {}", del_gen);
        assert!(
            del_count <= info.doc_count,
            "delete count {} exceeds doc count {}",
            del_count,
            info.doc_count
        );
        let next_write_del_gen = if del_gen == NO_DELETES { 1 } else { del_gen + 1 };
        Self {
            info,
            del_count,
            del_gen,
            next_write_del_gen,
            size_in_bytes: AtomicI64::new(SIZE_UNSET),
            buffered_deletes_gen: 0,
        }
    }

    pub fn info(&self) -> &Arc<SegmentInfo> {
        &self.info
    }

    pub fn del_count(&self) -> u32 {
        self.del_count
    }

    pub fn del_gen(&self) -> i64 {
        self.del_gen
    }

    pub fn next_write_del_gen(&self) -> i64 {
        self.next_write_del_gen
    }

    pub fn has_deletions(&self) -> bool {
        self.del_gen != NO_DELETES
    }

    pub fn buffered_deletes_gen(&self) -> i64 {
        self.buffered_deletes_gen
    }

    /// Documents not deleted
    pub fn live_doc_count(&self) -> u32 {
        self.info.doc_count - self.del_count
    }

    /// A delete write at `next_write_del_gen` succeeded: it becomes current
    pub fn advance_del_gen(&mut self) {
        self.del_gen = self.next_write_del_gen;
        self.next_write_del_gen = self.del_gen + 1;
        self.invalidate_size();
        debug!("Segment {} now at delete generation {}", self.info.name, self.del_gen);
    }

    /// A delete write failed: never reuse its generation
    pub fn advance_next_write_del_gen(&mut self) {
        self.next_write_del_gen += 1;
    }

    /// # Panics
    ///
    /// If `del_count` exceeds the segment's doc count.
    pub fn set_del_count(&mut self, del_count: u32) {
        assert!(
            del_count <= self.info.doc_count,
            "delete count {} exceeds doc count {} of segment {}",
            del_count,
            self.info.doc_count,
            self.info.name
        );
        self.del_count = del_count;
    }

    pub fn set_buffered_deletes_gen(&mut self, gen: i64) {
        self.buffered_deletes_gen = gen;
        self.invalidate_size();
    }

    fn invalidate_size(&self) {
        self.size_in_bytes.store(SIZE_UNSET, Ordering::Release);
    }

    /// Total length of `files()`, computed once and cached until the file set
    /// changes. A failed lookup leaves the cache unset.
    pub fn size_in_bytes(&self) -> Result<u64> {
        let cached = self.size_in_bytes.load(Ordering::Acquire);
        if cached != SIZE_UNSET {
            return Ok(cached as u64);
        }
        let mut total = 0u64;
        for file in self.files() {
            total += self.info.directory.file_length(&file)?;
        }
        self.size_in_bytes.store(total as i64, Ordering::Release);
        Ok(total)
    }

    /// Segment files plus the current live-docs files, sorted, no duplicates
    pub fn files(&self) -> Vec<String> {
        let mut files: BTreeSet<String> = self.info.files().clone();
        files.extend(self.info.codec().live_docs_format().files(self));
        files.into_iter().collect()
    }
}

impl Clone for SegmentCommitInfo {
    fn clone(&self) -> Self {
        Self {
            info: Arc::clone(&self.info),
            del_count: self.del_count,
            del_gen: self.del_gen,
            next_write_del_gen: self.next_write_del_gen,
            size_in_bytes: AtomicI64::new(SIZE_UNSET),
            buffered_deletes_gen: self.buffered_deletes_gen,
        }
    }
}

impl fmt::Display for SegmentCommitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:C{}", self.info.name, self.info.doc_count)?;
        if self.del_count != 0 {
            write!(f, "/{}", self.del_count)?;
        }
        if self.del_gen != NO_DELETES {
            write!(f, ":delGen={}", self.del_gen)?;
        }
        Ok(())
    }
}

/// Persist `deleted` as the segment's next delete generation.
///
/// On success the new generation becomes current and the delete count is
/// updated. A rejected argument leaves the record untouched. Any other
/// failure moves only `next_write_del_gen`, so a retry never writes over the
/// failed generation, and any partial file is removed.
pub fn write_deletes(commit: &mut SegmentCommitInfo, deleted: &RoaringBitmap) -> Result<()> {
    let info = Arc::clone(commit.info());
    let format = info.codec().live_docs_format();
    let dir = info.directory.as_ref();

    match format.write_live_docs(dir, commit, deleted) {
        Ok(()) => {
            commit.advance_del_gen();
            commit.set_del_count(deleted.len() as u32);
            Ok(())
        }
        Err(e @ QuireError::IllegalArgument(_)) => Err(e),
        Err(e) => {
            let failed_gen = commit.next_write_del_gen();
            if let Some(name) = format.file_name(&info.name, failed_gen) {
                if dir.file_exists(&name) {
                    if let Err(cleanup) = dir.delete_file(&name) {
                        warn!("Failed to remove partial deletes file {}: {}", name, cleanup);
                    }
                }
            }
            commit.advance_next_write_del_gen();
            warn!(
                "Writing deletes for {} at generation {} failed: {}",
                info.name, failed_gen, e
            );
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DefaultCodec;
    use crate::store::RamDirectory;

    fn segment(doc_count: u32) -> Arc<SegmentInfo> {
        let mut info = SegmentInfo::new(
            Arc::new(RamDirectory::new()),
            "_2",
            doc_count,
            Arc::new(DefaultCodec::simple()),
        );
        info.set_files(["_2.si".to_string(), "_2.fnm".to_string()]);
        Arc::new(info)
    }

    #[test]
    fn test_initial_state() {
        let commit = SegmentCommitInfo::new(segment(5));
        assert_eq!(commit.del_gen(), NO_DELETES);
        assert_eq!(commit.next_write_del_gen(), 1);
        assert!(!commit.has_deletions());
        assert_eq!(commit.live_doc_count(), 5);
    }

    #[test]
    fn test_generation_advances_sequentially() {
        let mut commit = SegmentCommitInfo::new(segment(5));
        commit.advance_del_gen();
        assert_eq!((commit.del_gen(), commit.next_write_del_gen()), (1, 2));
        assert!(commit.has_deletions());

        commit.advance_del_gen();
        assert_eq!((commit.del_gen(), commit.next_write_del_gen()), (2, 3));

        commit.advance_next_write_del_gen();
        assert_eq!((commit.del_gen(), commit.next_write_del_gen()), (2, 4));
    }

    #[test]
    fn test_with_del_gen_restores_next() {
        let commit = SegmentCommitInfo::with_del_gen(segment(5), 2, 6);
        assert_eq!(commit.next_write_del_gen(), 7);
        assert_eq!(commit.del_count(), 2);

        let fresh = SegmentCommitInfo::with_del_gen(segment(5), 0, NO_DELETES);
        assert_eq!(fresh.next_write_del_gen(), 1);
    }

    #[test]
    fn test_set_del_count_boundaries() {
        let mut commit = SegmentCommitInfo::new(segment(5));
        commit.set_del_count(0);
        commit.set_del_count(5);
        assert_eq!(commit.del_count(), 5);
        assert_eq!(commit.live_doc_count(), 0);
    }

    #[test]
    #[should_panic(expected = "exceeds doc count")]
    fn test_set_del_count_above_doc_count_panics() {
        let mut commit = SegmentCommitInfo::new(segment(5));
        commit.set_del_count(6);
    }

    #[test]
    fn test_display() {
        let mut commit = SegmentCommitInfo::new(segment(10));
        assert_eq!(commit.to_string(), "_2:C10");
        commit.set_del_count(3);
        commit.advance_del_gen();
        assert_eq!(commit.to_string(), "_2:C10/3:delGen=1");
    }

    #[test]
    fn test_clone_shares_info_and_drops_size_cache() {
        let mut commit = SegmentCommitInfo::new(segment(5));
        commit.advance_del_gen();
        commit.set_del_count(1);
        commit.set_buffered_deletes_gen(9);
        commit.size_in_bytes.store(1234, Ordering::Release);

        let copy = commit.clone();
        assert!(Arc::ptr_eq(copy.info(), commit.info()));
        assert_eq!(copy.del_gen(), 1);
        assert_eq!(copy.next_write_del_gen(), 2);
        assert_eq!(copy.del_count(), 1);
        assert_eq!(copy.buffered_deletes_gen(), 9);
        assert_eq!(copy.size_in_bytes.load(Ordering::Acquire), SIZE_UNSET);
        assert_eq!(commit.size_in_bytes.load(Ordering::Acquire), 1234);
    }

    #[test]
    fn test_files_include_current_live_docs() {
        let mut commit = SegmentCommitInfo::new(segment(5));
        assert_eq!(commit.files(), vec!["_2.fnm", "_2.si"]);

        commit.advance_del_gen();
        commit.advance_del_gen();
        assert_eq!(commit.files(), vec!["_2.fnm", "_2.si", "_2_2.liv"]);
    }
}
