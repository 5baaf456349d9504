//! Deleted documents as roaring bitmaps, one file per delete generation

use roaring::RoaringBitmap;
use tracing::debug;

use crate::error::{QuireError, Result};
use crate::index::{file_name_from_generation, SegmentCommitInfo};
use crate::store::Directory;

use super::format::LiveDocsFormat;
use super::io::{read_checked, write_checked};

pub const LIVE_DOCS_EXTENSION: &str = "liv";

const VERSION: u32 = 1;

/// Writes `<segment>_<gen>.liv` holding the set of deleted documents
#[derive(Debug, Default)]
pub struct RoaringLiveDocsFormat;

impl LiveDocsFormat for RoaringLiveDocsFormat {
    fn write_live_docs(&self, dir: &dyn Directory, commit: &SegmentCommitInfo, deleted: &RoaringBitmap) -> Result<()> {
        let info = commit.info();
        if let Some(max) = deleted.max() {
            if max >= info.doc_count {
                return Err(QuireError::IllegalArgument(format!(
                    "deleted doc {} out of range for segment {} with {} docs",
                    max, info.name, info.doc_count
                )));
            }
        }

        let gen = commit.next_write_del_gen();
        let name = self.file_name(&info.name, gen).ok_or_else(|| {
            QuireError::IllegalArgument(format!("no live docs file for generation {}", gen))
        })?;

        let mut bytes = Vec::with_capacity(deleted.serialized_size());
        deleted.serialize_into(&mut bytes)?;
        write_checked(dir, &name, VERSION, &bytes)?;
        debug!("Wrote {} deletes for {} to {}", deleted.len(), info.name, name);
        Ok(())
    }

    fn read_live_docs(&self, dir: &dyn Directory, commit: &SegmentCommitInfo) -> Result<RoaringBitmap> {
        let info = commit.info();
        let Some(name) = self.file_name(&info.name, commit.del_gen()) else {
            return Ok(RoaringBitmap::new());
        };

        let bytes: Vec<u8> = read_checked(dir, &name, VERSION)?;
        let deleted = RoaringBitmap::deserialize_from(&bytes[..])
            .map_err(|e| QuireError::Corruption(format!("{}: {}", name, e)))?;
        if deleted.len() != u64::from(commit.del_count()) {
            return Err(QuireError::Corruption(format!(
                "{}: {} deleted docs, commit records {}",
                name,
                deleted.len(),
                commit.del_count()
            )));
        }
        Ok(deleted)
    }

    fn file_name(&self, segment: &str, gen: i64) -> Option<String> {
        file_name_from_generation(segment, LIVE_DOCS_EXTENSION, gen)
    }
}
