//! Delete generations and size caching of flushed segments

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::FaultyDirectory;
use quire::index::{write_deletes, IndexableField, SegmentCommitInfo, SegmentIndexer, SegmentReader, Token, NO_DELETES};
use quire::store::Directory;
use quire::{DefaultCodec, IndexingConfig, QuireError};
use roaring::RoaringBitmap;

fn flush_segment(dir: &Arc<FaultyDirectory>, docs: u32) -> SegmentCommitInfo {
    let mut indexer =
        SegmentIndexer::new(dir.clone(), Arc::new(DefaultCodec::simple()), IndexingConfig::small()).unwrap();
    for i in 0..docs {
        let term = format!("doc{}", i);
        indexer
            .add_document(&[IndexableField::text("id", Token::sequence([term.as_str()]))])
            .unwrap();
    }
    indexer.flush().unwrap().commit
}

fn bitmap(docs: &[u32]) -> RoaringBitmap {
    docs.iter().copied().collect()
}

#[test]
fn test_deletes_advance_generation_and_hide_docs() {
    common::init_tracing();
    let dir = FaultyDirectory::new();
    let mut commit = flush_segment(&dir, 4);
    assert_eq!(commit.del_gen(), NO_DELETES);
    assert!(!commit.has_deletions());

    write_deletes(&mut commit, &bitmap(&[1, 3])).unwrap();
    assert_eq!(commit.del_gen(), 1);
    assert_eq!(commit.next_write_del_gen(), 2);
    assert_eq!(commit.del_count(), 2);
    assert_eq!(commit.to_string(), "_0:C4/2:delGen=1");
    assert!(commit.files().contains(&"_0_1.liv".to_string()));

    let reader = SegmentReader::open(&commit).unwrap();
    assert_eq!(reader.max_doc(), 4);
    assert_eq!(reader.num_docs(), 2);
    assert!(reader.is_deleted(1));
    assert!(!reader.is_deleted(2));

    // A later generation supersedes the earlier one
    write_deletes(&mut commit, &bitmap(&[0, 1, 3])).unwrap();
    assert_eq!(commit.del_gen(), 2);
    let files = commit.files();
    assert!(files.contains(&"_0_2.liv".to_string()));
    assert!(!files.contains(&"_0_1.liv".to_string()));
    assert_eq!(SegmentReader::open(&commit).unwrap().num_docs(), 1);
}

#[test]
fn test_failed_delete_write_skips_generation() {
    common::init_tracing();
    let dir = FaultyDirectory::new();
    let mut commit = flush_segment(&dir, 3);
    write_deletes(&mut commit, &bitmap(&[0])).unwrap();

    dir.fail_writes_containing(Some(".liv"));
    let err = write_deletes(&mut commit, &bitmap(&[0, 2])).unwrap_err();
    assert!(matches!(err, QuireError::Io(_)));
    assert_eq!(commit.del_gen(), 1);
    assert_eq!(commit.del_count(), 1);
    assert_eq!(commit.next_write_del_gen(), 3);
    assert!(!dir.file_exists("_0_2.liv"));

    dir.fail_writes_containing(None);
    write_deletes(&mut commit, &bitmap(&[0, 2])).unwrap();
    assert_eq!(commit.del_gen(), 3);
    assert_eq!(commit.next_write_del_gen(), 4);
    assert_eq!(SegmentReader::open(&commit).unwrap().num_docs(), 1);
}

#[test]
fn test_out_of_range_delete_is_rejected() {
    let dir = FaultyDirectory::new();
    let mut commit = flush_segment(&dir, 2);
    let err = write_deletes(&mut commit, &bitmap(&[5])).unwrap_err();
    assert!(matches!(err, QuireError::IllegalArgument(_)));
    assert_eq!(commit.del_gen(), NO_DELETES);
    assert_eq!(commit.next_write_del_gen(), 1);

    // Nothing was written, so the next write takes the first generation
    write_deletes(&mut commit, &bitmap(&[1])).unwrap();
    assert_eq!(commit.del_gen(), 1);
    assert_eq!(commit.next_write_del_gen(), 2);
}

#[test]
fn test_size_is_cached_until_files_change() {
    let dir = FaultyDirectory::new();
    let mut commit = flush_segment(&dir, 2);

    let before = dir.length_calls();
    let size = commit.size_in_bytes().unwrap();
    assert!(size > 0);
    let files = commit.files().len();
    assert_eq!(dir.length_calls(), before + files);

    assert_eq!(commit.size_in_bytes().unwrap(), size);
    assert_eq!(dir.length_calls(), before + files);

    write_deletes(&mut commit, &bitmap(&[1])).unwrap();
    let with_deletes = commit.size_in_bytes().unwrap();
    assert!(with_deletes > size);
    assert_eq!(dir.length_calls(), before + files + files + 1);
}

#[test]
fn test_failed_size_lookup_is_not_cached() {
    let dir = FaultyDirectory::new();
    let commit = flush_segment(&dir, 1);

    dir.fail_lengths(true);
    assert!(matches!(commit.size_in_bytes(), Err(QuireError::Io(_))));

    dir.fail_lengths(false);
    let before = dir.length_calls();
    assert!(commit.size_in_bytes().unwrap() > 0);
    assert_eq!(dir.length_calls(), before + commit.files().len());
}

#[test]
fn test_files_are_a_superset_without_duplicates() {
    let dir = FaultyDirectory::new();
    let mut commit = flush_segment(&dir, 2);
    write_deletes(&mut commit, &bitmap(&[0])).unwrap();

    let files = commit.files();
    let unique: HashSet<&String> = files.iter().collect();
    assert_eq!(unique.len(), files.len());
    for file in commit.info().files() {
        assert!(files.contains(file));
    }
    assert!(files.iter().all(|f| dir.file_exists(f)));
}
