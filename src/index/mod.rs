//! In-memory segment building and segment bookkeeping
//!
//! - `terms_hash`: per-field term builders over shared block pools
//! - `freq_prox` / `term_vectors`: the two builder consumers
//! - `doc_values_writer`: per-field doc-values buffers
//! - `indexing_chain`: `SegmentIndexer`, which drives the above and flushes
//! - `segment_info` / `commit_info`: immutable segment description and its
//!   commit-time state
//! - `segment_reader`: read access to a flushed segment

mod commit_info;
mod doc_values_writer;
mod file_names;
mod freq_prox;
mod indexing_chain;
mod postings_array;
mod segment_info;
mod segment_reader;
mod term_vectors;
mod terms_hash;
mod types;

pub use commit_info::*;
pub use doc_values_writer::*;
pub use file_names::*;
pub use freq_prox::*;
pub use indexing_chain::*;
pub use postings_array::*;
pub use segment_info::*;
pub use segment_reader::*;
pub use term_vectors::*;
pub use terms_hash::*;
pub use types::*;
