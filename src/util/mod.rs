//! Indexing-time memory primitives
//!
//! - `Counter`: shared byte accounting for everything charged to one indexing thread
//! - `ByteBlockPool` / `IntBlockPool`: append-only arenas addressed by integer offsets
//! - `BytesRefHash`: term dedup table generic over its backing-store adapter

mod block_pool;
mod bytes_hash;
mod counter;

pub use block_pool::*;
pub use bytes_hash::*;
pub use counter::*;
