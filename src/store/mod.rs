//! Flat file storage for segment artifacts
//!
//! - `Directory`: named byte files, the only I/O surface codecs see
//! - `RamDirectory`: in-memory map, used by tests and benches
//! - `FsDirectory`: one plain file per name under a base directory
//! - `TrackingDirectory`: wrapper that records every file written through it

mod directory;

pub use directory::*;
