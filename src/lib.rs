pub mod codec;
pub mod config;
pub mod error;
pub mod index;
pub mod store;
pub mod util;

pub use codec::{Codec, DefaultCodec, FormatRegistry};
pub use config::{IndexingConfig, PerFieldConfig};
pub use error::{QuireError, Result};
pub use index::{
    DocValue, FieldInfo, FieldInfos, FlushedSegment, IndexOptions, IndexableField, SegmentCommitInfo, SegmentIndexer,
    SegmentInfo, SegmentReader, Token,
};
pub use store::{Directory, FsDirectory, RamDirectory};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
