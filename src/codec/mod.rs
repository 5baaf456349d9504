//! Segment codecs
//!
//! - `format`: the format traits and the state handed to them
//! - `perfield`: per-field dispatch over registered formats
//! - `simple`: the bundled single-file formats
//! - `live_docs`: deleted documents per delete generation
//! - `metadata`: field infos and segment info files
//! - `registry`: name-to-format lookup for the read side

mod default_codec;
mod format;
mod io;
mod live_docs;
mod metadata;
pub mod perfield;
mod registry;
mod simple;

pub use default_codec::*;
pub use format::*;
pub use io::*;
pub use live_docs::*;
pub use metadata::*;
pub use perfield::{
    DocValuesFormatResolver, PerFieldDocValuesFormat, PerFieldDocValuesReader, PerFieldDocValuesWriter,
    PerFieldPostingsFormat, PerFieldPostingsReader, PerFieldPostingsWriter, PostingsFormatResolver,
};
pub use registry::*;
pub use simple::*;
