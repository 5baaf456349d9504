//! Segment metadata files: field infos (`.fnm`) and segment info (`.si`)

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{QuireError, Result};
use crate::index::{segment_file_name, FieldInfo, FieldInfos, SegmentInfo};
use crate::store::Directory;

use super::format::Codec;
use super::io::{read_checked, write_checked};

pub const FIELD_INFOS_EXTENSION: &str = "fnm";
pub const SEGMENT_INFO_EXTENSION: &str = "si";

const VERSION: u32 = 1;

/// Write `infos`, attributes included, as `<segment>.fnm`. Returns the file name.
pub fn write_field_infos(dir: &dyn Directory, segment: &str, infos: &FieldInfos) -> Result<String> {
    let name = segment_file_name(segment, "", FIELD_INFOS_EXTENSION);
    let fields: Vec<&FieldInfo> = infos.iter().collect();
    write_checked(dir, &name, VERSION, &fields)?;
    Ok(name)
}

pub fn read_field_infos(dir: &dyn Directory, segment: &str) -> Result<FieldInfos> {
    let name = segment_file_name(segment, "", FIELD_INFOS_EXTENSION);
    let fields: Vec<FieldInfo> = read_checked(dir, &name, VERSION)?;
    FieldInfos::from_fields(fields)
}

#[derive(Debug, Serialize, Deserialize)]
struct SegmentInfoRecord {
    name: String,
    doc_count: u32,
    codec: String,
    files: BTreeSet<String>,
    diagnostics: BTreeMap<String, String>,
    version: String,
}

/// Write `info` as `<segment>.si`. The `.si` file itself is expected to be
/// part of `info.files()`.
pub fn write_segment_info(dir: &dyn Directory, info: &SegmentInfo) -> Result<String> {
    let name = segment_file_name(&info.name, "", SEGMENT_INFO_EXTENSION);
    let record = SegmentInfoRecord {
        name: info.name.clone(),
        doc_count: info.doc_count,
        codec: info.codec().name().to_string(),
        files: info.files().clone(),
        diagnostics: info.diagnostics().clone(),
        version: crate::VERSION.to_string(),
    };
    write_checked(dir, &name, VERSION, &record)?;
    Ok(name)
}

/// Read `<segment>.si`; the segment must have been written with `codec`
pub fn read_segment_info(directory: Arc<dyn Directory>, segment: &str, codec: Arc<dyn Codec>) -> Result<SegmentInfo> {
    let name = segment_file_name(segment, "", SEGMENT_INFO_EXTENSION);
    let record: SegmentInfoRecord = read_checked(directory.as_ref(), &name, VERSION)?;
    if record.name != segment {
        return Err(QuireError::Corruption(format!(
            "{}: holds segment {}",
            name, record.name
        )));
    }
    if record.codec != codec.name() {
        return Err(QuireError::UnknownFormat(format!(
            "segment {} written with codec {}, reading with {}",
            segment,
            record.codec,
            codec.name()
        )));
    }

    let mut info = SegmentInfo::new(directory, record.name, record.doc_count, codec);
    info.set_files(record.files);
    info.set_diagnostics(record.diagnostics);
    Ok(info)
}
