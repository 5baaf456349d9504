//! Checksummed bincode files
//!
//! Layout: 4-byte magic, 4-byte little-endian format version, bincode
//! payload, 4-byte little-endian CRC32 of everything before it.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{QuireError, Result};
use crate::store::Directory;

const MAGIC: &[u8; 4] = b"QUIR";
const HEADER_LEN: usize = 8;
const FOOTER_LEN: usize = 4;

/// Serialize `value` and write it as `name`
pub fn write_checked<T: Serialize>(dir: &dyn Directory, name: &str, version: u32, value: &T) -> Result<()> {
    let payload = bincode::serialize(value)?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len() + FOOTER_LEN);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&version.to_le_bytes());
    bytes.extend_from_slice(&payload);
    let crc = crc32fast::hash(&bytes);
    bytes.extend_from_slice(&crc.to_le_bytes());
    dir.write_file(name, &bytes)?;
    Ok(())
}

/// Read `name`, verify header and checksum, and deserialize the payload
pub fn read_checked<T: DeserializeOwned>(dir: &dyn Directory, name: &str, version: u32) -> Result<T> {
    let bytes = dir.read_file(name)?;
    if bytes.len() < HEADER_LEN + FOOTER_LEN || &bytes[..4] != MAGIC {
        return Err(QuireError::Corruption(format!("{}: bad header", name)));
    }

    let (body, footer) = bytes.split_at(bytes.len() - FOOTER_LEN);
    let expected = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let actual = crc32fast::hash(body);
    if expected != actual {
        return Err(QuireError::Corruption(format!(
            "{}: checksum mismatch (expected {:08x}, got {:08x})",
            name, expected, actual
        )));
    }

    let found = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
    if found != version {
        return Err(QuireError::Corruption(format!(
            "{}: unsupported version {} (expected {})",
            name, found, version
        )));
    }

    Ok(bincode::deserialize(&body[HEADER_LEN..])?)
}
