//! CRC32 content checksums.
//!
//! The wire protocol reports checksums as unsigned 32-bit CRC values
//! (IEEE polynomial, the same as zlib's `crc32`).

use crate::error::StorageResult;
use crc32fast::Hasher as Crc32;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const READ_BUFFER: usize = 64 * 1024;

/// Computes the CRC32 of an in-memory buffer.
#[must_use]
pub fn crc32_of_bytes(data: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(data);
    hasher.finalize()
}

/// Computes the CRC32 of a file by streaming its contents.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn crc32_of_file(path: &Path) -> StorageResult<u32> {
    let mut file = File::open(path)?;
    let mut hasher = Crc32::new();
    let mut buffer = vec![0u8; READ_BUFFER];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize())
}
