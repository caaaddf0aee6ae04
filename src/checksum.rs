//! Content fingerprinting used for change detection.

use crate::types::Checksum;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Computes a fast fingerprint of a file's content.
pub trait ChecksumProvider: Send + Sync {
    fn checksum(&self, path: &Path) -> io::Result<Checksum>;
}

/// Streaming CRC32 over the raw file bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct Crc32Checksum;

const READ_BUFFER_SIZE: usize = 64 * 1024;

impl ChecksumProvider for Crc32Checksum {
    fn checksum(&self, path: &Path) -> io::Result<Checksum> {
        let mut file = File::open(path)?;
        let mut hasher = crc32fast::Hasher::new();
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(hasher.finalize())
    }
}

/// CRC32 of an in-memory buffer, identical to what [`Crc32Checksum`] yields for a file.
pub fn checksum_bytes(bytes: &[u8]) -> Checksum {
    crc32fast::hash(bytes)
}
