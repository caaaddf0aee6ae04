//! Change detection against the index.
//!
//! The (checksum, path) pair is checked first: a byte-identical file is
//! `Unchanged` even when its mtime moved, so it is never re-resolved.

use std::path::Path;

use crate::store::{StoreConnection, StoreResult};
use crate::types::{Checksum, Classification};

pub struct ChangeDetector;

impl ChangeDetector {
    pub fn classify(
        conn: &dyn StoreConnection,
        path: &Path,
        checksum: Checksum,
    ) -> StoreResult<Classification> {
        if conn.document_exists_with_checksum(checksum, path)? {
            return Ok(Classification::Unchanged);
        }
        if conn.document_exists(path)? {
            Ok(Classification::Changed)
        } else {
            Ok(Classification::New)
        }
    }
}
