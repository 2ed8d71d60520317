// Copyright 2024 The Cask Authors
// SPDX-License-Identifier: Apache-2.0

//! Reference-counted content store.
//!
//! Object bytes live here, keyed by an internal content id. Entries are
//! immutable once inserted and shared by reference: a copy operation can
//! point a second object version at the same entry. Bytes are reclaimed
//! when the last referencing version is removed.

use bytes::Bytes;
use cask_core::error::{Error, S3ErrorCode};
use cask_core::types::ContentId;
use cask_core::Result;
use dashmap::DashMap;
use tracing::trace;
use uuid::Uuid;

struct Entry {
    data: Bytes,
    refs: u64,
}

/// In-memory blob storage with reference counting.
#[derive(Default)]
pub struct ContentStore {
    entries: DashMap<ContentId, Entry>,
}

impl ContentStore {
    /// Creates an empty content store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a sealed blob and returns its content id.
    ///
    /// The new entry starts with a reference count of one.
    pub fn insert(&self, data: Bytes) -> ContentId {
        let id = Uuid::new_v4();
        self.insert_with_id(id, data);
        id
    }

    /// Inserts a sealed blob under a caller-allocated id.
    ///
    /// Used when the id must exist before the bytes do, e.g. to derive a
    /// per-content encryption key. The id must be freshly allocated.
    pub fn insert_with_id(&self, id: ContentId, data: Bytes) {
        trace!(%id, size = data.len(), "content insert");
        self.entries.insert(id, Entry { data, refs: 1 });
    }

    /// Adds a reference to an existing entry.
    ///
    /// Returns `false` if the entry does not exist.
    pub fn retain(&self, id: ContentId) -> bool {
        match self.entries.get_mut(&id) {
            Some(mut entry) => {
                entry.refs += 1;
                true
            }
            None => false,
        }
    }

    /// Drops a reference; reclaims the bytes when the count reaches zero.
    pub fn release(&self, id: ContentId) {
        let remove = match self.entries.get_mut(&id) {
            Some(mut entry) => {
                entry.refs = entry.refs.saturating_sub(1);
                entry.refs == 0
            }
            None => false,
        };
        if remove {
            trace!(%id, "content reclaim");
            self.entries.remove(&id);
        }
    }

    /// Returns the full bytes of an entry.
    #[must_use]
    pub fn get(&self, id: ContentId) -> Option<Bytes> {
        self.entries.get(&id).map(|e| e.data.clone())
    }

    /// Returns the size in bytes of an entry.
    #[must_use]
    pub fn size(&self, id: ContentId) -> Option<u64> {
        self.entries.get(&id).map(|e| e.data.len() as u64)
    }

    /// Number of live entries (testing/introspection).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Slices an inclusive byte range out of a blob.
///
/// The end offset is clamped to the last byte, matching S3 range
/// semantics. A start past the end of the data (or past the requested
/// end) is not satisfiable.
///
/// # Errors
///
/// Returns `InvalidRange` if the range selects no bytes.
pub fn slice_range(data: &Bytes, start: u64, end: u64) -> Result<Bytes> {
    let len = data.len() as u64;
    if start > end || start >= len {
        return Err(Error::s3(
            S3ErrorCode::InvalidRange,
            "The requested range is not satisfiable",
        ));
    }
    let end = end.min(len - 1);
    let start = usize::try_from(start).map_err(|_| {
        Error::s3(S3ErrorCode::InvalidRange, "The requested range is not satisfiable")
    })?;
    let end = usize::try_from(end).map_err(|_| {
        Error::s3(S3ErrorCode::InvalidRange, "The requested range is not satisfiable")
    })?;
    Ok(data.slice(start..=end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let store = ContentStore::new();
        let id = store.insert(Bytes::from_static(b"hello"));

        assert_eq!(store.get(id), Some(Bytes::from_static(b"hello")));
        assert_eq!(store.size(id), Some(5));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_release_reclaims_at_zero() {
        let store = ContentStore::new();
        let id = store.insert(Bytes::from_static(b"data"));

        assert!(store.retain(id));
        store.release(id);
        assert!(store.get(id).is_some());

        store.release(id);
        assert!(store.get(id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_retain_missing_entry() {
        let store = ContentStore::new();
        assert!(!store.retain(Uuid::new_v4()));
    }

    #[test]
    fn test_slice_range() {
        let data = Bytes::from_static(b"Hello, World!");

        assert_eq!(slice_range(&data, 0, 4).unwrap(), Bytes::from_static(b"Hello"));
        assert_eq!(slice_range(&data, 7, 11).unwrap(), Bytes::from_static(b"World"));
        // End clamps to the last byte.
        assert_eq!(slice_range(&data, 7, 9999).unwrap(), Bytes::from_static(b"World!"));
        // Whole object.
        assert_eq!(slice_range(&data, 0, 12).unwrap(), data);
    }

    #[test]
    fn test_slice_range_unsatisfiable() {
        let data = Bytes::from_static(b"abc");

        assert!(slice_range(&data, 3, 10).is_err());
        assert!(slice_range(&data, 2, 1).is_err());
        assert!(slice_range(&Bytes::new(), 0, 0).is_err());
    }
}
