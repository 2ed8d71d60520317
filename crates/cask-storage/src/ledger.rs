// Copyright 2024 The Cask Authors
// SPDX-License-Identifier: Apache-2.0

//! Per-bucket version ledger.
//!
//! The ledger holds, for every key, its history of object versions and
//! delete markers, newest first. The entry at the front of a key's
//! history is the latest version, the one resolved by version-less reads
//! and deletes. All mutations happen under the owning bucket's write
//! lock; a version and its latest-pointer update are one atomic step.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use cask_core::types::{ContentId, ETag, ObjectVersionInfo, SseDescriptor, VersionId, VersioningMode};

/// Allocates version ids that order newest-first.
///
/// Ids are `hex(u64::MAX - t)` for a strictly increasing nanosecond
/// counter `t`, so a later write always sorts lexicographically before
/// an earlier one. The counter never moves backwards, even if the wall
/// clock does.
#[derive(Debug, Default)]
pub struct VersionSequencer {
    last: AtomicU64,
}

impl VersionSequencer {
    /// Creates a sequencer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next sequence value (larger = newer).
    pub fn next_seq(&self) -> u64 {
        let now = Utc::now().timestamp_nanos_opt().map_or(0, |n| n.unsigned_abs());
        self.last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .map_or(now, |prev| now.max(prev + 1))
    }

    /// Renders a sequence value as a version id token.
    #[must_use]
    pub fn id_for(seq: u64) -> VersionId {
        VersionId::Id(format!("{:016x}", u64::MAX - seq))
    }
}

/// One entry in a key's version history.
#[derive(Debug, Clone)]
pub struct VersionRecord {
    /// Version id (null under disabled/suspended writes).
    pub version_id: VersionId,
    /// Creation order across the ledger; larger is newer.
    pub seq: u64,
    /// Content entry, absent for delete markers.
    pub content: Option<ContentId>,
    /// Plaintext size in bytes (0 for delete markers).
    pub size: u64,
    /// ETag of the plaintext content.
    pub etag: ETag,
    /// Creation timestamp.
    pub last_modified: DateTime<Utc>,
    /// Whether this entry is a delete marker.
    pub is_delete_marker: bool,
    /// Encryption applied to the content entry.
    pub sse: SseDescriptor,
    /// Nonce for encrypted content.
    pub nonce: Option<Vec<u8>>,
}

impl VersionRecord {
    /// Projects this record into the public version info type.
    #[must_use]
    pub fn to_info(&self, key: &str, is_latest: bool) -> ObjectVersionInfo {
        ObjectVersionInfo {
            key: key.to_string(),
            version_id: self.version_id.clone(),
            size: self.size,
            etag: self.etag.clone(),
            last_modified: self.last_modified,
            is_latest,
            is_delete_marker: self.is_delete_marker,
            sse: self.sse.clone(),
        }
    }
}

/// Outcome of a versioned delete.
#[derive(Debug)]
pub struct DeleteOutcome {
    /// Whether a delete marker was created (vs. a physical removal).
    pub delete_marker: bool,
    /// Version id of the created delete marker, if any.
    pub version_id: Option<VersionId>,
    /// Content entries whose ledger reference went away.
    pub released: Vec<ContentId>,
}

/// Per-bucket key/version index.
///
/// Keys are held in lexicographic order; each key's history is newest
/// first.
#[derive(Debug, Default)]
pub struct VersionLedger {
    keys: BTreeMap<String, Vec<VersionRecord>>,
}

impl VersionLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the ledger holds no versions or delete markers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterates keys and their histories in key order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &Vec<VersionRecord>)> {
        self.keys.iter()
    }

    /// Returns the latest entry for a key, delete markers included.
    #[must_use]
    pub fn latest(&self, key: &str) -> Option<&VersionRecord> {
        self.keys.get(key).and_then(|h| h.first())
    }

    /// Returns a specific version of a key.
    #[must_use]
    pub fn version(&self, key: &str, version_id: &VersionId) -> Option<&VersionRecord> {
        self.keys.get(key).and_then(|h| h.iter().find(|r| &r.version_id == version_id))
    }

    /// Commits one written version according to the bucket's mode.
    ///
    /// Under `Enabled` the record is appended at the front of the history
    /// with its real id; the previous latest is retained. Under
    /// `Disabled` and `Suspended` the record takes the null id slot: an
    /// existing null entry is removed first, and any real-id versions
    /// written while versioning was enabled stay untouched.
    ///
    /// Returns content ids displaced by the write; the caller releases
    /// them once outside the ledger lock.
    pub fn commit_put(&mut self, key: &str, mut record: VersionRecord, mode: VersioningMode) -> Vec<ContentId> {
        let history = self.keys.entry(key.to_string()).or_default();
        let mut released = Vec::new();

        match mode {
            VersioningMode::Enabled => {
                debug_assert!(!record.version_id.is_null());
            }
            VersioningMode::Disabled | VersioningMode::Suspended => {
                record.version_id = VersionId::Null;
                if let Some(pos) = history.iter().position(|r| r.version_id.is_null()) {
                    let old = history.remove(pos);
                    released.extend(old.content);
                }
            }
        }

        history.insert(0, record);
        released
    }

    /// Commits a version-less delete according to the bucket's mode.
    ///
    /// `marker` supplies the delete-marker record when one is needed; it
    /// is ignored under `Disabled`.
    pub fn commit_delete(
        &mut self,
        key: &str,
        mode: VersioningMode,
        marker: VersionRecord,
    ) -> DeleteOutcome {
        match mode {
            VersioningMode::Disabled => {
                // Physical removal of the single null entry; deleting an
                // absent key is a successful no-op.
                let released = self.remove_version(key, &VersionId::Null);
                DeleteOutcome { delete_marker: false, version_id: None, released }
            }
            VersioningMode::Enabled => {
                let version_id = marker.version_id.clone();
                self.keys.entry(key.to_string()).or_default().insert(0, marker);
                DeleteOutcome { delete_marker: true, version_id: Some(version_id), released: Vec::new() }
            }
            VersioningMode::Suspended => {
                let released = self.remove_version(key, &VersionId::Null);
                let mut marker = marker;
                marker.version_id = VersionId::Null;
                self.keys.entry(key.to_string()).or_default().insert(0, marker);
                DeleteOutcome {
                    delete_marker: true,
                    version_id: Some(VersionId::Null),
                    released,
                }
            }
        }
    }

    /// Physically removes one version or delete marker.
    ///
    /// If the removed entry was the latest, the next most recent entry
    /// becomes latest by construction. Removing an absent key or version
    /// is a successful no-op. Returns released content ids.
    pub fn remove_version(&mut self, key: &str, version_id: &VersionId) -> Vec<ContentId> {
        let mut released = Vec::new();
        if let Some(history) = self.keys.get_mut(key) {
            if let Some(pos) = history.iter().position(|r| &r.version_id == version_id) {
                let removed = history.remove(pos);
                released.extend(removed.content);
            }
            if history.is_empty() {
                self.keys.remove(key);
            }
        }
        released
    }

    /// Drains every content reference in the ledger (bucket teardown).
    pub fn drain(&mut self) -> Vec<ContentId> {
        let mut released = Vec::new();
        for (_, history) in std::mem::take(&mut self.keys) {
            released.extend(history.into_iter().filter_map(|r| r.content));
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn record(seq: u64, version_id: VersionId, content: bool) -> VersionRecord {
        VersionRecord {
            version_id,
            seq,
            content: content.then(Uuid::new_v4),
            size: if content { 4 } else { 0 },
            etag: ETag::new("\"test\""),
            last_modified: Utc::now(),
            is_delete_marker: !content,
            sse: SseDescriptor::None,
            nonce: None,
        }
    }

    #[test]
    fn test_sequencer_monotonic_and_newest_sorts_first() {
        let sequencer = VersionSequencer::new();
        let a = sequencer.next_seq();
        let b = sequencer.next_seq();
        assert!(b > a);

        let VersionId::Id(id_a) = VersionSequencer::id_for(a) else { unreachable!() };
        let VersionId::Id(id_b) = VersionSequencer::id_for(b) else { unreachable!() };
        // Newer version ids order lexicographically before older ones.
        assert!(id_b < id_a);
    }

    #[test]
    fn test_disabled_put_replaces_null_in_place() {
        let mut ledger = VersionLedger::new();
        let seq = VersionSequencer::new();

        let r1 = record(seq.next_seq(), VersionId::Null, true);
        let first_content = r1.content.unwrap();
        assert!(ledger.commit_put("key", r1, VersioningMode::Disabled).is_empty());

        let r2 = record(seq.next_seq(), VersionId::Null, true);
        let released = ledger.commit_put("key", r2, VersioningMode::Disabled);
        assert_eq!(released, vec![first_content]);

        // Exactly one entry, still the null id.
        let latest = ledger.latest("key").unwrap();
        assert!(latest.version_id.is_null());
        assert_eq!(ledger.iter().next().unwrap().1.len(), 1);
    }

    #[test]
    fn test_enabled_put_retains_history() {
        let mut ledger = VersionLedger::new();
        let seq = VersionSequencer::new();

        let s1 = seq.next_seq();
        ledger.commit_put("key", record(s1, VersionSequencer::id_for(s1), true), VersioningMode::Enabled);
        let s2 = seq.next_seq();
        ledger.commit_put("key", record(s2, VersionSequencer::id_for(s2), true), VersioningMode::Enabled);

        let history = ledger.iter().next().unwrap().1;
        assert_eq!(history.len(), 2);
        assert_eq!(ledger.latest("key").unwrap().seq, s2);
    }

    #[test]
    fn test_suspended_put_overwrites_null_slot_only() {
        let mut ledger = VersionLedger::new();
        let seq = VersionSequencer::new();

        // Disabled-era write, then two enabled-era writes.
        ledger.commit_put("key", record(seq.next_seq(), VersionId::Null, true), VersioningMode::Disabled);
        for _ in 0..2 {
            let s = seq.next_seq();
            ledger.commit_put("key", record(s, VersionSequencer::id_for(s), true), VersioningMode::Enabled);
        }

        // Suspended write replaces the null slot, not a fourth entry.
        let released =
            ledger.commit_put("key", record(seq.next_seq(), VersionId::Null, true), VersioningMode::Suspended);
        assert_eq!(released.len(), 1);

        let history = ledger.iter().next().unwrap().1;
        assert_eq!(history.len(), 3);
        assert!(ledger.latest("key").unwrap().version_id.is_null());
    }

    #[test]
    fn test_enabled_delete_appends_marker() {
        let mut ledger = VersionLedger::new();
        let seq = VersionSequencer::new();

        let s1 = seq.next_seq();
        ledger.commit_put("key", record(s1, VersionSequencer::id_for(s1), true), VersioningMode::Enabled);

        let s2 = seq.next_seq();
        let outcome = ledger.commit_delete(
            "key",
            VersioningMode::Enabled,
            record(s2, VersionSequencer::id_for(s2), false),
        );

        assert!(outcome.delete_marker);
        assert!(outcome.released.is_empty());
        assert!(ledger.latest("key").unwrap().is_delete_marker);
        assert_eq!(ledger.iter().next().unwrap().1.len(), 2);
    }

    #[test]
    fn test_suspended_delete_replaces_null_content() {
        let mut ledger = VersionLedger::new();
        let seq = VersionSequencer::new();

        ledger.commit_put("key", record(seq.next_seq(), VersionId::Null, true), VersioningMode::Disabled);

        let s = seq.next_seq();
        let outcome =
            ledger.commit_delete("key", VersioningMode::Suspended, record(s, VersionId::Null, false));

        assert!(outcome.delete_marker);
        assert_eq!(outcome.version_id, Some(VersionId::Null));
        assert_eq!(outcome.released.len(), 1);
        assert!(ledger.latest("key").unwrap().is_delete_marker);
    }

    #[test]
    fn test_disabled_delete_is_physical_and_idempotent() {
        let mut ledger = VersionLedger::new();
        let seq = VersionSequencer::new();

        let r = record(seq.next_seq(), VersionId::Null, true);
        ledger.commit_put("key", r, VersioningMode::Disabled);

        let s = seq.next_seq();
        let outcome = ledger.commit_delete("key", VersioningMode::Disabled, record(s, VersionId::Null, false));
        assert!(!outcome.delete_marker);
        assert_eq!(outcome.released.len(), 1);
        assert!(ledger.is_empty());

        // Deleting again is a no-op success.
        let s = seq.next_seq();
        let outcome = ledger.commit_delete("key", VersioningMode::Disabled, record(s, VersionId::Null, false));
        assert!(!outcome.delete_marker);
        assert!(outcome.released.is_empty());
    }

    #[test]
    fn test_remove_version_promotes_next_latest() {
        let mut ledger = VersionLedger::new();
        let seq = VersionSequencer::new();

        let s1 = seq.next_seq();
        let v1 = VersionSequencer::id_for(s1);
        ledger.commit_put("key", record(s1, v1.clone(), true), VersioningMode::Enabled);
        let s2 = seq.next_seq();
        let v2 = VersionSequencer::id_for(s2);
        ledger.commit_put("key", record(s2, v2.clone(), true), VersioningMode::Enabled);

        // Removing the latest hands the pointer to the older version.
        let released = ledger.remove_version("key", &v2);
        assert_eq!(released.len(), 1);
        assert_eq!(ledger.latest("key").unwrap().version_id, v1);

        // Removing the last entry clears the key.
        ledger.remove_version("key", &v1);
        assert!(ledger.is_empty());

        // Unknown version is a no-op.
        assert!(ledger.remove_version("key", &v1).is_empty());
    }
}
