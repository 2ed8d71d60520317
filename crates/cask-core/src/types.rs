// Copyright 2024 The Cask Authors
// SPDX-License-Identifier: Apache-2.0

//! Common types used throughout Cask.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An S3 ETag value.
///
/// ETags are MD5 hashes of object content for single-part uploads,
/// or `MD5(concat(part_md5s))-{num_parts}` for multipart uploads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ETag(String);

impl ETag {
    /// Creates a new ETag from a string value.
    ///
    /// The value should be quoted (e.g., `"d41d8cd98f00b204e9800998ecf8427e"`).
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Creates an ETag from an MD5 hash (single-part upload).
    #[must_use]
    pub fn from_md5(hash: &[u8; 16]) -> Self {
        Self(format!("\"{}\"", hex::encode(hash)))
    }

    /// Creates an ETag for a multipart upload.
    #[must_use]
    pub fn from_multipart(hash: &[u8; 16], num_parts: usize) -> Self {
        Self(format!("\"{}-{}\"", hex::encode(hash), num_parts))
    }

    /// Returns the ETag value as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the ETag value without surrounding quotes.
    #[must_use]
    pub fn trimmed(&self) -> &str {
        self.0.trim_matches('"')
    }

    /// Returns whether this ETag is from a multipart upload.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.0.contains('-')
    }

    /// Compares two ETags ignoring surrounding quotes.
    #[must_use]
    pub fn matches(&self, other: &str) -> bool {
        self.trimmed() == other.trim_matches('"')
    }
}

impl std::fmt::Display for ETag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ETag {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ETag {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// An object version identifier.
///
/// Buckets that have never had versioning enabled carry their single
/// version under the `null` id; buckets with versioning enabled assign
/// opaque ids that order newest-first lexicographically. Keeping the
/// null case as a variant (rather than the literal string `"null"`)
/// keeps sentinel comparisons out of the ledger and listing code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionId {
    /// The versioning-disabled/suspended sentinel version.
    Null,
    /// A real version id assigned under versioning.
    Id(String),
}

impl VersionId {
    /// The wire form of the null version id.
    pub const NULL_STR: &'static str = "null";

    /// Parses a version id from its wire form.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value == Self::NULL_STR {
            Self::Null
        } else {
            Self::Id(value.to_string())
        }
    }

    /// Returns whether this is the null version id.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl std::fmt::Display for VersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "{}", Self::NULL_STR),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}

/// Bucket versioning mode.
///
/// Mode transitions never rewrite existing versions; they only change how
/// future writes and deletes are id-assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum VersioningMode {
    /// Versioning has never been enabled on this bucket.
    #[default]
    Disabled,
    /// New writes get fresh version ids; deletes create delete markers.
    Enabled,
    /// New writes and delete markers use the null version id.
    Suspended,
}

impl VersioningMode {
    /// Returns the S3 status string, or `None` for a never-versioned bucket.
    #[must_use]
    pub const fn as_status_str(&self) -> Option<&'static str> {
        match self {
            Self::Disabled => None,
            Self::Enabled => Some("Enabled"),
            Self::Suspended => Some("Suspended"),
        }
    }
}

/// Server-side encryption descriptor for a stored object version.
///
/// Never carries raw key material; SSE-C keeps only the base64 MD5
/// fingerprint of the customer key for verification on reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SseDescriptor {
    /// Stored as plaintext.
    #[default]
    None,
    /// Encrypted with the engine-managed master key (SSE-S3).
    SseS3,
    /// Encrypted with a customer-provided key (SSE-C).
    SseC {
        /// Base64-encoded MD5 of the customer key.
        key_md5: String,
    },
}

impl SseDescriptor {
    /// Returns whether any encryption applies.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Metadata for a bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketInfo {
    /// Bucket name.
    pub name: String,
    /// When the bucket was created.
    pub created_at: DateTime<Utc>,
    /// Current versioning mode.
    pub versioning: VersioningMode,
}

impl BucketInfo {
    /// Creates a new bucket info with versioning disabled.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), created_at: Utc::now(), versioning: VersioningMode::Disabled }
    }
}

/// Metadata for one stored object version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectVersionInfo {
    /// Object key.
    pub key: String,
    /// Version id.
    pub version_id: VersionId,
    /// Object size in bytes (0 for delete markers).
    pub size: u64,
    /// Object ETag.
    pub etag: ETag,
    /// When the version was created.
    pub last_modified: DateTime<Utc>,
    /// Whether this is the version returned by version-less reads.
    pub is_latest: bool,
    /// Whether this version is a delete marker.
    pub is_delete_marker: bool,
    /// Encryption applied to this version's content.
    pub sse: SseDescriptor,
}

/// Owner information for S3 responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Owner {
    /// Owner ID.
    pub id: String,
    /// Owner display name.
    pub display_name: String,
}

impl Default for Owner {
    fn default() -> Self {
        Self { id: "cask".to_string(), display_name: "Cask".to_string() }
    }
}

/// An in-progress multipart upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipartUploadInfo {
    /// Upload ID.
    pub upload_id: String,
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// When the upload was initiated.
    pub initiated: DateTime<Utc>,
}

/// A committed part in a multipart upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartInfo {
    /// Part number (1-10000).
    pub part_number: u32,
    /// Part ETag.
    pub etag: ETag,
    /// Part size in bytes.
    pub size: u64,
    /// When the part was uploaded.
    pub last_modified: DateTime<Utc>,
}

/// Internal identifier of a sealed content-store entry.
pub type ContentId = Uuid;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_etag_from_md5() {
        let hash: [u8; 16] = [
            0xd4, 0x1d, 0x8c, 0xd9, 0x8f, 0x00, 0xb2, 0x04, 0xe9, 0x80, 0x09, 0x98, 0xec, 0xf8,
            0x42, 0x7e,
        ];
        let etag = ETag::from_md5(&hash);
        assert_eq!(etag.as_str(), "\"d41d8cd98f00b204e9800998ecf8427e\"");
        assert!(!etag.is_multipart());
    }

    #[test]
    fn test_etag_multipart() {
        let hash: [u8; 16] = [0; 16];
        let etag = ETag::from_multipart(&hash, 2);
        assert!(etag.as_str().ends_with("-2\""));
        assert!(etag.is_multipart());
    }

    #[test]
    fn test_etag_matches_ignores_quotes() {
        let etag = ETag::new("\"abc123\"");
        assert!(etag.matches("abc123"));
        assert!(etag.matches("\"abc123\""));
        assert!(!etag.matches("def456"));
    }

    #[test]
    fn test_version_id_parse() {
        assert_eq!(VersionId::parse("null"), VersionId::Null);
        assert_eq!(VersionId::parse("abc"), VersionId::Id("abc".to_string()));
        assert_eq!(VersionId::Null.to_string(), "null");
    }

    #[test]
    fn test_versioning_status_str() {
        assert_eq!(VersioningMode::Disabled.as_status_str(), None);
        assert_eq!(VersioningMode::Enabled.as_status_str(), Some("Enabled"));
        assert_eq!(VersioningMode::Suspended.as_status_str(), Some("Suspended"));
    }
}
