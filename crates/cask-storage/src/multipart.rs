// Copyright 2024 The Cask Authors
// SPDX-License-Identifier: Apache-2.0

//! Multipart upload tracking.
//!
//! The manager owns upload records only; part bytes live in the content
//! store as plaintext and are referenced here by content id. An upload
//! leaves the map on completion or abort, so any later operation on its
//! id fails with `NoSuchUpload` regardless of how it ended.

use std::collections::BTreeMap;

use cask_core::error::{Error, S3ErrorCode};
use cask_core::types::{ContentId, ETag, MultipartUploadInfo, PartInfo, SseDescriptor};
use cask_core::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use md5::{Digest, Md5};
use tracing::debug;
use uuid::Uuid;

use crate::backend::{CompletedPart, ListPartsParams, ListPartsResult};

/// One committed part of an open upload.
#[derive(Debug, Clone)]
pub struct StoredPart {
    /// Plaintext bytes in the content store.
    pub content: ContentId,
    /// MD5 digest of the part body.
    pub md5: [u8; 16],
    /// Part size in bytes.
    pub size: u64,
    /// When the part was last written.
    pub last_modified: DateTime<Utc>,
}

impl StoredPart {
    fn etag(&self) -> ETag {
        ETag::from_md5(&self.md5)
    }

    fn to_info(&self, part_number: u32) -> PartInfo {
        PartInfo {
            part_number,
            etag: self.etag(),
            size: self.size,
            last_modified: self.last_modified,
        }
    }
}

struct Upload {
    info: MultipartUploadInfo,
    sse: SseDescriptor,
    parts: BTreeMap<u32, StoredPart>,
}

/// Result of a successful completion.
///
/// The caller assembles `selected` in order and releases every content
/// id in both lists once the assembled object is stored.
#[derive(Debug)]
pub struct CompletedUpload {
    /// The named parts, in request order.
    pub selected: Vec<StoredPart>,
    /// Uploaded parts the request did not name; discarded.
    pub leftover: Vec<ContentId>,
    /// Hash-of-hashes ETag for the assembled object.
    pub etag: ETag,
    /// Encryption recorded when the upload was created.
    pub sse: SseDescriptor,
}

/// Tracks open multipart uploads across all buckets.
#[derive(Default)]
pub struct MultipartManager {
    uploads: DashMap<String, Upload>,
}

impl MultipartManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new upload and returns its metadata.
    pub fn create(&self, bucket: &str, key: &str, sse: SseDescriptor) -> MultipartUploadInfo {
        let info = MultipartUploadInfo {
            upload_id: Uuid::new_v4().simple().to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            initiated: Utc::now(),
        };
        debug!(bucket, key, upload_id = %info.upload_id, "multipart create");
        self.uploads
            .insert(info.upload_id.clone(), Upload { info: info.clone(), sse, parts: BTreeMap::new() });
        info
    }

    /// Commits one part, replacing any earlier part with the same number.
    ///
    /// Returns the part's ETag and, when a part was replaced, the content
    /// id its reference was dropped from.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a part number outside `1..=max_parts`,
    /// `NoSuchUpload` if the upload is not open under this bucket/key.
    pub fn put_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        part: StoredPart,
        max_parts: u32,
    ) -> Result<(ETag, Option<ContentId>)> {
        if part_number == 0 || part_number > max_parts {
            return Err(Error::s3(
                S3ErrorCode::InvalidArgument,
                format!("Part number must be an integer between 1 and {max_parts}"),
            ));
        }
        let mut upload = self.open_upload_mut(bucket, key, upload_id)?;
        let etag = part.etag();
        let replaced = upload.parts.insert(part_number, part).map(|old| old.content);
        Ok((etag, replaced))
    }

    /// Returns the encryption recorded for an open upload.
    ///
    /// # Errors
    ///
    /// `NoSuchUpload` if the upload is not open under this bucket/key.
    pub fn sse_of(&self, bucket: &str, key: &str, upload_id: &str) -> Result<SseDescriptor> {
        let upload = self.open_upload(bucket, key, upload_id)?;
        Ok(upload.sse.clone())
    }

    /// Lists committed parts in ascending part-number order, one page.
    ///
    /// # Errors
    ///
    /// `NoSuchUpload` if the upload is not open under this bucket/key.
    pub fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        params: &ListPartsParams,
        default_max_parts: u32,
    ) -> Result<ListPartsResult> {
        let upload = self.open_upload(bucket, key, upload_id)?;
        let marker = params.part_number_marker.unwrap_or(0);
        let max_parts = params.max_parts.unwrap_or(default_max_parts) as usize;

        let mut result = ListPartsResult::default();
        for (&number, part) in upload.parts.range(marker.saturating_add(1)..) {
            if result.parts.len() == max_parts {
                result.is_truncated = true;
                result.next_part_number_marker = result.parts.last().map(|p| p.part_number);
                break;
            }
            result.parts.push(part.to_info(number));
        }
        Ok(result)
    }

    /// Lists open uploads in a bucket, ordered by key then upload id.
    #[must_use]
    pub fn list_uploads(&self, bucket: &str) -> Vec<MultipartUploadInfo> {
        let mut uploads: Vec<_> = self
            .uploads
            .iter()
            .filter(|e| e.value().info.bucket == bucket)
            .map(|e| e.value().info.clone())
            .collect();
        uploads.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.upload_id.cmp(&b.upload_id)));
        uploads
    }

    /// Validates the completion request and closes the upload.
    ///
    /// The upload stays open when validation fails, so the caller can
    /// retry with a corrected part list.
    ///
    /// # Errors
    ///
    /// `InvalidPart` for an empty request or an unknown/mismatched part,
    /// `InvalidPartOrder` when part numbers are not strictly increasing,
    /// `EntityTooSmall` when a non-final part is below `min_part_size`,
    /// `NoSuchUpload` if the upload is not open under this bucket/key.
    pub fn complete(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
        min_part_size: u64,
    ) -> Result<CompletedUpload> {
        use dashmap::mapref::entry::Entry;

        // Validation and removal under one entry guard so a concurrent
        // abort cannot slip between them.
        let Entry::Occupied(entry) = self.uploads.entry(upload_id.to_string()) else {
            return Err(no_such_upload(upload_id));
        };
        let upload = entry.get();
        if upload.info.bucket != bucket || upload.info.key != key {
            return Err(no_such_upload(upload_id));
        }

        if parts.is_empty() {
            return Err(Error::s3(
                S3ErrorCode::InvalidPart,
                "You must specify at least one part",
            ));
        }
        for pair in parts.windows(2) {
            if pair[1].part_number <= pair[0].part_number {
                return Err(Error::s3(
                    S3ErrorCode::InvalidPartOrder,
                    "The list of parts was not in ascending order",
                ));
            }
        }

        let mut selected = Vec::with_capacity(parts.len());
        let mut digests = Vec::with_capacity(parts.len() * 16);
        for (idx, named) in parts.iter().enumerate() {
            let Some(stored) = upload.parts.get(&named.part_number) else {
                return Err(Error::s3(
                    S3ErrorCode::InvalidPart,
                    format!("Part number {} was not found", named.part_number),
                ));
            };
            if !stored.etag().matches(named.etag.as_str()) {
                return Err(Error::s3(
                    S3ErrorCode::InvalidPart,
                    format!("Part number {} ETag does not match", named.part_number),
                ));
            }
            let is_last = idx == parts.len() - 1;
            if !is_last && stored.size < min_part_size {
                return Err(Error::s3(
                    S3ErrorCode::EntityTooSmall,
                    format!("Part number {} is smaller than the minimum part size", named.part_number),
                ));
            }
            digests.extend_from_slice(&stored.md5);
            selected.push(stored.clone());
        }

        let (_, mut upload) = entry.remove_entry();
        debug!(bucket, key, upload_id, parts = selected.len(), "multipart complete");

        let named: std::collections::BTreeSet<u32> = parts.iter().map(|p| p.part_number).collect();
        let leftover = std::mem::take(&mut upload.parts)
            .into_iter()
            .filter(|(number, _)| !named.contains(number))
            .map(|(_, part)| part.content)
            .collect();

        let digest: [u8; 16] = Md5::digest(&digests).into();
        Ok(CompletedUpload {
            selected,
            leftover,
            etag: ETag::from_multipart(&digest, parts.len()),
            sse: upload.sse,
        })
    }

    /// Aborts an upload and returns its part contents for release.
    ///
    /// # Errors
    ///
    /// `NoSuchUpload` if the upload is not open under this bucket/key.
    pub fn abort(&self, bucket: &str, key: &str, upload_id: &str) -> Result<Vec<ContentId>> {
        use dashmap::mapref::entry::Entry;

        let Entry::Occupied(entry) = self.uploads.entry(upload_id.to_string()) else {
            return Err(no_such_upload(upload_id));
        };
        if entry.get().info.bucket != bucket || entry.get().info.key != key {
            return Err(no_such_upload(upload_id));
        }
        let (_, upload) = entry.remove_entry();
        debug!(bucket, key, upload_id, "multipart abort");
        Ok(upload.parts.into_values().map(|p| p.content).collect())
    }

    /// Drains every upload in a bucket (bucket teardown).
    pub fn drain_bucket(&self, bucket: &str) -> Vec<ContentId> {
        let ids: Vec<String> = self
            .uploads
            .iter()
            .filter(|e| e.value().info.bucket == bucket)
            .map(|e| e.key().clone())
            .collect();
        let mut released = Vec::new();
        for id in ids {
            if let Some((_, upload)) = self.uploads.remove(&id) {
                released.extend(upload.parts.into_values().map(|p| p.content));
            }
        }
        released
    }

    /// Whether any upload is open in the bucket.
    #[must_use]
    pub fn bucket_has_uploads(&self, bucket: &str) -> bool {
        self.uploads.iter().any(|e| e.value().info.bucket == bucket)
    }

    fn open_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<dashmap::mapref::one::Ref<'_, String, Upload>> {
        match self.uploads.get(upload_id) {
            Some(u) if u.info.bucket == bucket && u.info.key == key => Ok(u),
            _ => Err(no_such_upload(upload_id)),
        }
    }

    fn open_upload_mut(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<dashmap::mapref::one::RefMut<'_, String, Upload>> {
        match self.uploads.get_mut(upload_id) {
            Some(u) if u.info.bucket == bucket && u.info.key == key => Ok(u),
            _ => Err(no_such_upload(upload_id)),
        }
    }
}

fn no_such_upload(upload_id: &str) -> Error {
    Error::s3_with_resource(
        S3ErrorCode::NoSuchUpload,
        "The specified upload does not exist",
        upload_id,
    )
}
