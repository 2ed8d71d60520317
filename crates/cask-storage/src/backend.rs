// Copyright 2024 The Cask Authors
// SPDX-License-Identifier: Apache-2.0

//! Storage backend trait and its request/response types.
//!
//! The trait is the seam between protocol frontends and the engine. All
//! methods take plaintext and return plaintext; encryption is a backend
//! concern driven by [`SseRequest`].

use bytes::Bytes;
use cask_core::types::{
    BucketInfo, ETag, MultipartUploadInfo, ObjectVersionInfo, PartInfo, VersionId, VersioningMode,
};
use cask_core::Result;

use crate::crypto::SseCKey;

/// An inclusive byte range, as in an HTTP `Range: bytes=start-end` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset.
    pub start: u64,
    /// Last byte offset, inclusive. Clamped to the object's last byte.
    pub end: u64,
}

/// Encryption requested for a write.
#[derive(Debug, Default)]
pub enum SseRequest {
    /// Store as plaintext.
    #[default]
    None,
    /// Encrypt under the engine-managed master key.
    SseS3,
    /// Encrypt under this customer-provided key.
    SseC(SseCKey),
}

/// A part reference in a complete-multipart request.
#[derive(Debug, Clone)]
pub struct CompletedPart {
    /// Part number as uploaded.
    pub part_number: u32,
    /// ETag the caller observed for the part.
    pub etag: ETag,
}

/// Outcome of a put, copy, or completed multipart upload.
#[derive(Debug, Clone)]
pub struct PutObjectResult {
    /// ETag of the stored version.
    pub etag: ETag,
    /// Version id of the stored version.
    ///
    /// `None` when the bucket has never been versioned, `Null` under
    /// suspended versioning, a real id under enabled versioning.
    pub version_id: Option<VersionId>,
    /// Encryption applied to the stored version.
    pub sse: cask_core::types::SseDescriptor,
}

/// Outcome of a get.
#[derive(Debug, Clone)]
pub struct GetObjectResult {
    /// Object bytes, range-sliced if a range was given.
    pub data: Bytes,
    /// Metadata of the resolved version. `size` is always the full
    /// object size, not the slice length.
    pub info: ObjectVersionInfo,
}

/// Outcome of a delete.
#[derive(Debug, Clone)]
pub struct DeleteObjectResult {
    /// Whether the delete created (or targeted) a delete marker.
    pub delete_marker: bool,
    /// Version id of the created delete marker or removed version.
    pub version_id: Option<VersionId>,
}

/// Parameters for a latest-version listing.
#[derive(Debug, Clone, Default)]
pub struct ListObjectsParams {
    /// Only keys starting with this prefix.
    pub prefix: Option<String>,
    /// Delimiter for rolling up key groups into common prefixes.
    pub delimiter: Option<String>,
    /// Exclusive resume point from a previous page.
    pub marker: Option<String>,
    /// Page size; the engine default applies when `None`.
    pub max_keys: Option<u32>,
}

/// Parameters for a version listing.
#[derive(Debug, Clone, Default)]
pub struct ListVersionsParams {
    /// Only keys starting with this prefix.
    pub prefix: Option<String>,
    /// Delimiter for rolling up key groups into common prefixes.
    pub delimiter: Option<String>,
    /// Key half of the exclusive resume point.
    pub key_marker: Option<String>,
    /// Version half of the resume point; resumes within `key_marker`.
    pub version_id_marker: Option<VersionId>,
    /// Page size; the engine default applies when `None`.
    pub max_keys: Option<u32>,
}

/// One page of a latest-version listing.
#[derive(Debug, Clone, Default)]
pub struct ListObjectsResult {
    /// Matching objects in key order.
    pub objects: Vec<ObjectVersionInfo>,
    /// Rolled-up key groups, each counted as one unit toward the page.
    pub common_prefixes: Vec<String>,
    /// Whether more results remain past this page.
    pub is_truncated: bool,
    /// Marker to pass back for the next page; set only when truncated.
    pub next_marker: Option<String>,
}

/// One page of a version listing.
#[derive(Debug, Clone, Default)]
pub struct ListVersionsResult {
    /// Matching versions and delete markers, key order then newest first.
    pub versions: Vec<ObjectVersionInfo>,
    /// Rolled-up key groups.
    pub common_prefixes: Vec<String>,
    /// Whether more results remain past this page.
    pub is_truncated: bool,
    /// Key half of the next-page resume point; set only when truncated.
    pub next_key_marker: Option<String>,
    /// Version half of the next-page resume point.
    pub next_version_id_marker: Option<VersionId>,
}

/// Parameters for listing the parts of an open upload.
#[derive(Debug, Clone, Default)]
pub struct ListPartsParams {
    /// Exclusive part-number resume point.
    pub part_number_marker: Option<u32>,
    /// Page size; the engine's `max_parts` applies when `None`.
    pub max_parts: Option<u32>,
}

/// One page of an upload's committed parts.
#[derive(Debug, Clone, Default)]
pub struct ListPartsResult {
    /// Parts in ascending part-number order.
    pub parts: Vec<PartInfo>,
    /// Whether more parts remain past this page.
    pub is_truncated: bool,
    /// Resume point for the next page; set only when truncated.
    pub next_part_number_marker: Option<u32>,
}

/// Versioned object storage.
///
/// Writes to a single key are serialized by the implementation; a read
/// never observes a version without its metadata or vice versa.
#[allow(async_fn_in_trait)]
pub trait StorageBackend {
    /// Creates a bucket.
    async fn create_bucket(&self, bucket: &str) -> Result<BucketInfo>;

    /// Deletes an empty bucket.
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;

    /// Returns bucket metadata.
    async fn head_bucket(&self, bucket: &str) -> Result<BucketInfo>;

    /// Lists all buckets in name order.
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>>;

    /// Returns the bucket's versioning mode.
    async fn get_bucket_versioning(&self, bucket: &str) -> Result<VersioningMode>;

    /// Sets the bucket's versioning mode to `Enabled` or `Suspended`.
    async fn set_bucket_versioning(&self, bucket: &str, mode: VersioningMode) -> Result<()>;

    /// Stores an object, creating a new version per the bucket's mode.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        sse: SseRequest,
    ) -> Result<PutObjectResult>;

    /// Reads an object or a specific version of it.
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&VersionId>,
        range: Option<ByteRange>,
        sse_c_key: Option<&SseCKey>,
    ) -> Result<GetObjectResult>;

    /// Reads object metadata without the body.
    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&VersionId>,
        sse_c_key: Option<&SseCKey>,
    ) -> Result<ObjectVersionInfo>;

    /// Deletes an object (version-less) or one specific version.
    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&VersionId>,
    ) -> Result<DeleteObjectResult>;

    /// Copies an object, re-encrypting when the destination asks for
    /// different encryption.
    #[allow(clippy::too_many_arguments)]
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        src_version_id: Option<&VersionId>,
        src_sse_c_key: Option<&SseCKey>,
        dst_bucket: &str,
        dst_key: &str,
        sse: SseRequest,
    ) -> Result<PutObjectResult>;

    /// Lists latest versions under a prefix.
    async fn list_objects(&self, bucket: &str, params: ListObjectsParams)
        -> Result<ListObjectsResult>;

    /// Lists all versions and delete markers under a prefix.
    async fn list_object_versions(
        &self,
        bucket: &str,
        params: ListVersionsParams,
    ) -> Result<ListVersionsResult>;

    /// Starts a multipart upload.
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        sse: SseRequest,
    ) -> Result<MultipartUploadInfo>;

    /// Uploads one part, replacing any earlier part with the same number.
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<ETag>;

    /// Uploads one part by copying from an existing object.
    #[allow(clippy::too_many_arguments)]
    async fn upload_part_copy(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        src_bucket: &str,
        src_key: &str,
        src_version_id: Option<&VersionId>,
        src_range: Option<ByteRange>,
        src_sse_c_key: Option<&SseCKey>,
    ) -> Result<ETag>;

    /// Assembles the named parts into one object version.
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
        sse_c_key: Option<&SseCKey>,
    ) -> Result<PutObjectResult>;

    /// Aborts an upload and discards its parts.
    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str)
        -> Result<()>;

    /// Lists the committed parts of an open upload.
    async fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        params: ListPartsParams,
    ) -> Result<ListPartsResult>;

    /// Lists open multipart uploads in a bucket.
    async fn list_multipart_uploads(&self, bucket: &str) -> Result<Vec<MultipartUploadInfo>>;
}
