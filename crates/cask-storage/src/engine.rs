// Copyright 2024 The Cask Authors
// SPDX-License-Identifier: Apache-2.0

//! The storage engine.
//!
//! Ties the registry, content store, version ledger, multipart manager,
//! and encryption providers together behind [`StorageBackend`]. Byte
//! work (hashing, encryption, assembly) happens outside the bucket
//! ledger lock; only the metadata commit runs under it.

use bytes::Bytes;
use cask_core::config::EngineConfig;
use cask_core::error::{Error, S3ErrorCode};
use cask_core::types::{
    BucketInfo, ContentId, ETag, MultipartUploadInfo, ObjectVersionInfo, SseDescriptor, VersionId,
    VersioningMode,
};
use cask_core::Result;
use chrono::Utc;
use md5::{Digest, Md5};
use tracing::debug;
use uuid::Uuid;

use crate::backend::{
    ByteRange, CompletedPart, DeleteObjectResult, GetObjectResult, ListObjectsParams,
    ListObjectsResult, ListPartsParams, ListPartsResult, ListVersionsParams, ListVersionsResult,
    PutObjectResult, SseRequest, StorageBackend,
};
use crate::content::{slice_range, ContentStore};
use crate::crypto::{CryptoError, SseCKey, SseCProvider, SseS3Provider};
use crate::ledger::{VersionLedger, VersionRecord, VersionSequencer};
use crate::listing;
use crate::multipart::{CompletedUpload, MultipartManager, StoredPart};
use crate::registry::{BucketState, Registry};

/// In-memory versioned object storage engine.
pub struct StorageEngine {
    config: EngineConfig,
    registry: Registry,
    content: ContentStore,
    multipart: MultipartManager,
    sse_s3: SseS3Provider,
    sequencer: VersionSequencer,
}

impl StorageEngine {
    /// Creates an engine from a validated configuration.
    ///
    /// Without a configured master key, SSE-S3 runs on an ephemeral
    /// random key that dies with the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let sse_s3 = match &config.sse_master_key_hex {
            Some(hex_key) => {
                SseS3Provider::from_hex(hex_key).map_err(|e| Error::Crypto(e.to_string()))?
            }
            None => SseS3Provider::ephemeral(),
        };
        Ok(Self {
            registry: Registry::new(config.max_buckets),
            content: ContentStore::new(),
            multipart: MultipartManager::new(),
            sse_s3,
            sequencer: VersionSequencer::new(),
            config,
        })
    }

    /// Number of live content entries (testing/introspection).
    #[must_use]
    pub fn content_entries(&self) -> usize {
        self.content.len()
    }

    /// Encrypts (or passes through) a write body per the request.
    fn seal_for_request(
        &self,
        content_id: ContentId,
        data: &Bytes,
        sse: &SseRequest,
    ) -> Result<(Bytes, SseDescriptor, Option<Vec<u8>>)> {
        match sse {
            SseRequest::None => Ok((data.clone(), SseDescriptor::None, None)),
            SseRequest::SseS3 => {
                let (sealed, nonce) =
                    self.sse_s3.encrypt(content_id, data).map_err(crypto_err)?;
                Ok((sealed, SseDescriptor::SseS3, Some(nonce)))
            }
            SseRequest::SseC(key) => {
                let (sealed, nonce) = SseCProvider::new(key).encrypt(data).map_err(crypto_err)?;
                Ok((sealed, SseDescriptor::SseC { key_md5: key.fingerprint() }, Some(nonce)))
            }
        }
    }

    /// Fetches and decrypts a version's bytes.
    ///
    /// SSE-C authorization must have been checked already; this still
    /// fails closed if the key is absent or wrong.
    fn open_content(&self, record: &VersionRecord, sse_c_key: Option<&SseCKey>) -> Result<Bytes> {
        let content_id = record.content.ok_or_else(content_gone)?;
        let sealed = self.content.get(content_id).ok_or_else(content_gone)?;
        match &record.sse {
            SseDescriptor::None => Ok(sealed),
            SseDescriptor::SseS3 => {
                let nonce = record.nonce.as_deref().ok_or_else(content_gone)?;
                self.sse_s3.decrypt(content_id, &sealed, nonce).map_err(crypto_err)
            }
            SseDescriptor::SseC { .. } => {
                let key = sse_c_key.ok_or_else(sse_c_denied)?;
                let nonce = record.nonce.as_deref().ok_or_else(content_gone)?;
                SseCProvider::new(key).decrypt(&sealed, nonce).map_err(crypto_err)
            }
        }
    }

    /// Commits one written version under the bucket's current mode and
    /// releases whatever the write displaced.
    fn commit_version(
        &self,
        state: &BucketState,
        key: &str,
        content_id: ContentId,
        size: u64,
        etag: ETag,
        sse: SseDescriptor,
        nonce: Option<Vec<u8>>,
    ) -> PutObjectResult {
        let seq = self.sequencer.next_seq();
        let mode = *state.versioning.read();
        let version_id = match mode {
            VersioningMode::Enabled => VersionSequencer::id_for(seq),
            VersioningMode::Disabled | VersioningMode::Suspended => VersionId::Null,
        };
        let record = VersionRecord {
            version_id: version_id.clone(),
            seq,
            content: Some(content_id),
            size,
            etag: etag.clone(),
            last_modified: Utc::now(),
            is_delete_marker: false,
            sse: sse.clone(),
            nonce,
        };
        let released = state.ledger.write().commit_put(key, record, mode);
        for id in released {
            self.content.release(id);
        }
        let reported = match mode {
            VersioningMode::Disabled => None,
            VersioningMode::Enabled | VersioningMode::Suspended => Some(version_id),
        };
        PutObjectResult { etag, version_id: reported, sse }
    }

    /// Concatenates a completed upload's parts, seals the result, and
    /// commits it as one version.
    ///
    /// Does not release the part content entries; the caller drops them
    /// whether this succeeds or fails.
    fn assemble_and_commit(
        &self,
        state: &BucketState,
        key: &str,
        done: &CompletedUpload,
        sse_c_key: Option<&SseCKey>,
    ) -> Result<PutObjectResult> {
        let mut assembled = Vec::new();
        for part in &done.selected {
            let bytes = self.content.get(part.content).ok_or_else(content_gone)?;
            assembled.extend_from_slice(&bytes);
        }
        let data = Bytes::from(assembled);
        let size = data.len() as u64;

        let content_id = Uuid::new_v4();
        let (sealed, descriptor, nonce) = match &done.sse {
            SseDescriptor::None => (data, SseDescriptor::None, None),
            SseDescriptor::SseS3 => {
                let (sealed, nonce) =
                    self.sse_s3.encrypt(content_id, &data).map_err(crypto_err)?;
                (sealed, SseDescriptor::SseS3, Some(nonce))
            }
            SseDescriptor::SseC { .. } => {
                let sse_c = sse_c_key.ok_or_else(sse_c_denied)?;
                let (sealed, nonce) =
                    SseCProvider::new(sse_c).encrypt(&data).map_err(crypto_err)?;
                (sealed, done.sse.clone(), Some(nonce))
            }
        };
        self.content.insert_with_id(content_id, sealed);

        Ok(self.commit_version(state, key, content_id, size, done.etag.clone(), descriptor, nonce))
    }
}

impl StorageBackend for StorageEngine {
    async fn create_bucket(&self, bucket: &str) -> Result<BucketInfo> {
        self.registry.create(bucket)
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        // Open uploads hold bucket contents the ledger cannot see.
        self.registry.get(bucket)?;
        if self.multipart.bucket_has_uploads(bucket) {
            return Err(Error::s3_with_resource(
                S3ErrorCode::BucketNotEmpty,
                "The bucket has in-progress multipart uploads",
                bucket,
            ));
        }
        self.registry.delete(bucket)
    }

    async fn head_bucket(&self, bucket: &str) -> Result<BucketInfo> {
        Ok(self.registry.get(bucket)?.info())
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        Ok(self.registry.list())
    }

    async fn get_bucket_versioning(&self, bucket: &str) -> Result<VersioningMode> {
        Ok(*self.registry.get(bucket)?.versioning.read())
    }

    async fn set_bucket_versioning(&self, bucket: &str, mode: VersioningMode) -> Result<()> {
        self.registry.set_versioning(bucket, mode)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        sse: SseRequest,
    ) -> Result<PutObjectResult> {
        let state = self.registry.get(bucket)?;

        let md5: [u8; 16] = Md5::digest(&data).into();
        let etag = ETag::from_md5(&md5);
        let size = data.len() as u64;
        let content_id = Uuid::new_v4();
        let (sealed, descriptor, nonce) = self.seal_for_request(content_id, &data, &sse)?;
        self.content.insert_with_id(content_id, sealed);

        debug!(bucket, key, size, sse = ?descriptor, "put object");
        Ok(self.commit_version(&state, key, content_id, size, etag, descriptor, nonce))
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&VersionId>,
        range: Option<ByteRange>,
        sse_c_key: Option<&SseCKey>,
    ) -> Result<GetObjectResult> {
        let state = self.registry.get(bucket)?;
        let (record, is_latest) = {
            let ledger = state.ledger.read();
            resolve(&ledger, key, version_id)?
        };
        authorize_sse_c(&record.sse, sse_c_key)?;

        let plaintext = self.open_content(&record, sse_c_key)?;
        let data = match range {
            Some(range) => slice_range(&plaintext, range.start, range.end)?,
            None => plaintext,
        };
        Ok(GetObjectResult { data, info: record.to_info(key, is_latest) })
    }

    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&VersionId>,
        sse_c_key: Option<&SseCKey>,
    ) -> Result<ObjectVersionInfo> {
        let state = self.registry.get(bucket)?;
        let (record, is_latest) = {
            let ledger = state.ledger.read();
            resolve(&ledger, key, version_id)?
        };
        authorize_sse_c(&record.sse, sse_c_key)?;
        Ok(record.to_info(key, is_latest))
    }

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&VersionId>,
    ) -> Result<DeleteObjectResult> {
        let state = self.registry.get(bucket)?;

        if let Some(version_id) = version_id {
            // Targeted removal; deleting an absent version is a no-op.
            let (was_marker, released) = {
                let mut ledger = state.ledger.write();
                let was_marker = ledger.version(key, version_id).map(|r| r.is_delete_marker);
                let released = match was_marker {
                    Some(_) => ledger.remove_version(key, version_id),
                    None => Vec::new(),
                };
                (was_marker, released)
            };
            for id in released {
                self.content.release(id);
            }
            debug!(bucket, key, %version_id, "delete version");
            return Ok(DeleteObjectResult {
                delete_marker: was_marker.unwrap_or(false),
                version_id: Some(version_id.clone()),
            });
        }

        let seq = self.sequencer.next_seq();
        let mode = *state.versioning.read();
        let marker_id = match mode {
            VersioningMode::Enabled => VersionSequencer::id_for(seq),
            VersioningMode::Disabled | VersioningMode::Suspended => VersionId::Null,
        };
        let marker = VersionRecord {
            version_id: marker_id,
            seq,
            content: None,
            size: 0,
            etag: ETag::new("\"\""),
            last_modified: Utc::now(),
            is_delete_marker: true,
            sse: SseDescriptor::None,
            nonce: None,
        };
        let outcome = state.ledger.write().commit_delete(key, mode, marker);
        for id in outcome.released {
            self.content.release(id);
        }
        debug!(bucket, key, delete_marker = outcome.delete_marker, "delete object");
        Ok(DeleteObjectResult { delete_marker: outcome.delete_marker, version_id: outcome.version_id })
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        src_version_id: Option<&VersionId>,
        src_sse_c_key: Option<&SseCKey>,
        dst_bucket: &str,
        dst_key: &str,
        sse: SseRequest,
    ) -> Result<PutObjectResult> {
        let src_state = self.registry.get(src_bucket)?;
        let (src_record, _) = {
            let ledger = src_state.ledger.read();
            resolve(&ledger, src_key, src_version_id)?
        };
        authorize_sse_c(&src_record.sse, src_sse_c_key)?;
        let dst_state = self.registry.get(dst_bucket)?;

        let result = if matches!(sse, SseRequest::None) {
            // No new encryption asked for: the destination shares the
            // sealed bytes and inherits the source's encryption.
            let content_id = src_record.content.ok_or_else(content_gone)?;
            if !self.content.retain(content_id) {
                return Err(content_gone());
            }
            self.commit_version(
                &dst_state,
                dst_key,
                content_id,
                src_record.size,
                src_record.etag.clone(),
                src_record.sse.clone(),
                src_record.nonce.clone(),
            )
        } else {
            let plaintext = self.open_content(&src_record, src_sse_c_key)?;
            let md5: [u8; 16] = Md5::digest(&plaintext).into();
            let content_id = Uuid::new_v4();
            let (sealed, descriptor, nonce) = self.seal_for_request(content_id, &plaintext, &sse)?;
            self.content.insert_with_id(content_id, sealed);
            self.commit_version(
                &dst_state,
                dst_key,
                content_id,
                plaintext.len() as u64,
                ETag::from_md5(&md5),
                descriptor,
                nonce,
            )
        };
        debug!(src_bucket, src_key, dst_bucket, dst_key, "copy object");
        Ok(result)
    }

    async fn list_objects(
        &self,
        bucket: &str,
        params: ListObjectsParams,
    ) -> Result<ListObjectsResult> {
        let state = self.registry.get(bucket)?;
        let ledger = state.ledger.read();
        Ok(listing::list_objects(&ledger, &params, self.config.default_max_keys))
    }

    async fn list_object_versions(
        &self,
        bucket: &str,
        params: ListVersionsParams,
    ) -> Result<ListVersionsResult> {
        let state = self.registry.get(bucket)?;
        let ledger = state.ledger.read();
        Ok(listing::list_versions(&ledger, &params, self.config.default_max_keys))
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        sse: SseRequest,
    ) -> Result<MultipartUploadInfo> {
        self.registry.get(bucket)?;
        // Only the descriptor is recorded; an SSE-C key is never kept.
        let descriptor = match &sse {
            SseRequest::None => SseDescriptor::None,
            SseRequest::SseS3 => SseDescriptor::SseS3,
            SseRequest::SseC(key) => SseDescriptor::SseC { key_md5: key.fingerprint() },
        };
        Ok(self.multipart.create(bucket, key, descriptor))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<ETag> {
        self.registry.get(bucket)?;
        let part = StoredPart {
            content: self.content.insert(data.clone()),
            md5: Md5::digest(&data).into(),
            size: data.len() as u64,
            last_modified: Utc::now(),
        };
        let content_id = part.content;
        match self.multipart.put_part(bucket, key, upload_id, part_number, part, self.config.max_parts)
        {
            Ok((etag, replaced)) => {
                if let Some(old) = replaced {
                    self.content.release(old);
                }
                Ok(etag)
            }
            Err(err) => {
                self.content.release(content_id);
                Err(err)
            }
        }
    }

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
    ) -> Result<ETag> {
        let src_state = self.registry.get(src_bucket)?;
        let (src_record, _) = {
            let ledger = src_state.ledger.read();
            resolve(&ledger, src_key, src_version_id)?
        };
        authorize_sse_c(&src_record.sse, src_sse_c_key)?;

        let plaintext = self.open_content(&src_record, src_sse_c_key)?;
        let data = match src_range {
            Some(range) => slice_range(&plaintext, range.start, range.end)?,
            None => plaintext,
        };
        self.upload_part(bucket, key, upload_id, part_number, data).await
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
        sse_c_key: Option<&SseCKey>,
    ) -> Result<PutObjectResult> {
        let state = self.registry.get(bucket)?;

        // Verify the SSE-C key before touching the upload, so a key
        // mismatch leaves it open.
        let descriptor = self.multipart.sse_of(bucket, key, upload_id)?;
        authorize_sse_c(&descriptor, sse_c_key)?;

        let done =
            self.multipart.complete(bucket, key, upload_id, parts, self.config.min_part_size)?;

        // The part entries are dropped whether assembly succeeds or not;
        // a failure past this point must not strand their bytes.
        let outcome = self.assemble_and_commit(&state, key, &done, sse_c_key);
        for part in &done.selected {
            self.content.release(part.content);
        }
        for id in &done.leftover {
            self.content.release(*id);
        }
        let result = outcome?;
        debug!(bucket, key, upload_id, "multipart assembled");
        Ok(result)
    }

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        self.registry.get(bucket)?;
        for id in self.multipart.abort(bucket, key, upload_id)? {
            self.content.release(id);
        }
        Ok(())
    }

    async fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        params: ListPartsParams,
    ) -> Result<ListPartsResult> {
        self.registry.get(bucket)?;
        self.multipart.list_parts(bucket, key, upload_id, &params, self.config.max_parts)
    }

    async fn list_multipart_uploads(&self, bucket: &str) -> Result<Vec<MultipartUploadInfo>> {
        self.registry.get(bucket)?;
        Ok(self.multipart.list_uploads(bucket))
    }
}

/// Resolves a key (and optional version) to a readable record.
///
/// A version-less read of a delete-marker latest, or of an absent key,
/// is `NoSuchKey`. A read of an explicit absent version is
/// `NoSuchVersion`; an explicit delete marker is not readable either.
fn resolve(
    ledger: &VersionLedger,
    key: &str,
    version_id: Option<&VersionId>,
) -> Result<(VersionRecord, bool)> {
    match version_id {
        None => {
            let record = ledger.latest(key).ok_or_else(|| no_such_key(key))?;
            if record.is_delete_marker {
                return Err(no_such_key(key));
            }
            Ok((record.clone(), true))
        }
        Some(version_id) => {
            let record = ledger.version(key, version_id).ok_or_else(|| no_such_version(key))?;
            if record.is_delete_marker {
                return Err(no_such_key(key));
            }
            let is_latest =
                ledger.latest(key).is_some_and(|latest| latest.version_id == record.version_id);
            Ok((record.clone(), is_latest))
        }
    }
}

/// Rejects reads of SSE-C data without the exact key it was sealed with.
fn authorize_sse_c(sse: &SseDescriptor, provided: Option<&SseCKey>) -> Result<()> {
    if let SseDescriptor::SseC { key_md5 } = sse {
        match provided {
            Some(key) if key.fingerprint() == *key_md5 => Ok(()),
            _ => Err(sse_c_denied()),
        }
    } else {
        Ok(())
    }
}

fn crypto_err(err: CryptoError) -> Error {
    match err {
        CryptoError::WrongKey => sse_c_denied(),
        other => Error::Crypto(other.to_string()),
    }
}

fn sse_c_denied() -> Error {
    Error::s3(
        S3ErrorCode::AccessDenied,
        "The object was stored with a customer-provided key; the matching key is required",
    )
}

fn content_gone() -> Error {
    Error::s3(S3ErrorCode::InternalError, "Stored content is missing")
}

fn no_such_key(key: &str) -> Error {
    Error::s3_with_resource(S3ErrorCode::NoSuchKey, "The specified key does not exist", key)
}

fn no_such_version(key: &str) -> Error {
    Error::s3_with_resource(S3ErrorCode::NoSuchVersion, "The specified version does not exist", key)
}
