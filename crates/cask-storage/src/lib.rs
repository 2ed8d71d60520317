// Copyright 2024 The Cask Authors
// SPDX-License-Identifier: Apache-2.0

//! Versioned object-storage engine for Cask.
//!
//! This crate provides:
//! - A reference-counted in-memory content store
//! - The per-bucket version ledger (the versioning state machine)
//! - Multipart upload tracking and assembly
//! - Delimiter/prefix listing with S3 pagination semantics
//! - Server-side encryption providers (SSE-S3, SSE-C)

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod content;
pub mod crypto;
pub mod engine;
pub mod ledger;
pub mod listing;
pub mod multipart;
pub mod registry;

pub use backend::{
    ByteRange, CompletedPart, DeleteObjectResult, GetObjectResult, ListObjectsParams,
    ListObjectsResult, ListPartsParams, ListPartsResult, ListVersionsParams, ListVersionsResult,
    PutObjectResult, SseRequest, StorageBackend,
};
pub use content::ContentStore;
pub use crypto::SseCKey;
pub use engine::StorageEngine;
