// Copyright 2024 The Cask Authors
// SPDX-License-Identifier: Apache-2.0

//! Bucket registry.
//!
//! Maps bucket names to their live state: versioning mode and the version
//! ledger. The ledger lock is the single-writer queue for a bucket; every
//! object mutation takes it for writing, so a version and its
//! latest-pointer update commit as one step.

use std::sync::Arc;

use cask_core::error::{Error, S3ErrorCode};
use cask_core::types::{BucketInfo, VersioningMode};
use cask_core::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::ledger::VersionLedger;

/// Live state of one bucket.
#[derive(Debug)]
pub struct BucketState {
    /// Bucket name.
    pub name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Versioning mode; transitions never rewrite existing versions.
    pub versioning: RwLock<VersioningMode>,
    /// Key/version index. Write lock = the bucket's mutation queue.
    pub ledger: RwLock<VersionLedger>,
}

impl BucketState {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            created_at: Utc::now(),
            versioning: RwLock::new(VersioningMode::Disabled),
            ledger: RwLock::new(VersionLedger::new()),
        }
    }

    /// Snapshots the bucket's metadata.
    #[must_use]
    pub fn info(&self) -> BucketInfo {
        BucketInfo {
            name: self.name.clone(),
            created_at: self.created_at,
            versioning: *self.versioning.read(),
        }
    }
}

/// Bucket name and lifecycle management.
pub struct Registry {
    buckets: DashMap<String, Arc<BucketState>>,
    // Serializes creates so the bucket cap cannot be raced past.
    create_lock: Mutex<()>,
    max_buckets: usize,
}

impl Registry {
    /// Creates an empty registry with the given bucket cap.
    #[must_use]
    pub fn new(max_buckets: usize) -> Self {
        Self { buckets: DashMap::new(), create_lock: Mutex::new(()), max_buckets }
    }

    /// Creates a bucket.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a malformed name, `BucketAlreadyExists` for
    /// a taken name, `TooManyBuckets` at the cap.
    pub fn create(&self, name: &str) -> Result<BucketInfo> {
        validate_bucket_name(name)?;

        let _guard = self.create_lock.lock();
        if self.buckets.contains_key(name) {
            return Err(Error::s3_with_resource(
                S3ErrorCode::BucketAlreadyExists,
                "The requested bucket name is not available",
                name,
            ));
        }
        if self.buckets.len() >= self.max_buckets {
            return Err(Error::s3(
                S3ErrorCode::TooManyBuckets,
                "You have attempted to create more buckets than allowed",
            ));
        }
        let state = Arc::new(BucketState::new(name));
        let bucket_info = state.info();
        self.buckets.insert(name.to_string(), state);
        info!(bucket = name, "bucket created");
        Ok(bucket_info)
    }

    /// Deletes a bucket with no versions and no delete markers.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket` if absent, `BucketNotEmpty` if anything remains in
    /// its ledger.
    pub fn delete(&self, name: &str) -> Result<()> {
        let removed = self.buckets.remove_if(name, |_, state| state.ledger.read().is_empty());
        match removed {
            Some(_) => {
                info!(bucket = name, "bucket deleted");
                Ok(())
            }
            None if self.buckets.contains_key(name) => Err(Error::s3_with_resource(
                S3ErrorCode::BucketNotEmpty,
                "The bucket you tried to delete is not empty",
                name,
            )),
            None => Err(no_such_bucket(name)),
        }
    }

    /// Returns a bucket's live state.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket` if absent.
    pub fn get(&self, name: &str) -> Result<Arc<BucketState>> {
        self.buckets.get(name).map(|e| Arc::clone(e.value())).ok_or_else(|| no_such_bucket(name))
    }

    /// Lists all buckets in name order.
    #[must_use]
    pub fn list(&self) -> Vec<BucketInfo> {
        let mut buckets: Vec<_> = self.buckets.iter().map(|e| e.value().info()).collect();
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        buckets
    }

    /// Sets a bucket's versioning mode.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket` if absent; `InvalidArgument` for `Disabled`, which
    /// is an initial state and never a transition target.
    pub fn set_versioning(&self, name: &str, mode: VersioningMode) -> Result<()> {
        if mode == VersioningMode::Disabled {
            return Err(Error::s3(
                S3ErrorCode::InvalidArgument,
                "Versioning cannot be set back to disabled",
            ));
        }
        let state = self.get(name)?;
        *state.versioning.write() = mode;
        info!(bucket = name, ?mode, "bucket versioning changed");
        Ok(())
    }
}

fn no_such_bucket(name: &str) -> Error {
    Error::s3_with_resource(S3ErrorCode::NoSuchBucket, "The specified bucket does not exist", name)
}

/// Validates a bucket name against the S3 naming rules the engine
/// enforces: 3-63 characters of lowercase letters, digits, hyphens, and
/// dots, starting and ending with a letter or digit.
fn validate_bucket_name(name: &str) -> Result<()> {
    let invalid = || {
        Error::s3_with_resource(S3ErrorCode::InvalidArgument, "Invalid bucket name", name)
    };
    if name.len() < 3 || name.len() > 63 {
        return Err(invalid());
    }
    if !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.') {
        return Err(invalid());
    }
    let first = name.as_bytes()[0];
    let last = name.as_bytes()[name.len() - 1];
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return Err(invalid());
    }
    Ok(())
}
