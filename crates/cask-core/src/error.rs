// Copyright 2024 The Cask Authors
// SPDX-License-Identifier: Apache-2.0

//! Error types for Cask with S3-compatible error codes.

use thiserror::Error;

/// A specialized `Result` type for Cask operations.
pub type Result<T> = std::result::Result<T, Error>;

/// S3-compatible error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S3ErrorCode {
    /// Access denied (e.g. wrong SSE-C key supplied for a read).
    AccessDenied,
    /// The specified bucket already exists.
    BucketAlreadyExists,
    /// The bucket you tried to delete is not empty.
    BucketNotEmpty,
    /// You have attempted to create more buckets than allowed.
    TooManyBuckets,
    /// The specified bucket does not exist.
    NoSuchBucket,
    /// The specified key does not exist.
    NoSuchKey,
    /// The specified version does not exist.
    NoSuchVersion,
    /// The specified upload does not exist, or was already completed or aborted.
    NoSuchUpload,
    /// Your proposed upload is smaller than the minimum allowed part size.
    EntityTooSmall,
    /// One or more of the specified parts could not be found or did not match.
    InvalidPart,
    /// The list of parts was not in ascending order.
    InvalidPartOrder,
    /// The specified argument is not valid.
    InvalidArgument,
    /// The requested range is not satisfiable.
    InvalidRange,
    /// At least one of the preconditions you specified did not hold.
    ///
    /// Reserved for conditional writes; no current operation emits it.
    PreconditionFailed,
    /// Internal error.
    InternalError,
}

/// Coarse error taxonomy, for callers that dispatch on failure class
/// rather than on the exact S3 wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A bucket, key, version, or upload is absent.
    NotFound,
    /// The operation conflicts with current state.
    Conflict,
    /// A request argument is malformed or inconsistent.
    InvalidArgument,
    /// A configured resource cap was exceeded.
    LimitExceeded,
    /// A stated precondition did not hold.
    PreconditionFailed,
    /// The caller is not permitted to read this data.
    AccessDenied,
    /// Internal failure.
    Internal,
}

impl S3ErrorCode {
    /// Returns the coarse taxonomy class for this code.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NoSuchBucket | Self::NoSuchKey | Self::NoSuchVersion | Self::NoSuchUpload => {
                ErrorKind::NotFound
            }
            Self::BucketAlreadyExists | Self::BucketNotEmpty => ErrorKind::Conflict,
            Self::EntityTooSmall
            | Self::InvalidPart
            | Self::InvalidPartOrder
            | Self::InvalidArgument
            | Self::InvalidRange => ErrorKind::InvalidArgument,
            Self::TooManyBuckets => ErrorKind::LimitExceeded,
            Self::PreconditionFailed => ErrorKind::PreconditionFailed,
            Self::AccessDenied => ErrorKind::AccessDenied,
            Self::InternalError => ErrorKind::Internal,
        }
    }

    /// Returns the HTTP status code for this error.
    ///
    /// The transport layer owns the wire mapping; this is the conventional
    /// S3 status for each code.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::AccessDenied => 403,
            Self::NoSuchBucket | Self::NoSuchKey | Self::NoSuchVersion | Self::NoSuchUpload => 404,
            Self::BucketAlreadyExists | Self::BucketNotEmpty => 409,
            Self::TooManyBuckets
            | Self::EntityTooSmall
            | Self::InvalidPart
            | Self::InvalidPartOrder
            | Self::InvalidArgument => 400,
            Self::InvalidRange => 416,
            Self::PreconditionFailed => 412,
            Self::InternalError => 500,
        }
    }

    /// Returns the HTTP status code as an `http::StatusCode`.
    #[must_use]
    pub fn status_code(&self) -> http::StatusCode {
        http::StatusCode::from_u16(self.http_status())
            .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Returns the S3 error code string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "AccessDenied",
            Self::BucketAlreadyExists => "BucketAlreadyExists",
            Self::BucketNotEmpty => "BucketNotEmpty",
            Self::TooManyBuckets => "TooManyBuckets",
            Self::NoSuchBucket => "NoSuchBucket",
            Self::NoSuchKey => "NoSuchKey",
            Self::NoSuchVersion => "NoSuchVersion",
            Self::NoSuchUpload => "NoSuchUpload",
            Self::EntityTooSmall => "EntityTooSmall",
            Self::InvalidPart => "InvalidPart",
            Self::InvalidPartOrder => "InvalidPartOrder",
            Self::InvalidArgument => "InvalidArgument",
            Self::InvalidRange => "InvalidRange",
            Self::PreconditionFailed => "PreconditionFailed",
            Self::InternalError => "InternalError",
        }
    }
}

impl std::fmt::Display for S3ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur during Cask operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An S3 API error with a specific error code.
    #[error("{code}: {message}")]
    S3 {
        /// The S3 error code.
        code: S3ErrorCode,
        /// A human-readable error message.
        message: String,
        /// The resource that caused the error (bucket name, key, upload id, etc.).
        resource: Option<String>,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Encryption or decryption failure that is not a key mismatch.
    #[error("crypto error: {0}")]
    Crypto(String),
}

impl Error {
    /// Creates a new S3 error.
    #[must_use]
    pub fn s3(code: S3ErrorCode, message: impl Into<String>) -> Self {
        Self::S3 { code, message: message.into(), resource: None }
    }

    /// Creates a new S3 error with a resource.
    #[must_use]
    pub fn s3_with_resource(
        code: S3ErrorCode,
        message: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self::S3 { code, message: message.into(), resource: Some(resource.into()) }
    }

    /// Returns the S3 error code, if this is an S3 error.
    #[must_use]
    pub const fn s3_error_code(&self) -> Option<S3ErrorCode> {
        match self {
            Self::S3 { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns the coarse taxonomy class for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::S3 { code, .. } => code.kind(),
            Self::Config(_) => ErrorKind::InvalidArgument,
            Self::Crypto(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_strings_roundtrip_status() {
        assert_eq!(S3ErrorCode::NoSuchKey.as_str(), "NoSuchKey");
        assert_eq!(S3ErrorCode::NoSuchKey.http_status(), 404);
        assert_eq!(S3ErrorCode::BucketNotEmpty.http_status(), 409);
        assert_eq!(S3ErrorCode::InvalidRange.http_status(), 416);
        assert_eq!(S3ErrorCode::TooManyBuckets.http_status(), 400);
    }

    #[test]
    fn test_kind_taxonomy() {
        assert_eq!(S3ErrorCode::NoSuchUpload.kind(), ErrorKind::NotFound);
        assert_eq!(S3ErrorCode::BucketAlreadyExists.kind(), ErrorKind::Conflict);
        assert_eq!(S3ErrorCode::InvalidPartOrder.kind(), ErrorKind::InvalidArgument);
        assert_eq!(S3ErrorCode::TooManyBuckets.kind(), ErrorKind::LimitExceeded);
    }

    #[test]
    fn test_error_carries_resource() {
        let err = Error::s3_with_resource(S3ErrorCode::NoSuchBucket, "no such bucket", "mybucket");
        assert_eq!(err.s3_error_code(), Some(S3ErrorCode::NoSuchBucket));
        match err {
            Error::S3 { resource, .. } => assert_eq!(resource.as_deref(), Some("mybucket")),
            _ => unreachable!(),
        }
    }
}
