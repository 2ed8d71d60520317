// Copyright 2024 The Cask Authors
// SPDX-License-Identifier: Apache-2.0

//! Core types and utilities for the Cask object-storage engine.
//!
//! This crate provides the building blocks shared across all Cask components:
//! - Error types with S3-compatible error codes
//! - Common data types (ETag, version ids, bucket metadata, etc.)
//! - Engine configuration

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

pub use config::EngineConfig;
pub use error::{Error, ErrorKind, Result, S3ErrorCode};
