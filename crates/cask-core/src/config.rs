// Copyright 2024 The Cask Authors
// SPDX-License-Identifier: Apache-2.0

//! Configuration for the Cask engine.

use serde::{Deserialize, Serialize};

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of buckets per account.
    /// Default: 100 (the S3 per-account default).
    pub max_buckets: usize,
    /// Minimum size in bytes for every multipart part except the last.
    /// Default: 5 MiB (5242880 bytes), the S3 floor.
    pub min_part_size: u64,
    /// Maximum part number accepted for a multipart upload.
    /// Default: 10000.
    pub max_parts: u32,
    /// Default page size for listings when the caller passes none.
    /// Default: 1000.
    pub default_max_keys: u32,
    /// Hex-encoded 32-byte master key for SSE-S3.
    ///
    /// Optional; when unset, an ephemeral random key is generated at
    /// engine startup. SSE-C needs no engine key.
    pub sse_master_key_hex: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_buckets: 100,
            min_part_size: 5 * 1024 * 1024, // 5 MiB (S3 minimum part size)
            max_parts: 10_000,
            default_max_keys: 1000,
            sse_master_key_hex: None,
        }
    }
}

impl EngineConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any field holds an unusable value.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_buckets == 0 {
            return Err(crate::Error::Config("max_buckets must be positive".to_string()));
        }
        if self.max_parts == 0 {
            return Err(crate::Error::Config("max_parts must be positive".to_string()));
        }
        if let Some(hex_key) = &self.sse_master_key_hex {
            let decoded = hex::decode(hex_key)
                .map_err(|e| crate::Error::Config(format!("sse_master_key_hex: {e}")))?;
            if decoded.len() != 32 {
                return Err(crate::Error::Config(
                    "sse_master_key_hex must decode to 32 bytes".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_buckets, 100);
        assert_eq!(config.min_part_size, 5 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_master_key() {
        let config = EngineConfig {
            sse_master_key_hex: Some("not-hex".to_string()),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            sse_master_key_hex: Some("abcd".to_string()), // too short
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_valid_key() {
        let config = EngineConfig {
            sse_master_key_hex: Some("00".repeat(32)),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
