// Copyright 2024 The Cask Authors
// SPDX-License-Identifier: Apache-2.0

//! Listing over the version ledger.
//!
//! Both projections walk keys in lexicographic order and emit *units*: a
//! single object (or version), or a delimiter group rolled up into one
//! common prefix. Every unit counts once toward the page size. Markers
//! are exclusive resume points; a marker equal to a group's prefix spends
//! the whole group, while a marker inside a group skips only the member
//! keys at or before it.

use cask_core::types::VersionId;

use crate::backend::{ListObjectsParams, ListObjectsResult, ListVersionsParams, ListVersionsResult};
use crate::ledger::VersionLedger;

/// Returns the common prefix a key rolls up into, if the delimiter
/// occurs in the key past the listing prefix.
fn group_of(key: &str, prefix: &str, delimiter: &str) -> Option<String> {
    let rest = &key[prefix.len()..];
    rest.find(delimiter).map(|i| format!("{prefix}{}", &rest[..i + delimiter.len()]))
}

/// Lists latest versions under a prefix, one page.
///
/// Keys whose latest entry is a delete marker are invisible, both as
/// objects and as contributors to common prefixes.
#[must_use]
pub fn list_objects(
    ledger: &VersionLedger,
    params: &ListObjectsParams,
    default_max_keys: u32,
) -> ListObjectsResult {
    let prefix = params.prefix.as_deref().unwrap_or("");
    let delimiter = params.delimiter.as_deref().filter(|d| !d.is_empty());
    let marker = params.marker.as_deref().unwrap_or("");
    let max_keys = params.max_keys.unwrap_or(default_max_keys) as usize;

    let mut result = ListObjectsResult::default();
    if max_keys == 0 {
        return result;
    }

    let mut count = 0usize;
    let mut last_unit: Option<String> = None;
    let mut last_group: Option<String> = None;

    for (key, history) in ledger.iter() {
        if !key.starts_with(prefix) {
            if key.as_str() > prefix {
                break;
            }
            continue;
        }
        let Some(latest) = history.first() else { continue };
        if latest.is_delete_marker {
            continue;
        }

        let group = delimiter.and_then(|d| group_of(key, prefix, d));
        match group {
            Some(group) => {
                // A marker inside the group skips only members at or
                // before it; the group is spent as a whole only when the
                // marker is the group prefix itself.
                if key.as_str() <= marker
                    || group.as_str() == marker
                    || last_group.as_deref() == Some(group.as_str())
                {
                    continue;
                }
                if count == max_keys {
                    result.is_truncated = true;
                    result.next_marker = last_unit;
                    return result;
                }
                last_unit = Some(group.clone());
                last_group = Some(group.clone());
                result.common_prefixes.push(group);
            }
            None => {
                if key.as_str() <= marker {
                    continue;
                }
                if count == max_keys {
                    result.is_truncated = true;
                    result.next_marker = last_unit;
                    return result;
                }
                last_unit = Some(key.clone());
                result.objects.push(latest.to_info(key, true));
            }
        }
        count += 1;
    }

    result
}

/// Lists all versions and delete markers under a prefix, one page.
///
/// Versions are emitted in key order, newest first within a key. A page
/// can end mid-key; the version-id marker then resumes within that key.
#[must_use]
pub fn list_versions(
    ledger: &VersionLedger,
    params: &ListVersionsParams,
    default_max_keys: u32,
) -> ListVersionsResult {
    let prefix = params.prefix.as_deref().unwrap_or("");
    let delimiter = params.delimiter.as_deref().filter(|d| !d.is_empty());
    let key_marker = params.key_marker.as_deref();
    let max_keys = params.max_keys.unwrap_or(default_max_keys) as usize;

    let mut result = ListVersionsResult::default();
    if max_keys == 0 {
        return result;
    }

    let mut count = 0usize;
    let mut last_unit: Option<(String, Option<VersionId>)> = None;
    let mut last_group: Option<String> = None;

    for (key, history) in ledger.iter() {
        if !key.starts_with(prefix) {
            if key.as_str() > prefix {
                break;
            }
            continue;
        }

        if let Some(delimiter) = delimiter {
            if let Some(group) = group_of(key, prefix, delimiter) {
                if key_marker.is_some_and(|m| key.as_str() <= m || group.as_str() == m)
                    || last_group.as_deref() == Some(group.as_str())
                {
                    continue;
                }
                if count == max_keys {
                    return truncate_versions(result, last_unit);
                }
                last_unit = Some((group.clone(), None));
                last_group = Some(group.clone());
                result.common_prefixes.push(group);
                count += 1;
                continue;
            }
        }

        // Resume position within this key's history.
        let mut start = 0;
        if let Some(marker) = key_marker {
            if key.as_str() < marker {
                continue;
            }
            if key.as_str() == marker {
                match &params.version_id_marker {
                    Some(vm) => {
                        start = history
                            .iter()
                            .position(|r| &r.version_id == vm)
                            .map_or(0, |pos| pos + 1);
                    }
                    // No version marker: the whole key was covered.
                    None => continue,
                }
            }
        }

        for (idx, record) in history.iter().enumerate().skip(start) {
            if count == max_keys {
                return truncate_versions(result, last_unit);
            }
            last_unit = Some((key.clone(), Some(record.version_id.clone())));
            result.versions.push(record.to_info(key, idx == 0));
            count += 1;
        }
    }

    result
}

fn truncate_versions(
    mut result: ListVersionsResult,
    last_unit: Option<(String, Option<VersionId>)>,
) -> ListVersionsResult {
    result.is_truncated = true;
    if let Some((key, version_id)) = last_unit {
        result.next_key_marker = Some(key);
        result.next_version_id_marker = version_id;
    }
    result
}
