// Copyright 2024 The Cask Authors
// SPDX-License-Identifier: Apache-2.0

//! Listing pagination, prefixes, and delimiter roll-up at the engine level.

use bytes::Bytes;
use cask_core::config::EngineConfig;
use cask_core::types::VersioningMode;
use cask_storage::{
    ListObjectsParams, ListVersionsParams, SseRequest, StorageBackend, StorageEngine,
};

fn engine() -> StorageEngine {
    StorageEngine::new(EngineConfig::default()).expect("default config is valid")
}

async fn seed(engine: &StorageEngine, bucket: &str, keys: &[&str]) {
    engine.create_bucket(bucket).await.unwrap();
    for key in keys {
        engine
            .put_object(bucket, key, Bytes::from_static(b"body"), SseRequest::None)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_list_returns_keys_in_lexicographic_order() {
    let engine = engine();
    seed(&engine, "bucket", &["zebra", "apple", "mango"]).await;

    let result = engine.list_objects("bucket", ListObjectsParams::default()).await.unwrap();
    let keys: Vec<_> = result.objects.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, ["apple", "mango", "zebra"]);
    assert!(!result.is_truncated);
}

#[tokio::test]
async fn test_prefix_filters_keys() {
    let engine = engine();
    seed(&engine, "bucket", &["logs/2024/a", "logs/2024/b", "logs/2025/a", "data/x"]).await;

    let params = ListObjectsParams {
        prefix: Some("logs/2024/".to_string()),
        ..ListObjectsParams::default()
    };
    let result = engine.list_objects("bucket", params).await.unwrap();
    let keys: Vec<_> = result.objects.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, ["logs/2024/a", "logs/2024/b"]);
}

#[tokio::test]
async fn test_flat_pagination_walks_every_key_exactly_once() {
    let engine = engine();
    seed(&engine, "bucket", &["a", "b", "c", "d", "e"]).await;

    let mut seen = Vec::new();
    let mut marker = None;
    loop {
        let params = ListObjectsParams {
            marker: marker.clone(),
            max_keys: Some(2),
            ..ListObjectsParams::default()
        };
        let page = engine.list_objects("bucket", params).await.unwrap();
        assert!(page.objects.len() <= 2);
        seen.extend(page.objects.iter().map(|o| o.key.clone()));
        if !page.is_truncated {
            break;
        }
        marker = page.next_marker;
        assert!(marker.is_some(), "truncated pages must carry a resume marker");
    }
    assert_eq!(seen, ["a", "b", "c", "d", "e"]);
}

#[tokio::test]
async fn test_delimiter_groups_page_as_single_units() {
    let engine = engine();
    seed(&engine, "bucket", &["asdf", "boo/bar", "boo/baz/xyzzy", "cquux/thud", "cquux/bla"])
        .await;

    // Page 1: the lone top-level key.
    let params = ListObjectsParams {
        delimiter: Some("/".to_string()),
        max_keys: Some(1),
        ..ListObjectsParams::default()
    };
    let page = engine.list_objects("bucket", params).await.unwrap();
    assert_eq!(page.objects.len(), 1);
    assert_eq!(page.objects[0].key, "asdf");
    assert!(page.common_prefixes.is_empty());
    assert!(page.is_truncated);

    // Page 2: the boo/ group, counted as one unit.
    let params = ListObjectsParams {
        delimiter: Some("/".to_string()),
        marker: page.next_marker,
        max_keys: Some(1),
        ..ListObjectsParams::default()
    };
    let page = engine.list_objects("bucket", params).await.unwrap();
    assert!(page.objects.is_empty());
    assert_eq!(page.common_prefixes, ["boo/"]);
    assert!(page.is_truncated);

    // Page 3: the cquux/ group ends the walk.
    let params = ListObjectsParams {
        delimiter: Some("/".to_string()),
        marker: page.next_marker,
        max_keys: Some(1),
        ..ListObjectsParams::default()
    };
    let page = engine.list_objects("bucket", params).await.unwrap();
    assert!(page.objects.is_empty());
    assert_eq!(page.common_prefixes, ["cquux/"]);
    assert!(!page.is_truncated);
    assert!(page.next_marker.is_none());
}

#[tokio::test]
async fn test_deleted_key_disappears_from_listing() {
    let engine = engine();
    seed(&engine, "bucket", &["keep", "remove"]).await;

    engine.delete_object("bucket", "remove", None).await.unwrap();

    let result = engine.list_objects("bucket", ListObjectsParams::default()).await.unwrap();
    let keys: Vec<_> = result.objects.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, ["keep"]);
}

#[tokio::test]
async fn test_delete_marker_latest_hides_key_from_object_listing() {
    let engine = engine();
    engine.create_bucket("bucket").await.unwrap();
    engine.set_bucket_versioning("bucket", VersioningMode::Enabled).await.unwrap();
    engine
        .put_object("bucket", "key", Bytes::from_static(b"x"), SseRequest::None)
        .await
        .unwrap();
    engine.delete_object("bucket", "key", None).await.unwrap();

    let objects = engine.list_objects("bucket", ListObjectsParams::default()).await.unwrap();
    assert!(objects.objects.is_empty());

    // The version listing still shows the marker and the version.
    let versions =
        engine.list_object_versions("bucket", ListVersionsParams::default()).await.unwrap();
    assert_eq!(versions.versions.len(), 2);
    assert!(versions.versions[0].is_delete_marker);
    assert!(versions.versions[0].is_latest);
    assert!(!versions.versions[1].is_delete_marker);
}

#[tokio::test]
async fn test_version_listing_paginates_within_a_key() {
    let engine = engine();
    engine.create_bucket("bucket").await.unwrap();
    engine.set_bucket_versioning("bucket", VersioningMode::Enabled).await.unwrap();
    for _ in 0..5 {
        engine
            .put_object("bucket", "key", Bytes::from_static(b"v"), SseRequest::None)
            .await
            .unwrap();
    }

    let mut collected = Vec::new();
    let mut key_marker = None;
    let mut version_id_marker = None;
    loop {
        let params = ListVersionsParams {
            key_marker: key_marker.clone(),
            version_id_marker: version_id_marker.clone(),
            max_keys: Some(2),
            ..ListVersionsParams::default()
        };
        let page = engine.list_object_versions("bucket", params).await.unwrap();
        collected.extend(page.versions);
        if !page.is_truncated {
            break;
        }
        key_marker = page.next_key_marker;
        version_id_marker = page.next_version_id_marker;
    }

    assert_eq!(collected.len(), 5);
    // Newest first, exactly one latest, no duplicates.
    assert!(collected[0].is_latest);
    assert!(collected[1..].iter().all(|v| !v.is_latest));
    let mut ids: Vec<_> = collected.iter().map(|v| v.version_id.clone()).collect();
    ids.dedup();
    assert_eq!(ids.len(), 5);
}

#[tokio::test]
async fn test_max_keys_zero_returns_empty_page() {
    let engine = engine();
    seed(&engine, "bucket", &["a", "b"]).await;

    let params = ListObjectsParams { max_keys: Some(0), ..ListObjectsParams::default() };
    let result = engine.list_objects("bucket", params).await.unwrap();
    assert!(result.objects.is_empty());
    assert!(!result.is_truncated);
}

#[tokio::test]
async fn test_prefix_and_delimiter_roll_up_nested_levels() {
    let engine = engine();
    seed(
        &engine,
        "bucket",
        &["photos/2024/jan/a.jpg", "photos/2024/feb/b.jpg", "photos/2024/top.jpg"],
    )
    .await;

    let params = ListObjectsParams {
        prefix: Some("photos/2024/".to_string()),
        delimiter: Some("/".to_string()),
        ..ListObjectsParams::default()
    };
    let result = engine.list_objects("bucket", params).await.unwrap();

    let keys: Vec<_> = result.objects.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, ["photos/2024/top.jpg"]);
    assert_eq!(result.common_prefixes, ["photos/2024/feb/", "photos/2024/jan/"]);
}
