// Copyright 2026 Bagstore Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Concurrency and Quota Integration Test
//!
//! Writers to the same file conflict instead of waiting, publication
//! excludes concurrent writers, and payload limits are enforced against
//! the reserved Payload-Oxum before any bytes are written.

use bagstore_core::bagit::{BagItInfo, PayloadManifest, PayloadOxum};
use bagstore_core::paths;
use bagstore_core::{
    AccessRight, DatasetVersion, FileService, FileSystemStorage, FileType, InMemoryLockService,
    LockService, MetadataService, PayloadLimits, QuotaKind, ServiceError,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

struct Fixture {
    service: FileService,
    locks: Arc<InMemoryLockService>,
    metadata: MetadataService,
    _temp_dir: TempDir,
}

async fn setup(limits: PayloadLimits) -> Fixture {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let storage = Arc::new(
        FileSystemStorage::new(temp_dir.path())
            .await
            .expect("Failed to open storage"),
    );
    let locks = Arc::new(InMemoryLockService::new());
    Fixture {
        service: FileService::new(storage.clone(), locks.clone(), limits),
        locks,
        metadata: MetadataService::new(storage),
        _temp_dir: temp_dir,
    }
}

async fn store(
    service: &FileService,
    dv: &DatasetVersion,
    path: &str,
    data: &[u8],
) -> Result<(), ServiceError> {
    let mut reader = data;
    service
        .store(dv, FileType::Data, path, &mut reader, Some(data.len() as u64), None)
        .await
        .map(|_| ())
}

async fn oxum(metadata: &MetadataService, dv: &DatasetVersion) -> Option<PayloadOxum> {
    let info: BagItInfo = metadata.load(dv).await.expect("Failed to load bag-info");
    info.payload_oxum
}

#[tokio::test]
async fn test_store_conflicts_with_held_path_lock() {
    let f = setup(PayloadLimits::default()).await;
    let dv = DatasetVersion::new("2024-123", "1");

    let full_path = paths::full_file_path(&dv, "data/data/a.csv");
    let guard = f.locks.try_lock_path(&full_path).await.unwrap();
    assert!(guard.is_some());

    let err = store(&f.service, &dv, "a.csv", b"abc").await.unwrap_err();
    assert!(matches!(err, ServiceError::Conflict));
    assert!(err.is_retryable());
    assert_eq!(err.status_code(), 409);

    // Other paths are unaffected
    store(&f.service, &dv, "b.csv", b"abc").await.unwrap();

    drop(guard);
    store(&f.service, &dv, "a.csv", b"abc").await.unwrap();
}

#[tokio::test]
async fn test_store_conflicts_with_exclusive_version_lock() {
    let f = setup(PayloadLimits::default()).await;
    let dv = DatasetVersion::new("2024-123", "1");

    let guard = f.locks.try_lock_dataset_version_exclusive(&dv).await.unwrap();
    assert!(guard.is_some());

    let err = store(&f.service, &dv, "a.csv", b"abc").await.unwrap_err();
    assert!(matches!(err, ServiceError::Conflict));

    let err = f
        .service
        .publish(&dv, AccessRight::Public, "doi:10.5878/x")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict));

    // A different version of the same dataset is independent
    store(&f.service, &dv.with_version("2"), "a.csv", b"abc")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_concurrent_writers_to_same_path() {
    let f = setup(PayloadLimits::default()).await;
    let dv = DatasetVersion::new("2024-123", "1");

    // First writer blocks on its body while holding the path lock
    let (mut client, server) = tokio::io::duplex(64);
    let first = {
        let service = f.service.clone();
        let dv = dv.clone();
        tokio::spawn(async move {
            let mut body = server;
            service
                .store(&dv, FileType::Data, "a.csv", &mut body, Some(5), None)
                .await
        })
    };

    tokio::time::timeout(Duration::from_secs(5), async {
        while f.locks.held_path_locks() == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("First writer never took the path lock");

    let err = store(&f.service, &dv, "a.csv", b"other").await.unwrap_err();
    assert!(matches!(err, ServiceError::Conflict));

    // The publisher cannot get in while a writer is active
    let err = f
        .service
        .publish(&dv, AccessRight::Public, "doi:10.5878/x")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict));

    client.write_all(b"first").await.unwrap();
    drop(client);

    let stored = first.await.unwrap().expect("First writer failed");
    assert_eq!(stored.size, 5);

    let listed = f.service.list(&dv).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].sha256, stored.sha256);
    assert_eq!(f.locks.held_path_locks(), 0);
}

#[tokio::test]
async fn test_store_alongside_sibling_delete() {
    let f = setup(PayloadLimits::default()).await;
    let dv = DatasetVersion::new("2024-123", "1");
    store(&f.service, &dv, "dir/b.csv", b"sibling").await.unwrap();

    let (mut client, server) = tokio::io::duplex(64);
    let upload = {
        let service = f.service.clone();
        let dv = dv.clone();
        tokio::spawn(async move {
            let mut body = server;
            service
                .store(&dv, FileType::Data, "dir/a.csv", &mut body, Some(6), None)
                .await
        })
    };

    client.write_all(b"1,2").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    f.service
        .delete(&dv, FileType::Data, "dir/b.csv")
        .await
        .expect("Sibling delete failed");

    client.write_all(b",3\n").await.unwrap();
    drop(client);

    let stored = upload.await.unwrap().expect("Upload failed after sibling delete");
    assert_eq!(stored.size, 6);

    let paths: Vec<String> = f
        .service
        .list(&dv)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.path)
        .collect();
    assert_eq!(paths, vec!["dir/a.csv".to_string()]);
}

#[tokio::test]
async fn test_cancelled_store_releases_locks_and_reservation() {
    let f = setup(PayloadLimits {
        max_file_count: Some(10),
        ..Default::default()
    })
    .await;
    let dv = DatasetVersion::new("2024-123", "1");
    store(&f.service, &dv, "kept.csv", b"kept").await.unwrap();

    let (_client, server) = tokio::io::duplex(64);
    let mut body = server;
    let pending = f
        .service
        .store(&dv, FileType::Data, "a.csv", &mut body, Some(100), None);

    // The body never arrives
    let result = tokio::time::timeout(Duration::from_millis(100), pending).await;
    assert!(result.is_err());

    // Release runs in a spawned task
    tokio::time::timeout(Duration::from_secs(5), async {
        while oxum(&f.metadata, &dv).await != Some(PayloadOxum::new(4, 1)) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Reservation was not released");
    while f.locks.held_path_locks() > 0 {
        tokio::task::yield_now().await;
    }

    store(&f.service, &dv, "a.csv", b"retry").await.unwrap();
    assert_eq!(oxum(&f.metadata, &dv).await, Some(PayloadOxum::new(9, 2)));
}

#[tokio::test]
async fn test_max_file_count_boundary() {
    let f = setup(PayloadLimits {
        max_file_count: Some(2),
        ..Default::default()
    })
    .await;
    let dv = DatasetVersion::new("2024-123", "1");

    store(&f.service, &dv, "a.csv", b"aa").await.unwrap();
    store(&f.service, &dv, "b.csv", b"bbb").await.unwrap();
    assert_eq!(oxum(&f.metadata, &dv).await, Some(PayloadOxum::new(5, 2)));

    let manifest_before: PayloadManifest = f.metadata.load(&dv).await.unwrap();

    let err = store(&f.service, &dv, "c.csv", b"c").await.unwrap_err();
    assert!(matches!(err, ServiceError::QuotaExceeded(QuotaKind::FileCount)));
    assert_eq!(err.status_code(), 400);

    let manifest_after: PayloadManifest = f.metadata.load(&dv).await.unwrap();
    assert_eq!(manifest_before, manifest_after);
    assert_eq!(oxum(&f.metadata, &dv).await, Some(PayloadOxum::new(5, 2)));
    assert_eq!(f.service.list(&dv).await.unwrap().len(), 2);

    // Overwriting does not count as a new file
    store(&f.service, &dv, "a.csv", b"a").await.unwrap();
    assert_eq!(oxum(&f.metadata, &dv).await, Some(PayloadOxum::new(4, 2)));

    // Deleting frees a slot
    f.service.delete(&dv, FileType::Data, "b.csv").await.unwrap();
    assert_eq!(oxum(&f.metadata, &dv).await, Some(PayloadOxum::new(1, 1)));
    store(&f.service, &dv, "c.csv", b"c").await.unwrap();
}

#[tokio::test]
async fn test_max_total_size() {
    let f = setup(PayloadLimits {
        max_total_size: Some(10),
        ..Default::default()
    })
    .await;
    let dv = DatasetVersion::new("2024-123", "1");

    store(&f.service, &dv, "a.csv", b"123456").await.unwrap();
    let err = store(&f.service, &dv, "b.csv", b"12345").await.unwrap_err();
    assert!(matches!(err, ServiceError::QuotaExceeded(QuotaKind::TotalSize)));

    store(&f.service, &dv, "b.csv", b"1234").await.unwrap();
    assert_eq!(oxum(&f.metadata, &dv).await, Some(PayloadOxum::new(10, 2)));
}

#[tokio::test]
async fn test_max_file_size_and_missing_length() {
    let f = setup(PayloadLimits {
        max_file_size: Some(4),
        ..Default::default()
    })
    .await;
    let dv = DatasetVersion::new("2024-123", "1");

    let err = store(&f.service, &dv, "big.bin", b"12345").await.unwrap_err();
    assert!(matches!(err, ServiceError::QuotaExceeded(QuotaKind::FileSize)));

    let mut reader = &b"1234"[..];
    let err = f
        .service
        .store(&dv, FileType::Data, "a.bin", &mut reader, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::MissingContentLength));
    assert_eq!(err.status_code(), 411);

    assert!(f.service.list(&dv).await.unwrap().is_empty());
    assert_eq!(f.locks.held_path_locks(), 0);
}

#[tokio::test]
async fn test_length_mismatch_discards_upload() {
    let f = setup(PayloadLimits {
        max_file_count: Some(10),
        ..Default::default()
    })
    .await;
    let dv = DatasetVersion::new("2024-123", "1");

    store(&f.service, &dv, "a.csv", b"abc").await.unwrap();

    let mut reader = &b"xyz"[..];
    let err = f
        .service
        .store(&dv, FileType::Data, "b.csv", &mut reader, Some(5), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::LengthMismatch {
            declared: 5,
            received: 3
        }
    ));

    let paths: Vec<String> = f
        .service
        .list(&dv)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.path)
        .collect();
    assert_eq!(paths, vec!["a.csv".to_string()]);
    assert_eq!(oxum(&f.metadata, &dv).await, Some(PayloadOxum::new(3, 1)));

    let manifest: PayloadManifest = f.metadata.load(&dv).await.unwrap();
    assert!(!manifest.contains("data/data/b.csv"));
}

#[tokio::test]
async fn test_illegal_paths_rejected() {
    let f = setup(PayloadLimits::default()).await;
    let dv = DatasetVersion::new("2024-123", "1");

    for path in ["../x", "a/../b", "a//b", "./a", ""] {
        let err = store(&f.service, &dv, path, b"x").await.unwrap_err();
        assert!(
            matches!(err, ServiceError::IllegalPath { .. }),
            "{} was accepted",
            path
        );
        assert_eq!(err.status_code(), 400);
    }
}
