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

//! Import and Zip Export Integration Test
//!
//! Imported files are referenced through `fetch.txt` and read from the
//! source version. Zip archives are checked with an independent reader.

use bagstore_core::bagit::{BagItFetch, BagItInfo, PayloadManifest, PayloadOxum};
use bagstore_core::checksum::sha256;
use bagstore_core::{
    DatasetVersion, FileService, FileSystemStorage, FileType, InMemoryLockService,
    MetadataService, PayloadLimits,
};
use std::io::{Cursor, Read};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

struct Fixture {
    service: FileService,
    metadata: MetadataService,
    _temp_dir: TempDir,
}

async fn setup() -> Fixture {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let storage = Arc::new(
        FileSystemStorage::new(temp_dir.path())
            .await
            .expect("Failed to open storage"),
    );
    let service = FileService::new(
        storage.clone(),
        Arc::new(InMemoryLockService::new()),
        PayloadLimits {
            max_total_size: Some(1 << 20),
            ..Default::default()
        },
    );
    Fixture {
        service,
        metadata: MetadataService::new(storage),
        _temp_dir: temp_dir,
    }
}

async fn store(service: &FileService, dv: &DatasetVersion, file_type: FileType, path: &str, data: &[u8]) {
    let mut reader = data;
    service
        .store(dv, file_type, path, &mut reader, Some(data.len() as u64), None)
        .await
        .expect("Failed to store file");
}

async fn read(service: &FileService, dv: &DatasetVersion, path: &str) -> Option<Vec<u8>> {
    let data = service
        .get_data(dv, FileType::Data, path, None, false)
        .await
        .expect("Failed to get data")?;
    let mut out = Vec::new();
    let mut stream = data.stream;
    stream.read_to_end(&mut out).await.expect("Failed to read");
    Some(out)
}

async fn zip_bytes(service: &FileService, dv: &DatasetVersion, filters: &[String]) -> Vec<u8> {
    let mut buf = Vec::new();
    service
        .write_data_as_zip(dv, filters, &mut buf)
        .await
        .expect("Failed to write zip");
    buf
}

fn zip_entries(bytes: Vec<u8>) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("Invalid zip");
    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).expect("Failed to open entry");
        assert_eq!(file.compression(), zip::CompressionMethod::Stored);
        let mut contents = Vec::new();
        file.read_to_end(&mut contents).expect("Failed to read entry");
        entries.push((file.name().to_string(), contents));
    }
    entries
}

#[tokio::test]
async fn test_import_references_previous_version() {
    let f = setup().await;
    let v1 = DatasetVersion::new("2024-123", "1");
    let v2 = v1.with_version("2");

    store(&f.service, &v1, FileType::Data, "dir/foo.bin", b"version one").await;
    store(&f.service, &v1, FileType::Documentation, "readme.txt", b"docs").await;
    let v1_listing = f.service.list(&v1).await.unwrap();

    f.service
        .import(&v2, "1", FileType::Data)
        .await
        .expect("Failed to import");

    let listed = f.service.list(&v2).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].path, "dir/foo.bin");
    assert_eq!(listed[0].file_type, FileType::Data);
    assert_eq!(listed[0].size, 11);
    assert_eq!(listed[0].sha256, Some(hex::encode(sha256(b"version one"))));

    assert_eq!(read(&f.service, &v2, "dir/foo.bin").await, Some(b"version one".to_vec()));

    let fetch: BagItFetch = f.metadata.load(&v2).await.unwrap();
    let item = fetch.try_get_item("data/data/dir/foo.bin").expect("Fetch entry missing");
    assert_eq!(item.url, "../2024-123-1/data/data/dir/foo.bin");
    assert_eq!(item.length, Some(11));

    let info: BagItInfo = f.metadata.load(&v2).await.unwrap();
    assert_eq!(info.payload_oxum, Some(PayloadOxum::new(11, 1)));

    // Source version is untouched
    let after = f.service.list(&v1).await.unwrap();
    assert_eq!(after.len(), v1_listing.len());
    let v1_fetch: BagItFetch = f.metadata.load(&v1).await.unwrap();
    assert!(v1_fetch.is_empty());
}

#[tokio::test]
async fn test_import_chains_and_skips() {
    let f = setup().await;
    let v1 = DatasetVersion::new("2024-123", "1");
    let v2 = v1.with_version("2");
    let v3 = v1.with_version("3");

    store(&f.service, &v1, FileType::Data, "a.csv", b"from v1").await;
    f.service.import(&v2, "1", FileType::Data).await.unwrap();
    store(&f.service, &v2, FileType::Data, "b.csv", b"from v2").await;

    // Fetch entries carry over unchanged, local files become new entries
    f.service.import(&v3, "2", FileType::Data).await.unwrap();
    let fetch: BagItFetch = f.metadata.load(&v3).await.unwrap();
    assert_eq!(
        fetch.try_get_item("data/data/a.csv").map(|i| i.url.as_str()),
        Some("../2024-123-1/data/data/a.csv")
    );
    assert_eq!(
        fetch.try_get_item("data/data/b.csv").map(|i| i.url.as_str()),
        Some("../2024-123-2/data/data/b.csv")
    );
    assert_eq!(read(&f.service, &v3, "a.csv").await, Some(b"from v1".to_vec()));
    assert_eq!(read(&f.service, &v3, "b.csv").await, Some(b"from v2".to_vec()));

    // Target already has data payload
    store(&f.service, &v1, FileType::Data, "c.csv", b"late").await;
    f.service.import(&v2, "1", FileType::Data).await.unwrap();
    let paths: Vec<String> = f.service.list(&v2).await.unwrap().into_iter().map(|m| m.path).collect();
    assert_eq!(paths, vec!["a.csv".to_string(), "b.csv".to_string()]);

    // Same version
    f.service.import(&v1, "1", FileType::Data).await.unwrap();
    assert_eq!(f.service.list(&v1).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_overwrite_replaces_fetch_reference() {
    let f = setup().await;
    let v1 = DatasetVersion::new("2024-123", "1");
    let v2 = v1.with_version("2");

    store(&f.service, &v1, FileType::Data, "a.csv", b"old").await;
    f.service.import(&v2, "1", FileType::Data).await.unwrap();

    store(&f.service, &v2, FileType::Data, "a.csv", b"new!").await;

    let fetch: BagItFetch = f.metadata.load(&v2).await.unwrap();
    assert!(!fetch.contains("data/data/a.csv"));
    let manifest: PayloadManifest = f.metadata.load(&v2).await.unwrap();
    assert_eq!(manifest.try_get_item("data/data/a.csv"), Some(&sha256(b"new!")));

    let info: BagItInfo = f.metadata.load(&v2).await.unwrap();
    assert_eq!(info.payload_oxum, Some(PayloadOxum::new(4, 1)));

    assert_eq!(read(&f.service, &v2, "a.csv").await, Some(b"new!".to_vec()));
    assert_eq!(read(&f.service, &v1, "a.csv").await, Some(b"old".to_vec()));

    // Deleting an imported file only drops the reference
    f.service.import(&v1.with_version("3"), "1", FileType::Data).await.unwrap();
    f.service
        .delete(&v1.with_version("3"), FileType::Data, "a.csv")
        .await
        .unwrap();
    assert!(f.service.list(&v1.with_version("3")).await.unwrap().is_empty());
    assert_eq!(read(&f.service, &v1, "a.csv").await, Some(b"old".to_vec()));
}

#[tokio::test]
async fn test_zip_export() {
    let f = setup().await;
    let dv = DatasetVersion::new("2024-123", "1");

    store(&f.service, &dv, FileType::Data, "a.csv", b"1,2\n").await;
    store(&f.service, &dv, FileType::Data, "sub/b.csv", b"3,4\n").await;
    store(&f.service, &dv, FileType::Documentation, "readme.txt", b"read me").await;

    let entries = zip_entries(zip_bytes(&f.service, &dv, &[]).await);
    let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "2024-123-1/data/a.csv",
            "2024-123-1/data/sub/b.csv",
            "2024-123-1/documentation/readme.txt",
            "2024-123-1/sha256.txt",
        ]
    );
    assert_eq!(entries[0].1, b"1,2\n");
    assert_eq!(entries[2].1, b"read me");

    let listing = String::from_utf8(entries[3].1.clone()).unwrap();
    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], format!("{} data/a.csv", hex::encode(sha256(b"1,2\n"))));
    assert_eq!(
        lines[2],
        format!("{} documentation/readme.txt", hex::encode(sha256(b"read me")))
    );
}

#[tokio::test]
async fn test_zip_export_filters_and_fetch() {
    let f = setup().await;
    let v1 = DatasetVersion::new("2024-123", "1");
    let v2 = v1.with_version("2");

    store(&f.service, &v1, FileType::Data, "a.csv", b"shared").await;
    f.service.import(&v2, "1", FileType::Data).await.unwrap();
    store(&f.service, &v2, FileType::Documentation, "readme.txt", b"v2 docs").await;

    let entries = zip_entries(zip_bytes(&f.service, &v2, &["data/".to_string()]).await);
    let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["2024-123-2/data/a.csv", "2024-123-2/sha256.txt"]);
    assert_eq!(entries[0].1, b"shared");

    // Nothing matches: empty archive, no checksum file
    let entries = zip_entries(zip_bytes(&f.service, &v2, &["nothing/".to_string()]).await);
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_zip_checksum_file_escapes_names() {
    let f = setup().await;
    let dv = DatasetVersion::new("2024-123", "1");
    store(&f.service, &dv, FileType::Data, "back\\slash.txt", b"x").await;

    let entries = zip_entries(zip_bytes(&f.service, &dv, &[]).await);
    let listing = String::from_utf8(entries.last().unwrap().1.clone()).unwrap();
    assert_eq!(
        listing,
        format!("\\{} data/back\\\\slash.txt\n", hex::encode(sha256(b"x")))
    );
}
