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

//! Local filesystem backend.
//!
//! Objects are plain files below a root directory. Writes go to a temporary
//! file under `.partial/` and are renamed into place, so readers never see a
//! half-written object.

use super::StorageService;
use crate::error::StorageError;
use crate::types::{ByteRange, FileData, StorageFile, StoredFile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::ffi::OsStr;
use std::fs::Metadata;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Component, Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

/// Directory for in-flight writes, relative to the root.
const PARTIAL_DIR: &str = ".partial";

/// Renames retried when a concurrent delete prunes the target directory.
const RENAME_ATTEMPTS: u32 = 5;

/// Storage backend on a local directory tree.
#[derive(Debug, Clone)]
pub struct FileSystemStorage {
    root: PathBuf,
}

impl FileSystemStorage {
    /// Opens a backend rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(PARTIAL_DIR)).await?;

        debug!("Opened filesystem storage at {:?}", root);

        Ok(Self { root })
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a key onto the filesystem. Only plain segments are accepted.
    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path);
        let plain = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
            && relative.components().next() != Some(Component::Normal(OsStr::new(PARTIAL_DIR)));

        if !plain {
            return Err(StorageError::InvalidPath {
                path: path.to_string(),
            });
        }

        Ok(self.root.join(relative))
    }

    fn to_storage_file(key: String, metadata: &Metadata) -> StorageFile {
        StorageFile {
            path: key,
            size: metadata.len(),
            content_type: None,
            date_created: metadata.created().ok().map(DateTime::<Utc>::from),
            date_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        }
    }

    /// Removes empty directories from `dir` upwards, stopping at the root.
    async fn prune_empty_dirs(&self, mut dir: Option<&Path>) {
        while let Some(current) = dir {
            if current == self.root || !current.starts_with(&self.root) {
                break;
            }
            // Fails on non-empty directories, which ends the walk
            if fs::remove_dir(current).await.is_err() {
                break;
            }
            dir = current.parent();
        }
    }
}

/// Renames a finished temp file onto its key.
///
/// The parent directory is created right before the rename. A concurrent
/// delete may prune it again in between, so a missing directory is retried.
async fn move_into_place(temp: &Path, target: &Path) -> std::io::Result<()> {
    let mut attempt = 0;
    loop {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        match fs::rename(temp, target).await {
            Err(e) if e.kind() == ErrorKind::NotFound && attempt < RENAME_ATTEMPTS => {
                attempt += 1;
                debug!("Parent of {:?} vanished before rename, retrying", target);
            }
            result => return result,
        }
    }
}

async fn metadata_if_file(path: &Path) -> Result<Option<Metadata>, StorageError> {
    match fs::metadata(path).await {
        Ok(m) if m.is_file() => Ok(Some(m)),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl StorageService for FileSystemStorage {
    async fn store(
        &self,
        path: &str,
        data: &mut (dyn AsyncRead + Unpin + Send),
        _length: u64,
        _content_type: Option<&str>,
    ) -> Result<StoredFile, StorageError> {
        let target = self.resolve(path)?;

        let temp = self
            .root
            .join(PARTIAL_DIR)
            .join(uuid::Uuid::new_v4().to_string());

        let written = async {
            let mut file = File::create(&temp).await?;
            let n = tokio::io::copy(data, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            let metadata = file.metadata().await?;
            Ok::<_, std::io::Error>((n, metadata))
        }
        .await;

        let result = match written {
            Ok((bytes, metadata)) => move_into_place(&temp, &target)
                .await
                .map(|()| (bytes, metadata)),
            Err(e) => Err(e),
        };

        let (bytes, metadata) = match result {
            Ok(done) => done,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&temp).await {
                    if cleanup.kind() != ErrorKind::NotFound {
                        warn!("Failed to remove partial file {:?}: {}", temp, cleanup);
                    }
                }
                return Err(e.into());
            }
        };

        debug!("Stored {} ({} bytes)", path, bytes);

        Ok(StoredFile {
            content_type: None,
            date_created: metadata.created().ok().map(DateTime::<Utc>::from),
            date_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    async fn get(
        &self,
        path: &str,
        range: Option<ByteRange>,
    ) -> Result<Option<FileData>, StorageError> {
        let target = self.resolve(path)?;
        let Some(metadata) = metadata_if_file(&target).await? else {
            return Ok(None);
        };

        let mut file = File::open(&target).await?;
        let size = metadata.len();

        let (offset, length) = match range {
            Some(range) => range.resolve(size).unwrap_or((0, 0)),
            None => (0, size),
        };

        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }

        Ok(Some(FileData {
            stream: Box::new(file.take(length)),
            size,
            content_type: None,
            stream_length: length,
        }))
    }

    async fn get_metadata(&self, path: &str) -> Result<Option<StorageFile>, StorageError> {
        let target = self.resolve(path)?;
        Ok(metadata_if_file(&target)
            .await?
            .map(|m| Self::to_storage_file(path.to_string(), &m)))
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let target = self.resolve(path)?;

        match fs::remove_file(&target).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        debug!("Deleted {}", path);

        self.prune_empty_dirs(target.parent()).await;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StorageFile>, StorageError> {
        // Walk from the deepest directory the prefix fully names
        let start_key = match prefix.rfind('/') {
            Some(i) => &prefix[..i],
            None => "",
        };
        let start = if start_key.is_empty() {
            self.root.clone()
        } else {
            self.resolve(start_key)?
        };

        let mut files = Vec::new();
        let mut pending = vec![start];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");

                if key == PARTIAL_DIR {
                    continue;
                }

                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    // Only descend where the prefix can still match
                    let dir_key = format!("{}/", key);
                    if dir_key.starts_with(prefix) || prefix.starts_with(&dir_key) {
                        pending.push(path);
                    }
                } else if file_type.is_file() && key.starts_with(prefix) {
                    let metadata = entry.metadata().await?;
                    files.push(Self::to_storage_file(key, &metadata));
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    fn name(&self) -> &str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (FileSystemStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileSystemStorage::new(temp_dir.path()).await.unwrap();
        (storage, temp_dir)
    }

    async fn put(storage: &FileSystemStorage, path: &str, data: &[u8]) {
        let mut reader = data;
        storage
            .store(path, &mut reader, data.len() as u64, None)
            .await
            .unwrap();
    }

    async fn read_all(data: FileData) -> Vec<u8> {
        let mut out = Vec::new();
        let mut stream = data.stream;
        stream.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let (storage, _temp) = setup().await;
        put(&storage, "a/b/c.txt", b"Hello, World!").await;

        let data = storage.get("a/b/c.txt", None).await.unwrap().unwrap();
        assert_eq!(data.size, 13);
        assert_eq!(data.stream_length, 13);
        assert_eq!(read_all(data).await, b"Hello, World!");

        assert!(storage.get("a/b/missing", None).await.unwrap().is_none());
        // Directories are not objects
        assert!(storage.get("a/b", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_overwrites() {
        let (storage, _temp) = setup().await;
        put(&storage, "x", b"first version").await;
        put(&storage, "x", b"second").await;

        let meta = storage.get_metadata("x").await.unwrap().unwrap();
        assert_eq!(meta.size, 6);
    }

    #[tokio::test]
    async fn test_get_range() {
        let (storage, _temp) = setup().await;
        put(&storage, "r", b"0123456789").await;

        let data = storage
            .get("r", Some(ByteRange::new(Some(2), Some(5))))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(data.size, 10);
        assert_eq!(data.stream_length, 4);
        assert_eq!(read_all(data).await, b"2345");

        let data = storage
            .get("r", Some(ByteRange::new(None, Some(3))))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read_all(data).await, b"789");

        let data = storage
            .get("r", Some(ByteRange::new(Some(50), None)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(data.stream_length, 0);
    }

    #[tokio::test]
    async fn test_delete_prunes_empty_dirs() {
        let (storage, temp) = setup().await;
        put(&storage, "d/e/f/one", b"1").await;
        put(&storage, "d/two", b"2").await;

        storage.delete("d/e/f/one").await.unwrap();
        assert!(!temp.path().join("d/e").exists());
        assert!(temp.path().join("d/two").exists());

        // Missing objects are fine
        storage.delete("d/e/f/one").await.unwrap();
    }

    #[tokio::test]
    async fn test_store_survives_concurrent_prune() {
        let (storage, temp) = setup().await;
        put(&storage, "d/b", b"sibling").await;

        let (mut client, server) = tokio::io::duplex(16);
        let writer = {
            let storage = storage.clone();
            tokio::spawn(async move {
                let mut body = server;
                storage.store("d/a", &mut body, 8, None).await
            })
        };

        client.write_all(b"half").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // Empties and prunes d/ while the upload is still streaming
        storage.delete("d/b").await.unwrap();
        assert!(!temp.path().join("d").exists());

        client.write_all(b"done").await.unwrap();
        drop(client);

        writer.await.unwrap().expect("Store failed after concurrent prune");
        let data = storage.get("d/a", None).await.unwrap().unwrap();
        assert_eq!(read_all(data).await, b"halfdone");
    }

    #[tokio::test]
    async fn test_store_reports_dates_and_cleans_partial() {
        let (storage, temp) = setup().await;
        let mut reader = &b"abc"[..];
        let stored = storage.store("s/t", &mut reader, 3, None).await.unwrap();
        assert!(stored.date_modified.is_some());

        let partial = std::fs::read_dir(temp.path().join(PARTIAL_DIR)).unwrap().count();
        assert_eq!(partial, 0);
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let (storage, _temp) = setup().await;
        put(&storage, "ds/v1/data/data/b.csv", b"b").await;
        put(&storage, "ds/v1/data/data/a.csv", b"aa").await;
        put(&storage, "ds/v1/data/documentation/readme", b"r").await;
        put(&storage, "ds/v10/data/data/other", b"o").await;

        let files = storage.list("ds/v1/data/").await.unwrap();
        let keys: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "ds/v1/data/data/a.csv",
                "ds/v1/data/data/b.csv",
                "ds/v1/data/documentation/readme"
            ]
        );
        assert_eq!(files[0].size, 2);

        // Prefix ending mid-segment matches siblings too
        assert_eq!(storage.list("ds/v1").await.unwrap().len(), 4);
        assert!(storage.list("nothing/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let (storage, _temp) = setup().await;
        for bad in ["../x", "/etc/passwd", "a/../../b", "", ".partial/x"] {
            let result = storage.get_metadata(bad).await;
            assert!(
                matches!(result, Err(StorageError::InvalidPath { .. })),
                "{}",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_list_skips_partial_dir() {
        let (storage, temp) = setup().await;
        std::fs::write(temp.path().join(PARTIAL_DIR).join("leftover"), b"x").unwrap();
        put(&storage, "k", b"v").await;

        let files = storage.list("").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "k");
    }
}
