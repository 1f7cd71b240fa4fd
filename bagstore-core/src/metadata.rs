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

//! Loading and storing BagIt control documents of a dataset version.
//!
//! No locking happens here. Callers hold whatever lock protects the
//! document they read-modify-write.

use crate::bagit::{parse_element, BagItElement, BAGIT_CONTENTS, BAGIT_FILE_NAME};
use crate::checksum::HashingReader;
use crate::error::StorageError;
use crate::paths;
use crate::storage::StorageService;
use crate::types::{DatasetVersion, FileType, Sha256Digest, StorageFile};
use std::sync::Arc;
use tracing::debug;

/// Control document access on top of a storage backend.
#[derive(Clone)]
pub struct MetadataService {
    storage: Arc<dyn StorageService>,
}

impl MetadataService {
    /// Creates a metadata service.
    pub fn new(storage: Arc<dyn StorageService>) -> Self {
        Self { storage }
    }

    /// Full storage key of the document `T` of a dataset version.
    pub fn element_path<T: BagItElement>(dataset_version: &DatasetVersion) -> String {
        paths::full_file_path(dataset_version, T::FILE_NAME)
    }

    /// Loads a document. A missing document is empty.
    pub async fn load<T: BagItElement>(
        &self,
        dataset_version: &DatasetVersion,
    ) -> Result<T, StorageError> {
        Ok(self
            .load_with_checksum(dataset_version)
            .await?
            .map(|(element, _)| element)
            .unwrap_or_default())
    }

    /// Loads a document together with the SHA-256 of its stored bytes.
    ///
    /// Returns `None` if the document does not exist.
    pub async fn load_with_checksum<T: BagItElement>(
        &self,
        dataset_version: &DatasetVersion,
    ) -> Result<Option<(T, Sha256Digest)>, StorageError> {
        let path = Self::element_path::<T>(dataset_version);

        let Some(data) = self.storage.get(&path, None).await? else {
            return Ok(None);
        };

        let mut reader = HashingReader::new(data.stream);
        let element = parse_element::<T, _>(&mut reader).await?;
        let (checksum, _) = reader.finish();

        Ok(Some((element, checksum)))
    }

    /// Stores a document, or deletes it if it has no values.
    pub async fn store<T: BagItElement>(
        &self,
        dataset_version: &DatasetVersion,
        element: &T,
    ) -> Result<(), StorageError> {
        let path = Self::element_path::<T>(dataset_version);

        if !element.has_values() {
            debug!("Removing empty {} of {}", T::FILE_NAME, dataset_version);
            return self.storage.delete(&path).await;
        }

        let bytes = element.serialize();
        let mut reader = &bytes[..];
        self.storage
            .store(&path, &mut reader, bytes.len() as u64, Some("text/plain"))
            .await?;

        debug!("Stored {} of {}", T::FILE_NAME, dataset_version);
        Ok(())
    }

    /// Writes the `bagit.txt` marker.
    pub async fn store_bagit_marker(
        &self,
        dataset_version: &DatasetVersion,
    ) -> Result<(), StorageError> {
        let path = paths::full_file_path(dataset_version, BAGIT_FILE_NAME);
        let mut reader = BAGIT_CONTENTS;
        self.storage
            .store(&path, &mut reader, BAGIT_CONTENTS.len() as u64, Some("text/plain"))
            .await?;
        Ok(())
    }

    /// True once the `bagit.txt` marker exists.
    pub async fn version_has_been_published(
        &self,
        dataset_version: &DatasetVersion,
    ) -> Result<bool, StorageError> {
        let path = paths::full_file_path(dataset_version, BAGIT_FILE_NAME);
        Ok(self.storage.get_metadata(&path).await?.is_some())
    }

    /// Lists payload files stored under the version's own directory.
    ///
    /// Files referenced through `fetch.txt` are not included. Paths are
    /// relative to the version root, e.g. `data/data/table.csv`.
    pub async fn list_payload_files(
        &self,
        dataset_version: &DatasetVersion,
        file_type: Option<FileType>,
    ) -> Result<Vec<StorageFile>, StorageError> {
        let root = paths::dataset_version_path(dataset_version);
        let prefix = format!("{}{}", root, paths::payload_path(file_type));

        let files = self.storage.list(&prefix).await?;

        Ok(files
            .into_iter()
            .filter_map(|mut file| {
                let relative = file.path.strip_prefix(&root)?.to_string();
                file.path = relative;
                Some(file)
            })
            .collect())
    }
}
