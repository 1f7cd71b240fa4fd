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

//! Storage backend contract and implementations.

pub mod filesystem;

pub use filesystem::FileSystemStorage;

use crate::error::StorageError;
use crate::types::{ByteRange, FileData, StorageFile, StoredFile};
use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Blob storage backend.
///
/// Paths are opaque `/` separated keys. The backend has no transactions;
/// consistency is the caller's job.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Writes an object, replacing any existing one.
    ///
    /// # Arguments
    ///
    /// * `path` - Object key
    /// * `data` - Object bytes, read to the end
    /// * `length` - Declared length, used by backends that need it up front
    /// * `content_type` - MIME type, for backends that record one
    async fn store(
        &self,
        path: &str,
        data: &mut (dyn AsyncRead + Unpin + Send),
        length: u64,
        content_type: Option<&str>,
    ) -> Result<StoredFile, StorageError>;

    /// Opens an object for reading.
    ///
    /// Returns `None` if the object does not exist. An unsatisfiable range
    /// yields an empty stream.
    async fn get(
        &self,
        path: &str,
        range: Option<ByteRange>,
    ) -> Result<Option<FileData>, StorageError>;

    /// Reads object metadata without opening a stream.
    async fn get_metadata(&self, path: &str) -> Result<Option<StorageFile>, StorageError>;

    /// Deletes an object. Deleting a missing object is not an error.
    async fn delete(&self, path: &str) -> Result<(), StorageError>;

    /// Lists every object whose key starts with `prefix`, sorted by key.
    async fn list(&self, prefix: &str) -> Result<Vec<StorageFile>, StorageError>;

    /// Short backend name reported by system information.
    fn name(&self) -> &str;
}
