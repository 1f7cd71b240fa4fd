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

//! File records exchanged with the storage backend and with API consumers.

use crate::types::FileType;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncRead;

/// Boxed byte stream returned by reads.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// SHA-256 digest.
pub type Sha256Digest = [u8; 32];

/// Result of a backend store operation.
#[derive(Debug, Clone, Default)]
pub struct StoredFile {
    /// Content type recorded by the backend, if it keeps one.
    pub content_type: Option<String>,
    /// Creation timestamp.
    pub date_created: Option<DateTime<Utc>>,
    /// Last modification timestamp.
    pub date_modified: Option<DateTime<Utc>>,
}

/// Metadata of one object as reported by the backend.
#[derive(Debug, Clone)]
pub struct StorageFile {
    /// Backend path. Relative to whatever root the caller asked about.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Content type recorded by the backend, if it keeps one.
    pub content_type: Option<String>,
    /// Creation timestamp.
    pub date_created: Option<DateTime<Utc>>,
    /// Last modification timestamp.
    pub date_modified: Option<DateTime<Utc>>,
}

/// Data read from storage.
pub struct FileData {
    /// Byte stream, limited to the requested range.
    pub stream: ByteStream,
    /// Total size of the stored object.
    pub size: u64,
    /// Content type.
    pub content_type: Option<String>,
    /// Number of bytes the stream yields.
    pub stream_length: u64,
}

impl std::fmt::Debug for FileData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileData")
            .field("size", &self.size)
            .field("content_type", &self.content_type)
            .field("stream_length", &self.stream_length)
            .finish_non_exhaustive()
    }
}

/// Inclusive byte range with HTTP `Range` semantics.
///
/// - `from` and `to`: bytes `from..=to`
/// - only `from`: bytes from `from` to the end
/// - only `to`: the last `to` bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteRange {
    /// First byte offset.
    pub from: Option<u64>,
    /// Last byte offset, or suffix length when `from` is absent.
    pub to: Option<u64>,
}

impl ByteRange {
    /// Creates a new range.
    pub fn new(from: Option<u64>, to: Option<u64>) -> Self {
        Self { from, to }
    }

    /// Resolves the range against an object size.
    ///
    /// Returns `(offset, length)`, or `None` if the range is unsatisfiable.
    pub fn resolve(&self, total: u64) -> Option<(u64, u64)> {
        match (self.from, self.to) {
            (Some(from), _) if from >= total => None,
            (Some(from), Some(to)) if to < from => None,
            (Some(from), Some(to)) => Some((from, to.min(total - 1) - from + 1)),
            (Some(from), None) => Some((from, total - from)),
            (None, Some(0)) => None,
            (None, Some(suffix)) => {
                let len = suffix.min(total);
                Some((total - len, len))
            }
            (None, None) => Some((0, total)),
        }
    }
}

/// Payload file description handed to API consumers.
///
/// Derived from manifest, fetch and storage listing, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct FileMetadata {
    /// Path relative to the payload directory of `file_type`.
    pub path: String,
    /// File type.
    #[serde(rename = "type")]
    pub file_type: FileType,
    /// Size in bytes.
    pub size: u64,
    /// Content type, inferred from the extension when the backend has none.
    pub content_type: String,
    /// Lowercase hex SHA-256, when recorded in the payload manifest.
    pub sha256: Option<String>,
    /// Creation timestamp.
    pub date_created: Option<DateTime<Utc>>,
    /// Last modification timestamp.
    pub date_modified: Option<DateTime<Utc>>,
}

/// Configured limits and active backend.
#[derive(Debug, Clone, Serialize)]
pub struct SystemInformation {
    /// Maximum size of a single file, if limited.
    pub max_file_size: Option<u64>,
    /// Maximum number of payload files per dataset version, if limited.
    pub max_file_count: Option<u64>,
    /// Maximum payload size per dataset version, if limited.
    pub max_total_size: Option<u64>,
    /// Name of the active storage backend.
    pub storage_type: String,
}

/// Guesses a content type from a file name's extension.
pub fn guess_content_type(path: &str) -> String {
    mime_guess::from_path(path).first_or_octet_stream().essence_str().to_string()
}
