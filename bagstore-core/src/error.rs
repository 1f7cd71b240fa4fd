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

//! Error types for the storage backend, the lock service and the file service.

use thiserror::Error;

/// Errors that can occur in a storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Path cannot be mapped onto the backend (escapes the root, absolute, ...).
    #[error("Invalid storage path: {path}")]
    InvalidPath {
        /// The offending path.
        path: String,
    },

    /// Invalid data format or content.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Errors raised by a lock service implementation.
#[derive(Error, Debug)]
pub enum LockError {
    /// The lock backend could not be reached or answered with an error.
    #[error("Lock backend error: {0}")]
    Backend(String),
}

/// Limit that rejected a store request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKind {
    /// Single file larger than `max_file_size`.
    FileSize,
    /// Too many payload files in the dataset version.
    FileCount,
    /// Payload total larger than `max_total_size`.
    TotalSize,
}

impl std::fmt::Display for QuotaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QuotaKind::FileSize => "file too large",
            QuotaKind::FileCount => "too many files",
            QuotaKind::TotalSize => "max total size exceeded",
        };
        f.write_str(s)
    }
}

/// Errors returned by [`crate::FileService`] operations.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Relative file path contains an empty, `.` or `..` segment.
    #[error("Illegal path: {path}")]
    IllegalPath {
        /// Path as supplied by the caller.
        path: String,
    },

    /// An argument cannot be recorded in a BagIt document.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A lock could not be acquired without waiting. The caller may retry.
    #[error("Write conflict")]
    Conflict,

    /// The dataset version's lifecycle state does not allow the operation.
    #[error("Dataset version status does not permit this operation: {0}")]
    DatasetStatus(String),

    /// A configured payload limit would be exceeded.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(QuotaKind),

    /// Upload without a declared content length.
    #[error("Missing content length")]
    MissingContentLength,

    /// Number of bytes received differs from the declared content length.
    #[error("Content length mismatch: declared {declared}, received {received}")]
    LengthMismatch {
        /// Declared length.
        declared: u64,
        /// Bytes actually read from the body.
        received: u64,
    },

    /// Storage backend failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Lock service failure.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Zip archive could not be written.
    #[error("Archive error: {0}")]
    Archive(String),

    /// A detached completion task failed to run to the end.
    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self {
        ServiceError::Storage(StorageError::Io(e))
    }
}

impl ServiceError {
    /// Returns the HTTP status code a boundary layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::IllegalPath { .. } => 400,
            ServiceError::InvalidArgument(_) => 400,
            ServiceError::Conflict => 409,
            ServiceError::DatasetStatus(_) => 409,
            ServiceError::QuotaExceeded(_) => 400,
            ServiceError::MissingContentLength => 411,
            ServiceError::LengthMismatch { .. } => 400,
            ServiceError::Storage(_)
            | ServiceError::Lock(_)
            | ServiceError::Archive(_)
            | ServiceError::Task(_) => 500,
        }
    }

    /// True if the caller may simply retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Conflict)
    }
}
