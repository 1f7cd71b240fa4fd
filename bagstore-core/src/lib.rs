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

//! Versioned BagIt storage for research dataset versions.
//!
//! Each dataset version is a bag of payload files (`data` and
//! `documentation`) that goes from draft to published to withdrawn. The
//! payload lives in a [`StorageService`] backend next to its BagIt control
//! documents. Consistency between concurrent writers comes from a
//! [`LockService`].
//!
//! ```no_run
//! use bagstore_core::{
//!     DatasetVersion, FileService, FileSystemStorage, FileType, InMemoryLockService,
//!     PayloadLimits,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = Arc::new(FileSystemStorage::new("/var/lib/bagstore").await?);
//! let service = FileService::new(
//!     storage,
//!     Arc::new(InMemoryLockService::new()),
//!     PayloadLimits::default(),
//! );
//!
//! let dv = DatasetVersion::new("2024-123", "1");
//! let mut body = &b"a,b\n1,2\n"[..];
//! service
//!     .store(&dv, FileType::Data, "table.csv", &mut body, Some(8), None)
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod bagit;
pub mod checksum;
pub mod error;
pub mod lock;
pub mod metadata;
pub mod paths;
pub mod service;
pub mod storage;
pub mod types;

pub use error::{LockError, QuotaKind, ServiceError, StorageError};
pub use lock::{InMemoryLockService, LockGuard, LockService};
pub use metadata::MetadataService;
pub use service::{FileService, PayloadLimits};
pub use storage::{FileSystemStorage, StorageService};
pub use types::{
    AccessRight, ByteRange, DatasetStatus, DatasetVersion, FileData, FileMetadata, FileType,
    SystemInformation,
};
