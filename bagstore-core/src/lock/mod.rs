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

//! Lock service contract.
//!
//! Two kinds of lock exist:
//! - a reader/writer lock per dataset version, keyed `<identifier>-<version>`
//! - a mutex per storage path
//!
//! All consistency between concurrent service instances comes from these
//! locks. A lock is held for as long as its [`LockGuard`] lives.

pub mod memory;

pub use memory::InMemoryLockService;

use crate::error::LockError;
use crate::types::DatasetVersion;
use async_trait::async_trait;

/// Proof of a held lock. Dropping it releases the lock.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard {
    _inner: Box<dyn Send + Sync>,
}

impl LockGuard {
    /// Wraps a backend specific guard.
    pub fn new<G: Send + Sync + 'static>(guard: G) -> Self {
        Self {
            _inner: Box::new(guard),
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LockGuard")
    }
}

/// Distributed lock primitives.
///
/// `try_*` methods return `Ok(None)` when the lock is held elsewhere and never
/// wait. Only [`LockService::lock_path`] waits.
#[async_trait]
pub trait LockService: Send + Sync {
    /// Acquires the mutex for `path`, waiting as long as needed.
    async fn lock_path(&self, path: &str) -> Result<LockGuard, LockError>;

    /// Acquires the mutex for `path` if it is free.
    async fn try_lock_path(&self, path: &str) -> Result<Option<LockGuard>, LockError>;

    /// Acquires the version lock in shared mode if no exclusive holder exists.
    async fn try_lock_dataset_version_shared(
        &self,
        dataset_version: &DatasetVersion,
    ) -> Result<Option<LockGuard>, LockError>;

    /// Acquires the version lock in exclusive mode if nobody holds it.
    async fn try_lock_dataset_version_exclusive(
        &self,
        dataset_version: &DatasetVersion,
    ) -> Result<Option<LockGuard>, LockError>;
}
