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

//! In-process lock table.
//!
//! Only coordinates tasks inside one process. Entries are held weakly and
//! disappear once no guard references them.

use super::{LockGuard, LockService};
use crate::error::LockError;
use crate::types::DatasetVersion;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use tokio::sync::{Mutex, RwLock};
use tracing::trace;

type Table<T> = StdMutex<HashMap<String, Weak<T>>>;

/// Lock service backed by tokio locks in a process-local table.
#[derive(Default)]
pub struct InMemoryLockService {
    paths: Table<Mutex<()>>,
    dataset_versions: Table<RwLock<()>>,
}

impl InMemoryLockService {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live path locks.
    pub fn held_path_locks(&self) -> usize {
        let table = self.paths.lock().unwrap_or_else(|e| e.into_inner());
        table.values().filter(|w| w.strong_count() > 0).count()
    }
}

/// Returns the lock registered under `key`, creating it if needed.
fn entry<T: Default>(table: &Table<T>, key: &str) -> Arc<T> {
    let mut table = table.lock().unwrap_or_else(|e| e.into_inner());

    if let Some(existing) = table.get(key).and_then(Weak::upgrade) {
        return existing;
    }

    table.retain(|_, weak| weak.strong_count() > 0);

    let lock = Arc::new(T::default());
    table.insert(key.to_string(), Arc::downgrade(&lock));
    lock
}

#[async_trait]
impl LockService for InMemoryLockService {
    async fn lock_path(&self, path: &str) -> Result<LockGuard, LockError> {
        let lock = entry(&self.paths, path);
        let guard = lock.lock_owned().await;
        trace!("Locked path {}", path);
        Ok(LockGuard::new(guard))
    }

    async fn try_lock_path(&self, path: &str) -> Result<Option<LockGuard>, LockError> {
        let lock = entry(&self.paths, path);
        Ok(lock.try_lock_owned().ok().map(LockGuard::new))
    }

    async fn try_lock_dataset_version_shared(
        &self,
        dataset_version: &DatasetVersion,
    ) -> Result<Option<LockGuard>, LockError> {
        let lock = entry(&self.dataset_versions, &dataset_version.lock_key());
        Ok(lock.try_read_owned().ok().map(LockGuard::new))
    }

    async fn try_lock_dataset_version_exclusive(
        &self,
        dataset_version: &DatasetVersion,
    ) -> Result<Option<LockGuard>, LockError> {
        let lock = entry(&self.dataset_versions, &dataset_version.lock_key());
        Ok(lock.try_write_owned().ok().map(LockGuard::new))
    }
}
