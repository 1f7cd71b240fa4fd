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

//! Dataset version orchestration.
//!
//! [`FileService`] composes storage, locks and BagIt documents into the
//! operations exposed to callers.
//!
//! # Locking
//!
//! - store/delete: version lock shared, then path lock on the file (try)
//! - import/publish/withdraw: version lock exclusive (try)
//! - control document updates: path lock on the document (blocking), only
//!   while a version lock is held
//!
//! # Cancellation
//!
//! Dropping an operation future cancels it up to the point where its
//! primary effect (byte transfer, deletion) is durable. The remaining
//! metadata updates run on a spawned task that owns the lock guards and
//! always runs to completion.

use crate::bagit::{
    format_bag_size, BagItElement, BagItFetch, BagItInfo, FetchItem, ManifestItem, PayloadManifest,
    PayloadOxum, TagManifest, BAGIT_CONTENTS, BAGIT_FILE_NAME,
};
use crate::checksum::{sha256, HashingReader};
use crate::error::{QuotaKind, ServiceError};
use crate::lock::{LockGuard, LockService};
use crate::metadata::MetadataService;
use crate::paths;
use crate::storage::StorageService;
use crate::types::{
    guess_content_type, AccessRight, ByteRange, DatasetStatus, DatasetVersion, FileData,
    FileMetadata, FileType, StorageFile, SystemInformation,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, error, info, warn};

/// Payload limits per dataset version. `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadLimits {
    /// Maximum size of one file in bytes.
    pub max_file_size: Option<u64>,
    /// Maximum number of payload files.
    pub max_file_count: Option<u64>,
    /// Maximum total payload size in bytes.
    pub max_total_size: Option<u64>,
}

impl PayloadLimits {
    /// True if Payload-Oxum has to be kept current while in draft.
    pub fn tracks_payload(&self) -> bool {
        self.max_file_count.is_some() || self.max_total_size.is_some()
    }

    fn check(&self, oxum: &PayloadOxum) -> Result<(), ServiceError> {
        if self.max_file_count.is_some_and(|max| oxum.stream_count > max) {
            return Err(ServiceError::QuotaExceeded(QuotaKind::FileCount));
        }
        if self.max_total_size.is_some_and(|max| oxum.octet_count > max) {
            return Err(ServiceError::QuotaExceeded(QuotaKind::TotalSize));
        }
        Ok(())
    }
}

/// Payload-Oxum change booked for an in-flight store.
#[derive(Debug, Clone, Copy)]
struct Reservation {
    /// Declared length of the new file.
    added_octets: u64,
    /// Size of the file being replaced.
    removed_octets: u64,
    /// True if the path already held a payload file.
    replaces: bool,
}

impl Reservation {
    fn apply(&self, oxum: PayloadOxum) -> PayloadOxum {
        PayloadOxum::new(
            oxum.octet_count.saturating_sub(self.removed_octets) + self.added_octets,
            oxum.stream_count + u64::from(!self.replaces),
        )
    }

    fn revert(&self, oxum: PayloadOxum) -> PayloadOxum {
        PayloadOxum::new(
            oxum.octet_count.saturating_sub(self.added_octets) + self.removed_octets,
            oxum.stream_count.saturating_sub(u64::from(!self.replaces)),
        )
    }

    /// Oxum after the path ended up with no file at all.
    fn discard(&self, oxum: PayloadOxum) -> PayloadOxum {
        PayloadOxum::new(
            oxum.octet_count.saturating_sub(self.added_octets),
            oxum.stream_count.saturating_sub(1),
        )
    }
}

/// Locks and quota reservation of a store whose transfer is in flight.
///
/// If dropped while still armed (the caller cancelled), the reservation is
/// handed back on a spawned task that keeps the locks until it is done.
struct PendingStore {
    state: Option<PendingState>,
}

struct PendingState {
    service: FileService,
    dataset_version: DatasetVersion,
    reservation: Option<Reservation>,
    guards: Vec<LockGuard>,
}

impl PendingState {
    async fn release(self) -> Result<(), ServiceError> {
        if let Some(reservation) = self.reservation {
            self.service
                .update_element::<BagItInfo, _>(&self.dataset_version, move |info| {
                    info.payload_oxum = Some(reservation.revert(info.payload_oxum.unwrap_or_default()));
                    Ok(true)
                })
                .await?;
        }
        drop(self.guards);
        Ok(())
    }
}

impl PendingStore {
    fn disarm(mut self) -> Option<PendingState> {
        self.state.take()
    }

    async fn release(mut self) -> Result<(), ServiceError> {
        match self.state.take() {
            Some(state) => state.release().await,
            None => Ok(()),
        }
    }
}

impl Drop for PendingStore {
    fn drop(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };
        if state.reservation.is_none() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let dataset_version = state.dataset_version.clone();
                    if let Err(e) = state.release().await {
                        error!(
                            "Failed to release quota reservation of {}: {}",
                            dataset_version, e
                        );
                    }
                });
            }
            Err(_) => warn!(
                "No runtime to release quota reservation of {}",
                state.dataset_version
            ),
        }
    }
}

/// Runs `fut` to completion even if the caller's future is dropped.
async fn run_uncancellable<F, T>(fut: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(fut)
        .await
        .map_err(|e| ServiceError::Task(e.to_string()))?
}

/// Checks that a DOI fits on one bag-info line.
fn validate_doi(doi: &str) -> Result<(), ServiceError> {
    if doi.trim().is_empty() {
        return Err(ServiceError::InvalidArgument("DOI must not be empty".into()));
    }
    if doi.contains(|c: char| c == '\r' || c == '\n') {
        return Err(ServiceError::InvalidArgument(format!(
            "DOI must not contain line breaks: {:?}",
            doi
        )));
    }
    Ok(())
}

/// Escapes a file name for a sha256sum style listing.
///
/// Returns the name and whether the line needs a leading `\`.
fn sha256sum_name(name: &str) -> (String, bool) {
    let escaped = name.replace('\\', "\\\\").replace('\n', "\\n");
    let needs_prefix = escaped.len() > name.len();
    (escaped, needs_prefix)
}

/// Version orchestrator.
#[derive(Clone)]
pub struct FileService {
    storage: Arc<dyn StorageService>,
    locks: Arc<dyn LockService>,
    metadata: MetadataService,
    limits: PayloadLimits,
}

impl FileService {
    /// Creates a file service.
    pub fn new(
        storage: Arc<dyn StorageService>,
        locks: Arc<dyn LockService>,
        limits: PayloadLimits,
    ) -> Self {
        Self {
            metadata: MetadataService::new(storage.clone()),
            storage,
            locks,
            limits,
        }
    }

    /// Reports configured limits and the storage backend in use.
    pub fn system_information(&self) -> SystemInformation {
        SystemInformation {
            max_file_size: self.limits.max_file_size,
            max_file_count: self.limits.max_file_count,
            max_total_size: self.limits.max_total_size,
            storage_type: self.storage.name().to_string(),
        }
    }

    async fn lock_shared(&self, dv: &DatasetVersion) -> Result<LockGuard, ServiceError> {
        self.locks
            .try_lock_dataset_version_shared(dv)
            .await?
            .ok_or(ServiceError::Conflict)
    }

    async fn lock_exclusive(&self, dv: &DatasetVersion) -> Result<LockGuard, ServiceError> {
        self.locks
            .try_lock_dataset_version_exclusive(dv)
            .await?
            .ok_or(ServiceError::Conflict)
    }

    async fn lock_file(&self, full_file_path: &str) -> Result<LockGuard, ServiceError> {
        self.locks
            .try_lock_path(full_file_path)
            .await?
            .ok_or(ServiceError::Conflict)
    }

    async fn ensure_not_published(&self, dv: &DatasetVersion) -> Result<(), ServiceError> {
        if self.metadata.version_has_been_published(dv).await? {
            return Err(ServiceError::DatasetStatus(format!(
                "{} has been published",
                dv
            )));
        }
        Ok(())
    }

    /// Read-modify-write of one control document under its path lock.
    ///
    /// The document is only written if `action` reports a change.
    async fn update_element<T, F>(&self, dv: &DatasetVersion, action: F) -> Result<bool, ServiceError>
    where
        T: BagItElement,
        F: FnOnce(&mut T) -> Result<bool, ServiceError> + Send,
    {
        let _guard = self
            .locks
            .lock_path(&MetadataService::element_path::<T>(dv))
            .await?;

        let mut element = self.metadata.load::<T>(dv).await?;
        let changed = action(&mut element)?;
        if changed {
            self.metadata.store(dv, &element).await?;
        }
        Ok(changed)
    }

    /// Size of the payload file currently at `file_path`, local or fetched.
    async fn existing_payload_size(
        &self,
        dv: &DatasetVersion,
        file_path: &str,
        full_file_path: &str,
    ) -> Result<Option<u64>, ServiceError> {
        if let Some(file) = self.storage.get_metadata(full_file_path).await? {
            return Ok(Some(file.size));
        }

        let fetch = self.metadata.load::<BagItFetch>(dv).await?;
        Ok(fetch
            .try_get_item(file_path)
            .map(|item| item.length.unwrap_or(0)))
    }

    /// Storage key holding the bytes of `file_path`, following fetch.
    fn actual_file_path(
        dv: &DatasetVersion,
        fetch: &BagItFetch,
        file_path: &str,
    ) -> Result<String, ServiceError> {
        match fetch.try_get_item(file_path) {
            Some(item) => Ok(paths::resolve_fetch_url(dv, &item.url)?),
            None => Ok(paths::full_file_path(dv, file_path)),
        }
    }

    /// Stores a payload file.
    ///
    /// # Arguments
    ///
    /// * `dv` - Target dataset version, must not be published
    /// * `file_type` - Payload type
    /// * `file_path` - Path relative to the payload directory of `file_type`
    /// * `data` - File contents, read to the end
    /// * `declared_length` - Length announced by the caller, required
    /// * `content_type` - MIME type to record where the backend supports it
    pub async fn store(
        &self,
        dv: &DatasetVersion,
        file_type: FileType,
        file_path: &str,
        data: &mut (dyn AsyncRead + Unpin + Send),
        declared_length: Option<u64>,
        content_type: Option<&str>,
    ) -> Result<FileMetadata, ServiceError> {
        let file_path = paths::validate_file_path(file_type, file_path)?;
        let full_file_path = paths::full_file_path(dv, &file_path);

        info!("Store: version={}, path={}", dv, file_path);

        let version_guard = self.lock_shared(dv).await?;
        let path_guard = self.lock_file(&full_file_path).await?;

        self.ensure_not_published(dv).await?;

        let length = declared_length.ok_or(ServiceError::MissingContentLength)?;

        if self.limits.max_file_size.is_some_and(|max| length > max) {
            return Err(ServiceError::QuotaExceeded(QuotaKind::FileSize));
        }

        let reservation = if self.limits.tracks_payload() {
            let existing = self
                .existing_payload_size(dv, &file_path, &full_file_path)
                .await?;
            let reservation = Reservation {
                added_octets: length,
                removed_octets: existing.unwrap_or(0),
                replaces: existing.is_some(),
            };

            let limits = self.limits;
            self.update_element::<BagItInfo, _>(dv, move |info| {
                let updated = reservation.apply(info.payload_oxum.unwrap_or_default());
                limits.check(&updated)?;
                info.payload_oxum = Some(updated);
                Ok(true)
            })
            .await?;

            debug!("Reserved {} bytes for {} in {}", length, file_path, dv);
            Some(reservation)
        } else {
            None
        };

        let pending = PendingStore {
            state: Some(PendingState {
                service: self.clone(),
                dataset_version: dv.clone(),
                reservation,
                guards: vec![version_guard, path_guard],
            }),
        };

        let mut reader = HashingReader::new(data);
        let stored = match self
            .storage
            .store(&full_file_path, &mut reader, length, content_type)
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                error!("Store failed for {} in {}: {}", file_path, dv, e);
                pending.release().await?;
                return Err(e.into());
            }
        };
        let (checksum, received) = reader.finish();

        // Bytes are durable from here on
        let Some(state) = pending.disarm() else {
            return Err(ServiceError::Task("store state already released".into()));
        };

        if received != length {
            warn!(
                "Length mismatch for {} in {}: declared {}, received {}",
                file_path, dv, length, received
            );
            let service = self.clone();
            let dataset_version = dv.clone();
            let (path, full_path) = (file_path.clone(), full_file_path.clone());
            run_uncancellable(async move {
                let _guards = state.guards;
                service.storage.delete(&full_path).await?;
                service
                    .remove_payload_entries(&dataset_version, &path, state.reservation.map(|r| {
                        move |oxum: PayloadOxum| r.discard(oxum)
                    }))
                    .await
            })
            .await?;
            return Err(ServiceError::LengthMismatch {
                declared: length,
                received,
            });
        }

        let service = self.clone();
        let dataset_version = dv.clone();
        let path = file_path.clone();
        run_uncancellable(async move {
            let _guards = state.guards;
            service
                .update_element::<BagItFetch, _>(&dataset_version, |fetch| {
                    Ok(fetch.remove_item(&path))
                })
                .await?;
            service
                .update_element::<PayloadManifest, _>(&dataset_version, |manifest| {
                    Ok(manifest.add_or_update_item(ManifestItem::new(path.clone(), checksum)))
                })
                .await?;
            Ok(())
        })
        .await?;

        info!("Stored {} in {} ({} bytes)", file_path, dv, received);

        Ok(FileMetadata {
            path: paths::strip_payload_path(file_type, &file_path).to_string(),
            file_type,
            size: received,
            content_type: stored
                .content_type
                .unwrap_or_else(|| guess_content_type(&file_path)),
            sha256: Some(hex::encode(checksum)),
            date_created: stored.date_created,
            date_modified: stored.date_modified,
        })
    }

    /// Removes manifest and fetch entries of a path, then adjusts Payload-Oxum.
    async fn remove_payload_entries<F>(
        &self,
        dv: &DatasetVersion,
        file_path: &str,
        adjust_oxum: Option<F>,
    ) -> Result<(), ServiceError>
    where
        F: FnOnce(PayloadOxum) -> PayloadOxum + Send,
    {
        self.update_element::<PayloadManifest, _>(dv, |manifest| Ok(manifest.remove_item(file_path)))
            .await?;
        self.update_element::<BagItFetch, _>(dv, |fetch| Ok(fetch.remove_item(file_path)))
            .await?;

        if let Some(adjust) = adjust_oxum {
            self.update_element::<BagItInfo, _>(dv, move |info| {
                info.payload_oxum = Some(adjust(info.payload_oxum.unwrap_or_default()));
                Ok(true)
            })
            .await?;
        }
        Ok(())
    }

    /// Deletes a payload file.
    ///
    /// Deleting a file that does not exist is not an error.
    pub async fn delete(
        &self,
        dv: &DatasetVersion,
        file_type: FileType,
        file_path: &str,
    ) -> Result<(), ServiceError> {
        let file_path = paths::validate_file_path(file_type, file_path)?;
        let full_file_path = paths::full_file_path(dv, &file_path);

        info!("Delete: version={}, path={}", dv, file_path);

        let version_guard = self.lock_shared(dv).await?;
        let path_guard = self.lock_file(&full_file_path).await?;

        self.ensure_not_published(dv).await?;

        let existing = if self.limits.tracks_payload() {
            self.existing_payload_size(dv, &file_path, &full_file_path)
                .await?
        } else {
            None
        };

        self.storage.delete(&full_file_path).await?;

        // Deletion is durable from here on
        let service = self.clone();
        let dataset_version = dv.clone();
        let path = file_path.clone();
        run_uncancellable(async move {
            let _guards = (version_guard, path_guard);
            service
                .remove_payload_entries(
                    &dataset_version,
                    &path,
                    existing.map(|size| {
                        move |oxum: PayloadOxum| {
                            PayloadOxum::new(
                                oxum.octet_count.saturating_sub(size),
                                oxum.stream_count.saturating_sub(1),
                            )
                        }
                    }),
                )
                .await
        })
        .await
    }

    /// Makes every payload file of `file_type` in `from_version` part of
    /// `dv` by reference, without copying bytes.
    ///
    /// A no-op if both versions are the same or if `dv` already has payload
    /// of `file_type`.
    pub async fn import(
        &self,
        dv: &DatasetVersion,
        from_version: &str,
        file_type: FileType,
    ) -> Result<(), ServiceError> {
        let from = dv.with_version(from_version);
        if from == *dv {
            return Ok(());
        }

        info!("Import: version={}, from={}, type={}", dv, from, file_type);

        let guard = self.lock_exclusive(dv).await?;

        self.ensure_not_published(dv).await?;

        let prefix = paths::payload_path(Some(file_type));
        let mut fetch = self.metadata.load::<BagItFetch>(dv).await?;
        let mut manifest = self.metadata.load::<PayloadManifest>(dv).await?;

        let has_payload = fetch.items().any(|i| i.file_path.starts_with(&prefix))
            || manifest.items().any(|(path, _)| path.starts_with(&prefix))
            || !self
                .metadata
                .list_payload_files(dv, Some(file_type))
                .await?
                .is_empty();

        if has_payload {
            debug!("{} already has {} payload, skipping import", dv, file_type);
            return Ok(());
        }

        let from_fetch = self.metadata.load::<BagItFetch>(&from).await?;
        let from_manifest = self.metadata.load::<PayloadManifest>(&from).await?;

        // Fetch URLs are relative to the dataset directory, so they carry over
        for item in from_fetch.items().filter(|i| i.file_path.starts_with(&prefix)) {
            fetch.add_or_update_item(item.clone());
        }

        for file in self.metadata.list_payload_files(&from, Some(file_type)).await? {
            if from_fetch.contains(&file.path) {
                continue;
            }
            let url = paths::fetch_url(&from, &file.path);
            fetch.add_or_update_item(FetchItem::new(file.path, Some(file.size), url));
        }

        let mut imported = 0usize;
        for (path, checksum) in from_manifest.items().filter(|(p, _)| p.starts_with(&prefix)) {
            if manifest.add_or_update_item(ManifestItem::new(path, *checksum)) {
                imported += 1;
            }
        }

        self.metadata.store(dv, &fetch).await?;

        // Fetch is durable, manifest must follow
        let service = self.clone();
        let dataset_version = dv.clone();
        run_uncancellable(async move {
            let _guard = guard;
            service.metadata.store(&dataset_version, &manifest).await?;
            if service.limits.tracks_payload() {
                service.recompute_payload_oxum(&dataset_version).await?;
            }
            Ok(())
        })
        .await?;

        info!("Imported {} {} files from {} into {}", imported, file_type, from, dv);
        Ok(())
    }

    /// Rewrites Payload-Oxum from the current manifest, fetch and local files.
    async fn recompute_payload_oxum(&self, dv: &DatasetVersion) -> Result<(), ServiceError> {
        let fetch = self.metadata.load::<BagItFetch>(dv).await?;
        let manifest = self.metadata.load::<PayloadManifest>(dv).await?;
        let local = self.metadata.list_payload_files(dv, None).await?;

        let octets: u64 = local.iter().map(|f| f.size).sum::<u64>()
            + fetch.items().filter_map(|i| i.length).sum::<u64>();

        let mut streams: BTreeSet<&str> = manifest.items().map(|(p, _)| p).collect();
        streams.extend(fetch.items().map(|i| i.file_path.as_str()));
        streams.extend(local.iter().map(|f| f.path.as_str()));

        let oxum = PayloadOxum::new(octets, streams.len() as u64);
        debug!("Payload-Oxum of {} is {}", dv, oxum);

        self.update_element::<BagItInfo, _>(dv, move |info| {
            info.payload_oxum = Some(oxum);
            Ok(true)
        })
        .await?;
        Ok(())
    }

    /// True if the public may read `file_type` files of `dv`.
    async fn is_publicly_accessible(
        &self,
        dv: &DatasetVersion,
        file_type: FileType,
    ) -> Result<bool, ServiceError> {
        if !self.metadata.version_has_been_published(dv).await? {
            return Ok(false);
        }

        let bag_info = self.metadata.load::<BagItInfo>(dv).await?;

        Ok(bag_info.dataset_status == Some(DatasetStatus::Completed)
            && (file_type == FileType::Documentation
                || bag_info.access_right == Some(AccessRight::Public)))
    }

    /// Opens a payload file for reading.
    ///
    /// With `restrict_to_public`, files of unpublished, withdrawn or
    /// restricted versions are reported as absent.
    pub async fn get_data(
        &self,
        dv: &DatasetVersion,
        file_type: FileType,
        file_path: &str,
        range: Option<ByteRange>,
        restrict_to_public: bool,
    ) -> Result<Option<FileData>, ServiceError> {
        let file_path = paths::validate_file_path(file_type, file_path)?;

        debug!("GetData: version={}, path={}", dv, file_path);

        if restrict_to_public && !self.is_publicly_accessible(dv, file_type).await? {
            return Ok(None);
        }

        let fetch = self.metadata.load::<BagItFetch>(dv).await?;
        let actual = Self::actual_file_path(dv, &fetch, &file_path)?;

        Ok(self.storage.get(&actual, range).await?.map(|mut data| {
            if data.content_type.is_none() {
                data.content_type = Some(guess_content_type(&file_path));
            }
            data
        }))
    }

    /// Reads payload file metadata without opening its bytes.
    ///
    /// The returned stream is empty.
    pub async fn get_metadata(
        &self,
        dv: &DatasetVersion,
        file_type: FileType,
        file_path: &str,
        restrict_to_public: bool,
    ) -> Result<Option<FileData>, ServiceError> {
        let file_path = paths::validate_file_path(file_type, file_path)?;

        if restrict_to_public && !self.is_publicly_accessible(dv, file_type).await? {
            return Ok(None);
        }

        let fetch = self.metadata.load::<BagItFetch>(dv).await?;
        let actual = Self::actual_file_path(dv, &fetch, &file_path)?;

        Ok(self
            .storage
            .get_metadata(&actual)
            .await?
            .map(|file| FileData {
                stream: Box::new(tokio::io::empty()),
                size: file.size,
                content_type: Some(
                    file.content_type
                        .unwrap_or_else(|| guess_content_type(&file_path)),
                ),
                stream_length: 0,
            }))
    }

    /// Lists every payload file of a dataset version, sorted by path.
    pub async fn list(&self, dv: &DatasetVersion) -> Result<Vec<FileMetadata>, ServiceError> {
        debug!("List: version={}", dv);

        let manifest = self.metadata.load::<PayloadManifest>(dv).await?;
        let fetch = self.metadata.load::<BagItFetch>(dv).await?;
        let dataset_path = paths::dataset_path(dv);

        let mut files: Vec<StorageFile> = Vec::new();

        // Sorting by URL groups entries of the same source version, so each
        // source payload directory is listed once
        let mut items: Vec<&FetchItem> = fetch.items().collect();
        items.sort_by(|a, b| a.url.cmp(&b.url));

        let mut listed_prefix = String::new();
        let mut listing: HashMap<String, StorageFile> = HashMap::new();

        for item in items {
            let resolved = match paths::resolve_fetch_url(dv, &item.url) {
                Ok(resolved) => resolved,
                Err(e) => {
                    warn!("Skipping fetch entry {} of {}: {}", item.file_path, dv, e);
                    continue;
                }
            };

            let relative = &resolved[dataset_path.len()..];
            let prefix = match relative.find('/') {
                Some(i) => format!("{}{}/{}", dataset_path, &relative[..i], paths::payload_path(None)),
                None => resolved.clone(),
            };

            if prefix != listed_prefix {
                listing = self
                    .storage
                    .list(&prefix)
                    .await?
                    .into_iter()
                    .map(|f| (f.path.clone(), f))
                    .collect();
                listed_prefix = prefix;
            }

            match listing.get(&resolved) {
                Some(file) => files.push(StorageFile {
                    path: item.file_path.clone(),
                    ..file.clone()
                }),
                None => warn!(
                    "Fetch entry {} of {} points to missing {}",
                    item.file_path, dv, resolved
                ),
            }
        }

        files.extend(self.metadata.list_payload_files(dv, None).await?);
        files.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(files
            .into_iter()
            .filter_map(|file| {
                let file_type = paths::file_type_of(&file.path)?;
                Some(FileMetadata {
                    path: paths::strip_payload_path(file_type, &file.path).to_string(),
                    file_type,
                    size: file.size,
                    content_type: file
                        .content_type
                        .unwrap_or_else(|| guess_content_type(&file.path)),
                    sha256: manifest.try_get_item(&file.path).map(hex::encode),
                    date_created: file.date_created,
                    date_modified: file.date_modified,
                })
            })
            .collect())
    }

    /// Writes the payload as an uncompressed zip archive.
    ///
    /// Entries are named `<identifier>-<version>/<type>/<path>`. With
    /// non-empty `path_filters`, only entries whose `<type>/<path>` starts
    /// with one of the filters are written. A trailing `sha256.txt` lists
    /// the checksums of the written entries in sha256sum format.
    pub async fn write_data_as_zip<W>(
        &self,
        dv: &DatasetVersion,
        path_filters: &[String],
        writer: W,
    ) -> Result<(), ServiceError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        use async_zip::base::write::ZipFileWriter;
        use async_zip::{Compression, ZipEntryBuilder};
        use futures::io::AsyncWriteExt as _;

        let archive_err = |e: async_zip::error::ZipError| ServiceError::Archive(e.to_string());

        info!("WriteDataAsZip: version={}, filters={:?}", dv, path_filters);

        let manifest = self.metadata.load::<PayloadManifest>(dv).await?;
        let fetch = self.metadata.load::<BagItFetch>(dv).await?;
        let version_path = paths::version_path(dv);
        let data_prefix = paths::payload_path(None);

        let mut zip = ZipFileWriter::with_tokio(writer);
        let mut written = Vec::new();
        let mut buf = vec![0u8; 64 * 1024];

        for (file_path, checksum) in manifest.items() {
            let zip_file_path = file_path.strip_prefix(&data_prefix).unwrap_or(file_path);

            if !path_filters.is_empty()
                && !path_filters.iter().any(|f| zip_file_path.starts_with(f.as_str()))
            {
                continue;
            }

            let actual = Self::actual_file_path(dv, &fetch, file_path)?;
            let Some(data) = self.storage.get(&actual, None).await? else {
                warn!("Skipping {} of {} in zip: bytes missing", file_path, dv);
                continue;
            };

            let entry = ZipEntryBuilder::new(
                format!("{}/{}", version_path, zip_file_path).into(),
                Compression::Stored,
            );
            let mut entry_writer = zip.write_entry_stream(entry).await.map_err(archive_err)?;

            let mut stream = data.stream;
            loop {
                let n = stream.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                entry_writer.write_all(&buf[..n]).await?;
            }
            entry_writer.close().await.map_err(archive_err)?;

            written.push((zip_file_path.to_string(), *checksum));
        }

        if !written.is_empty() {
            let mut listing = String::new();
            for (name, checksum) in &written {
                let (escaped, needs_prefix) = sha256sum_name(name);
                if needs_prefix {
                    listing.push('\\');
                }
                listing.push_str(&hex::encode(checksum));
                listing.push(' ');
                listing.push_str(&escaped);
                listing.push('\n');
            }

            let entry = ZipEntryBuilder::new(
                format!("{}/sha256.txt", version_path).into(),
                Compression::Stored,
            );
            zip.write_entry_whole(entry, listing.as_bytes())
                .await
                .map_err(archive_err)?;
        }

        let mut inner = zip.close().await.map_err(archive_err)?;
        inner.flush().await?;

        info!("Wrote {} files of {} to zip", written.len(), dv);
        Ok(())
    }

    /// Publishes a dataset version.
    ///
    /// Does nothing if the version has no payload. After publication only
    /// [`FileService::withdraw`] may change the version.
    pub async fn publish(
        &self,
        dv: &DatasetVersion,
        access_right: AccessRight,
        doi: &str,
    ) -> Result<(), ServiceError> {
        info!("Publish: version={}, access_right={}", dv, access_right.as_str());

        validate_doi(doi)?;

        let guard = self.lock_exclusive(dv).await?;

        if self.metadata.version_has_been_published(dv).await? {
            return Err(ServiceError::DatasetStatus(format!(
                "{} is already published",
                dv
            )));
        }

        let local = self.metadata.list_payload_files(dv, None).await?;
        let fetch = self.metadata.load_with_checksum::<BagItFetch>(dv).await?;
        let fetch_items: Vec<&FetchItem> = fetch
            .as_ref()
            .map(|(f, _)| f.items().collect())
            .unwrap_or_default();

        if local.is_empty() && fetch_items.is_empty() {
            info!("{} has no payload, nothing to publish", dv);
            return Ok(());
        }

        let octet_count: u64 = local.iter().map(|f| f.size).sum::<u64>()
            + fetch_items.iter().filter_map(|i| i.length).sum::<u64>();

        let manifest = self.metadata.load_with_checksum::<PayloadManifest>(dv).await?;

        let mut streams: BTreeSet<&str> = fetch_items.iter().map(|i| i.file_path.as_str()).collect();
        if let Some((manifest, _)) = &manifest {
            streams.extend(manifest.items().map(|(p, _)| p));
        }

        let bag_info = BagItInfo {
            bagging_date: Some(Utc::now().date_naive()),
            bag_group_identifier: Some(dv.identifier.clone()),
            bag_size: Some(format_bag_size(octet_count)),
            external_identifier: Some(doi.to_string()),
            payload_oxum: Some(PayloadOxum::new(octet_count, streams.len() as u64)),
            access_right: Some(access_right),
            dataset_status: Some(DatasetStatus::Completed),
            version: Some(dv.version.clone()),
            other: Vec::new(),
        };

        let mut tag_manifest = self.metadata.load::<TagManifest>(dv).await?;
        tag_manifest.add_or_update_item(ManifestItem::new(BAGIT_FILE_NAME, sha256(BAGIT_CONTENTS)));
        tag_manifest.add_or_update_item(ManifestItem::new(
            BagItInfo::FILE_NAME,
            sha256(&bag_info.serialize()),
        ));
        if let Some((_, checksum)) = &manifest {
            tag_manifest.add_or_update_item(ManifestItem::new(PayloadManifest::FILE_NAME, *checksum));
        }
        if let Some((_, checksum)) = &fetch {
            tag_manifest.add_or_update_item(ManifestItem::new(BagItFetch::FILE_NAME, *checksum));
        }

        self.metadata.store(dv, &tag_manifest).await?;

        // bagit.txt goes last: its presence marks the version as published
        let service = self.clone();
        let dataset_version = dv.clone();
        run_uncancellable(async move {
            let _guard = guard;
            service.metadata.store(&dataset_version, &bag_info).await?;
            service.metadata.store_bagit_marker(&dataset_version).await?;
            Ok(())
        })
        .await?;

        info!("Published {}", dv);
        Ok(())
    }

    /// Withdraws a published dataset version. Payload is kept.
    pub async fn withdraw(&self, dv: &DatasetVersion) -> Result<(), ServiceError> {
        info!("Withdraw: version={}", dv);

        let guard = self.lock_exclusive(dv).await?;

        if !self.metadata.version_has_been_published(dv).await? {
            return Err(ServiceError::DatasetStatus(format!(
                "{} has not been published",
                dv
            )));
        }

        let mut bag_info = self.metadata.load::<BagItInfo>(dv).await?;

        match bag_info.dataset_status {
            None => {
                warn!("{} is published but has no status, not withdrawing", dv);
                return Ok(());
            }
            Some(DatasetStatus::Withdrawn) => return Ok(()),
            Some(DatasetStatus::Completed) => {}
        }

        bag_info.dataset_status = Some(DatasetStatus::Withdrawn);

        let mut tag_manifest = self.metadata.load::<TagManifest>(dv).await?;
        tag_manifest.add_or_update_item(ManifestItem::new(
            BagItInfo::FILE_NAME,
            sha256(&bag_info.serialize()),
        ));
        self.metadata.store(dv, &tag_manifest).await?;

        let service = self.clone();
        let dataset_version = dv.clone();
        run_uncancellable(async move {
            let _guard = guard;
            service.metadata.store(&dataset_version, &bag_info).await?;
            Ok(())
        })
        .await?;

        info!("Withdrew {}", dv);
        Ok(())
    }
}
