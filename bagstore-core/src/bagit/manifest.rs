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

//! SHA-256 manifests (`manifest-sha256.txt`, `tagmanifest-sha256.txt`).
//!
//! One line per file: `<lowercase hex sha256> <path>`, sorted by path.

use super::{content_lines, decode_line_path, encode_line_path, split_field, BagItElement};
use crate::error::StorageError;
use crate::types::Sha256Digest;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::{Deref, DerefMut};

/// One manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    /// Path relative to the version root.
    pub file_path: String,
    /// SHA-256 of the file contents.
    pub checksum: Sha256Digest,
}

impl ManifestItem {
    /// Creates a new manifest item.
    pub fn new(file_path: impl Into<String>, checksum: Sha256Digest) -> Self {
        Self {
            file_path: file_path.into(),
            checksum,
        }
    }
}

/// Mapping file path → checksum, with a reverse index by checksum.
///
/// Checksums are compared as raw bytes, never as hex strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BagItManifest {
    items: BTreeMap<String, Sha256Digest>,
    by_checksum: HashMap<Sha256Digest, BTreeSet<String>>,
}

impl BagItManifest {
    /// Creates an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an item. Returns `true` if the manifest changed.
    pub fn add_or_update_item(&mut self, item: ManifestItem) -> bool {
        match self.items.get(&item.file_path) {
            Some(existing) if *existing == item.checksum => return false,
            Some(existing) => {
                let old = *existing;
                self.unindex(&old, &item.file_path);
            }
            None => {}
        }

        self.by_checksum
            .entry(item.checksum)
            .or_default()
            .insert(item.file_path.clone());
        self.items.insert(item.file_path, item.checksum);
        true
    }

    /// Removes an item. Returns `true` if the manifest changed.
    pub fn remove_item(&mut self, file_path: &str) -> bool {
        match self.items.remove(file_path) {
            Some(checksum) => {
                self.unindex(&checksum, file_path);
                true
            }
            None => false,
        }
    }

    fn unindex(&mut self, checksum: &Sha256Digest, file_path: &str) {
        if let Some(paths) = self.by_checksum.get_mut(checksum) {
            paths.remove(file_path);
            if paths.is_empty() {
                self.by_checksum.remove(checksum);
            }
        }
    }

    /// Looks up the checksum of a file.
    pub fn try_get_item(&self, file_path: &str) -> Option<&Sha256Digest> {
        self.items.get(file_path)
    }

    /// Checks if a file is listed.
    pub fn contains(&self, file_path: &str) -> bool {
        self.items.contains_key(file_path)
    }

    /// Paths of all items with exactly this checksum, sorted.
    pub fn get_items_by_checksum(&self, checksum: &Sha256Digest) -> Vec<&str> {
        self.by_checksum
            .get(checksum)
            .map(|paths| paths.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Iterates items in path order.
    pub fn items(&self) -> impl Iterator<Item = (&str, &Sha256Digest)> {
        self.items.iter().map(|(p, c)| (p.as_str(), c))
    }

    /// Returns the number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Checks if the manifest is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn parse_lines(text: &str, file_name: &str) -> Result<Self, StorageError> {
        let mut manifest = Self::new();

        for line in content_lines(text) {
            let (hex_checksum, path) = split_field(line).ok_or_else(|| {
                StorageError::InvalidData(format!("Malformed line in {}: {}", file_name, line))
            })?;

            let mut checksum = [0u8; 32];
            hex::decode_to_slice(hex_checksum, &mut checksum).map_err(|e| {
                StorageError::InvalidData(format!("Bad checksum in {}: {}", file_name, e))
            })?;

            manifest.add_or_update_item(ManifestItem::new(decode_line_path(path), checksum));
        }

        Ok(manifest)
    }

    fn serialize_lines(&self) -> Vec<u8> {
        let mut out = String::new();
        for (path, checksum) in &self.items {
            out.push_str(&hex::encode(checksum));
            out.push(' ');
            out.push_str(&encode_line_path(path));
            out.push('\n');
        }
        out.into_bytes()
    }
}

/// `manifest-sha256.txt`: checksums of payload files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadManifest(pub BagItManifest);

/// `tagmanifest-sha256.txt`: checksums of the other control documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagManifest(pub BagItManifest);

impl Deref for PayloadManifest {
    type Target = BagItManifest;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for PayloadManifest {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Deref for TagManifest {
    type Target = BagItManifest;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for TagManifest {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl BagItElement for PayloadManifest {
    const FILE_NAME: &'static str = "manifest-sha256.txt";

    fn parse_str(text: &str) -> Result<Self, StorageError> {
        BagItManifest::parse_lines(text, Self::FILE_NAME).map(Self)
    }

    fn serialize(&self) -> Vec<u8> {
        self.0.serialize_lines()
    }

    fn has_values(&self) -> bool {
        !self.0.is_empty()
    }
}

impl BagItElement for TagManifest {
    const FILE_NAME: &'static str = "tagmanifest-sha256.txt";

    fn parse_str(text: &str) -> Result<Self, StorageError> {
        BagItManifest::parse_lines(text, Self::FILE_NAME).map(Self)
    }

    fn serialize(&self) -> Vec<u8> {
        self.0.serialize_lines()
    }

    fn has_values(&self) -> bool {
        !self.0.is_empty()
    }
}
