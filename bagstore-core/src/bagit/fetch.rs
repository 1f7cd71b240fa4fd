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

//! `fetch.txt`: payload files held by another version of the same dataset.
//!
//! Line format: `<url> <length or -> <path>`.

use super::{content_lines, decode_line_path, encode_line_path, split_field, BagItElement};
use crate::error::StorageError;
use std::collections::BTreeMap;

/// One fetch line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchItem {
    /// Path relative to the version root.
    pub file_path: String,
    /// Size in bytes, if known.
    pub length: Option<u64>,
    /// URL relative to the dataset directory.
    pub url: String,
}

impl FetchItem {
    /// Creates a new fetch item.
    pub fn new(file_path: impl Into<String>, length: Option<u64>, url: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            length,
            url: url.into(),
        }
    }
}

/// Fetch document, keyed by file path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BagItFetch {
    items: BTreeMap<String, FetchItem>,
}

impl BagItFetch {
    /// Creates an empty fetch document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an item. Returns `true` if the document changed.
    pub fn add_or_update_item(&mut self, item: FetchItem) -> bool {
        if self.items.get(&item.file_path) == Some(&item) {
            return false;
        }
        self.items.insert(item.file_path.clone(), item);
        true
    }

    /// Removes an item. Returns `true` if the document changed.
    pub fn remove_item(&mut self, file_path: &str) -> bool {
        self.items.remove(file_path).is_some()
    }

    /// Looks up an item by path.
    pub fn try_get_item(&self, file_path: &str) -> Option<&FetchItem> {
        self.items.get(file_path)
    }

    /// Checks if a file is listed.
    pub fn contains(&self, file_path: &str) -> bool {
        self.items.contains_key(file_path)
    }

    /// Iterates items in path order.
    pub fn items(&self) -> impl Iterator<Item = &FetchItem> {
        self.items.values()
    }

    /// Returns the number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Checks if the document is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl BagItElement for BagItFetch {
    const FILE_NAME: &'static str = "fetch.txt";

    fn parse_str(text: &str) -> Result<Self, StorageError> {
        let mut fetch = Self::new();

        for line in content_lines(text) {
            let malformed =
                || StorageError::InvalidData(format!("Malformed line in {}: {}", Self::FILE_NAME, line));

            let (url, rest) = split_field(line).ok_or_else(malformed)?;
            let (length, path) = split_field(rest).ok_or_else(malformed)?;

            let length = match length {
                "-" => None,
                n => Some(n.parse::<u64>().map_err(|_| malformed())?),
            };

            fetch.add_or_update_item(FetchItem::new(decode_line_path(path), length, url));
        }

        Ok(fetch)
    }

    fn serialize(&self) -> Vec<u8> {
        let mut out = String::new();
        for item in self.items.values() {
            out.push_str(&item.url);
            out.push(' ');
            match item.length {
                Some(n) => out.push_str(&n.to_string()),
                None => out.push('-'),
            }
            out.push(' ');
            out.push_str(&encode_line_path(&item.file_path));
            out.push('\n');
        }
        out.into_bytes()
    }

    fn has_values(&self) -> bool {
        !self.items.is_empty()
    }
}
