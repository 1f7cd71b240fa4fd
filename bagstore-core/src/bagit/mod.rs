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

//! BagIt control documents.
//!
//! Each dataset version carries:
//! - `bagit.txt`: the marker, written last on publish
//! - `bag-info.txt`: [`BagItInfo`]
//! - `manifest-sha256.txt`: [`PayloadManifest`]
//! - `fetch.txt`: [`BagItFetch`]
//! - `tagmanifest-sha256.txt`: [`TagManifest`]
//!
//! Documents are immutable snapshots in practice: load, transform, store.

pub mod fetch;
pub mod info;
pub mod manifest;

pub use fetch::{BagItFetch, FetchItem};
pub use info::{format_bag_size, BagItInfo, PayloadOxum};
pub use manifest::{BagItManifest, ManifestItem, PayloadManifest, TagManifest};

use crate::error::StorageError;
use tokio::io::{AsyncRead, AsyncReadExt};

/// File name of the BagIt marker.
pub const BAGIT_FILE_NAME: &str = "bagit.txt";

/// Contents of the BagIt marker.
pub const BAGIT_CONTENTS: &[u8] = b"BagIt-Version: 1.0\nTag-File-Character-Encoding: UTF-8\n";

/// A BagIt control document stored next to the payload.
pub trait BagItElement: Default + Send + Sync + Sized + 'static {
    /// File name relative to the version root.
    const FILE_NAME: &'static str;

    /// Parses the document from its UTF-8 text.
    fn parse_str(text: &str) -> Result<Self, StorageError>;

    /// Serializes the document.
    fn serialize(&self) -> Vec<u8>;

    /// False if the document has no content and should not exist in storage.
    fn has_values(&self) -> bool;

    /// Parses the document from a byte slice.
    fn parse_bytes(data: &[u8]) -> Result<Self, StorageError> {
        let text = std::str::from_utf8(data).map_err(|e| {
            StorageError::InvalidData(format!("{} is not valid UTF-8: {}", Self::FILE_NAME, e))
        })?;
        Self::parse_str(text)
    }
}

/// Reads a stream to the end and parses it as `T`.
pub async fn parse_element<T, R>(mut reader: R) -> Result<T, StorageError>
where
    T: BagItElement,
    R: AsyncRead + Unpin,
{
    let mut data = Vec::new();
    reader.read_to_end(&mut data).await?;
    T::parse_bytes(&data)
}

/// Encodes a file path for use in a manifest or fetch line.
///
/// Only `%`, CR and LF are escaped.
pub(crate) fn encode_line_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '%' => out.push_str("%25"),
            '\n' => out.push_str("%0A"),
            '\r' => out.push_str("%0D"),
            c => out.push(c),
        }
    }
    out
}

/// Reverses [`encode_line_path`]. Other percent sequences are kept verbatim.
pub(crate) fn decode_line_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let escape = rest.get(pos..pos + 3).map(|e| e.to_ascii_uppercase());
        match escape.as_deref() {
            Some("%25") => out.push('%'),
            Some("%0A") => out.push('\n'),
            Some("%0D") => out.push('\r'),
            _ => {
                out.push('%');
                rest = &rest[pos + 1..];
                continue;
            }
        }
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    out
}

/// Splits a line at the first run of whitespace.
pub(crate) fn split_field(line: &str) -> Option<(&str, &str)> {
    let (head, tail) = line.split_once(|c: char| c == ' ' || c == '\t')?;
    Some((head, tail.trim_start_matches([' ', '\t'])))
}

/// Iterates non-empty lines, tolerating CRLF endings.
pub(crate) fn content_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .filter(|l| !l.is_empty())
}
