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

//! Storage key derivation for dataset versions.
//!
//! Layout of one dataset version:
//!
//! ```text
//! [<prefix>/]<identifier>/<identifier>-<version>/
//!     bagit.txt, bag-info.txt, manifest-sha256.txt, fetch.txt, tagmanifest-sha256.txt
//!     data/data/...            payload of type data
//!     data/documentation/...   payload of type documentation
//! ```
//!
//! Every function here is pure. [`validate_file_path`] is the only traversal
//! defense and must run before any storage backend call.

use crate::error::{ServiceError, StorageError};
use crate::types::{DatasetVersion, FileType};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Identifier prefixes that shard into their own directory regardless of `-`.
pub const LEGACY_PREFIXES: [&str; 3] = ["ecds", "ext", "snd"];

/// Everything except RFC 3986 unreserved characters is escaped.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Prefix of fetch URLs. They are relative to the dataset directory.
const FETCH_URL_PREFIX: &str = "../";

/// Returns the routing prefix for a dataset identifier, if any.
fn base_prefix(identifier: &str) -> Option<&str> {
    if let Some(prefix) = LEGACY_PREFIXES.iter().find(|p| identifier.starts_with(**p)) {
        return Some(prefix);
    }

    match identifier.find('-') {
        Some(index) if index > 0 => Some(&identifier[..index]),
        _ => None,
    }
}

/// Directory holding every version of a dataset, with trailing `/`.
pub fn dataset_path(dv: &DatasetVersion) -> String {
    match base_prefix(&dv.identifier) {
        Some(prefix) => format!("{}/{}/", prefix, dv.identifier),
        None => format!("{}/", dv.identifier),
    }
}

/// Name of the version directory: `<identifier>-<version>`.
pub fn version_path(dv: &DatasetVersion) -> String {
    format!("{}-{}", dv.identifier, dv.version)
}

/// Root of a dataset version, with trailing `/`.
pub fn dataset_version_path(dv: &DatasetVersion) -> String {
    format!("{}{}/", dataset_path(dv), version_path(dv))
}

/// Payload directory relative to the version root: `data/` or `data/<type>/`.
pub fn payload_path(file_type: Option<FileType>) -> String {
    match file_type {
        Some(t) => format!("data/{}/", t.as_str()),
        None => "data/".to_string(),
    }
}

/// Full storage key of a file given its path relative to the version root.
pub fn full_file_path(dv: &DatasetVersion, file_path: &str) -> String {
    format!("{}{}", dataset_version_path(dv), file_path)
}

/// Validates a caller supplied relative path and prefixes it with the
/// payload directory of `file_type`.
///
/// Rejects empty, `.` and `..` segments (which also covers leading,
/// trailing and doubled `/`).
pub fn validate_file_path(file_type: FileType, file_path: &str) -> Result<String, ServiceError> {
    let illegal = file_path
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..");

    if illegal {
        return Err(ServiceError::IllegalPath {
            path: file_path.to_string(),
        });
    }

    Ok(format!("{}{}", payload_path(Some(file_type)), file_path))
}

/// Determines the file type of a path relative to the version root.
pub fn file_type_of(file_path: &str) -> Option<FileType> {
    FileType::ALL
        .into_iter()
        .find(|t| file_path.starts_with(&payload_path(Some(*t))))
}

/// Strips the payload directory of `file_type` from a version-relative path.
pub fn strip_payload_path(file_type: FileType, file_path: &str) -> &str {
    let prefix_len = payload_path(Some(file_type)).len();
    file_path.get(prefix_len..).unwrap_or(file_path)
}

/// Percent-encodes every segment of a `/` separated path.
pub fn url_encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Decodes a path produced by [`url_encode_path`].
pub fn decode_url_encoded_path(path: &str) -> Result<String, StorageError> {
    path.split('/')
        .map(|segment| {
            percent_decode_str(segment)
                .decode_utf8()
                .map(|s| s.into_owned())
                .map_err(|e| StorageError::InvalidData(format!("Bad URL encoding: {}", e)))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(|segments| segments.join("/"))
}

/// Fetch URL referencing `file_path` (version-relative) inside `from`.
pub fn fetch_url(from: &DatasetVersion, file_path: &str) -> String {
    format!(
        "{}{}/{}",
        FETCH_URL_PREFIX,
        url_encode_path(&version_path(from)),
        url_encode_path(file_path)
    )
}

/// Resolves a fetch URL into a full storage key.
///
/// Fetch URLs are relative to the dataset directory of `dv` and may only
/// point into a sibling version of the same dataset.
pub fn resolve_fetch_url(dv: &DatasetVersion, url: &str) -> Result<String, StorageError> {
    let relative = url
        .strip_prefix(FETCH_URL_PREFIX)
        .ok_or_else(|| StorageError::InvalidData(format!("Unsupported fetch URL: {}", url)))?;
    let decoded = decode_url_encoded_path(relative)?;

    if decoded.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
        return Err(StorageError::InvalidData(format!(
            "Fetch URL escapes dataset: {}",
            url
        )));
    }

    Ok(format!("{}{}", dataset_path(dv), decoded))
}
