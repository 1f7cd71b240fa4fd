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

//! Dataset version identity and lifecycle types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of one version of a dataset.
///
/// This is the unit of locking, path derivation and publication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetVersion {
    /// Dataset identifier, e.g. `2024-123`.
    pub identifier: String,
    /// Version number, e.g. `1`.
    pub version: String,
}

impl DatasetVersion {
    /// Creates a new dataset version identity.
    pub fn new(identifier: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            version: version.into(),
        }
    }

    /// Returns another version of the same dataset.
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self::new(self.identifier.clone(), version)
    }

    /// Key used for the dataset version reader/writer lock.
    pub fn lock_key(&self) -> String {
        format!("{}-{}", self.identifier, self.version)
    }
}

impl fmt::Display for DatasetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.identifier, self.version)
    }
}

/// Kind of payload file. Determines the payload sub-directory and the
/// default access policy (documentation is always public once published).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Research data.
    Data,
    /// Documentation describing the data.
    Documentation,
}

impl FileType {
    /// All file types, in payload directory order.
    pub const ALL: [FileType; 2] = [FileType::Data, FileType::Documentation];

    /// Name used in storage paths and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Data => "data",
            FileType::Documentation => "documentation",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "data" => Ok(FileType::Data),
            "documentation" => Ok(FileType::Documentation),
            other => Err(format!("Unknown file type: {}", other)),
        }
    }
}

/// Access right recorded in bag-info at publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessRight {
    /// Data files may be served to anyone.
    Public,
    /// Only documentation is served publicly.
    Restricted,
}

impl AccessRight {
    /// Value written to bag-info.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessRight::Public => "public",
            AccessRight::Restricted => "restricted",
        }
    }
}

impl FromStr for AccessRight {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(AccessRight::Public),
            "restricted" => Ok(AccessRight::Restricted),
            other => Err(format!("Unknown access right: {}", other)),
        }
    }
}

/// Dataset version status recorded in bag-info.
///
/// A version without a status is a draft:
/// - `Completed`: published, payload frozen
/// - `Withdrawn`: was published, no longer served publicly
///
/// `Withdrawn` can only be reached from `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetStatus {
    /// Published.
    Completed,
    /// Withdrawn after publication. Data is retained.
    Withdrawn,
}

impl DatasetStatus {
    /// Value written to bag-info.
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetStatus::Completed => "completed",
            DatasetStatus::Withdrawn => "withdrawn",
        }
    }
}

impl FromStr for DatasetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(DatasetStatus::Completed),
            "withdrawn" => Ok(DatasetStatus::Withdrawn),
            other => Err(format!("Unknown dataset status: {}", other)),
        }
    }
}
