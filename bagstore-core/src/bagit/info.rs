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

//! `bag-info.txt`: `Label: value` lines.
//!
//! Known labels are typed. Unknown labels survive a parse/serialize cycle in
//! their original order, after the known ones.

use super::{content_lines, BagItElement};
use crate::error::StorageError;
use crate::types::{AccessRight, DatasetStatus};
use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

const BAGGING_DATE: &str = "Bagging-Date";
const BAG_GROUP_IDENTIFIER: &str = "Bag-Group-Identifier";
const BAG_SIZE: &str = "Bag-Size";
const EXTERNAL_IDENTIFIER: &str = "External-Identifier";
const PAYLOAD_OXUM: &str = "Payload-Oxum";
const ACCESS_RIGHT: &str = "Access-Right";
const DATASET_STATUS: &str = "Dataset-Status";
const VERSION: &str = "Version";

/// Payload octet and stream counts, serialized as `octets.streams`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PayloadOxum {
    /// Total payload bytes.
    pub octet_count: u64,
    /// Number of payload files.
    pub stream_count: u64,
}

impl PayloadOxum {
    /// Creates a new oxum.
    pub fn new(octet_count: u64, stream_count: u64) -> Self {
        Self {
            octet_count,
            stream_count,
        }
    }
}

impl fmt::Display for PayloadOxum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.octet_count, self.stream_count)
    }
}

impl FromStr for PayloadOxum {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (octets, streams) = s
            .split_once('.')
            .ok_or_else(|| format!("Invalid Payload-Oxum: {}", s))?;
        let octet_count = octets
            .parse()
            .map_err(|_| format!("Invalid Payload-Oxum octet count: {}", s))?;
        let stream_count = streams
            .parse()
            .map_err(|_| format!("Invalid Payload-Oxum stream count: {}", s))?;
        Ok(Self::new(octet_count, stream_count))
    }
}

/// Formats a byte count with binary units, e.g. `1.5 KiB`.
pub fn format_bag_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let formatted = format!("{:.2}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}

/// Bag metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BagItInfo {
    /// Date of publication.
    pub bagging_date: Option<NaiveDate>,
    /// Dataset identifier shared by all versions.
    pub bag_group_identifier: Option<String>,
    /// Human readable payload size.
    pub bag_size: Option<String>,
    /// Persistent identifier such as a DOI.
    pub external_identifier: Option<String>,
    /// Payload totals.
    pub payload_oxum: Option<PayloadOxum>,
    /// Access right of the data files.
    pub access_right: Option<AccessRight>,
    /// Lifecycle status. Absent means draft.
    pub dataset_status: Option<DatasetStatus>,
    /// Dataset version.
    pub version: Option<String>,
    /// Unrecognized labels.
    pub other: Vec<(String, String)>,
}

impl BagItInfo {
    /// Creates an empty bag-info.
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&mut self, label: String, value: String) -> Result<(), StorageError> {
        let invalid = |e: String| StorageError::InvalidData(format!("bag-info.txt: {}", e));

        match label.as_str() {
            BAGGING_DATE => {
                let date = NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                    .map_err(|e| invalid(format!("Invalid {}: {}", BAGGING_DATE, e)))?;
                self.bagging_date = Some(date);
            }
            BAG_GROUP_IDENTIFIER => self.bag_group_identifier = Some(value),
            BAG_SIZE => self.bag_size = Some(value),
            EXTERNAL_IDENTIFIER => self.external_identifier = Some(value),
            PAYLOAD_OXUM => self.payload_oxum = Some(value.parse().map_err(invalid)?),
            ACCESS_RIGHT => self.access_right = Some(value.parse().map_err(invalid)?),
            DATASET_STATUS => self.dataset_status = Some(value.parse().map_err(invalid)?),
            VERSION => self.version = Some(value),
            _ => self.other.push((label, value)),
        }

        Ok(())
    }
}

fn push_line(out: &mut String, label: &str, value: &str) {
    out.push_str(label);
    out.push_str(": ");
    out.push_str(value);
    out.push('\n');
}

impl BagItElement for BagItInfo {
    const FILE_NAME: &'static str = "bag-info.txt";

    fn parse_str(text: &str) -> Result<Self, StorageError> {
        let mut entries: Vec<(String, String)> = Vec::new();

        for line in content_lines(text) {
            // Indented lines continue the previous value
            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = entries.last_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                    continue;
                }
            }

            let (label, value) = line.split_once(':').ok_or_else(|| {
                StorageError::InvalidData(format!("Malformed line in {}: {}", Self::FILE_NAME, line))
            })?;
            entries.push((label.trim().to_string(), value.trim().to_string()));
        }

        let mut info = Self::new();
        for (label, value) in entries {
            info.set(label, value)?;
        }
        Ok(info)
    }

    fn serialize(&self) -> Vec<u8> {
        let mut out = String::new();

        if let Some(date) = self.bagging_date {
            push_line(&mut out, BAGGING_DATE, &date.format("%Y-%m-%d").to_string());
        }
        if let Some(v) = &self.bag_group_identifier {
            push_line(&mut out, BAG_GROUP_IDENTIFIER, v);
        }
        if let Some(v) = &self.bag_size {
            push_line(&mut out, BAG_SIZE, v);
        }
        if let Some(v) = &self.external_identifier {
            push_line(&mut out, EXTERNAL_IDENTIFIER, v);
        }
        if let Some(oxum) = self.payload_oxum {
            push_line(&mut out, PAYLOAD_OXUM, &oxum.to_string());
        }
        if let Some(v) = self.access_right {
            push_line(&mut out, ACCESS_RIGHT, v.as_str());
        }
        if let Some(v) = self.dataset_status {
            push_line(&mut out, DATASET_STATUS, v.as_str());
        }
        if let Some(v) = &self.version {
            push_line(&mut out, VERSION, v);
        }
        for (label, value) in &self.other {
            push_line(&mut out, label, value);
        }

        out.into_bytes()
    }

    fn has_values(&self) -> bool {
        self.bagging_date.is_some()
            || self.bag_group_identifier.is_some()
            || self.bag_size.is_some()
            || self.external_identifier.is_some()
            || self.payload_oxum.is_some()
            || self.access_right.is_some()
            || self.dataset_status.is_some()
            || self.version.is_some()
            || !self.other.is_empty()
    }
}
