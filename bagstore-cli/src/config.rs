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

//! Configuration for the bagstore command line.

use anyhow::{anyhow, Context};
use bagstore_core::PayloadLimits;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Command line configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Storage backend settings
    pub storage: StorageConfig,
    /// Payload limits applied to every dataset version
    pub limits: PayloadLimits,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the filesystem backend.
    /// Can be set via BAGSTORE_DATA_DIR environment variable.
    pub data_dir: PathBuf,
}

/// Parses a size string like "10GB", "1.5M", "1024KB" or "5000" into bytes.
///
/// Supported suffixes (case-insensitive):
/// - GB, G: Gigabytes
/// - MB, M: Megabytes
/// - KB, K: Kilobytes
/// - B or no suffix: Bytes
///
/// Fractions are rounded down to whole bytes. Values that do not fit in a
/// `u64` are rejected.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim().to_uppercase();

    if s.is_empty() {
        return Err("Empty size string".to_string());
    }

    let num_end = s
        .chars()
        .position(|c| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());

    let (num_str, suffix) = s.split_at(num_end);
    let suffix = suffix.trim();

    let multiplier: u64 = match suffix {
        "GB" | "G" => 1024 * 1024 * 1024,
        "MB" | "M" => 1024 * 1024,
        "KB" | "K" => 1024,
        "B" | "" => 1,
        _ => return Err(format!("Unknown size suffix: {}", suffix)),
    };

    let too_large = || format!("Size out of range: {}", s);

    if !num_str.contains('.') {
        let num: u64 = num_str
            .parse()
            .map_err(|_| format!("Invalid number: {}", num_str))?;
        return num.checked_mul(multiplier).ok_or_else(too_large);
    }

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;
    let bytes = (num * multiplier as f64).floor();
    // u64::MAX rounds up to 2^64 as f64, so the bound is exclusive
    if !bytes.is_finite() || bytes < 0.0 || bytes >= u64::MAX as f64 {
        return Err(too_large());
    }
    Ok(bytes as u64)
}

impl Config {
    /// Loads configuration from `BAGSTORE_*` environment variables.
    pub fn load() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    ///
    /// Unset limits mean unlimited. Malformed values are errors.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup("BAGSTORE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("bagstore-data"));

        let size = |key: &str| -> anyhow::Result<Option<u64>> {
            lookup(key)
                .map(|v| parse_size(&v).map_err(|e| anyhow!("{}: {}", key, e)))
                .transpose()
        };

        let max_file_count = lookup("BAGSTORE_MAX_FILE_COUNT")
            .map(|v| {
                v.trim()
                    .parse::<u64>()
                    .with_context(|| format!("BAGSTORE_MAX_FILE_COUNT: invalid count {}", v))
            })
            .transpose()?;

        Ok(Self {
            storage: StorageConfig { data_dir },
            limits: PayloadLimits {
                max_file_size: size("BAGSTORE_MAX_FILE_SIZE")?,
                max_file_count,
                max_total_size: size("BAGSTORE_MAX_TOTAL_SIZE")?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_parse_size_bytes() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("12B").unwrap(), 12);
    }

    #[test]
    fn test_parse_size_suffixes() {
        assert_eq!(parse_size("1KB").unwrap(), 1024);
        assert_eq!(parse_size("10k").unwrap(), 10 * 1024);
        assert_eq!(parse_size("100mb").unwrap(), 100 * 1024 * 1024);
        assert_eq!(parse_size("1.5M").unwrap(), 1536 * 1024);
        assert_eq!(parse_size("5GB").unwrap(), 5 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_parse_size_invalid() {
        assert!(parse_size("").is_err());
        assert!(parse_size("abc").is_err());
        assert!(parse_size("1TB").is_err());
        assert!(parse_size("1.2.3K").is_err());
        assert!(parse_size(".").is_err());
    }

    #[test]
    fn test_parse_size_overflow() {
        assert_eq!(parse_size("18446744073709551615").unwrap(), u64::MAX);
        assert!(parse_size("18446744073709551616").is_err());
        assert!(parse_size("17179869184G").is_err());
        assert!(parse_size("99999999999999999999GB").is_err());
        assert!(parse_size("17179869184.5G").is_err());
        assert_eq!(parse_size("0.5K").unwrap(), 512);
        assert_eq!(parse_size("0.0001K").unwrap(), 0);
    }

    #[test]
    fn test_defaults_are_unlimited() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.limits, PayloadLimits::default());
        assert!(config.storage.data_dir.ends_with("bagstore-data"));
    }

    #[test]
    fn test_limits_from_variables() {
        let config = Config::from_lookup(lookup(&[
            ("BAGSTORE_DATA_DIR", "/srv/bags"),
            ("BAGSTORE_MAX_FILE_SIZE", "2GB"),
            ("BAGSTORE_MAX_FILE_COUNT", "500"),
            ("BAGSTORE_MAX_TOTAL_SIZE", "10GB"),
        ]))
        .unwrap();

        assert_eq!(config.storage.data_dir, PathBuf::from("/srv/bags"));
        assert_eq!(config.limits.max_file_size, Some(2 * 1024 * 1024 * 1024));
        assert_eq!(config.limits.max_file_count, Some(500));
        assert_eq!(config.limits.max_total_size, Some(10 * 1024 * 1024 * 1024));
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        let err = Config::from_lookup(lookup(&[("BAGSTORE_MAX_FILE_COUNT", "many")])).unwrap_err();
        assert!(err.to_string().contains("BAGSTORE_MAX_FILE_COUNT"));

        let err = Config::from_lookup(lookup(&[("BAGSTORE_MAX_TOTAL_SIZE", "1TB")])).unwrap_err();
        assert!(err.to_string().contains("BAGSTORE_MAX_TOTAL_SIZE"));

        let err = Config::from_lookup(lookup(&[("BAGSTORE_MAX_FILE_SIZE", "99999999999999999999GB")]))
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }
}
