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

//! Command line arguments.

use bagstore_core::{AccessRight, ByteRange, DatasetVersion, FileType};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Operator command line for bagstore dataset versions.
#[derive(Debug, Parser)]
#[command(name = "bagstore")]
#[command(about = "Versioned BagIt dataset storage")]
pub struct Cli {
    /// Storage root, overrides BAGSTORE_DATA_DIR
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Dataset version addressed by a command.
#[derive(Debug, Clone, Args)]
pub struct VersionArgs {
    /// Dataset identifier, e.g. 2024-123
    pub identifier: String,
    /// Version name
    pub version: String,
}

impl VersionArgs {
    /// Dataset version named by the arguments.
    pub fn dataset_version(&self) -> DatasetVersion {
        DatasetVersion::new(self.identifier.clone(), self.version.clone())
    }
}

/// Subcommands, one per storage operation.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store a local file as a payload file
    Store {
        #[command(flatten)]
        target: VersionArgs,
        /// Path relative to the payload directory
        path: String,
        /// Local file to upload
        source: PathBuf,
        /// Payload type
        #[arg(long = "type", default_value = "data")]
        file_type: FileType,
        /// Content type to record
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Delete a payload file
    Delete {
        #[command(flatten)]
        target: VersionArgs,
        /// Path relative to the payload directory
        path: String,
        /// Payload type
        #[arg(long = "type", default_value = "data")]
        file_type: FileType,
    },
    /// Reference the payload of another version of the same dataset
    Import {
        #[command(flatten)]
        target: VersionArgs,
        /// Version to import from
        #[arg(long)]
        from: String,
        /// Payload type
        #[arg(long = "type", default_value = "data")]
        file_type: FileType,
    },
    /// Write a payload file to stdout or a local file
    Get {
        #[command(flatten)]
        target: VersionArgs,
        /// Path relative to the payload directory
        path: String,
        /// Payload type
        #[arg(long = "type", default_value = "data")]
        file_type: FileType,
        /// Byte range as FROM-TO, FROM- or -SUFFIX
        #[arg(long, value_parser = parse_range, allow_hyphen_values = true)]
        range: Option<ByteRange>,
        /// Apply public access rules
        #[arg(long)]
        public: bool,
        /// Output file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Print size and content type of a payload file as JSON
    Head {
        #[command(flatten)]
        target: VersionArgs,
        /// Path relative to the payload directory
        path: String,
        /// Payload type
        #[arg(long = "type", default_value = "data")]
        file_type: FileType,
        /// Apply public access rules
        #[arg(long)]
        public: bool,
    },
    /// List payload files as JSON
    List {
        #[command(flatten)]
        target: VersionArgs,
    },
    /// Export payload files as a zip archive
    Zip {
        #[command(flatten)]
        target: VersionArgs,
        /// Only include entries starting with this prefix, e.g. data/tables/
        #[arg(long = "filter")]
        filters: Vec<String>,
        /// Output file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Publish a dataset version
    Publish {
        #[command(flatten)]
        target: VersionArgs,
        /// Access right of the data files
        #[arg(long, default_value = "restricted")]
        access_right: AccessRight,
        /// Persistent identifier
        #[arg(long)]
        doi: String,
    },
    /// Withdraw a published dataset version
    Withdraw {
        #[command(flatten)]
        target: VersionArgs,
    },
    /// Print configured limits and backend as JSON
    Info,
}

/// Parses `FROM-TO`, `FROM-` or `-SUFFIX`.
pub fn parse_range(s: &str) -> Result<ByteRange, String> {
    let (from, to) = s
        .split_once('-')
        .ok_or_else(|| format!("Invalid range: {}", s))?;

    let bound = |v: &str| -> Result<Option<u64>, String> {
        if v.is_empty() {
            return Ok(None);
        }
        v.parse()
            .map(Some)
            .map_err(|_| format!("Invalid range bound: {}", v))
    };

    let range = ByteRange::new(bound(from)?, bound(to)?);
    if range.from.is_none() && range.to.is_none() {
        return Err(format!("Invalid range: {}", s));
    }
    Ok(range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("3-5").unwrap(), ByteRange::new(Some(3), Some(5)));
        assert_eq!(parse_range("3-").unwrap(), ByteRange::new(Some(3), None));
        assert_eq!(parse_range("-5").unwrap(), ByteRange::new(None, Some(5)));
        assert!(parse_range("-").is_err());
        assert!(parse_range("5").is_err());
        assert!(parse_range("a-b").is_err());
    }

    #[test]
    fn test_parse_store() {
        let cli = Cli::try_parse_from([
            "bagstore",
            "store",
            "2024-123",
            "1",
            "tables/a.csv",
            "/tmp/a.csv",
            "--type",
            "documentation",
        ])
        .unwrap();

        match cli.command {
            Command::Store {
                target,
                path,
                file_type,
                ..
            } => {
                assert_eq!(target.dataset_version(), DatasetVersion::new("2024-123", "1"));
                assert_eq!(path, "tables/a.csv");
                assert_eq!(file_type, FileType::Documentation);
            }
            other => panic!("Unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_publish_rejects_unknown_access_right() {
        assert!(Cli::try_parse_from([
            "bagstore",
            "publish",
            "2024-123",
            "1",
            "--doi",
            "doi:10.5878/x",
            "--access-right",
            "secret",
        ])
        .is_err());
    }
}
