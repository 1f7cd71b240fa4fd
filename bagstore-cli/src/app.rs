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

//! Application initialization and command dispatch.
//!
//! This module handles:
//! - Storage backend initialization
//! - Wiring of the lock table and file service
//! - Running one command against the service

use crate::cli::Command;
use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use bagstore_core::{FileService, FileSystemStorage, InMemoryLockService};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::info;

/// Size and content type printed by `head`.
#[derive(Debug, Serialize)]
struct HeadOutput {
    size: u64,
    content_type: Option<String>,
}

/// Main application.
pub struct App {
    service: FileService,
}

impl App {
    /// Creates a new application instance.
    ///
    /// Creates the storage root if it does not exist.
    pub async fn new(config: Config) -> Result<Self> {
        info!("Initializing bagstore...");

        tokio::fs::create_dir_all(&config.storage.data_dir)
            .await
            .with_context(|| format!("Failed to create {:?}", config.storage.data_dir))?;

        let storage = FileSystemStorage::new(&config.storage.data_dir).await?;
        let service = FileService::new(
            Arc::new(storage),
            Arc::new(InMemoryLockService::new()),
            config.limits,
        );

        info!("Storage path: {:?}", config.storage.data_dir);

        Ok(Self { service })
    }

    /// Runs one command. Results are written to `out`.
    pub async fn execute<W>(&self, command: Command, out: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        match command {
            Command::Store {
                target,
                path,
                source,
                file_type,
                content_type,
            } => {
                let dv = target.dataset_version();
                let mut file = tokio::fs::File::open(&source)
                    .await
                    .with_context(|| format!("Failed to open {:?}", source))?;
                let length = file.metadata().await?.len();

                let stored = self
                    .service
                    .store(
                        &dv,
                        file_type,
                        &path,
                        &mut file,
                        Some(length),
                        content_type.as_deref(),
                    )
                    .await?;
                write_json(out, &stored).await
            }
            Command::Delete {
                target,
                path,
                file_type,
            } => {
                self.service
                    .delete(&target.dataset_version(), file_type, &path)
                    .await?;
                Ok(())
            }
            Command::Import {
                target,
                from,
                file_type,
            } => {
                self.service
                    .import(&target.dataset_version(), &from, file_type)
                    .await?;
                Ok(())
            }
            Command::Get {
                target,
                path,
                file_type,
                range,
                public,
                output,
            } => {
                let dv = target.dataset_version();
                let data = self
                    .service
                    .get_data(&dv, file_type, &path, range, public)
                    .await?
                    .ok_or_else(|| anyhow!("{} not found in {}", path, dv))?;

                let mut stream = data.stream;
                match output {
                    Some(output) => {
                        let mut file = create_output(&output).await?;
                        tokio::io::copy(&mut stream, &mut file).await?;
                        file.flush().await?;
                    }
                    None => {
                        tokio::io::copy(&mut stream, out).await?;
                        out.flush().await?;
                    }
                }
                Ok(())
            }
            Command::Head {
                target,
                path,
                file_type,
                public,
            } => {
                let dv = target.dataset_version();
                let data = self
                    .service
                    .get_metadata(&dv, file_type, &path, public)
                    .await?
                    .ok_or_else(|| anyhow!("{} not found in {}", path, dv))?;
                write_json(
                    out,
                    &HeadOutput {
                        size: data.size,
                        content_type: data.content_type,
                    },
                )
                .await
            }
            Command::List { target } => {
                let files = self.service.list(&target.dataset_version()).await?;
                write_json(out, &files).await
            }
            Command::Zip {
                target,
                filters,
                output,
            } => {
                let dv = target.dataset_version();
                match output {
                    Some(output) => {
                        let file = create_output(&output).await?;
                        self.service.write_data_as_zip(&dv, &filters, file).await?;
                    }
                    None => {
                        self.service.write_data_as_zip(&dv, &filters, &mut *out).await?;
                    }
                }
                Ok(())
            }
            Command::Publish {
                target,
                access_right,
                doi,
            } => {
                self.service
                    .publish(&target.dataset_version(), access_right, &doi)
                    .await?;
                Ok(())
            }
            Command::Withdraw { target } => {
                self.service.withdraw(&target.dataset_version()).await?;
                Ok(())
            }
            Command::Info => write_json(out, &self.service.system_information()).await,
        }
    }
}

async fn create_output(path: &Path) -> Result<tokio::fs::File> {
    tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create {:?}", path))
}

async fn write_json<W, T>(out: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
    T: Serialize + ?Sized,
{
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    out.write_all(&bytes).await?;
    out.flush().await?;
    Ok(())
}
