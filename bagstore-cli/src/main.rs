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

//! bagstore - Main entry point.

use anyhow::Result;
use bagstore_cli::{App, Cli, Config};
use bagstore_core::ServiceError;
use clap::Parser;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, stdout carries command output
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "bagstore_core=info,bagstore_cli=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }

    let app = App::new(config).await?;
    let mut stdout = tokio::io::stdout();

    if let Err(e) = app.execute(cli.command, &mut stdout).await {
        if let Some(service_error) = e.downcast_ref::<ServiceError>() {
            error!(
                "{} (status {}{})",
                service_error,
                service_error.status_code(),
                if service_error.is_retryable() { ", retry" } else { "" }
            );
        }
        return Err(e);
    }

    info!("Done");
    Ok(())
}
