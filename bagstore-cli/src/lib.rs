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

//! Operator command line for bagstore.
//!
//! Wires a [`bagstore_core::FileService`] to the local filesystem backend
//! and exposes each of its operations as a subcommand.

pub mod app;
pub mod cli;
pub mod config;

pub use app::App;
pub use cli::{Cli, Command};
pub use config::Config;
