// Copyright 2025 ZeroNet Authors
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

//! # ZeroNet CLI
//!
//! Command-line host for ZeroNet station processes.
//!
//! ## Key Commands
//!
//! - `zeronet run`: Join the center, host the configured stations and read
//!   console commands until `exit`
//! - `zeronet call`: Make one RPC call to a station (outputs raw JSON)
//! - `zeronet command`: Send one management command to the center
//!
//! ## Configuration
//!
//! The host config is a JSON file found through `--config`, then the
//! `ZERONET_HOST_CONFIG` environment variable, then `host.json` in the
//! working directory.

pub mod console;

use std::path::PathBuf;

/// Environment variable naming the host config file.
pub const CONFIG_ENV: &str = "ZERONET_HOST_CONFIG";

/// Config file used when neither the flag nor the environment names one.
pub const DEFAULT_CONFIG: &str = "host.json";

/// Resolves the host config path: flag, then environment, then default.
pub fn config_path(flag: Option<String>, env: Option<String>) -> PathBuf {
    flag.or(env)
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
}
