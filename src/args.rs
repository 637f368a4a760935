// Copyright 2024 Felix Engl
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

//! Command-line surface (component K), grounded in the teacher's `clap`-derived
//! `AtraArgs`/`RunMode`: a top-level `generate_example_config` flag kept outside the
//! subcommand enum, plus a `crawl`/`init` subcommand pair.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Two-stage dark-web / surface-web crawler", long_about = None)]
pub struct DarcArgs {
    /// Writes a commented example config to ./config.toml and exits.
    #[arg(long)]
    pub generate_example_config: bool,

    #[command(subcommand)]
    pub mode: Option<RunMode>,
}

#[derive(Subcommand, Debug)]
pub enum RunMode {
    /// Runs the crawl dispatcher until Ctrl-C.
    Crawl {
        /// Folder to load config.toml from; defaults to the working directory.
        #[arg(short, long)]
        config: Option<String>,

        /// A single inline seed URL.
        #[arg(long)]
        seed: Option<String>,

        /// Path to a newline-delimited seed file.
        #[arg(long)]
        seed_file: Option<String>,

        /// Overrides the configured log level.
        #[arg(long)]
        log_level: Option<log::LevelFilter>,
    },
    /// Writes the default config.toml into the working directory.
    Init,
}
