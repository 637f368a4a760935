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

mod args;

use args::{DarcArgs, RunMode};
use clap::Parser;
use darc_rs::config::{BackendKind, Config};
use darc_rs::context::CrawlContext;
use darc_rs::queue::redis_backend::RedisQueueBackend;
use darc_rs::queue::sql_backend::SqlQueueBackend;
use darc_rs::queue::{QueueBackend, WriteMode};
use darc_rs::seed::SeedDefinition;
use darc_rs::store::FsArtifactStore;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn main() -> ExitCode {
    let args = DarcArgs::parse();

    if args.generate_example_config {
        return match Config::write_example("./config.toml") {
            Ok(()) => {
                println!("Wrote example config to ./config.toml");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("failed to write example config: {err}");
                ExitCode::FAILURE
            }
        };
    }

    match args.mode {
        Some(RunMode::Init) => match Config::write_example("./config.toml") {
            Ok(()) => {
                println!("Wrote default config to ./config.toml");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("failed to write default config: {err}");
                ExitCode::FAILURE
            }
        },
        Some(RunMode::Crawl {
            config,
            seed,
            seed_file,
            log_level,
        }) => run_crawl(config, seed, seed_file, log_level),
        None => {
            eprintln!("no subcommand given; run with --help");
            ExitCode::FAILURE
        }
    }
}

fn run_crawl(
    config_folder: Option<String>,
    seed: Option<String>,
    seed_file: Option<String>,
    log_level_override: Option<log::LevelFilter>,
) -> ExitCode {
    let mut config = match &config_folder {
        Some(folder) => match Config::load_from(folder.as_str()) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("failed to load config from {folder}: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => Config::discover_or_default(),
    };

    if let Some(level) = log_level_override {
        config.system.log_level = level;
    }

    darc_rs::logging::configure_logging(&config);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start tokio runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async move { run_crawl_async(config, seed, seed_file).await })
}

async fn run_crawl_async(config: Config, seed: Option<String>, seed_file: Option<String>) -> ExitCode {
    let queue: Arc<dyn QueueBackend> = match build_queue(&config).await {
        Ok(queue) => queue,
        Err(err) => {
            log::error!("failed to connect to queue backend: {err}");
            return ExitCode::FAILURE;
        }
    };

    let store = Arc::new(FsArtifactStore::new(config.paths.root.clone()));
    let ctx = CrawlContext::new(queue, store, config.crawl.clone());

    if let Err(err) = seed_queue(&ctx, seed, seed_file).await {
        log::error!("failed to seed stage-1 queue: {err}");
        return ExitCode::FAILURE;
    }

    let shutdown = CancellationToken::new();
    let shutdown_for_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("received Ctrl-C, shutting down");
            shutdown_for_signal.cancel();
        }
    });

    log::info!("crawl dispatcher starting");
    darc_rs::dispatcher::run(ctx, shutdown).await;
    log::info!("crawl dispatcher stopped");
    ExitCode::SUCCESS
}

async fn build_queue(config: &Config) -> Result<Arc<dyn QueueBackend>, anyhow::Error> {
    match config.queue.flag_db {
        BackendKind::OrderedSet => {
            let url = config
                .connections
                .redis_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("flag_db=ordered_set requires connections.redis_url"))?;
            let backend = RedisQueueBackend::connect(url, config.queue.clone()).await?;
            Ok(Arc::new(backend))
        }
        BackendKind::Relational => {
            let url = config
                .connections
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("flag_db=relational requires connections.database_url"))?;
            let backend = SqlQueueBackend::connect(url, config.queue.clone()).await?;
            Ok(Arc::new(backend))
        }
    }
}

async fn seed_queue(ctx: &CrawlContext, seed: Option<String>, seed_file: Option<String>) -> Result<(), anyhow::Error> {
    let definition = match (seed, seed_file) {
        (Some(url), _) => SeedDefinition::Single(url),
        (None, Some(path)) => SeedDefinition::File(path),
        (None, None) => return Ok(()),
    };

    let urls = definition.resolve()?;
    let links: Vec<_> = urls
        .into_iter()
        .filter_map(|url| match darc_rs::link::Link::parse(&url) {
            Ok(link) => Some(link),
            Err(err) => {
                log::warn!("skipping unparseable seed url {url}: {err}");
                None
            }
        })
        .collect();

    if links.is_empty() {
        return Ok(());
    }

    log::info!("seeding stage-1 queue with {} urls", links.len());
    ctx.queue.save_requests(&links, WriteMode::Replace, None).await?;
    Ok(())
}
