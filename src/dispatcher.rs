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

//! The dispatcher (component H): two fixed-size worker pools draw batches off their
//! respective queue, fan each entry out to a task, and idle-sleep when a draw comes
//! back empty. Grounded in the teacher's `app::mod::execute` run loop -- a `tokio`
//! task set bounded by a semaphore, driven until a shutdown signal fires.

use crate::context::CrawlContext;
use crate::{fetch, render};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Runs both stage pools until `shutdown` fires, then waits for in-flight work to
/// drain.
pub async fn run(ctx: CrawlContext, shutdown: CancellationToken) {
    let stage1 = tokio::spawn(run_stage1(ctx.clone(), shutdown.clone()));
    let stage2 = tokio::spawn(run_stage2(ctx.clone(), shutdown.clone()));

    let _ = tokio::join!(stage1, stage2);
}

async fn run_stage1(ctx: CrawlContext, shutdown: CancellationToken) {
    let pool_size = ctx.crawl.requests_pool_size.max(1);
    let semaphore = Arc::new(Semaphore::new(pool_size));
    let idle_sleep = std::time::Duration::from_millis(ctx.crawl.idle_sleep_millis);

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let drawn = match ctx.queue.load_requests().await {
            Ok(drawn) => drawn,
            Err(err) => {
                log::error!("stage-1 draw failed: {err}");
                Vec::new()
            }
        };

        if drawn.is_empty() {
            tokio::select! {
                _ = tokio::time::sleep(idle_sleep) => {}
                _ = shutdown.cancelled() => break,
            }
            continue;
        }

        let mut handles = Vec::with_capacity(drawn.len());
        for entry in drawn {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                fetch::fetch(entry.link.url().to_string(), &ctx).await;
                drop(permit);
            }));
        }

        // §4.H step 3: wait for the whole batch to complete (or be independently
        // requeued) before drawing again, so a drawn-but-still-in-flight entry --
        // re-scored to `now + TimeCache` by `load_requests`, immediately due again
        // when `TimeCache` is unset -- is never redrawn and redispatched while it's
        // still being worked.
        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn run_stage2(ctx: CrawlContext, shutdown: CancellationToken) {
    let pool_size = ctx.crawl.selenium_pool_size.max(1);
    let semaphore = Arc::new(Semaphore::new(pool_size));
    let idle_sleep = std::time::Duration::from_millis(ctx.crawl.idle_sleep_millis);

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let drawn = match ctx.queue.load_selenium().await {
            Ok(drawn) => drawn,
            Err(err) => {
                log::error!("stage-2 draw failed: {err}");
                Vec::new()
            }
        };

        if drawn.is_empty() {
            tokio::select! {
                _ = tokio::time::sleep(idle_sleep) => {}
                _ = shutdown.cancelled() => break,
            }
            continue;
        }

        let mut handles = Vec::with_capacity(drawn.len());
        for entry in drawn {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                render::render(entry.timestamp, entry.link, &ctx).await;
                drop(permit);
            }));
        }

        // §4.H step 3: see the matching comment in `run_stage1`.
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::sql_backend::SqlQueueBackend;
    use crate::store::FsArtifactStore;
    use crate::link::Link;
    use camino::Utf8PathBuf;

    #[tokio::test]
    async fn stops_promptly_when_shutdown_is_already_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_owned()).unwrap();
        let store = FsArtifactStore::new(root);
        let backend = SqlQueueBackend::connect("sqlite::memory:", crate::config::QueueConfig::default())
            .await
            .unwrap();
        let ctx = CrawlContext::new(
            Arc::new(backend),
            Arc::new(store),
            crate::config::CrawlConfig::default(),
        );
        ctx.queue
            .save_requests(&[Link::parse("http://example.com/").unwrap()], crate::queue::WriteMode::Replace, None)
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        shutdown.cancel();

        tokio::time::timeout(std::time::Duration::from_secs(5), run(ctx, shutdown))
            .await
            .expect("dispatcher should stop promptly once shutdown is cancelled");
    }
}
