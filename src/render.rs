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

//! Stage-2 worker (component G, `render`): drains the stage-2 queue, drives a
//! headless browser to the link, persists the rendered document, and extracts
//! further links back into stage-1. Grounded in the reference `darc.crawl.loader`.

use crate::classifier;
use crate::context::CrawlContext;
use crate::errors::DriverError;
use crate::extract::extract_links;
use crate::link::Link;
use crate::queue::WriteMode;
use time::OffsetDateTime;

/// Renders one `(timestamp, link)` stage-2 entry, per §4.G. Like [`crate::fetch::fetch`],
/// every failure path resolves in-place by dropping or requeuing rather than
/// propagating an error.
pub async fn render(timestamp: OffsetDateTime, link: Link, ctx: &CrawlContext) {
    match ctx.store.has_html(timestamp, &link).await {
        Ok(Some(path)) => {
            handle_cache_hit(&link, &path, ctx).await;
            return;
        }
        Ok(None) => {}
        Err(err) => log::warn!("could not check rendered-artifact cache for {}: {err}", link.url()),
    }

    let driver = match classifier::driver_for(&link, &ctx.crawl).await {
        Ok(driver) => driver,
        Err(err) => {
            log::warn!("no browser driver available for {}: {err}", link.url());
            requeue_stage2(timestamp, &link, ctx).await;
            return;
        }
    };

    if let Err(err) = crate::hooks::load(&link, &driver).await {
        match err {
            DriverError::NoReturn(_) => {
                log::debug!("{} opted out of rendering via a site-specific hook", link.url());
            }
            DriverError::Driver(message) => {
                log::warn!("driver error rendering {}: {message}, requeuing", link.url());
                requeue_stage2(timestamp, &link, ctx).await;
            }
        }
        return;
    }

    let source = match driver.page_source().await {
        Ok(source) => source,
        Err(err) => {
            log::warn!("failed to read rendered source for {}: {err}, requeuing", link.url());
            requeue_stage2(timestamp, &link, ctx).await;
            return;
        }
    };

    if source == ctx.crawl.empty_page {
        log::debug!("{} rendered to the empty-page sentinel, requeuing", link.url());
        requeue_stage2(timestamp, &link, ctx).await;
        return;
    }

    if let Err(err) = ctx.store.save_html(timestamp, &link, source.as_bytes(), false).await {
        log::error!("failed to persist rendered body for {}: {err}", link.url());
    }

    let extracted = extract_links(link.url(), &source);
    if !extracted.is_empty() {
        if let Err(err) = ctx.queue.save_requests(&extracted, WriteMode::Replace, None).await {
            log::error!("failed to enqueue {} links extracted from render: {err}", extracted.len());
        }
    }
}

/// §4.G step 2: the rendered artifact for `(timestamp, link)` already exists --
/// read it back, extract its links into stage-1, and return without touching the
/// driver.
async fn handle_cache_hit(link: &Link, path: &camino::Utf8Path, ctx: &CrawlContext) {
    let body = match ctx.store.read_html(path).await {
        Ok(body) => body,
        Err(err) => {
            log::warn!("cache-hit rendered artifact for {} unreadable: {err}", link.url());
            return;
        }
    };
    let body_text = String::from_utf8_lossy(&body);
    let extracted = extract_links(link.url(), &body_text);
    if !extracted.is_empty() {
        if let Err(err) = ctx.queue.save_requests(&extracted, WriteMode::Replace, None).await {
            log::error!("failed to enqueue cache-hit links for {}: {err}", link.url());
        }
    }
}

async fn requeue_stage2(timestamp: OffsetDateTime, link: &Link, ctx: &CrawlContext) {
    let entry = [(timestamp, link.clone())];
    if let Err(err) = ctx.queue.save_selenium(&entry, WriteMode::Replace, None).await {
        log::error!("failed to requeue {} to stage-2: {err}", link.url());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::sql_backend::SqlQueueBackend;
    use crate::store::FsArtifactStore;
    use camino::Utf8PathBuf;
    use std::sync::Arc;

    async fn test_context() -> (CrawlContext, tempfile::TempDir) {
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
        (ctx, dir)
    }

    #[tokio::test]
    async fn cache_hit_extracts_links_into_stage1_without_touching_the_driver() {
        let (ctx, _dir) = test_context().await;
        let link = Link::parse("http://example.com/a").unwrap();
        let now = OffsetDateTime::now_utc();
        ctx.store
            .save_html(now, &link, br#"<html><body><a href="/b">b</a></body></html>"#, false)
            .await
            .unwrap();
        render(now, link, &ctx).await;

        let selenium = ctx.queue.load_selenium().await.unwrap();
        assert!(selenium.is_empty());
        let requests = ctx.queue.load_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].link.url().as_str(), "http://example.com/b");
    }

    #[tokio::test]
    async fn requeues_when_driver_navigation_fails() {
        // Without the `chrome` feature, `driver_for` hands back a stub whose
        // `navigate` always errors -- exercising the same requeue path a real
        // driver failure would take.
        let (ctx, _dir) = test_context().await;
        let link = Link::parse("http://example.com/a").unwrap();
        let now = OffsetDateTime::now_utc();
        render(now, link.clone(), &ctx).await;
        let drawn = ctx.queue.load_selenium().await.unwrap();
        assert_eq!(drawn.len(), 1);
        assert_eq!(drawn[0].link, link);
    }
}
