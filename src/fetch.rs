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

//! Stage-1 worker (component F, `fetch`): drains the stage-1 queue, performs the
//! transport-level fetch, persists the raw artifact, extracts links, and feeds both
//! queues. Grounded in the reference `darc.crawl.crawler`.

use crate::bootstrap;
use crate::classifier;
use crate::context::CrawlContext;
use crate::errors::HookError;
use crate::extract::extract_links;
use crate::hooks;
use crate::link::Link;
use crate::queue::WriteMode;
use time::OffsetDateTime;

/// Runs one stage-1 crawl of `url`, per §4.F. Never panics and never returns an
/// error to the caller: every failure path is logged and resolved in-place by
/// dropping or requeuing, matching the "no link is silently lost" invariant (§7).
pub async fn fetch(url: String, ctx: &CrawlContext) {
    let link = match Link::parse(&url) {
        Ok(link) => link,
        Err(err) => {
            log::warn!("dropping unparseable stage-1 url {url}: {err}");
            return;
        }
    };

    let now = OffsetDateTime::now_utc();

    match ctx.store.has_raw(now, &link).await {
        Ok(Some(path)) => {
            handle_cache_hit(&link, &path, now, ctx).await;
            return;
        }
        Ok(None) => {}
        Err(err) => log::warn!("could not check raw-artifact cache for {}: {err}", link.url()),
    }

    let new_host = bootstrap::is_new_host(&link, ctx.store.as_ref()).await;

    let session = match classifier::session_for(&link, &ctx.crawl) {
        Ok(session) => session,
        Err(err) => {
            log::warn!("dropping {}: {err}", link.url());
            return;
        }
    };

    if new_host {
        bootstrap::bootstrap_host(&link, &session, ctx.store.as_ref(), ctx.queue.as_ref()).await;
    }

    let response = match hooks::crawl(&link, &session).await {
        Ok(response) => response,
        Err(HookError::InvalidSchema(scheme)) => {
            log::warn!("dropping {} with unsupported scheme {scheme}", link.url());
            return;
        }
        Err(HookError::NoReturn(_)) => {
            log::debug!("{} opted out via a site-specific hook", link.url());
            return;
        }
        Err(HookError::Transport(err)) => {
            log::warn!("transport error fetching {}: {err}, requeuing", link.url());
            requeue_stage1(&link, ctx).await;
            return;
        }
    };

    if let Err(err) = ctx.store.save_headers(now, &link, &response.headers).await {
        log::error!("failed to persist headers for {}: {err}", link.url());
    }

    let is_html = response
        .content_type
        .as_deref()
        .map(|ct| ct.to_ascii_lowercase().contains("html"))
        .unwrap_or(false);
    if !is_html {
        log::warn!(
            "dropping {}: unexpected content type {:?}",
            link.url(),
            response.content_type
        );
        return;
    }

    if response.body.is_empty() {
        log::warn!("empty response body from {}, requeuing", link.url());
        requeue_stage1(&link, ctx).await;
        return;
    }

    if let Err(err) = ctx.store.save_html(now, &link, &response.body, true).await {
        log::error!("failed to persist raw body for {}: {err}", link.url());
    }

    let body_text = String::from_utf8_lossy(&response.body);
    let extracted = extract_links(link.url(), &body_text);
    enqueue_stage1(&extracted, ctx).await;

    if !response.status.is_success() {
        log::warn!("{} returned {}, requeuing", link.url(), response.status);
        requeue_stage1(&link, ctx).await;
        return;
    }

    if let Err(err) = ctx
        .queue
        .save_selenium(&[(now, link.clone())], WriteMode::Replace, None)
        .await
    {
        log::error!("failed to enqueue {} for stage-2: {err}", link.url());
    }
}

/// §4.F step 3: restart-replay optimization. Re-reads a pre-existing raw artifact,
/// extracts its links into stage-2 (paired with `now`, fixing the shape ambiguity
/// flagged in the design notes), and opportunistically re-runs bootstrap.
async fn handle_cache_hit(link: &Link, path: &camino::Utf8Path, now: OffsetDateTime, ctx: &CrawlContext) {
    let body = match ctx.store.read_raw(path).await {
        Ok(body) => body,
        Err(err) => {
            log::warn!("cache-hit raw artifact for {} unreadable: {err}", link.url());
            return;
        }
    };
    let body_text = String::from_utf8_lossy(&body);
    let extracted = extract_links(link.url(), &body_text);
    let entries: Vec<_> = extracted.into_iter().map(|l| (now, l)).collect();
    if let Err(err) = ctx.queue.save_selenium(&entries, WriteMode::Replace, None).await {
        log::error!("failed to enqueue cache-hit links for {}: {err}", link.url());
    }

    if let Ok(session) = classifier::session_for(link, &ctx.crawl) {
        bootstrap::bootstrap_host(link, &session, ctx.store.as_ref(), ctx.queue.as_ref()).await;
    }
}

async fn requeue_stage1(link: &Link, ctx: &CrawlContext) {
    if let Err(err) = ctx
        .queue
        .save_requests(std::slice::from_ref(link), WriteMode::Replace, None)
        .await
    {
        log::error!("failed to requeue {} to stage-1: {err}", link.url());
    }
}

async fn enqueue_stage1(links: &[Link], ctx: &CrawlContext) {
    if links.is_empty() {
        return;
    }
    if let Err(err) = ctx.queue.save_requests(links, WriteMode::Replace, None).await {
        log::error!("failed to enqueue {} extracted links: {err}", links.len());
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
    async fn drops_unparseable_url_without_touching_queue() {
        let (ctx, _dir) = test_context().await;
        fetch("not a url".to_string(), &ctx).await;
        let drawn = ctx.queue.load_requests().await.unwrap();
        assert!(drawn.is_empty());
    }
}
