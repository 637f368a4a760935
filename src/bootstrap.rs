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

//! Per-host bootstrap (component D): robots.txt acquisition and sitemap expansion,
//! performed once per newly-seen host. Grounded in the teacher's
//! `crawl::crawler::sitemaps::retrieve_and_parse` (fetch-or-read-cache, then parse
//! with the `sitemap` crate) and in the reference `darc.crawl.fetch_sitemap`
//! (robots-first, sitemap-per-entry, best-effort throughout).

use crate::classifier::SessionHandle;
use crate::link::Link;
use crate::queue::QueueBackend;
use crate::store::ArtifactStore;
use sitemap::reader::{SiteMapEntity, SiteMapReader};
use std::io::Cursor;

/// Fetches (or reads from cache) `host`'s robots.txt, expands every declared
/// `Sitemap:` entry, and seeds the stage-1 queue with everything they reference.
///
/// Any failure along the way is logged and swallowed: bootstrap is best-effort and
/// must never block the crawl of the link that triggered it (§4.D).
pub async fn bootstrap_host(link: &Link, session: &SessionHandle, store: &dyn ArtifactStore, queue: &dyn QueueBackend) {
    if let Err(err) = try_bootstrap_host(link, session, store, queue).await {
        log::warn!("bootstrap of host {} failed: {err}", link.host());
    }
}

#[derive(Debug, thiserror::Error)]
enum BootstrapError {
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
    #[error(transparent)]
    Queue(#[from] crate::queue::QueueError),
}

async fn try_bootstrap_host(
    link: &Link,
    session: &SessionHandle,
    store: &dyn ArtifactStore,
    queue: &dyn QueueBackend,
) -> Result<(), BootstrapError> {
    let robots_text = fetch_robots_text(link, session, store).await?;
    let sitemap_urls = parse_robots_sitemaps(link, &robots_text);

    let mut discovered = Vec::new();
    for sitemap_url in sitemap_urls {
        match fetch_sitemap_text(link.host(), &sitemap_url, session, store).await {
            Ok(Some(text)) => discovered.extend(parse_sitemap_urls(&text)),
            Ok(None) | Err(_) => continue,
        }
    }

    if discovered.is_empty() {
        return Ok(());
    }
    let links: Vec<Link> = discovered.iter().filter_map(|url| Link::parse(url).ok()).collect();
    queue.save_requests(&links, crate::queue::WriteMode::Replace, None).await?;
    Ok(())
}

/// Step 1: cached robots.txt wins; otherwise fetch `scheme://host/robots.txt`. A
/// transport error here is non-fatal -- treated the same as an empty 2xx body, so
/// the caller always has *some* robots text to look for `Sitemap:` entries in.
async fn fetch_robots_text(
    link: &Link,
    session: &SessionHandle,
    store: &dyn ArtifactStore,
) -> Result<String, BootstrapError> {
    if let Some(path) = store.has_robots(link.host()).await? {
        let bytes = store.read_robots(&path).await?;
        return Ok(String::from_utf8_lossy(&bytes).into_owned());
    }

    let robots_url = format!("{}://{}/robots.txt", link.url().scheme(), link.host());
    let response = match session.client().get(&robots_url).send().await {
        Ok(response) => response,
        Err(err) => {
            log::warn!("failed to fetch robots.txt for {}: {err}", link.host());
            return Ok(String::new());
        }
    };

    if !response.status().is_success() {
        log::debug!(
            "robots.txt for {} returned {}, treating as empty",
            link.host(),
            response.status()
        );
        return Ok(String::new());
    }

    let text = response.text().await.unwrap_or_default();
    store.save_robots(link.host(), text.as_bytes()).await?;
    Ok(text)
}

/// Step 2: pulls every `Sitemap:` directive out of a robots.txt document. Parsed
/// with `texting_robots` for the same reason the teacher does: it's the crate
/// already in the dependency tree for robots-exclusion semantics.
fn parse_robots_sitemaps(link: &Link, robots_text: &str) -> Vec<String> {
    let origin = format!("{}://{}/robots.txt", link.url().scheme(), link.host());
    match texting_robots::Robot::new("*", robots_text.as_bytes()) {
        Ok(robot) => robot.sitemaps,
        Err(_) => {
            log::debug!("could not parse robots.txt at {origin} for sitemap directives");
            Vec::new()
        }
    }
}

/// Step 3: cached-or-fetch for one sitemap URL. Failures are skipped, not fatal --
/// the caller moves on to the next sitemap URL.
async fn fetch_sitemap_text(
    host: &str,
    sitemap_url: &str,
    session: &SessionHandle,
    store: &dyn ArtifactStore,
) -> Result<Option<String>, BootstrapError> {
    if let Some(path) = store.has_sitemap(host, sitemap_url).await? {
        let bytes = store.read_sitemap(&path).await?;
        return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()));
    }

    let response = match session.client().get(sitemap_url).send().await {
        Ok(response) => response,
        Err(err) => {
            log::debug!("failed to fetch sitemap {sitemap_url}: {err}");
            return Ok(None);
        }
    };
    if !response.status().is_success() {
        return Ok(None);
    }
    let text = match response.text().await {
        Ok(text) => text,
        Err(_) => return Ok(None),
    };
    store.save_sitemap(host, sitemap_url, text.as_bytes()).await?;
    Ok(Some(text))
}

/// Step 4: parses a sitemap document (urlset or sitemap-index) into the flat list
/// of referenced URLs, grounded in the teacher's use of the `sitemap` crate.
fn parse_sitemap_urls(text: &str) -> Vec<String> {
    let reader = SiteMapReader::new(Cursor::new(text.as_bytes()));
    let mut out = Vec::new();
    for entity in reader {
        match entity {
            SiteMapEntity::Url(entry) => {
                if let sitemap::structs::Location::Url(url) = entry.loc {
                    out.push(url.to_string());
                }
            }
            SiteMapEntity::SiteMap(entry) => {
                if let sitemap::structs::Location::Url(url) = entry.loc {
                    out.push(url.to_string());
                }
            }
            SiteMapEntity::Err(err) => {
                log::debug!("malformed sitemap entry skipped: {err}");
            }
        }
    }
    out
}

/// `has_folder(link) is None` from §4.D: true exactly when this host has never
/// produced any on-disk artifact.
pub async fn is_new_host(link: &Link, store: &dyn ArtifactStore) -> bool {
    match store.has_folder(link).await {
        Ok(seen) => !seen,
        Err(err) => {
            log::warn!("could not check artifact presence for {}: {err}", link.host());
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sitemap_index_and_urlset() {
        let urlset = r#"<?xml version="1.0"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>http://example.com/a</loc></url>
  <url><loc>http://example.com/b</loc></url>
</urlset>"#;
        let urls = parse_sitemap_urls(urlset);
        assert_eq!(urls, vec!["http://example.com/a", "http://example.com/b"]);
    }

    #[test]
    fn parses_robots_sitemap_directives() {
        let link = Link::parse("http://example.com/").unwrap();
        let robots = "User-agent: *\nDisallow: /private\nSitemap: http://example.com/sitemap.xml\n";
        let sitemaps = parse_robots_sitemaps(&link, robots);
        assert_eq!(sitemaps, vec!["http://example.com/sitemap.xml"]);
    }

    #[tokio::test]
    async fn is_new_host_follows_has_folder() {
        use crate::store::MockArtifactStore;

        let link = Link::parse("http://example.com/").unwrap();

        let mut store = MockArtifactStore::new();
        store.expect_has_folder().returning(|_| Ok(false));
        assert!(is_new_host(&link, &store).await);

        let mut store = MockArtifactStore::new();
        store.expect_has_folder().returning(|_| Ok(true));
        assert!(!is_new_host(&link, &store).await);
    }

    #[tokio::test]
    async fn is_new_host_treats_a_store_error_as_new() {
        use crate::store::{MockArtifactStore, StoreError};
        use camino::Utf8PathBuf;

        let link = Link::parse("http://example.com/").unwrap();
        let mut store = MockArtifactStore::new();
        store.expect_has_folder().returning(|_| {
            Err(StoreError::Io {
                path: Utf8PathBuf::from("/nonexistent"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            })
        });
        assert!(is_new_host(&link, &store).await);
    }
}
