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

//! The artifact store (component B): deterministic, idempotent persistence of raw
//! bodies, rendered HTML, headers, robots, and sitemap documents. The core only
//! branches on presence; it never interprets the paths the store hands back.

use crate::link::Link;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use time::OffsetDateTime;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("artifact store io error at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The contract §6 describes: five presence queries and four writers, all keyed by
/// `(timestamp, link)` or, for host-scoped documents, by `host` alone.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Has this host ever produced any on-disk artifact (any timestamp)?
    async fn has_folder(&self, link: &Link) -> Result<bool, StoreError>;

    /// Path to a raw body artifact for `(timestamp, link)`, if one exists.
    async fn has_raw(&self, timestamp: OffsetDateTime, link: &Link) -> Result<Option<Utf8PathBuf>, StoreError>;

    /// Path to a rendered-HTML artifact for `(timestamp, link)`, if one exists.
    async fn has_html(&self, timestamp: OffsetDateTime, link: &Link) -> Result<Option<Utf8PathBuf>, StoreError>;

    /// Path to a cached robots.txt for `host`, if one exists.
    async fn has_robots(&self, host: &str) -> Result<Option<Utf8PathBuf>, StoreError>;

    /// Path to a cached sitemap document for `(host, sitemap_url)`, if one exists.
    async fn has_sitemap(&self, host: &str, sitemap_url: &str) -> Result<Option<Utf8PathBuf>, StoreError>;

    async fn save_headers(&self, timestamp: OffsetDateTime, link: &Link, headers: &str) -> Result<(), StoreError>;

    /// Persists a body for `(timestamp, link)`; `raw` selects the transport-fetched
    /// body over the browser-rendered one.
    async fn save_html(
        &self,
        timestamp: OffsetDateTime,
        link: &Link,
        body: &[u8],
        raw: bool,
    ) -> Result<(), StoreError>;

    async fn save_robots(&self, host: &str, body: &[u8]) -> Result<(), StoreError>;

    async fn save_sitemap(&self, host: &str, sitemap_url: &str, body: &[u8]) -> Result<(), StoreError>;

    async fn read_raw(&self, path: &Utf8Path) -> Result<Vec<u8>, StoreError>;

    async fn read_html(&self, path: &Utf8Path) -> Result<Vec<u8>, StoreError>;

    async fn read_robots(&self, path: &Utf8Path) -> Result<Vec<u8>, StoreError>;

    async fn read_sitemap(&self, path: &Utf8Path) -> Result<Vec<u8>, StoreError>;
}

/// Filesystem-rooted reference implementation, grounded in the teacher's
/// `io::fs` conventions (deterministic, content-independent file naming via
/// [`Link::name`]) but trimmed to the artifact shapes this crate persists.
///
/// Layout: `<root>/<host>/<YYYYMMDD>/<link-name>.{raw,html}`,
/// `<root>/<host>/robots.txt`, `<root>/<host>/sitemaps/<sha-of-url>.xml`.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: Utf8PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    fn host_dir(&self, host: &str) -> Utf8PathBuf {
        self.root.join(host)
    }

    fn day_dir(&self, host: &str, timestamp: OffsetDateTime) -> Utf8PathBuf {
        self.host_dir(host).join(format!(
            "{:04}{:02}{:02}",
            timestamp.year(),
            u8::from(timestamp.month()),
            timestamp.day()
        ))
    }

    fn raw_path(&self, timestamp: OffsetDateTime, link: &Link) -> Utf8PathBuf {
        self.day_dir(link.host(), timestamp)
            .join(format!("{}.raw", link.name()))
    }

    fn html_path(&self, timestamp: OffsetDateTime, link: &Link) -> Utf8PathBuf {
        self.day_dir(link.host(), timestamp)
            .join(format!("{}.html", link.name()))
    }

    fn headers_path(&self, timestamp: OffsetDateTime, link: &Link) -> Utf8PathBuf {
        self.day_dir(link.host(), timestamp)
            .join(format!("{}.headers", link.name()))
    }

    fn robots_path(&self, host: &str) -> Utf8PathBuf {
        self.host_dir(host).join("robots.txt")
    }

    fn sitemap_path(&self, host: &str, sitemap_url: &str) -> Utf8PathBuf {
        self.host_dir(host)
            .join("sitemaps")
            .join(format!("{}.xml", sitemap_digest(sitemap_url)))
    }

    async fn write_bytes(&self, path: &Utf8Path, bytes: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_err(parent, source))?;
        }
        tokio::fs::write(path, bytes)
            .await
            .map_err(|source| io_err(path, source))
    }

    async fn read_bytes(&self, path: &Utf8Path) -> Result<Vec<u8>, StoreError> {
        tokio::fs::read(path).await.map_err(|source| io_err(path, source))
    }

    async fn path_if_exists(&self, path: Utf8PathBuf) -> Result<Option<Utf8PathBuf>, StoreError> {
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Ok(Some(path)),
            Ok(false) => Ok(None),
            Err(source) => Err(io_err(&path, source)),
        }
    }
}

fn io_err(path: &Utf8Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_owned(),
        source,
    }
}

fn sitemap_digest(sitemap_url: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(sitemap_url.as_bytes());
    data_encoding::HEXLOWER.encode(&hasher.finalize())
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn has_folder(&self, link: &Link) -> Result<bool, StoreError> {
        let dir = self.host_dir(link.host());
        match tokio::fs::try_exists(&dir).await {
            Ok(exists) => Ok(exists),
            Err(source) => Err(io_err(&dir, source)),
        }
    }

    async fn has_raw(&self, timestamp: OffsetDateTime, link: &Link) -> Result<Option<Utf8PathBuf>, StoreError> {
        self.path_if_exists(self.raw_path(timestamp, link)).await
    }

    async fn has_html(&self, timestamp: OffsetDateTime, link: &Link) -> Result<Option<Utf8PathBuf>, StoreError> {
        self.path_if_exists(self.html_path(timestamp, link)).await
    }

    async fn has_robots(&self, host: &str) -> Result<Option<Utf8PathBuf>, StoreError> {
        self.path_if_exists(self.robots_path(host)).await
    }

    async fn has_sitemap(&self, host: &str, sitemap_url: &str) -> Result<Option<Utf8PathBuf>, StoreError> {
        self.path_if_exists(self.sitemap_path(host, sitemap_url)).await
    }

    async fn save_headers(&self, timestamp: OffsetDateTime, link: &Link, headers: &str) -> Result<(), StoreError> {
        self.write_bytes(&self.headers_path(timestamp, link), headers.as_bytes())
            .await
    }

    async fn save_html(
        &self,
        timestamp: OffsetDateTime,
        link: &Link,
        body: &[u8],
        raw: bool,
    ) -> Result<(), StoreError> {
        let path = if raw {
            self.raw_path(timestamp, link)
        } else {
            self.html_path(timestamp, link)
        };
        self.write_bytes(&path, body).await
    }

    async fn save_robots(&self, host: &str, body: &[u8]) -> Result<(), StoreError> {
        self.write_bytes(&self.robots_path(host), body).await
    }

    async fn save_sitemap(&self, host: &str, sitemap_url: &str, body: &[u8]) -> Result<(), StoreError> {
        self.write_bytes(&self.sitemap_path(host, sitemap_url), body).await
    }

    async fn read_raw(&self, path: &Utf8Path) -> Result<Vec<u8>, StoreError> {
        self.read_bytes(path).await
    }

    async fn read_html(&self, path: &Utf8Path) -> Result<Vec<u8>, StoreError> {
        self.read_bytes(path).await
    }

    async fn read_robots(&self, path: &Utf8Path) -> Result<Vec<u8>, StoreError> {
        self.read_bytes(path).await
    }

    async fn read_sitemap(&self, path: &Utf8Path) -> Result<Vec<u8>, StoreError> {
        self.read_bytes(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (FsArtifactStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_owned()).unwrap();
        (FsArtifactStore::new(root), dir)
    }

    #[tokio::test]
    async fn raw_write_then_presence_and_readback() {
        let (store, _dir) = temp_store();
        let link = Link::parse("http://example.com/a").unwrap();
        let now = OffsetDateTime::now_utc();
        assert!(store.has_raw(now, &link).await.unwrap().is_none());
        store.save_html(now, &link, b"<html></html>", true).await.unwrap();
        let path = store.has_raw(now, &link).await.unwrap().unwrap();
        assert_eq!(store.read_raw(&path).await.unwrap(), b"<html></html>");
    }

    #[tokio::test]
    async fn has_folder_reflects_any_host_write() {
        let (store, _dir) = temp_store();
        let link = Link::parse("http://example.com/a").unwrap();
        assert!(!store.has_folder(&link).await.unwrap());
        store.save_robots("example.com", b"").await.unwrap();
        assert!(store.has_folder(&link).await.unwrap());
    }

    #[tokio::test]
    async fn sitemap_round_trips_by_url_digest() {
        let (store, _dir) = temp_store();
        store
            .save_sitemap("example.com", "http://example.com/sitemap.xml", b"<urlset/>")
            .await
            .unwrap();
        let path = store
            .has_sitemap("example.com", "http://example.com/sitemap.xml")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(store.read_sitemap(&path).await.unwrap(), b"<urlset/>");
    }
}
