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

//! The shared, cross-process work queue: a hostname set plus two scored queues
//! (stage-1 `requests`, stage-2 `selenium`), behind a pluggable [`QueueBackend`].

pub mod errors;
pub mod redis_backend;
pub mod sql_backend;

use crate::config::QueueConfig;
use crate::link::Link;
use async_trait::async_trait;
pub use errors::QueueError;
use time::OffsetDateTime;

/// Insert mode for scored queue writes, modelling Redis `ZADD`'s `NX`/`XX` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Always set the score, overwriting any existing entry (the default).
    Replace,
    /// Only insert if the entry is not already present; keep the existing score otherwise.
    IfAbsent,
    /// Only update the score of an entry that is already present.
    IfPresent,
}

/// One entry drawn from the stage-1 queue: always a bare link, per the fixed queue shape.
#[derive(Debug, Clone)]
pub struct RequestsEntry {
    pub link: Link,
}

/// One entry drawn from the stage-2 queue: always a `(timestamp, link)` pair.
#[derive(Debug, Clone)]
pub struct SeleniumEntry {
    pub timestamp: OffsetDateTime,
    pub link: Link,
}

/// The queue backend contract described by the component design: a hostname set plus
/// two scored sets, with bulk writes, deferred draws, and optional named locks.
///
/// Implementations must make `have_hostname` atomic across processes: the backend's
/// native "add to set, report whether it was new" primitive is the only correct basis.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Atomically adds `link.host()` to the hostname set. Returns `true` if the host
    /// was already present (caller must *not* bootstrap), `false` on first sight.
    async fn have_hostname(&self, link: &Link) -> Result<bool, QueueError>;

    /// Idempotent removal of a host from the hostname set.
    async fn drop_hostname(&self, host: &str) -> Result<(), QueueError>;

    /// Adds or rescoring a batch of links into the stage-1 queue. `score` defaults to
    /// now; writes are chunked by `BulkSize` and issued under the requests lock.
    async fn save_requests(
        &self,
        links: &[Link],
        mode: WriteMode,
        score: Option<OffsetDateTime>,
    ) -> Result<(), QueueError>;

    /// Adds or rescoring a batch of `(timestamp, link)` pairs into the stage-2 queue.
    async fn save_selenium(
        &self,
        entries: &[(OffsetDateTime, Link)],
        mode: WriteMode,
        score: Option<OffsetDateTime>,
    ) -> Result<(), QueueError>;

    /// Idempotent removal of one entry from the stage-1 queue.
    async fn drop_requests(&self, link: &Link) -> Result<(), QueueError>;

    /// Idempotent removal of one entry from the stage-2 queue.
    async fn drop_selenium(&self, link: &Link) -> Result<(), QueueError>;

    /// Draws up to `MaxPool` due entries from the stage-1 queue and defers them by
    /// `TimeCache`. Returns an empty batch (with a logged warning) if the requests
    /// lock cannot be acquired within `LockTimeout`.
    async fn load_requests(&self) -> Result<Vec<RequestsEntry>, QueueError>;

    /// Draws up to `MaxPool` due entries from the stage-2 queue and defers them by
    /// `TimeCache`.
    async fn load_selenium(&self) -> Result<Vec<SeleniumEntry>, QueueError>;
}

/// The link-validity filter load operations apply when `Check` is enabled (§6):
/// drops entries whose scheme neither the default transport hook nor a
/// site-specific hook (`javascript:`, see `hooks.rs`) can ever act on, so a draw
/// doesn't hand a worker a link only to have it immediately error out as
/// `InvalidSchema`.
pub fn passes_link_check(link: &Link) -> bool {
    matches!(link.url().scheme(), "http" | "https" | "javascript")
}

/// Retries a fallible backend call with the pacing described by [`QueueConfig`]:
/// sleep `redis_retry` between attempts (or retry immediately if unset), giving up
/// after `max_backend_retries` attempts.
pub async fn with_retry<T, F, Fut>(config: &QueueConfig, mut call: F) -> Result<T, QueueError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, QueueError>>,
{
    let mut attempt = 0u32;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= config.max_backend_retries {
                    log::error!("queue backend call failed after {attempt} attempts: {err}");
                    return Err(QueueError::BackendUnavailable(err.to_string()));
                }
                log::warn!("queue backend call failed (attempt {attempt}): {err}, retrying");
                if let Some(delay) = config.redis_retry() {
                    tokio::time::sleep(delay).await;
                } else {
                    tokio::task::yield_now().await;
                }
            }
        }
    }
}
