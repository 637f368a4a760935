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

//! Ordered-set queue backend, modelled on Redis `SADD`/`ZADD`/`ZRANGEBYSCORE`.

use super::errors::QueueError;
use super::{passes_link_check, with_retry, QueueBackend, RequestsEntry, SeleniumEntry, WriteMode};
use crate::config::QueueConfig;
use crate::link::Link;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use time::OffsetDateTime;
use uuid::Uuid;

const KEY_HOSTNAME: &str = "queue_hostname";
const KEY_REQUESTS: &str = "queue_requests";
const KEY_SELENIUM: &str = "queue_selenium";

const LOCK_HOSTNAME: &str = "lock_queue_hostname";
const LOCK_REQUESTS: &str = "lock_queue_requests";
const LOCK_SELENIUM: &str = "lock_queue_selenium";

pub struct RedisQueueBackend {
    conn: ConnectionManager,
    config: QueueConfig,
}

impl RedisQueueBackend {
    pub async fn connect(url: &str, config: QueueConfig) -> Result<Self, QueueError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn, config })
    }

    /// Acquires the named lock for up to `LockTimeout`, returning `None` on timeout.
    /// A no-op guard is returned immediately when `RedisLock` is disabled.
    async fn lock(&self, name: &str) -> Result<Option<RedisLockGuard>, QueueError> {
        if !self.config.redis_lock {
            return Ok(Some(RedisLockGuard::noop()));
        }
        let token = Uuid::new_v4().to_string();
        let deadline = tokio::time::Instant::now() + self.config.lock_timeout();
        let mut conn = self.conn.clone();
        loop {
            let acquired: bool = redis::cmd("SET")
                .arg(name)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(5_000)
                .query_async::<_, Option<String>>(&mut conn)
                .await?
                .is_some();
            if acquired {
                return Ok(Some(RedisLockGuard::held(name.to_owned(), token, self.conn.clone())));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
    }

    fn score_of(ts: OffsetDateTime) -> f64 {
        ts.unix_timestamp_nanos() as f64 / 1_000_000_000.0
    }
}

struct RedisLockGuard {
    release: Option<(String, String, ConnectionManager)>,
}

impl RedisLockGuard {
    fn noop() -> Self {
        Self { release: None }
    }
    fn held(name: String, token: String, conn: ConnectionManager) -> Self {
        Self {
            release: Some((name, token, conn)),
        }
    }
}

impl Drop for RedisLockGuard {
    fn drop(&mut self) {
        if let Some((name, token, mut conn)) = self.release.take() {
            // Compare-and-delete so we never release a lock another holder re-acquired
            // after our own PX expiry. Best-effort: Drop cannot be async.
            tokio::spawn(async move {
                const SCRIPT: &str = r#"
                    if redis.call("GET", KEYS[1]) == ARGV[1] then
                        return redis.call("DEL", KEYS[1])
                    else
                        return 0
                    end
                "#;
                let _: Result<i64, _> = redis::Script::new(SCRIPT)
                    .key(name)
                    .arg(token)
                    .invoke_async(&mut conn)
                    .await;
            });
        }
    }
}

#[async_trait]
impl QueueBackend for RedisQueueBackend {
    async fn have_hostname(&self, link: &Link) -> Result<bool, QueueError> {
        with_retry(&self.config, || async {
            let _guard = self.lock(LOCK_HOSTNAME).await?;
            let mut conn = self.conn.clone();
            let added: i64 = conn.sadd(KEY_HOSTNAME, link.host()).await?;
            Ok(added == 0)
        })
        .await
    }

    async fn drop_hostname(&self, host: &str) -> Result<(), QueueError> {
        with_retry(&self.config, || async {
            let mut conn = self.conn.clone();
            let _: i64 = conn.srem(KEY_HOSTNAME, host).await?;
            Ok(())
        })
        .await
    }

    async fn save_requests(
        &self,
        links: &[Link],
        mode: WriteMode,
        score: Option<OffsetDateTime>,
    ) -> Result<(), QueueError> {
        let score = Self::score_of(score.unwrap_or_else(OffsetDateTime::now_utc));
        for chunk in links.chunks(self.config.bulk_size) {
            with_retry(&self.config, || async {
                let _guard = self.lock(LOCK_REQUESTS).await?;
                let mut conn = self.conn.clone();
                for link in chunk {
                    let member = link.to_bytes()?;
                    zadd_one(&mut conn, KEY_REQUESTS, &member, score, mode).await?;
                }
                Ok(())
            })
            .await?;
        }
        Ok(())
    }

    async fn save_selenium(
        &self,
        entries: &[(OffsetDateTime, Link)],
        mode: WriteMode,
        score: Option<OffsetDateTime>,
    ) -> Result<(), QueueError> {
        let score = Self::score_of(score.unwrap_or_else(OffsetDateTime::now_utc));
        for chunk in entries.chunks(self.config.bulk_size) {
            with_retry(&self.config, || async {
                let _guard = self.lock(LOCK_SELENIUM).await?;
                let mut conn = self.conn.clone();
                for (ts, link) in chunk {
                    let member = encode_selenium_member(*ts, link)?;
                    zadd_one(&mut conn, KEY_SELENIUM, &member, score, mode).await?;
                }
                Ok(())
            })
            .await?;
        }
        Ok(())
    }

    async fn drop_requests(&self, link: &Link) -> Result<(), QueueError> {
        with_retry(&self.config, || async {
            let mut conn = self.conn.clone();
            let member = link.to_bytes()?;
            let _: i64 = conn.zrem(KEY_REQUESTS, member).await?;
            Ok(())
        })
        .await
    }

    async fn drop_selenium(&self, link: &Link) -> Result<(), QueueError> {
        with_retry(&self.config, || async {
            let mut conn = self.conn.clone();
            // Selenium members are keyed by the encoded (ts, link); we drop by link
            // alone is not directly supported by a sorted set, so scan the due window.
            let members: Vec<Vec<u8>> = conn.zrange(KEY_SELENIUM, 0, -1).await?;
            for member in members {
                if let Ok((_, decoded)) = decode_selenium_member(&member) {
                    if &decoded == link {
                        let _: i64 = conn.zrem(KEY_SELENIUM, member).await?;
                    }
                }
            }
            Ok(())
        })
        .await
    }

    async fn load_requests(&self) -> Result<Vec<RequestsEntry>, QueueError> {
        let guard = self.lock(LOCK_REQUESTS).await?;
        let Some(_guard) = guard else {
            log::warn!("could not acquire {LOCK_REQUESTS} within timeout, returning empty batch");
            return Ok(Vec::new());
        };
        let now = OffsetDateTime::now_utc();
        let max_score = self
            .config
            .time_cache()
            .map(|tc| Self::score_of(now - tc))
            .unwrap_or_else(|| Self::score_of(now));
        let mut conn = self.conn.clone();
        let members: Vec<Vec<u8>> = conn
            .zrangebyscore_limit(KEY_REQUESTS, f64::MIN, max_score, 0, self.config.max_pool as isize)
            .await?;
        let mut out = Vec::with_capacity(members.len());
        let defer_score = Self::score_of(now + self.config.time_cache().unwrap_or_default());
        for member in &members {
            let link = Link::from_bytes(member)?;
            zadd_one(&mut conn, KEY_REQUESTS, member, defer_score, WriteMode::Replace).await?;
            if !self.config.check || passes_link_check(&link) {
                out.push(RequestsEntry { link });
            }
        }
        if self.config.verbose {
            dump_pool("stage-1", out.iter().map(|e| e.link.url().as_str()));
        }
        Ok(out)
    }

    async fn load_selenium(&self) -> Result<Vec<SeleniumEntry>, QueueError> {
        let guard = self.lock(LOCK_SELENIUM).await?;
        let Some(_guard) = guard else {
            log::warn!("could not acquire {LOCK_SELENIUM} within timeout, returning empty batch");
            return Ok(Vec::new());
        };
        let now = OffsetDateTime::now_utc();
        let max_score = self
            .config
            .time_cache()
            .map(|tc| Self::score_of(now - tc))
            .unwrap_or_else(|| Self::score_of(now));
        let mut conn = self.conn.clone();
        let members: Vec<Vec<u8>> = conn
            .zrangebyscore_limit(KEY_SELENIUM, f64::MIN, max_score, 0, self.config.max_pool as isize)
            .await?;
        let mut out = Vec::with_capacity(members.len());
        let defer_score = Self::score_of(now + self.config.time_cache().unwrap_or_default());
        for member in &members {
            let (timestamp, link) = decode_selenium_member(member)?;
            zadd_one(&mut conn, KEY_SELENIUM, member, defer_score, WriteMode::Replace).await?;
            if !self.config.check || passes_link_check(&link) {
                out.push(SeleniumEntry { timestamp, link });
            }
        }
        if self.config.verbose {
            dump_pool("stage-2", out.iter().map(|e| e.link.url().as_str()));
        }
        Ok(out)
    }
}

/// Dumps the full drawn pool for audit when `Verbose` is enabled (§6).
fn dump_pool<'a>(stage: &str, urls: impl Iterator<Item = &'a str>) {
    let joined = urls.collect::<Vec<_>>().join(", ");
    log::debug!("drew {stage} pool: [{joined}]");
}

async fn zadd_one(
    conn: &mut ConnectionManager,
    key: &str,
    member: &[u8],
    score: f64,
    mode: WriteMode,
) -> Result<(), QueueError> {
    let mut cmd = redis::cmd("ZADD");
    cmd.arg(key);
    match mode {
        WriteMode::Replace => {}
        WriteMode::IfAbsent => {
            cmd.arg("NX");
        }
        WriteMode::IfPresent => {
            cmd.arg("XX");
        }
    }
    cmd.arg(score).arg(member);
    let _: i64 = cmd.query_async(conn).await?;
    Ok(())
}

fn encode_selenium_member(ts: OffsetDateTime, link: &Link) -> Result<Vec<u8>, QueueError> {
    let link_bytes = link.to_bytes()?;
    let mut out = Vec::with_capacity(8 + link_bytes.len());
    out.extend_from_slice(&ts.unix_timestamp().to_be_bytes());
    out.extend_from_slice(&link_bytes);
    Ok(out)
}

fn decode_selenium_member(bytes: &[u8]) -> Result<(OffsetDateTime, Link), QueueError> {
    if bytes.len() < 8 {
        return Err(QueueError::LockPoisoned);
    }
    let (ts_bytes, rest) = bytes.split_at(8);
    let secs = i64::from_be_bytes(ts_bytes.try_into().unwrap());
    let ts = OffsetDateTime::from_unix_timestamp(secs).map_err(|_| QueueError::LockPoisoned)?;
    let link = Link::from_bytes(rest)?;
    Ok((ts, link))
}
