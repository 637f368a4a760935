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

//! Relational queue backend: three tables (`HostnameQueue`, `RequestsQueue`,
//! `SeleniumQueue`) with columns `(text, hash, link_blob, timestamp)` and uniqueness
//! on `text`, reached through connection-pooled transactions and batched upserts.

use super::errors::QueueError;
use super::{passes_link_check, with_retry, QueueBackend, RequestsEntry, SeleniumEntry, WriteMode};
use crate::config::QueueConfig;
use crate::link::Link;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use time::OffsetDateTime;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS HostnameQueue (
    text TEXT PRIMARY KEY
);
CREATE TABLE IF NOT EXISTS RequestsQueue (
    text TEXT PRIMARY KEY,
    hash TEXT NOT NULL,
    link_blob BLOB NOT NULL,
    timestamp REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_requests_timestamp ON RequestsQueue(timestamp);
CREATE TABLE IF NOT EXISTS SeleniumQueue (
    text TEXT PRIMARY KEY,
    hash TEXT NOT NULL,
    link_blob BLOB NOT NULL,
    timestamp REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_selenium_timestamp ON SeleniumQueue(timestamp);
"#;

pub struct SqlQueueBackend {
    pool: SqlitePool,
    config: QueueConfig,
}

impl SqlQueueBackend {
    /// Opens (and migrates) the relational backend at `database_url`, an
    /// `sqlx`-style connection string (e.g. `sqlite://darc_data/queue.sqlite`).
    pub async fn connect(database_url: &str, config: QueueConfig) -> Result<Self, QueueError> {
        let options: SqliteConnectOptions = database_url.parse().map_err(QueueError::Sql)?;
        let options = options.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;
        sqlx::query(SCHEMA_SQL).execute(&pool).await?;
        Ok(Self { pool, config })
    }

    fn score_of(ts: OffsetDateTime) -> f64 {
        ts.unix_timestamp_nanos() as f64 / 1_000_000_000.0
    }

    fn text_key(link: &Link) -> String {
        link.url().as_str().to_string()
    }

    fn hash_of(link: &Link) -> String {
        let mut hasher = Sha256::new();
        hasher.update(link.url().as_str().as_bytes());
        data_encoding::HEXLOWER.encode(&hasher.finalize())
    }

}

#[async_trait]
impl QueueBackend for SqlQueueBackend {
    async fn have_hostname(&self, link: &Link) -> Result<bool, QueueError> {
        with_retry(&self.config, || async {
            let mut tx = self.pool.begin().await?;
            let result = sqlx::query("INSERT INTO HostnameQueue (text) VALUES (?) ON CONFLICT(text) DO NOTHING")
                .bind(link.host())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(result.rows_affected() == 0)
        })
        .await
    }

    async fn drop_hostname(&self, host: &str) -> Result<(), QueueError> {
        with_retry(&self.config, || async {
            sqlx::query("DELETE FROM HostnameQueue WHERE text = ?")
                .bind(host)
                .execute(&self.pool)
                .await?;
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
                let mut tx = self.pool.begin().await?;
                for link in chunk {
                    let text = Self::text_key(link);
                    let hash = Self::hash_of(link);
                    let blob = link.to_bytes()?;
                    upsert_in_tx(&mut tx, "RequestsQueue", &text, &hash, &blob, score, mode).await?;
                }
                tx.commit().await?;
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
                let mut tx = self.pool.begin().await?;
                for (ts, link) in chunk {
                    let text = Self::text_key(link);
                    let hash = Self::hash_of(link);
                    let mut blob = ts.unix_timestamp().to_be_bytes().to_vec();
                    blob.extend_from_slice(&link.to_bytes()?);
                    upsert_in_tx(&mut tx, "SeleniumQueue", &text, &hash, &blob, score, mode).await?;
                }
                tx.commit().await?;
                Ok(())
            })
            .await?;
        }
        Ok(())
    }

    async fn drop_requests(&self, link: &Link) -> Result<(), QueueError> {
        with_retry(&self.config, || async {
            sqlx::query("DELETE FROM RequestsQueue WHERE text = ?")
                .bind(Self::text_key(link))
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn drop_selenium(&self, link: &Link) -> Result<(), QueueError> {
        with_retry(&self.config, || async {
            sqlx::query("DELETE FROM SeleniumQueue WHERE text = ?")
                .bind(Self::text_key(link))
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn load_requests(&self) -> Result<Vec<RequestsEntry>, QueueError> {
        let now = OffsetDateTime::now_utc();
        let max_score = self
            .config
            .time_cache()
            .map(|tc| Self::score_of(now - tc))
            .unwrap_or_else(|| Self::score_of(now));
        let defer_score = Self::score_of(now + self.config.time_cache().unwrap_or_default());

        with_retry(&self.config, || async {
            let mut tx = self.pool.begin().await?;
            let rows: Vec<(String, Vec<u8>)> = sqlx::query_as(
                "SELECT text, link_blob FROM RequestsQueue WHERE timestamp <= ? ORDER BY timestamp ASC LIMIT ?",
            )
            .bind(max_score)
            .bind(self.config.max_pool as i64)
            .fetch_all(&mut *tx)
            .await?;

            let mut out = Vec::with_capacity(rows.len());
            for (text, blob) in rows {
                sqlx::query("UPDATE RequestsQueue SET timestamp = ? WHERE text = ?")
                    .bind(defer_score)
                    .bind(&text)
                    .execute(&mut *tx)
                    .await?;
                let link = Link::from_bytes(&blob)?;
                if !self.config.check || passes_link_check(&link) {
                    out.push(RequestsEntry { link });
                }
            }
            tx.commit().await?;
            if self.config.verbose {
                dump_pool("stage-1", out.iter().map(|e| e.link.url().as_str()));
            }
            Ok(out)
        })
        .await
    }

    async fn load_selenium(&self) -> Result<Vec<SeleniumEntry>, QueueError> {
        let now = OffsetDateTime::now_utc();
        let max_score = self
            .config
            .time_cache()
            .map(|tc| Self::score_of(now - tc))
            .unwrap_or_else(|| Self::score_of(now));
        let defer_score = Self::score_of(now + self.config.time_cache().unwrap_or_default());

        with_retry(&self.config, || async {
            let mut tx = self.pool.begin().await?;
            let rows: Vec<(String, Vec<u8>)> = sqlx::query_as(
                "SELECT text, link_blob FROM SeleniumQueue WHERE timestamp <= ? ORDER BY timestamp ASC LIMIT ?",
            )
            .bind(max_score)
            .bind(self.config.max_pool as i64)
            .fetch_all(&mut *tx)
            .await?;

            let mut out = Vec::with_capacity(rows.len());
            for (text, blob) in rows {
                sqlx::query("UPDATE SeleniumQueue SET timestamp = ? WHERE text = ?")
                    .bind(defer_score)
                    .bind(&text)
                    .execute(&mut *tx)
                    .await?;
                let (ts_bytes, link_bytes) = blob.split_at(8);
                let secs = i64::from_be_bytes(ts_bytes.try_into().unwrap());
                let timestamp = OffsetDateTime::from_unix_timestamp(secs).map_err(|_| QueueError::LockPoisoned)?;
                let link = Link::from_bytes(link_bytes)?;
                if !self.config.check || passes_link_check(&link) {
                    out.push(SeleniumEntry { timestamp, link });
                }
            }
            tx.commit().await?;
            if self.config.verbose {
                dump_pool("stage-2", out.iter().map(|e| e.link.url().as_str()));
            }
            Ok(out)
        })
        .await
    }
}

/// Dumps the full drawn pool for audit when `Verbose` is enabled (§6).
fn dump_pool<'a>(stage: &str, urls: impl Iterator<Item = &'a str>) {
    let joined = urls.collect::<Vec<_>>().join(", ");
    log::debug!("drew {stage} pool: [{joined}]");
}

async fn upsert_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    table: &str,
    text: &str,
    hash: &str,
    blob: &[u8],
    score: f64,
    mode: WriteMode,
) -> Result<(), QueueError> {
    let sql = match mode {
        WriteMode::Replace => format!(
            "INSERT INTO {table} (text, hash, link_blob, timestamp) VALUES (?, ?, ?, ?) \
             ON CONFLICT(text) DO UPDATE SET hash = excluded.hash, link_blob = excluded.link_blob, timestamp = excluded.timestamp"
        ),
        WriteMode::IfAbsent => format!(
            "INSERT INTO {table} (text, hash, link_blob, timestamp) VALUES (?, ?, ?, ?) \
             ON CONFLICT(text) DO NOTHING"
        ),
        WriteMode::IfPresent => {
            format!("UPDATE {table} SET hash = ?, link_blob = ?, timestamp = ? WHERE text = ?")
        }
    };
    let mut query = sqlx::query(&sql);
    query = match mode {
        WriteMode::IfPresent => query.bind(hash).bind(blob).bind(score).bind(text),
        _ => query.bind(text).bind(hash).bind(blob).bind(score),
    };
    query.execute(&mut **tx).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;

    async fn backend() -> SqlQueueBackend {
        SqlQueueBackend::connect("sqlite::memory:", QueueConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn have_hostname_is_test_and_set() {
        let backend = backend().await;
        let link = Link::parse("http://example.com/a").unwrap();
        assert_eq!(backend.have_hostname(&link).await.unwrap(), false);
        assert_eq!(backend.have_hostname(&link).await.unwrap(), true);
    }

    #[tokio::test]
    async fn save_and_load_requests_round_trips() {
        let backend = backend().await;
        let link = Link::parse("http://example.com/a").unwrap();
        backend
            .save_requests(&[link.clone()], WriteMode::Replace, None)
            .await
            .unwrap();
        let drawn = backend.load_requests().await.unwrap();
        assert_eq!(drawn.len(), 1);
        assert_eq!(drawn[0].link, link);
    }

    #[tokio::test]
    async fn drop_on_missing_key_is_noop() {
        let backend = backend().await;
        let link = Link::parse("http://example.com/missing").unwrap();
        backend.drop_requests(&link).await.unwrap();
        backend.drop_selenium(&link).await.unwrap();
        backend.drop_hostname("missing.example").await.unwrap();
    }

    #[tokio::test]
    async fn check_filters_unfetchable_schemes_on_load() {
        let mut config = QueueConfig::default();
        config.check = true;
        let backend = SqlQueueBackend::connect("sqlite::memory:", config).await.unwrap();
        let fetchable = Link::parse("http://example.com/a").unwrap();
        let mailto = Link::parse("mailto:a@example.com").unwrap();
        backend
            .save_requests(&[fetchable.clone(), mailto], WriteMode::Replace, None)
            .await
            .unwrap();
        let drawn = backend.load_requests().await.unwrap();
        assert_eq!(drawn.len(), 1);
        assert_eq!(drawn[0].link, fetchable);
    }

    #[tokio::test]
    async fn nx_keeps_older_score() {
        let backend = backend().await;
        let link = Link::parse("http://example.com/a").unwrap();
        let earlier = OffsetDateTime::now_utc() - time::Duration::seconds(100);
        backend
            .save_requests(&[link.clone()], WriteMode::Replace, Some(earlier))
            .await
            .unwrap();
        backend
            .save_requests(&[link.clone()], WriteMode::IfAbsent, Some(OffsetDateTime::now_utc()))
            .await
            .unwrap();
        let row: (f64,) = sqlx::query_as("SELECT timestamp FROM RequestsQueue WHERE text = ?")
            .bind(link.url().as_str())
            .fetch_one(&backend.pool)
            .await
            .unwrap();
        assert!((row.0 - SqlQueueBackend::score_of(earlier)).abs() < 1.0);
    }
}
