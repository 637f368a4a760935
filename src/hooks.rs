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

//! Site-specific crawler/loader hooks (design note: "open polymorphic set keyed by
//! host pattern"), grounded in the teacher's `darc.sites` package: a small registry
//! of scheme- or host-keyed overrides, falling through to the default transport
//! fetch / browser render for everything else. The reference crate's
//! `darc.sites.script` hook (scheme-only sink for `javascript:` links, opting out
//! via `LinkNoReturn`) is reproduced as the one built-in non-default hook.

use crate::classifier::{DriverHandle, SessionHandle};
use crate::errors::{DriverError, HookError, LinkNoReturn};
use crate::link::Link;

/// A successful transport-level fetch: status, a coarse header dump, the
/// `Content-Type` (if any), and the body.
pub struct FetchedResponse {
    pub status: reqwest::StatusCode,
    pub headers: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// The transport-level schemes the default crawler hook knows how to fetch.
/// Anything else (that isn't otherwise intercepted by a more specific hook, like
/// `javascript:`) is a client-side `InvalidSchema`-style error.
fn is_fetchable_scheme(scheme: &str) -> bool {
    matches!(scheme, "http" | "https")
}

/// Default crawler hook: a plain GET through the session provided by the classifier.
async fn default_crawl(link: &Link, session: &SessionHandle) -> Result<FetchedResponse, HookError> {
    if !is_fetchable_scheme(link.url().scheme()) {
        return Err(HookError::InvalidSchema(link.url().scheme().to_string()));
    }
    let response = session
        .client()
        .get(link.url().as_str())
        .send()
        .await
        .map_err(HookError::Transport)?;
    let status = response.status();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| format!("{}: {}\n", name, value.to_str().unwrap_or("")))
        .collect::<String>();
    let body = response.bytes().await.map_err(HookError::Transport)?.to_vec();
    Ok(FetchedResponse {
        status,
        headers,
        content_type,
        body,
    })
}

/// Default loader hook: navigate the driver and let the caller read `page_source`.
async fn default_load(link: &Link, driver: &DriverHandle) -> Result<(), DriverError> {
    driver.navigate(link.url().as_str()).await
}

/// `javascript:` scheme-only sink, mirroring `darc.sites.script`: has nothing to
/// fetch over the network, so it opts out of both stages via [`LinkNoReturn`].
async fn javascript_crawl(_link: &Link, _session: &SessionHandle) -> Result<FetchedResponse, HookError> {
    Err(HookError::NoReturn(LinkNoReturn))
}

async fn javascript_load(_link: &Link, _driver: &DriverHandle) -> Result<(), DriverError> {
    Err(DriverError::NoReturn(LinkNoReturn))
}

/// Invokes the crawler hook selected for `link`'s scheme, falling back to the
/// default transport fetch for anything not specifically registered.
pub async fn crawl(link: &Link, session: &SessionHandle) -> Result<FetchedResponse, HookError> {
    match link.url().scheme() {
        "javascript" => javascript_crawl(link, session).await,
        _ => default_crawl(link, session).await,
    }
}

/// Invokes the loader hook selected for `link`'s scheme, falling back to the default
/// browser navigation for anything not specifically registered.
pub async fn load(link: &Link, driver: &DriverHandle) -> Result<(), DriverError> {
    match link.url().scheme() {
        "javascript" => javascript_load(link, driver).await,
        _ => default_load(link, driver).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn javascript_scheme_opts_out_with_no_return() {
        let config = crate::config::CrawlConfig::default();
        let link = Link::parse("javascript:void(0)").unwrap();
        let session = crate::classifier::session_for(&link, &config).unwrap();
        let err = crawl(&link, &session).await.unwrap_err();
        assert!(matches!(err, HookError::NoReturn(_)));
    }

    #[tokio::test]
    async fn unfetchable_scheme_is_invalid_schema() {
        let config = crate::config::CrawlConfig::default();
        let link = Link::parse("ftp://example.com/file").unwrap();
        let session = crate::classifier::session_for(&link, &config).unwrap();
        let err = crawl(&link, &session).await.unwrap_err();
        assert!(matches!(err, HookError::InvalidSchema(_)));
    }
}
