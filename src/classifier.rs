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

//! The link classifier (component E): maps a [`Link`] to a transport session and a
//! browser driver, routed by [`HostClass`]. Mirrors the teacher's `LINK_MAP` /
//! `request_session` / `request_driver` pair, generalized to two transport families.

use crate::config::CrawlConfig;
use crate::errors::UnsupportedLink;
use crate::link::{HostClass, Link};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use std::time::Duration;

/// A freshly built transport session scoped to one link's host class. Dropping it
/// releases the underlying connection pool; nothing needs to be awaited on exit, so
/// plain `Drop` is sufficient scoping for this resource.
pub struct SessionHandle {
    client: ClientWithMiddleware,
}

impl SessionHandle {
    pub fn client(&self) -> &ClientWithMiddleware {
        &self.client
    }
}

/// Builds a direct-HTTP or SOCKS-proxied client depending on `host_class`, mirroring
/// the teacher's `build_classic_client` (user agent, timeout) plus proxy routing.
pub fn session_for(link: &Link, config: &CrawlConfig) -> Result<SessionHandle, UnsupportedLink> {
    let builder = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .pool_idle_timeout(None);

    let builder = match link.host_class() {
        HostClass::Normal => builder,
        HostClass::Onion => {
            let proxy_url = format!("socks5h://{}", config.tor_socks_proxy);
            let proxy = reqwest::Proxy::all(&proxy_url).map_err(|_| UnsupportedLink(link.host().to_owned()))?;
            builder.proxy(proxy)
        }
    };

    let inner = builder.build().map_err(|_| UnsupportedLink(link.host().to_owned()))?;
    let client = ClientBuilder::new(inner).build();
    Ok(SessionHandle { client })
}

/// The headless-browser counterpart of [`SessionHandle`]. Behind the `chrome`
/// feature this wraps a real `chromiumoxide::Page`; without it, `navigate`/
/// `page_source` surface a `DriverError` so the crate still builds and tests its
/// stage-2 policy branches against a mock implementation (see `render::tests`).
#[async_trait::async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), crate::errors::DriverError>;
    async fn page_source(&self) -> Result<String, crate::errors::DriverError>;
}

#[cfg(feature = "chrome")]
pub mod chrome_driver {
    use super::BrowserDriver;
    use crate::errors::DriverError;
    use chromiumoxide::{Browser, BrowserConfig, Page};
    use futures::StreamExt;

    /// A scoped Chromium page. Dropping it closes the tab; the owning [`Browser`] is
    /// kept alive alongside it so the handle remains valid for its whole scope.
    pub struct ChromiumDriver {
        _browser: Browser,
        page: Page,
    }

    impl ChromiumDriver {
        pub async fn launch(proxy_server: Option<&str>) -> Result<Self, DriverError> {
            let mut builder = BrowserConfig::builder();
            if let Some(proxy) = proxy_server {
                builder = builder.arg(format!("--proxy-server={proxy}"));
            }
            let config = builder
                .build()
                .map_err(|err| DriverError::Driver(err.to_string()))?;
            let (browser, mut handler) = Browser::launch(config)
                .await
                .map_err(|err| DriverError::Driver(err.to_string()))?;
            tokio::spawn(async move { while handler.next().await.is_some() {} });
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|err| DriverError::Driver(err.to_string()))?;
            Ok(Self { _browser: browser, page })
        }
    }

    #[async_trait::async_trait]
    impl BrowserDriver for ChromiumDriver {
        async fn navigate(&self, url: &str) -> Result<(), DriverError> {
            self.page
                .goto(url)
                .await
                .map_err(|err| DriverError::Driver(err.to_string()))?;
            self.page
                .wait_for_navigation()
                .await
                .map_err(|err| DriverError::Driver(err.to_string()))?;
            Ok(())
        }

        async fn page_source(&self) -> Result<String, DriverError> {
            self.page
                .content()
                .await
                .map_err(|err| DriverError::Driver(err.to_string()))
        }
    }
}

/// Builds the browser driver for `link`, routed like [`session_for`]: onion links
/// get a Chromium instance launched behind the Tor SOCKS proxy, normal links a
/// direct one. Only available with the `chrome` feature; `DriverHandle` is a boxed
/// trait object so the dispatcher doesn't need to know which concrete driver it got.
pub type DriverHandle = Box<dyn BrowserDriver>;

#[cfg(feature = "chrome")]
pub async fn driver_for(link: &Link, config: &CrawlConfig) -> Result<DriverHandle, UnsupportedLink> {
    use self::chrome_driver::ChromiumDriver;
    let proxy = match link.host_class() {
        HostClass::Normal => None,
        HostClass::Onion => Some(config.tor_socks_proxy.as_str()),
    };
    let driver = ChromiumDriver::launch(proxy)
        .await
        .map_err(|_| UnsupportedLink(link.host().to_owned()))?;
    Ok(Box::new(driver))
}

#[cfg(not(feature = "chrome"))]
pub async fn driver_for(_link: &Link, _config: &CrawlConfig) -> Result<DriverHandle, UnsupportedLink> {
    struct Unavailable;

    #[async_trait::async_trait]
    impl BrowserDriver for Unavailable {
        async fn navigate(&self, _url: &str) -> Result<(), crate::errors::DriverError> {
            Err(crate::errors::DriverError::Driver(
                "browser rendering requires the `chrome` feature".to_string(),
            ))
        }

        async fn page_source(&self) -> Result<String, crate::errors::DriverError> {
            Err(crate::errors::DriverError::Driver(
                "browser rendering requires the `chrome` feature".to_string(),
            ))
        }
    }

    Ok(Box::new(Unavailable))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn onion_session_routes_through_socks_proxy() {
        let config = CrawlConfig::default();
        let onion = Link::parse("http://abc.onion/").unwrap();
        let normal = Link::parse("http://example.com/").unwrap();
        assert!(session_for(&onion, &config).is_ok());
        assert!(session_for(&normal, &config).is_ok());
    }
}
