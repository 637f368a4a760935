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

//! The [`Link`] value type and its host classification.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use url::Url;

/// Transport family a link's host routes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostClass {
    /// A `.onion` anonymity-network host, routed through a SOCKS proxy.
    Onion,
    /// Any other host, reached with a direct HTTP client.
    Normal,
}

impl HostClass {
    /// Classifies a host by the ordered rule list: `*.onion -> Onion`, else `Normal`.
    pub fn classify(host: &str) -> Self {
        if host.eq_ignore_ascii_case("onion") || host.to_ascii_lowercase().ends_with(".onion") {
            HostClass::Onion
        } else {
            HostClass::Normal
        }
    }
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid url: {0}")]
    Parse(#[from] url::ParseError),
    #[error("url has no host: {0}")]
    NoHost(String),
}

/// An immutable, normalized link. Equality and serialization are keyed purely on `url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    url: Url,
    host: String,
    host_class: HostClass,
}

impl Link {
    /// Parses `raw` into a [`Link`], rejecting anything without a host.
    pub fn parse(raw: &str) -> Result<Self, LinkError> {
        let url = Url::parse(raw)?;
        Self::from_url(url)
    }

    /// Builds a [`Link`] from an already-parsed URL. Scheme-only sinks such as
    /// `javascript:` or `data:` have no authority component; they are accepted with
    /// an empty `host` (classified `Normal`, matching the fallback arm of the
    /// classification rule list) rather than rejected, so they can still enter the
    /// queue and be opted out of by a site-specific hook (see `hooks::crawl`).
    pub fn from_url(url: Url) -> Result<Self, LinkError> {
        let host = url
            .host_str()
            .map(|h| h.to_ascii_lowercase())
            .unwrap_or_default();
        let host_class = HostClass::classify(&host);
        Ok(Self {
            url,
            host,
            host_class,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn host_class(&self) -> HostClass {
        self.host_class
    }

    /// A stable, content-independent identifier for this link, used as the artifact
    /// filename. Pure function of `url`.
    pub fn name(&self) -> String {
        let digest = twox_name_hash(self.url.as_str());
        format!("{:016x}", digest)
    }

    /// Current binary encoding version. Bump when the wire shape of [`Link`] changes.
    pub const WIRE_VERSION: u8 = 1;

    /// Encodes this link as a versioned binary blob for storage as a queue member.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        let mut buf = Vec::with_capacity(64);
        buf.push(Self::WIRE_VERSION);
        bincode::serialize_into(&mut buf, self)?;
        Ok(buf)
    }

    /// Decodes a blob produced by [`Link::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LinkError> {
        let (version, rest) = bytes
            .split_first()
            .ok_or_else(|| LinkError::NoHost(String::new()))?;
        if *version != Self::WIRE_VERSION {
            // Older/newer writers: fall back to treating the payload as a bare URL string.
            return Self::parse(&String::from_utf8_lossy(rest));
        }
        bincode::deserialize(rest).map_err(|_| LinkError::NoHost(String::from_utf8_lossy(rest).into_owned()))
    }
}

impl PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}
impl Eq for Link {}

impl std::hash::Hash for Link {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.url.hash(state)
    }
}

impl Display for Link {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

fn twox_name_hash(s: &str) -> u64 {
    // FNV-1a: no extra dependency needed for a filename digest.
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in s.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_onion_hosts() {
        assert_eq!(HostClass::classify("abc.onion"), HostClass::Onion);
        assert_eq!(HostClass::classify("ABC.ONION"), HostClass::Onion);
        assert_eq!(HostClass::classify("example.com"), HostClass::Normal);
    }

    #[test]
    fn equality_is_keyed_on_url_only() {
        let a = Link::parse("http://example.com/a").unwrap();
        let b = Link::parse("http://example.com/a").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.name(), b.name());
    }

    #[test]
    fn round_trips_through_bytes() {
        let link = Link::parse("http://abc.onion/page?x=1").unwrap();
        let bytes = link.to_bytes().unwrap();
        let back = Link::from_bytes(&bytes).unwrap();
        assert_eq!(link, back);
        assert_eq!(back.host_class(), HostClass::Onion);
    }

    #[test]
    fn rejects_malformed_urls() {
        let err = Link::parse("not a url at all");
        assert!(err.is_err());
    }

    #[test]
    fn accepts_scheme_only_sinks_with_empty_host() {
        let link = Link::parse("javascript:void(0)").unwrap();
        assert_eq!(link.host(), "");
        assert_eq!(link.host_class(), HostClass::Normal);
    }
}
