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

//! Link extraction, grounded in the teacher's `extraction::html::extract_links`, but
//! trimmed to the one thing the core spec needs: a flat list of absolute URLs found
//! in `href` attributes, resolved against the page's own `<base>` (falling back to
//! the fetched URL) and deduplicated.

use crate::link::Link;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

fn href_selector() -> Selector {
    Selector::parse("a,area,link").expect("static selector is valid")
}

fn base_selector() -> Selector {
    Selector::parse("base").expect("static selector is valid")
}

/// Parses `body` as HTML rooted at `root_url` and returns every distinct, absolute
/// link it references via `href`. Malformed `href`s and anything that doesn't parse
/// into a [`Link`] (unclassifiable host, non-http(s) scheme the crate doesn't
/// understand) are silently skipped -- extraction is best-effort by design.
pub fn extract_links(root_url: &Url, body: &str) -> Vec<Link> {
    let document = Html::parse_document(body);

    let base = document
        .select(&base_selector())
        .next()
        .and_then(|el| el.attr("href"))
        .and_then(|href| root_url.join(href).ok())
        .unwrap_or_else(|| root_url.clone());

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for element in document.select(&href_selector()) {
        let Some(href) = element.attr("href") else {
            continue;
        };
        let Ok(absolute) = base.join(href) else {
            continue;
        };
        let Ok(link) = Link::from_url(absolute) else {
            continue;
        };
        if seen.insert(link.url().clone()) {
            out.push(link);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_and_resolves_relative_hrefs() {
        let root = Url::parse("http://example.com/dir/page.html").unwrap();
        let body = r#"<html><body><a href="/a">a</a><a href="b">b</a></body></html>"#;
        let links: Vec<_> = extract_links(&root, body).into_iter().map(|l| l.url().to_string()).collect();
        assert_eq!(links, vec!["http://example.com/a", "http://example.com/dir/b"]);
    }

    #[test]
    fn respects_base_tag() {
        let root = Url::parse("http://example.com/dir/page.html").unwrap();
        let body = r#"<html><head><base href="http://other.example/x/"></head>
            <body><a href="y">y</a></body></html>"#;
        let links = extract_links(&root, body);
        assert_eq!(links[0].url().as_str(), "http://other.example/x/y");
    }

    #[test]
    fn dedupes_repeated_hrefs() {
        let root = Url::parse("http://example.com/").unwrap();
        let body = r#"<a href="/a">1</a><a href="/a">2</a>"#;
        assert_eq!(extract_links(&root, body).len(), 1);
    }

    #[test]
    fn includes_scheme_only_sinks_with_empty_host() {
        let root = Url::parse("http://example.com/").unwrap();
        let body = r#"<a href="javascript:void(0)">js</a>"#;
        let links = extract_links(&root, body);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].host(), "");
    }

    #[test]
    fn skips_truly_unparsable_hrefs() {
        let root = Url::parse("http://example.com/").unwrap();
        let body = r#"<a href="http://[not-a-valid-ipv6">bad</a>"#;
        assert!(extract_links(&root, body).is_empty());
    }
}
