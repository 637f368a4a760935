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

//! Crate-level error taxonomy (component L): one variant per policy branch of the
//! error handling design, composed via `#[from]` so match arms (not string
//! comparisons) drive the retry/drop/log decision in the stage workers.

use crate::link::LinkError;
use crate::queue::QueueError;
use crate::store::StoreError;
use thiserror::Error;

/// Raised by the classifier when a link's host matches no routing rule.
#[derive(Debug, Error)]
#[error("no transport rule matches host {0}")]
pub struct UnsupportedLink(pub String);

/// Raised by a site-specific hook that has already fully handled a link (e.g. a
/// scheme-only sink such as `javascript:`) and wants a silent drop.
#[derive(Debug, Error)]
#[error("hook opted out of returning a response for this link")]
pub struct LinkNoReturn;

/// The transport-level outcome of invoking a crawler hook, mirroring the
/// distinction the stage-1 worker must act on (§4.F).
#[derive(Debug, Error)]
pub enum HookError {
    /// The client-side URL scheme/shape cannot be dispatched at all (permanent).
    #[error("invalid schema for {0}")]
    InvalidSchema(String),
    /// Any other transport failure (network error, timeout, TLS, ...): transient.
    #[error(transparent)]
    Transport(#[from] reqwest_middleware::Error),
    /// The hook has opted out; caller must drop silently.
    #[error(transparent)]
    NoReturn(#[from] LinkNoReturn),
}

/// The browser-driver-level outcome of invoking a loader hook (§4.G).
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("browser driver error: {0}")]
    Driver(String),
    #[error(transparent)]
    NoReturn(#[from] LinkNoReturn),
}

/// Top-level crawl error, surfaced only at the CLI boundary (or in tests); every
/// internal policy branch is handled inline by the workers and never reaches here
/// except via `?` during setup (config, backend construction).
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Unsupported(#[from] UnsupportedLink),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
