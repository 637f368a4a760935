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

//! The shared, `Arc`-wrapped handles every worker needs: the queue backend, the
//! artifact store, and the crawl tunables. One value is built once at startup and
//! cloned cheaply into every dispatched worker task (§4.I: "no global mutable
//! state").

use crate::config::CrawlConfig;
use crate::queue::QueueBackend;
use crate::store::ArtifactStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct CrawlContext {
    pub queue: Arc<dyn QueueBackend>,
    pub store: Arc<dyn ArtifactStore>,
    pub crawl: Arc<CrawlConfig>,
}

impl CrawlContext {
    pub fn new(queue: Arc<dyn QueueBackend>, store: Arc<dyn ArtifactStore>, crawl: CrawlConfig) -> Self {
        Self {
            queue,
            store,
            crawl: Arc::new(crawl),
        }
    }
}
