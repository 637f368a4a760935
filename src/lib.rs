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

//! A two-stage crawler: a transport-level fetch stage that feeds a headless-browser
//! render stage, coordinated through a shared, cross-process work queue so that many
//! independent processes can cooperate on the same crawl without stepping on each
//! other (component overview in `DESIGN.md`).

pub mod bootstrap;
pub mod classifier;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod errors;
pub mod extract;
pub mod fetch;
pub mod hooks;
pub mod link;
pub mod queue;
pub mod render;
pub mod seed;
pub mod store;

pub mod logging;
