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

use crate::link::LinkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend unavailable after exhausting retries: {0}")]
    BackendUnavailable(String),
    #[error(transparent)]
    Encoding(#[from] bincode::Error),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
    #[error("lock poisoned")]
    LockPoisoned,
}
