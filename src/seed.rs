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

//! Seed input (§6): the operator supplies an initial list of URL strings, inline on
//! the CLI or one-per-line in a file. Grounded in the teacher's
//! `seed::input::lines::read_seeds` (line-oriented, `#`-comment, blank-skipping).

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// How the operator supplied the initial seed list.
#[derive(Debug, Clone)]
pub enum SeedDefinition {
    /// A single inline URL.
    Single(String),
    /// Several inline URLs.
    Multi(Vec<String>),
    /// A path to a newline-delimited seed file.
    File(String),
}

impl SeedDefinition {
    /// Resolves this definition into the flat, deduplicated list of seed URL
    /// strings to push into stage-1.
    pub fn resolve(&self) -> std::io::Result<Vec<String>> {
        match self {
            SeedDefinition::Single(url) => Ok(vec![url.clone()]),
            SeedDefinition::Multi(urls) => Ok(urls.clone()),
            SeedDefinition::File(path) => read_seeds(path).map(|set| set.into_iter().collect()),
        }
    }
}

/// Reads a newline-delimited seed file, ignoring blank lines and `#`-comments. A
/// line starting with an escaped `\#` keeps its literal leading `#`.
pub fn read_seeds<P: AsRef<Path>>(path: P) -> std::io::Result<HashSet<String>> {
    let mut seeds = HashSet::new();
    let lines = BufReader::new(File::open(path)?).lines();
    for line in lines.map_while(Result::ok) {
        let line = line.trim();
        if line.starts_with('#') || line.is_empty() {
            continue;
        }
        let line = line.strip_prefix('\\').unwrap_or(line);
        seeds.insert(line.to_string());
    }
    Ok(seeds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn skips_comments_and_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# a comment\n\nhttp://example.com/\nhttp://example.com/a").unwrap();
        let seeds = read_seeds(file.path()).unwrap();
        assert_eq!(seeds.len(), 2);
        assert!(seeds.contains("http://example.com/"));
    }

    #[test]
    fn single_resolves_to_one_url() {
        let def = SeedDefinition::Single("http://example.com/".to_string());
        assert_eq!(def.resolve().unwrap(), vec!["http://example.com/".to_string()]);
    }
}
