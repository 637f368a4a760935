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

//! Logging (component J), grounded in the teacher's `app::logging::configure_logging`:
//! leveled logging via the `log` facade, routed to a console or file appender
//! depending on configuration, with a pattern encoder.

use crate::config::Config;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::Config as LogConfig;
use log::LevelFilter;

/// Configures process-wide logging from `config`. Safe to call at most once per
/// process; a second call is a no-op logged at `warn`.
pub fn configure_logging(config: &Config) {
    let builder = LogConfig::builder();

    let builder = if config.system.log_to_file {
        let path = config.paths.root.join("darc.log");
        match FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new("{l}@{T} - {d} - {m}{n}")))
            .build(&path)
        {
            Ok(file_logger) => builder.appender(Appender::builder().build("out", Box::new(file_logger))),
            Err(err) => {
                eprintln!("failed to open log file {path}: {err}, falling back to console");
                let console_logger = ConsoleAppender::builder()
                    .encoder(Box::new(PatternEncoder::new("{l}@{T} - {d} - {m}{n}")))
                    .build();
                builder.appender(Appender::builder().build("out", Box::new(console_logger)))
            }
        }
    } else {
        let console_logger = ConsoleAppender::builder()
            .encoder(Box::new(PatternEncoder::new("{l}@{T} - {d} - {m}{n}")))
            .build();
        builder.appender(Appender::builder().build("out", Box::new(console_logger)))
    };

    let Ok(built) = builder
        .logger(Logger::builder().build("darc_rs", config.system.log_level))
        .build(Root::builder().appender("out").build(LevelFilter::Warn))
    else {
        eprintln!("failed to assemble logging config");
        return;
    };

    if log4rs::init_config(built).is_err() {
        log::warn!("logging was already configured; ignoring second call");
    }
}
