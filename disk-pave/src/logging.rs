// SPDX-License-Identifier: MIT

use log::LevelFilter;

/// Level picked from `-q`/`-v` counts; `RUST_LOG` still refines it per module.
pub fn level(quiet: u8, verbose: u8) -> LevelFilter {
    match (quiet, verbose) {
        (q, _) if q >= 2 => LevelFilter::Error,
        (1, _) => LevelFilter::Warn,
        (_, 0) => LevelFilter::Info,
        (_, 1) => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

pub fn init(level: LevelFilter) {
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .init();
}
