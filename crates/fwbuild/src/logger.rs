//! stderr logging through `env_logger`.
//!
//! Only records from this crate are shown. `info` prints the bare message,
//! warnings and errors carry a level prefix, and debug output is tagged with
//! its module.

use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;

fn builder(max_level: LevelFilter) -> Builder {
    let mut builder = Builder::new();
    builder
        .filter_level(LevelFilter::Off)
        .filter_module(env!("CARGO_CRATE_NAME"), max_level)
        .format(|buf, record| match record.level() {
            Level::Error | Level::Warn => writeln!(
                buf,
                "{}: {}",
                record.level().as_str().to_lowercase(),
                record.args()
            ),
            Level::Info => writeln!(buf, "{}", record.args()),
            Level::Debug | Level::Trace => {
                writeln!(buf, "[{}] {}", record.target(), record.args())
            }
        });
    builder
}

/// Install the logger. Only the first call has any effect.
pub fn init(max_level: LevelFilter) {
    if builder(max_level).try_init().is_err() {
        log::debug!("logger already installed");
    }
}

/// `-q` wins over any number of `-v`.
pub fn level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Warn;
    }
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}
