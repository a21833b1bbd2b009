use chrono::prelude::*;
use log::{LevelFilter, Metadata, Record};

const TARGET_PREFIX: &str = "musicd_catalog";

pub struct Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level() && metadata.target().starts_with(TARGET_PREFIX)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let target = record.target();
        let module = target
            .strip_prefix(TARGET_PREFIX)
            .and_then(|t| t.strip_prefix("::"))
            .unwrap_or("main");

        eprintln!(
            "{} {:05} [{}] {}",
            Local::now().format("%F %T"),
            record.level(),
            module,
            record.args()
        );
    }

    fn flush(&self) {}
}

static LOGGER: Logger = Logger;

/// Installs the logger. Calling it again only changes the level.
pub fn init(level: LevelFilter) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}

pub fn level_from_verbosity(verbosity: u64) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}
