//! Stderr logger
//!
//! stdout carries protocol frames, so every log line goes to stderr.

use std::io::Write;

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// `log` backend writing one line per record to stderr
#[derive(Debug)]
pub struct StderrLogger {
    name: String,
    level: LevelFilter,
}

impl StderrLogger {
    pub fn new(name: impl Into<String>, level: LevelFilter) -> Self {
        Self {
            name: name.into(),
            level,
        }
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Renders a record as `[LEVEL name] target: message`
    pub fn format(&self, record: &Record<'_>) -> String {
        format!(
            "[{:<5} {}] {}: {}",
            record.level(),
            self.name,
            record.target(),
            record.args()
        )
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            let line = self.format(record);
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Installs a [`StderrLogger`] as the process-wide logger
pub fn init(name: &str, level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_boxed_logger(Box::new(StderrLogger::new(name, level)))?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    #[test]
    fn test_format_line() {
        let logger = StderrLogger::new("lxfs", LevelFilter::Info);
        let line = logger.format(
            &Record::builder()
                .args(format_args!("mounted sd0"))
                .level(Level::Info)
                .target("services_lxfs::mount")
                .build(),
        );
        assert_eq!(line, "[INFO  lxfs] services_lxfs::mount: mounted sd0");
    }

    #[test]
    fn test_level_filtering() {
        let logger = StderrLogger::new("lxfs", LevelFilter::Warn);
        let warn = Metadata::builder().level(Level::Warn).build();
        let debug = Metadata::builder().level(Level::Debug).build();
        assert!(logger.enabled(&warn));
        assert!(!logger.enabled(&debug));
    }
}
