use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

use crate::config::LogLevel;

impl From<&LogLevel> for LevelFilter {
    fn from(level: &LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// Initialize the logging system
///
/// Safe to call more than once; only the first call installs the logger.
pub fn init(level: &LogLevel) {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level.into());

    if builder.try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(LevelFilter::from(&LogLevel::Warn), LevelFilter::Warn);
        assert_eq!(LevelFilter::from(&LogLevel::Trace), LevelFilter::Trace);
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init(&LogLevel::Debug);
        init(&LogLevel::Info);
    }
}
