//! Logger construction. Components receive a `slog::Logger` and derive child loggers from it.
pub use slog::{crit, debug, error, info, o, trace, warn, Discard, Logger};
use sloggers::{Config, LoggerConfig};
use std::fmt;
use std::path::Path;

const TERMINAL_CONFIG: &str = r#"
type = "terminal"
level = "info"
destination = "stderr"
"#;

#[derive(Debug)]
pub enum LogError {
    Config(serdeconv::Error),
    Build(sloggers::Error),
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LogError::Config(err) => write!(f, "invalid logging configuration: {}", err),
            LogError::Build(err) => write!(f, "failed to build logger: {}", err),
        }
    }
}

impl std::error::Error for LogError {}

impl From<serdeconv::Error> for LogError {
    #[inline]
    fn from(err: serdeconv::Error) -> Self {
        LogError::Config(err)
    }
}

impl From<sloggers::Error> for LogError {
    #[inline]
    fn from(err: sloggers::Error) -> Self {
        LogError::Build(err)
    }
}

/// Builds a logger from a sloggers TOML configuration file.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Logger, LogError> {
    let config: LoggerConfig = serdeconv::from_toml_file(path)?;
    Ok(config.build_logger()?)
}

/// Builds a logger from a sloggers TOML configuration string.
pub fn from_toml(toml: &str) -> Result<Logger, LogError> {
    let config: LoggerConfig = serdeconv::from_toml_str(toml)?;
    Ok(config.build_logger()?)
}

/// Terminal logger writing to stderr at info level. Falls back to a discarding logger if the
/// terminal cannot be set up.
pub fn terminal() -> Logger {
    from_toml(TERMINAL_CONFIG).unwrap_or_else(|_| discard())
}

/// Logger that drops every record.
#[inline]
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}
