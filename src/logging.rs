//! Logging facilities

use log::LevelFilter;
use log4rs::{
    append::console::{ConsoleAppender, Target},
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
};

use crate::config::{ConfigError, LogConfig};

/// Maps a configured level name onto a filter. `fatal` and `panic` have no
/// own filter in the `log` facade and clamp to `error`.
fn parse_level(level: &str) -> Option<LevelFilter> {
    match level {
        "" | "info" => Some(LevelFilter::Info),
        "trace" => Some(LevelFilter::Trace),
        "debug" => Some(LevelFilter::Debug),
        "warn" => Some(LevelFilter::Warn),
        "error" | "fatal" | "panic" => Some(LevelFilter::Error),
        _ => None,
    }
}

/// Initializes the global logger from the configuration
pub fn init_with_config(config: &LogConfig) -> Result<(), ConfigError> {
    let level = if config.disable {
        LevelFilter::Off
    } else {
        parse_level(&config.level).ok_or_else(|| ConfigError::InvalidLogLevel(config.level.clone()))?
    };

    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d} {h({l}):<5} {m}{n}")))
        .target(Target::Stderr)
        .build();

    let logging_config = log4rs::Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .build(Root::builder().appender("console").build(level))
        .expect("logging");

    log4rs::init_config(logging_config).expect("logging");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(parse_level(""), Some(LevelFilter::Info));
        assert_eq!(parse_level("trace"), Some(LevelFilter::Trace));
        assert_eq!(parse_level("fatal"), Some(LevelFilter::Error));
        assert_eq!(parse_level("panic"), Some(LevelFilter::Error));
        assert_eq!(parse_level("verbose"), None);
    }
}
