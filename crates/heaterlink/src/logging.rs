use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Extra filter directives, e.g. `heaterlink_control=debug,heaterlink_frame=trace`.
pub const LOG_ENV: &str = "HEATERLINK_LOG";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// `level` everywhere, refined per crate or module by `directives`.
/// Malformed directives are skipped.
pub fn log_filter(level: LogLevel, directives: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.as_filter().into())
        .parse_lossy(directives.unwrap_or_default())
}

/// Install the stderr subscriber. Stdout stays reserved for command output.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let directives = std::env::var(LOG_ENV).ok();
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(log_filter(level, directives.as_deref()))
        .with_ansi(false)
        // Targets only help once per-crate directives are in play.
        .with_target(directives.is_some());

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_alone_sets_the_ceiling() {
        let filter = log_filter(LogLevel::Warn, None);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn directives_can_raise_one_crate() {
        let filter = log_filter(LogLevel::Info, Some("heaterlink_frame=trace"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn malformed_directives_fall_back_to_level() {
        let filter = log_filter(LogLevel::Error, Some("heaterlink_frame=loud"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::ERROR));
    }
}
