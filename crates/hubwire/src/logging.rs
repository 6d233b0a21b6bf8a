use std::cmp;

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer, Registry};

/// Crates whose events follow `--log-level`. Everything else stays at warn.
const HUBWIRE_TARGETS: [&str; 4] = [
    "hubwire",
    "hubwire_transport",
    "hubwire_frame",
    "hubwire_messenger",
];

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

fn targets(level: LogLevel) -> Targets {
    let level = level.as_filter();
    HUBWIRE_TARGETS.iter().fold(
        Targets::new().with_default(cmp::min(level, LevelFilter::WARN)),
        |targets, target| targets.with_target(*target, level),
    )
}

/// Install the stderr subscriber. Library crates only emit events.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let layer: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Text => fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_target(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
    };

    let _ = tracing_subscriber::registry()
        .with(layer.with_filter(targets(level)))
        .try_init();
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn debug_applies_to_hubwire_crates_only() {
        let filter = targets(LogLevel::Debug);
        assert!(filter.would_enable("hubwire_messenger::queue", &Level::DEBUG));
        assert!(!filter.would_enable("tokio::runtime", &Level::DEBUG));
        assert!(filter.would_enable("tokio::runtime", &Level::WARN));
    }

    #[test]
    fn error_level_quiets_everything() {
        let filter = targets(LogLevel::Error);
        assert!(!filter.would_enable("hubwire_frame::codec", &Level::WARN));
        assert!(!filter.would_enable("tokio::runtime", &Level::WARN));
    }
}
