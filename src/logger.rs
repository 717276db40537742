//! Logger configuration.

use std::fs;
use std::fs::OpenOptions;
use std::str::FromStr;

use tracing::{debug, info, Level};
use tracing_subscriber::{filter, layer::SubscriberExt, Layer, Registry};

/// Install the global tracing subscriber.
///
/// * `level` - Log level (DEBUG, INFO, WARN, ERROR); unknown values fall back to INFO.
/// * `to_file` - Whether to add a JSON file sink.
/// * `to_stdout` - Whether to add a compact console sink.
/// * `dir` - Directory for the log file (created if needed).
/// * `file` - Log file name inside `dir`.
///
/// # Errors
/// Fails if the log directory cannot be created, the log file cannot be
/// opened, or a global subscriber is already set.
pub fn set_logger(
    level: &str,
    to_file: bool,
    to_stdout: bool,
    dir: &str,
    file: &str,
) -> anyhow::Result<()> {
    let level = Level::from_str(level).unwrap_or(Level::INFO);
    let level_filter = filter::LevelFilter::from_level(level);

    let console = if to_stdout {
        Some(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_ansi(true)
                .with_filter(level_filter.clone()),
        )
    } else {
        None
    };

    let file_sink = if to_file {
        fs::create_dir_all(dir)?;
        let path = format!("{dir}/{file}");
        let sink = OpenOptions::new().append(true).create(true).open(&path)?;
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(sink)
                .with_filter(level_filter),
        )
    } else {
        None
    };

    let subscriber = Registry::default().with(console).with(file_sink);
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Logger initialized, log level set to: {level}");
    if to_stdout {
        debug!("Logging to stdout.");
    }
    if to_file {
        debug!("Logging to file: {dir}/{file}");
    }
    Ok(())
}
