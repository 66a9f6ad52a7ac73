use crate::error::{CliError, Result};
use std::fs::File;
use std::path::Path;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt,
    prelude::*,
};

/// Crates whose events follow the `-v` count; everything else is a dependency.
const OWN_TARGETS: [&str; 2] = ["metafes", "metafes_cli"];

fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::OFF;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Console filter: our crates at the requested verbosity, dependencies at
/// `WARN` until `-vvv` opens them up to `INFO`.
fn console_targets(verbosity: u8, quiet: bool) -> Targets {
    let own = level_filter(verbosity, quiet);
    let dependencies = if own == LevelFilter::OFF {
        LevelFilter::OFF
    } else if own == LevelFilter::TRACE {
        LevelFilter::INFO
    } else {
        LevelFilter::WARN
    };
    with_own_targets(Targets::new().with_default(dependencies), own)
}

/// File filter: at least `DEBUG` for our crates whatever the console shows.
fn file_targets(verbosity: u8) -> Targets {
    let own = level_filter(verbosity, false).max(LevelFilter::DEBUG);
    with_own_targets(Targets::new().with_default(LevelFilter::INFO), own)
}

fn with_own_targets(targets: Targets, level: LevelFilter) -> Targets {
    OWN_TARGETS
        .iter()
        .fold(targets, |targets, target| targets.with_target(*target, level))
}

fn log_file_layer<S>(path: &Path, verbosity: u8) -> Result<impl tracing_subscriber::Layer<S>>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let file = File::create(path).map_err(CliError::Io)?;
    Ok(fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_target(true)
        .with_filter(file_targets(verbosity)))
}

/// Installs the global subscriber.
///
/// Console output goes to stderr in compact form, filtered per crate by the
/// `-v`/`-q` flags. With `log_file`, a plain-text copy with thread ids and
/// targets is written there under its own, more verbose filter.
///
/// # Errors
///
/// Returns [`CliError::Io`] if the log file cannot be created, or
/// [`CliError::Other`] if a global subscriber is already installed.
pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .compact()
        .with_filter(console_targets(verbosity, quiet));

    let file_layer = log_file
        .map(|path| log_file_layer(path, verbosity))
        .transpose()?;

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| CliError::Other(anyhow::Error::new(e)))
}
