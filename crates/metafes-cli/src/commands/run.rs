use super::{read_file, run_cancellable, write_file};
use crate::cli::RunArgs;
use crate::config::{CliOverrides, PartialConfig, RunConfig};
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use metafes::core::io::colvar::{ColvarFile, ColvarLog};
use metafes::core::io::hills::{HillLog, HillsFile};
use metafes::core::io::xyz::XyzFile;
use metafes::core::models::hill::HillRecord;
use metafes::workflows;
use std::path::Path;
use tracing::{info, warn};

pub async fn run(args: RunArgs) -> Result<()> {
    let overrides = CliOverrides {
        height: args.height,
        pace: args.pace,
        seed: None,
    };
    let config =
        PartialConfig::from_file(&args.config.config)?.merge_with_cli(&args.config, &overrides)?;

    let trajectory = read_file::<XyzFile>(&args.trajectory)?;
    let restart = match &args.restart {
        Some(path) => Some(load_restart(path, &config)?),
        None => None,
    };

    let progress_handler = CliProgressHandler::new();
    let reporter = progress_handler.reporter();

    println!(
        "Replaying {} frame(s), depositing every {} frame(s)...",
        trajectory.frames.len(),
        config.core.pace
    );
    let core = config.core.clone();
    let frames = trajectory.frames;
    let result = run_cancellable(move |cancel| {
        workflows::replay::run(frames, core, restart, &reporter, &cancel)
    })
    .await?;

    let hill_count = result.hills.len();
    let hills = HillLog::for_variables(&config.core.variables, result.hills);
    write_file::<HillsFile>(&hills, &args.hills)?;
    println!(
        "✓ {} hill(s) written to: {}",
        hill_count,
        args.hills.display()
    );

    if let Some(path) = &args.colvar {
        let colvar = ColvarLog::new(config.variable_names(), result.samples);
        write_file::<ColvarFile>(&colvar, path)?;
        println!("  CV time series written to: {}", path.display());
    }

    if result.rejected > 0 {
        warn!(rejected = result.rejected, "Some deposits fell outside the variable bounds");
        println!(
            "Warning: {} deposit(s) were rejected by the boundary policy.",
            result.rejected
        );
    }
    Ok(())
}

fn load_restart(path: &Path, config: &RunConfig) -> Result<Vec<HillRecord>> {
    let log = read_file::<HillsFile>(path)?;
    let expected = config.variable_names();
    if log.variable_names() != expected {
        return Err(CliError::Config(format!(
            "Restart hills in '{}' cover variables {:?}, but the configuration defines {:?}.",
            path.display(),
            log.variable_names(),
            expected
        )));
    }
    info!(hills = log.records.len(), "Restarting from earlier hills");
    Ok(log.records)
}
