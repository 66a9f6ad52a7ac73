use super::{read_file, write_file};
use crate::cli::SampleArgs;
use crate::config::{CliOverrides, PartialConfig};
use crate::error::{CliError, Result};
use crate::utils::parser;
use metafes::core::io::colvar::ColvarFile;
use metafes::core::io::xyz::{XyzFile, XyzTrajectory};
use metafes::core::models::frame::Frame;
use metafes::workflows;
use tracing::{info, warn};

pub async fn run(args: SampleArgs) -> Result<()> {
    let overrides = CliOverrides {
        seed: args.seed,
        ..Default::default()
    };
    let config =
        PartialConfig::from_file(&args.config.config)?.merge_with_cli(&args.config, &overrides)?;
    let bounds = parser::parse_bounds(&args.bounds, &config.variable_names())
        .map_err(|e| CliError::Argument(e.to_string()))?;

    let colvar = read_file::<ColvarFile>(&args.colvar)?;
    let trajectory = read_file::<XyzFile>(&args.trajectory)?;
    let symbols = trajectory.symbols.clone();

    let sampled = tokio::task::block_in_place(|| {
        workflows::sample::run(colvar, trajectory, &config.core, &bounds, args.count)
    })?;

    let Some(sampled) = sampled else {
        warn!("No frame lies inside the requested bounds");
        println!("No frame lies inside the requested bounds; nothing written.");
        return Ok(());
    };

    info!(frames = ?sampled.frame_indices(), "Sampled frame indices");
    let frames: Vec<Frame> = sampled.iter().map(|s| Frame::clone(&s.frame)).collect();
    write_file::<XyzFile>(&XyzTrajectory::new(symbols, frames), &args.output)?;
    println!(
        "✓ {} of {} matching frame(s) written to: {}",
        sampled.len(),
        sampled.matched,
        args.output.display()
    );
    Ok(())
}
