use super::{read_file, write_file};
use crate::cli::CvArgs;
use crate::config::PartialConfig;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use metafes::core::io::colvar::ColvarFile;
use metafes::core::io::xyz::XyzFile;
use metafes::engine::cancel::CancellationToken;
use metafes::workflows;
use tracing::info;

pub async fn run(args: CvArgs) -> Result<()> {
    let variables =
        PartialConfig::from_file(&args.config.config)?.variables_with_cli(&args.config)?;
    for variable in &variables {
        info!(name = %variable.name, kind = variable.kind_label(), "Collective variable");
    }
    let trajectory = read_file::<XyzFile>(&args.trajectory)?;
    info!(
        frames = trajectory.frames.len(),
        atoms = trajectory.symbols.len(),
        "Trajectory loaded"
    );

    let progress_handler = CliProgressHandler::new();
    let reporter = progress_handler.reporter();
    let cancel = CancellationToken::new();

    println!(
        "Evaluating {} collective variable(s) on {} frame(s)...",
        variables.len(),
        trajectory.frames.len()
    );
    let colvar = tokio::task::block_in_place(|| {
        workflows::evaluate::run(&trajectory.frames, &variables, &reporter, &cancel)
    })?;

    write_file::<ColvarFile>(&colvar, &args.output)?;
    println!("✓ CV time series written to: {}", args.output.display());
    Ok(())
}
