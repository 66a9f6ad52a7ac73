use super::{read_file, run_cancellable, write_file};
use crate::cli::FesArgs;
use crate::config::{CliOverrides, PartialConfig};
use crate::error::{CliError, Result};
use crate::utils::{parser, progress::CliProgressHandler};
use metafes::core::io::hills::HillsFile;
use metafes::core::io::table::{Table, TableFile};
use metafes::workflows::{self, reconstruct::FesRequest, session::FreeEnergy};
use tracing::info;

pub async fn run(args: FesArgs) -> Result<()> {
    let config = PartialConfig::from_file(&args.config.config)?
        .merge_with_cli(&args.config, &CliOverrides::default())?;
    let log = read_file::<HillsFile>(&args.hills)?;

    let project = args
        .project
        .as_deref()
        .map(|key| parser::resolve_variable(key, &config.variable_names()))
        .transpose()
        .map_err(|e| CliError::Argument(e.to_string()))?;
    let kt = args.kt.map(|kt| config.to_kj_per_mol(kt));
    if project.is_some() && kt.is_none() && config.core.well_tempered.is_none() {
        return Err(CliError::Argument(
            "--kt is required to project the surface of a run without well-tempering".to_string(),
        ));
    }
    let request = FesRequest {
        project,
        kt,
        axes: None,
    };

    let progress_handler = CliProgressHandler::new();
    let reporter = progress_handler.reporter();

    println!(
        "Reconstructing the free energy from {} hill(s)... (Ctrl-C to cancel)",
        log.records.len()
    );
    let core = config.core.clone();
    let free_energy = run_cancellable(move |cancel| {
        workflows::reconstruct::run(&log, &core, &request, &reporter, &cancel)
    })
    .await?;

    let (headers, rows) = free_energy.columns();
    let mut table = Table::new(headers, rows);
    table.map_last_column(|value| value / config.energy_factor);
    let row_count = table.rows.len();
    write_file::<TableFile>(&table, &args.output)?;

    match &free_energy {
        FreeEnergy::Surface(surface) => {
            info!(
                cells = surface.len(),
                defined = surface.defined_count(),
                "Surface written"
            );
            if let Some((point, _)) = surface.minimum() {
                println!("  Global minimum at {:?}", point);
            }
        }
        FreeEnergy::Projection(projection) => {
            info!(variable = %projection.name, points = row_count, "Projection written");
        }
    }
    println!(
        "✓ {} row(s) in {} written to: {}",
        row_count,
        config.energy_unit,
        args.output.display()
    );
    Ok(())
}
