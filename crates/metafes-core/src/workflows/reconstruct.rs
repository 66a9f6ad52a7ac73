use super::session::FreeEnergy;
use crate::core::io::hills::HillLog;
use crate::engine::accumulator::BiasAccumulator;
use crate::engine::cancel::CancellationToken;
use crate::engine::config::{ConfigError, MetadynamicsConfig};
use crate::engine::error::EngineError;
use crate::engine::estimator::FreeEnergyEstimator;
use crate::engine::grid::GridAxis;
use crate::engine::progress::{Progress, ProgressReporter};
use tracing::{info, instrument, warn};

/// What to compute from a hill log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FesRequest {
    /// Project onto this variable instead of returning the full surface.
    pub project: Option<usize>,
    /// Thermal energy for the projection, in kJ/mol.
    pub kt: Option<f64>,
    /// Surface axes; the variables' defaults when absent.
    pub axes: Option<Vec<GridAxis>>,
}

/// Rebuilds the bias from `log` and estimates the free energy.
///
/// The log's variables must match the configured ones by name and order.
#[instrument(skip_all, name = "fes_reconstruction_workflow")]
pub fn run(
    log: &HillLog,
    config: &MetadynamicsConfig,
    request: &FesRequest,
    reporter: &ProgressReporter,
    cancel: &CancellationToken,
) -> Result<FreeEnergy, EngineError> {
    check_variables(log, config)?;
    if config.well_tempered.is_none() && log.records.iter().any(|r| r.bias_factor.is_some()) {
        warn!(
            "The hill log was written by a well-tempered run but no bias factor is configured; the surface will not be rescaled"
        );
    }

    reporter.report(Progress::PhaseStart {
        name: "Loading Hills",
    });
    let mut accumulator = BiasAccumulator::new(config);
    accumulator.append_records(log.records.iter().cloned())?;
    reporter.report(Progress::PhaseFinish);
    info!(hills = accumulator.hill_count(), "Bias rebuilt from hill log");

    reporter.report(Progress::PhaseStart {
        name: "Free Energy",
    });
    let estimator = FreeEnergyEstimator::new(accumulator.reader());
    let axes = match &request.axes {
        Some(axes) => axes.clone(),
        None => estimator.default_axes()?,
    };
    let surface = estimator.surface(&axes, cancel, reporter)?;
    reporter.report(Progress::PhaseFinish);

    if surface.defined_count() == 0 {
        warn!("The reconstructed surface has no defined cells");
    }

    match request.project {
        None => Ok(FreeEnergy::Surface(surface)),
        Some(index) => {
            let kt = request
                .kt
                .or_else(|| config.well_tempered.map(|wt| wt.thermal_energy()))
                .ok_or(ConfigError::MissingParameter("kt"))?;
            Ok(FreeEnergy::Projection(surface.project(index, kt)?))
        }
    }
}

fn check_variables(log: &HillLog, config: &MetadynamicsConfig) -> Result<(), EngineError> {
    if log.variables.len() != config.dimension() {
        return Err(EngineError::DimensionMismatch {
            expected: config.dimension(),
            found: log.variables.len(),
        });
    }
    for (logged, configured) in log.variables.iter().zip(&config.variables) {
        if logged.name != configured.name {
            return Err(ConfigError::InvalidParameter {
                name: "variables".to_string(),
                reason: format!(
                    "hill log column '{}' does not match configured variable '{}'",
                    logged.name, configured.name
                ),
            }
            .into());
        }
    }
    Ok(())
}
