use super::accumulator::{BiasReader, BiasSnapshot};
use super::cancel::CancellationToken;
use super::error::EngineError;
use super::grid::GridAxis;
use super::progress::{Progress, ProgressReporter};
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

const CHUNK_SIZE: usize = 4096;
const DEFAULT_BINS: usize = 100;

/// Free energy on a regular mesh, in kJ/mol, shifted so its minimum is zero.
///
/// Cells the bias never reached are `+∞`.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeEnergySurface {
    names: Vec<String>,
    axes: Vec<GridAxis>,
    strides: Vec<usize>,
    values: Vec<f64>,
    well_tempered: bool,
}

/// Free energy along one variable with the others integrated out.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub index: usize,
    pub name: String,
    pub positions: Vec<f64>,
    pub values: Vec<f64>,
}

impl Projection {
    pub fn is_defined(&self, i: usize) -> bool {
        self.values.get(i).is_some_and(|v| v.is_finite())
    }
}

fn row_major_strides(axes: &[GridAxis]) -> Vec<usize> {
    let mut strides = vec![1; axes.len()];
    for d in (0..axes.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * axes[d + 1].node_count();
    }
    strides
}

/// Subtracts the smallest finite value from every finite entry.
fn shift_to_zero(values: &mut [f64]) {
    let minimum = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::INFINITY, f64::min);
    if minimum.is_finite() {
        for v in values.iter_mut().filter(|v| v.is_finite()) {
            *v -= minimum;
        }
    }
}

impl FreeEnergySurface {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn axes(&self) -> &[GridAxis] {
        &self.axes
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_well_tempered(&self) -> bool {
        self.well_tempered
    }

    pub fn is_defined(&self, cell: usize) -> bool {
        self.values.get(cell).is_some_and(|v| v.is_finite())
    }

    pub fn defined_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_finite()).count()
    }

    /// Checks that at least one cell carries bias.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InsufficientSampling`] if every cell is `+∞`.
    pub fn ensure_defined(&self) -> Result<&Self, EngineError> {
        if self.defined_count() == 0 {
            return Err(EngineError::InsufficientSampling(
                "no region of collective-variable space has been biased yet".to_string(),
            ));
        }
        Ok(self)
    }

    /// CV coordinates of a cell.
    pub fn point(&self, cell: usize) -> Vec<f64> {
        self.axes
            .iter()
            .zip(&self.strides)
            .map(|(axis, &stride)| axis.position((cell / stride) % axis.node_count()))
            .collect()
    }

    pub fn points(&self) -> impl Iterator<Item = (Vec<f64>, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(cell, &value)| (self.point(cell), value))
    }

    /// The lowest defined cell, which sits at zero.
    pub fn minimum(&self) -> Option<(Vec<f64>, f64)> {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(cell, &value)| (self.point(cell), value))
    }

    /// `F(s_i) = -kT ln Σ exp(-F(s)/kT)` over the other variables.
    ///
    /// A position is `+∞` only if every cell on its slice is undefined.
    ///
    /// # Arguments
    ///
    /// * `index` - The variable to keep.
    /// * `kt` - Thermal energy in kJ/mol used for the Boltzmann sum.
    ///
    /// # Return
    ///
    /// The projected profile on this surface's axis for `index`, shifted so
    /// its minimum is zero.
    ///
    /// # Errors
    ///
    /// * [`EngineError::IndexOutOfRange`] if `index` is not a variable of the surface.
    /// * [`EngineError::InvalidTemperature`] if `kt` is not finite and positive.
    pub fn project(&self, index: usize, kt: f64) -> Result<Projection, EngineError> {
        let count = self.axes.len();
        if index >= count {
            return Err(EngineError::IndexOutOfRange { index, count });
        }
        if !(kt.is_finite() && kt > 0.0) {
            return Err(EngineError::InvalidTemperature(kt));
        }
        if !self.well_tempered {
            warn!(
                "Projecting a surface from a bias that is not well-tempered; the result is only meaningful once the bias has converged"
            );
        }

        let axis = self.axes[index];
        let stride = self.strides[index];
        let n = axis.node_count();
        let slice_of = |cell: usize| (cell / stride) % n;

        let mut peak = vec![f64::NEG_INFINITY; n];
        for (cell, &f) in self.values.iter().enumerate() {
            if f.is_finite() {
                let slot = &mut peak[slice_of(cell)];
                *slot = slot.max(-f / kt);
            }
        }
        let mut sums = vec![0.0; n];
        for (cell, &f) in self.values.iter().enumerate() {
            if f.is_finite() {
                let j = slice_of(cell);
                sums[j] += (-f / kt - peak[j]).exp();
            }
        }
        let mut values: Vec<f64> = peak
            .iter()
            .zip(&sums)
            .map(|(&m, &s)| {
                if m.is_finite() {
                    -kt * (m + s.ln())
                } else {
                    f64::INFINITY
                }
            })
            .collect();
        shift_to_zero(&mut values);

        Ok(Projection {
            index,
            name: self.names[index].clone(),
            positions: axis.positions().collect(),
            values,
        })
    }
}

/// Turns the published bias into free-energy estimates.
#[derive(Debug, Clone)]
pub struct FreeEnergyEstimator {
    reader: BiasReader,
}

impl FreeEnergyEstimator {
    pub fn new(reader: BiasReader) -> Self {
        Self { reader }
    }

    /// One axis per variable: its grid spec if it has one, otherwise the
    /// full period, its bounds, or the span of deposited hills.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InsufficientSampling`] for an unbounded,
    /// non-periodic variable without a grid when no hill has been deposited.
    pub fn default_axes(&self) -> Result<Vec<GridAxis>, EngineError> {
        let snapshot = self.reader.snapshot();
        default_axes_for(&snapshot.value)
    }

    /// Evaluates the surface on `axes` from the latest published bias.
    ///
    /// The token is checked between chunks of cells. Cancelling leaves the
    /// accumulator untouched.
    ///
    /// # Arguments
    ///
    /// * `axes` - One axis per variable, in variable order.
    /// * `cancel` - Checked between chunks of cells.
    /// * `reporter` - Receives one task step per evaluated cell.
    ///
    /// # Return
    ///
    /// The surface in kJ/mol with its minimum at zero. Cells where the bias is
    /// negligible relative to its peak are `+∞`.
    ///
    /// # Errors
    ///
    /// * [`EngineError::DimensionMismatch`] if `axes` does not match the variables.
    /// * [`EngineError::Internal`] for an axis with no bins or an empty range.
    /// * [`EngineError::Cancelled`] if `cancel` fires mid-evaluation.
    #[instrument(skip_all, name = "free_energy_surface")]
    pub fn surface(
        &self,
        axes: &[GridAxis],
        cancel: &CancellationToken,
        reporter: &ProgressReporter,
    ) -> Result<FreeEnergySurface, EngineError> {
        let snapshot = self.reader.snapshot();
        let bias = &snapshot.value;
        let dimension = bias.variables().len();
        if axes.len() != dimension {
            return Err(EngineError::DimensionMismatch {
                expected: dimension,
                found: axes.len(),
            });
        }
        if let Some(axis) = axes.iter().find(|a| a.bins == 0 || !(a.max > a.min)) {
            return Err(EngineError::Internal(format!(
                "degenerate surface axis [{}, {}] with {} bins",
                axis.min, axis.max, axis.bins
            )));
        }

        let strides = row_major_strides(axes);
        let total: usize = axes.iter().map(GridAxis::node_count).product();
        info!(
            cells = total,
            hills = bias.hill_count(),
            version = snapshot.version,
            "Evaluating free-energy surface"
        );

        let cell_point = |cell: usize| -> Vec<f64> {
            axes.iter()
                .zip(&strides)
                .map(|(axis, &stride)| axis.position((cell / stride) % axis.node_count()))
                .collect()
        };

        reporter.report(Progress::TaskStart {
            total_steps: total as u64,
        });
        let mut potential = Vec::with_capacity(total);
        for start in (0..total).step_by(CHUNK_SIZE) {
            cancel.check()?;
            let end = (start + CHUNK_SIZE).min(total);

            let iterator = start..end;
            #[cfg(feature = "parallel")]
            let iterator = (start..end).into_par_iter();

            let chunk: Vec<f64> = iterator.map(|cell| bias.bias_at(&cell_point(cell))).collect();
            potential.extend(chunk);
            reporter.report(Progress::TaskAdvance {
                steps: (end - start) as u64,
            });
        }
        reporter.report(Progress::TaskFinish);

        let values = free_energy_from_bias(&potential, bias.free_energy_scale());
        let surface = FreeEnergySurface {
            names: bias.variables().iter().map(|cv| cv.name.clone()).collect(),
            axes: axes.to_vec(),
            strides,
            values,
            well_tempered: bias.is_well_tempered(),
        };
        debug!(
            defined = surface.defined_count(),
            cells = surface.len(),
            "Free-energy surface evaluated"
        );
        Ok(surface)
    }

    /// Surface on the default axes, projected onto variable `index`.
    ///
    /// # Errors
    ///
    /// Any error of [`FreeEnergyEstimator::default_axes`],
    /// [`FreeEnergyEstimator::surface`] or [`FreeEnergySurface::project`].
    pub fn project(
        &self,
        index: usize,
        kt: f64,
        cancel: &CancellationToken,
        reporter: &ProgressReporter,
    ) -> Result<Projection, EngineError> {
        let axes = self.default_axes()?;
        self.surface(&axes, cancel, reporter)?.project(index, kt)
    }
}

/// `F = -scale * V`, undefined where `V` carries no mass relative to its peak.
fn free_energy_from_bias(potential: &[f64], scale: f64) -> Vec<f64> {
    let peak = potential.iter().copied().fold(0.0, f64::max);
    let threshold = f64::EPSILON * peak;
    let mut values: Vec<f64> = potential
        .iter()
        .map(|&v| {
            if peak > 0.0 && v > threshold {
                -scale * v
            } else {
                f64::INFINITY
            }
        })
        .collect();
    shift_to_zero(&mut values);
    values
}

fn default_axes_for(bias: &BiasSnapshot) -> Result<Vec<GridAxis>, EngineError> {
    bias.variables()
        .iter()
        .enumerate()
        .map(|(index, cv)| {
            if let Some(axis) = GridAxis::from_variable(cv) {
                return Ok(axis);
            }
            if let Some((min, max)) = cv.periodicity() {
                return Ok(GridAxis::new(min, max, DEFAULT_BINS, true));
            }
            if let (Some(lower), Some(upper)) = (cv.lower, cv.upper) {
                return Ok(GridAxis::new(lower, upper, DEFAULT_BINS, false));
            }
            let (lo, hi) = bias.hills().iter().fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(lo, hi), hill| {
                    let reach = 3.0 * hill.sigma[index];
                    (lo.min(hill.center[index] - reach), hi.max(hill.center[index] + reach))
                },
            );
            if lo < hi {
                Ok(GridAxis::new(
                    cv.lower.map_or(lo, |l| l.max(lo)),
                    cv.upper.map_or(hi, |u| u.min(hi)),
                    DEFAULT_BINS,
                    false,
                ))
            } else {
                Err(EngineError::InsufficientSampling(format!(
                    "cannot choose a range for '{}' without a grid, bounds or deposited hills",
                    cv.name
                )))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::variable::CollectiveVariable;
    use crate::core::utils::geometry::periodic_difference;
    use crate::engine::accumulator::BiasAccumulator;
    use crate::engine::config::{MetadynamicsConfigBuilder, WellTemperedConfig};
    use std::f64::consts::PI;

    const KT: f64 = 2.5;

    fn surface_of(acc: &BiasAccumulator, axes: &[GridAxis]) -> FreeEnergySurface {
        FreeEnergyEstimator::new(acc.reader())
            .surface(axes, &CancellationToken::new(), &ProgressReporter::new())
            .unwrap()
    }

    fn one_d_accumulator(well_tempered: Option<WellTemperedConfig>) -> BiasAccumulator {
        let config = MetadynamicsConfigBuilder::new()
            .variable(CollectiveVariable::distance("d", [0, 1], 0.1).with_grid(0.0, 2.0, 200))
            .initial_height(1.0)
            .pace(1)
            .well_tempered(well_tempered)
            .build()
            .unwrap();
        BiasAccumulator::new(&config)
    }

    #[test]
    fn surface_without_hills_is_entirely_undefined() {
        let acc = one_d_accumulator(None);
        let estimator = FreeEnergyEstimator::new(acc.reader());
        let axes = estimator.default_axes().unwrap();
        let surface = estimator
            .surface(&axes, &CancellationToken::new(), &ProgressReporter::new())
            .unwrap();
        assert_eq!(surface.len(), 201);
        assert!(surface.values().iter().all(|v| *v == f64::INFINITY));
        assert!(matches!(
            surface.ensure_defined(),
            Err(EngineError::InsufficientSampling(_))
        ));
        assert!(surface.minimum().is_none());

        let projection = surface.project(0, KT).unwrap();
        assert!(projection.values.iter().all(|v| *v == f64::INFINITY));
    }

    #[test]
    fn single_hill_gives_negated_bias_shifted_to_zero() {
        let mut acc = one_d_accumulator(None);
        acc.deposit_at(0.0, &[1.0]).unwrap();
        let axes = [GridAxis::new(0.0, 2.0, 200, false)];
        let surface = surface_of(&acc, &axes);

        let (point, value) = surface.minimum().unwrap();
        assert!((point[0] - 1.0).abs() < 1e-9);
        assert_eq!(value, 0.0);

        let at_1_5 = surface.values()[150];
        let expected = 1.0 - (-12.5f64).exp();
        assert!((at_1_5 - expected).abs() < 1e-9);

        // exp(-50) is below machine precision relative to the peak
        assert!(!surface.is_defined(200));
        assert_eq!(surface.values()[200], f64::INFINITY);
    }

    #[test]
    fn well_tempered_surface_is_scaled_by_bias_factor() {
        let wt = WellTemperedConfig {
            bias_factor: 6.0,
            temperature: 300.0,
        };
        let mut acc = one_d_accumulator(Some(wt));
        acc.deposit_at(0.0, &[1.0]).unwrap();
        let surface = surface_of(&acc, &[GridAxis::new(0.0, 2.0, 200, false)]);
        assert!(surface.is_well_tempered());
        let expected = 1.2 * (1.0 - (-12.5f64).exp());
        assert!((surface.values()[150] - expected).abs() < 1e-9);
    }

    #[test]
    fn surface_rejects_axes_of_the_wrong_dimension() {
        let acc = one_d_accumulator(None);
        let estimator = FreeEnergyEstimator::new(acc.reader());
        let axes = vec![GridAxis::new(0.0, 1.0, 10, false); 2];
        assert!(matches!(
            estimator.surface(&axes, &CancellationToken::new(), &ProgressReporter::new()),
            Err(EngineError::DimensionMismatch {
                expected: 1,
                found: 2
            })
        ));
    }

    #[test]
    fn cancelled_token_aborts_surface_evaluation() {
        let mut acc = one_d_accumulator(None);
        acc.deposit_at(0.0, &[1.0]).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = FreeEnergyEstimator::new(acc.reader()).surface(
            &[GridAxis::new(0.0, 2.0, 200, false)],
            &cancel,
            &ProgressReporter::new(),
        );
        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert_eq!(acc.hill_count(), 1);
    }

    #[test]
    fn project_validates_index_and_temperature() {
        let mut acc = one_d_accumulator(None);
        acc.deposit_at(0.0, &[1.0]).unwrap();
        let surface = surface_of(&acc, &[GridAxis::new(0.0, 2.0, 20, false)]);
        assert!(matches!(
            surface.project(1, KT),
            Err(EngineError::IndexOutOfRange { index: 1, count: 1 })
        ));
        assert!(matches!(
            surface.project(0, 0.0),
            Err(EngineError::InvalidTemperature(_))
        ));
        assert!(matches!(
            surface.project(0, f64::NAN),
            Err(EngineError::InvalidTemperature(_))
        ));
    }

    #[test]
    fn projection_of_separable_well_matches_analytic_profile() {
        let sigma_x = 0.3;
        let config = MetadynamicsConfigBuilder::new()
            .variable(CollectiveVariable::distance("x", [0, 1], sigma_x))
            .variable(CollectiveVariable::distance("y", [2, 3], 1000.0))
            .initial_height(1.5)
            .pace(1)
            .build()
            .unwrap();
        let mut acc = BiasAccumulator::new(&config);
        acc.deposit_at(0.0, &[0.0, 0.2]).unwrap();
        acc.deposit_at(1.0, &[0.0, 0.8]).unwrap();

        let axes = [
            GridAxis::new(-1.0, 1.0, 40, false),
            GridAxis::new(0.0, 1.0, 50, false),
        ];
        let projection = surface_of(&acc, &axes).project(0, KT).unwrap();

        for (x, f) in projection.positions.iter().zip(&projection.values) {
            let expected = 3.0 * (1.0 - (-x * x / (2.0 * sigma_x * sigma_x)).exp());
            assert!(
                (f - expected).abs() < 1e-3,
                "at x = {}: projected {} vs analytic {}",
                x,
                f,
                expected
            );
        }
    }

    #[test]
    fn projection_of_two_dimensional_well_matches_numeric_integration() {
        let height = 5.0;
        let sigma = 1.0;
        let center = [0.5, -1.0];
        let config = MetadynamicsConfigBuilder::new()
            .variable(CollectiveVariable::torsion("phi", [0, 1, 2, 3], sigma))
            .variable(CollectiveVariable::torsion("psi", [1, 2, 3, 4], sigma))
            .initial_height(height)
            .pace(1)
            .build()
            .unwrap();
        let mut acc = BiasAccumulator::new(&config);
        acc.deposit_at(0.0, &center).unwrap();

        let axes = [
            GridAxis::new(-PI, PI, 90, true),
            GridAxis::new(-PI, PI, 180, true),
        ];
        let projection = surface_of(&acc, &axes).project(0, KT).unwrap();

        let bias = |x: f64, y: f64| {
            let dx = periodic_difference(x, center[0], 2.0 * PI) / sigma;
            let dy = periodic_difference(y, center[1], 2.0 * PI) / sigma;
            height * (-0.5 * (dx * dx + dy * dy)).exp()
        };
        let samples = 4000;
        let dy = 2.0 * PI / samples as f64;
        let mut reference: Vec<f64> = projection
            .positions
            .iter()
            .map(|&x| {
                let integral: f64 = (0..samples)
                    .map(|k| (bias(x, -PI + k as f64 * dy) / KT).exp() * dy)
                    .sum();
                -KT * integral.ln()
            })
            .collect();
        let minimum = reference.iter().copied().fold(f64::INFINITY, f64::min);
        reference.iter_mut().for_each(|v| *v -= minimum);

        for ((x, f), r) in projection.positions.iter().zip(&projection.values).zip(&reference) {
            assert!(
                (f - r).abs() < 1e-3,
                "at phi = {}: projected {} vs integrated {}",
                x,
                f,
                r
            );
        }
    }

    #[test]
    fn default_axes_follow_grid_period_bounds_and_hills() {
        let config = MetadynamicsConfigBuilder::new()
            .variable(CollectiveVariable::torsion("phi", [0, 1, 2, 3], 0.3))
            .variable(CollectiveVariable::distance("d", [0, 1], 0.1).with_bounds(Some(0.5), Some(1.5)))
            .variable(CollectiveVariable::distance("r", [1, 2], 0.2))
            .initial_height(1.0)
            .pace(1)
            .build()
            .unwrap();
        let mut acc = BiasAccumulator::new(&config);
        let estimator = FreeEnergyEstimator::new(acc.reader());
        assert!(matches!(
            estimator.default_axes(),
            Err(EngineError::InsufficientSampling(_))
        ));

        acc.deposit_at(0.0, &[0.0, 1.0, 2.0]).unwrap();
        let axes = estimator.default_axes().unwrap();
        assert!(axes[0].periodic);
        assert_eq!((axes[1].min, axes[1].max), (0.5, 1.5));
        assert!((axes[2].min - 1.4).abs() < 1e-12);
        assert!((axes[2].max - 2.6).abs() < 1e-12);
    }
}
