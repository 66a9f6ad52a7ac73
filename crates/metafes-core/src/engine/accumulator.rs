use super::config::{BoundaryPolicy, GridConfig, MetadynamicsConfig, WellTemperedConfig};
use super::error::EngineError;
use super::grid::BiasGrid;
use super::log::ChunkedLog;
use super::snapshot::{Publisher, Subscriber, Versioned};
use crate::core::kernel::sum_hills;
use crate::core::models::hill::HillRecord;
use crate::core::models::variable::CollectiveVariable;
use std::sync::Arc;
use tracing::{debug, trace};

/// An immutable view of the bias after some number of deposits.
#[derive(Debug, Clone)]
pub struct BiasSnapshot {
    variables: Arc<[CollectiveVariable]>,
    hills: ChunkedLog<HillRecord>,
    mesh: Option<Arc<BiasGrid>>,
    folded: usize,
    well_tempered: Option<WellTemperedConfig>,
}

impl BiasSnapshot {
    fn empty(
        variables: Arc<[CollectiveVariable]>,
        well_tempered: Option<WellTemperedConfig>,
        with_grid: bool,
    ) -> Self {
        let mesh = if with_grid {
            BiasGrid::for_variables(&variables).map(Arc::new)
        } else {
            None
        };
        Self {
            variables,
            hills: ChunkedLog::new(),
            mesh,
            folded: 0,
            well_tempered,
        }
    }

    /// Bias at `point`, using the mesh for folded hills when one covers the point.
    pub fn bias_at(&self, point: &[f64]) -> f64 {
        if let Some(mesh) = &self.mesh {
            if let Some(folded) = mesh.interpolate(point) {
                let pending = sum_hills(self.hills.iter_from(self.folded), point, &self.variables);
                return folded + pending;
            }
        }
        self.exact_bias_at(point)
    }

    /// Untruncated sum over every hill.
    pub fn exact_bias_at(&self, point: &[f64]) -> f64 {
        sum_hills(self.hills.iter(), point, &self.variables)
    }

    pub fn hills(&self) -> &ChunkedLog<HillRecord> {
        &self.hills
    }

    pub fn hill_count(&self) -> usize {
        self.hills.len()
    }

    pub fn variables(&self) -> &[CollectiveVariable] {
        &self.variables
    }

    pub fn is_well_tempered(&self) -> bool {
        self.well_tempered.is_some()
    }

    pub fn well_tempered(&self) -> Option<&WellTemperedConfig> {
        self.well_tempered.as_ref()
    }

    /// Factor mapping the bias onto `-F`.
    pub fn free_energy_scale(&self) -> f64 {
        self.well_tempered
            .as_ref()
            .map_or(1.0, WellTemperedConfig::free_energy_scale)
    }

    pub fn last_time(&self) -> Option<f64> {
        self.hills.last().map(|hill| hill.time)
    }
}

/// Read handle on an accumulator's published bias.
#[derive(Debug, Clone)]
pub struct BiasReader {
    subscriber: Subscriber<BiasSnapshot>,
}

impl BiasReader {
    pub fn snapshot(&self) -> Arc<Versioned<BiasSnapshot>> {
        self.subscriber.latest()
    }

    pub fn bias_at(&self, point: &[f64]) -> f64 {
        self.snapshot().value.bias_at(point)
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version
    }
}

/// Single-writer store of deposited hills.
///
/// Every deposit is published atomically; readers obtained through
/// [`BiasAccumulator::reader`] see either the state before or after it.
#[derive(Debug)]
pub struct BiasAccumulator {
    state: BiasSnapshot,
    publisher: Publisher<BiasSnapshot>,
    initial_height: f64,
    boundary: BoundaryPolicy,
    grid: Option<GridConfig>,
}

impl BiasAccumulator {
    /// Creates an empty accumulator and publishes its initial, zero bias.
    ///
    /// # Arguments
    ///
    /// * `config` - A validated configuration; its variables, height,
    ///   boundary policy, well-tempering and grid are copied in.
    pub fn new(config: &MetadynamicsConfig) -> Self {
        let variables: Arc<[CollectiveVariable]> = config.variables.clone().into();
        let state = BiasSnapshot::empty(variables, config.well_tempered, config.grid.is_some());
        let publisher = Publisher::new(state.clone());
        Self {
            state,
            publisher,
            initial_height: config.initial_height,
            boundary: config.boundary,
            grid: config.grid,
        }
    }

    pub fn variables(&self) -> &[CollectiveVariable] {
        self.state.variables()
    }

    pub fn hill_count(&self) -> usize {
        self.state.hill_count()
    }

    pub fn hills(&self) -> &ChunkedLog<HillRecord> {
        self.state.hills()
    }

    pub fn version(&self) -> u64 {
        self.publisher.version()
    }

    pub fn reader(&self) -> BiasReader {
        BiasReader {
            subscriber: self.publisher.subscribe(),
        }
    }

    /// Bias at `point` in the writer's current state, identical to what
    /// readers see.
    pub fn bias_at(&self, point: &[f64]) -> f64 {
        self.state.bias_at(point)
    }

    pub fn exact_bias_at(&self, point: &[f64]) -> f64 {
        self.state.exact_bias_at(point)
    }

    /// Largest absolute difference between grid-backed and exact evaluation
    /// over `probes`. Zero without a grid.
    pub fn max_grid_deviation(&self, probes: &[Vec<f64>]) -> f64 {
        if self.state.mesh.is_none() {
            return 0.0;
        }
        probes
            .iter()
            .map(|p| (self.state.bias_at(p) - self.state.exact_bias_at(p)).abs())
            .fold(0.0, f64::max)
    }

    /// Deposits a hill with the configured initial height and widths.
    ///
    /// # Errors
    ///
    /// Same as [`BiasAccumulator::deposit`].
    pub fn deposit_at(&mut self, time: f64, cv_values: &[f64]) -> Result<HillRecord, EngineError> {
        let sigma: Vec<f64> = self.state.variables.iter().map(|cv| cv.sigma).collect();
        self.deposit(time, cv_values, self.initial_height, &sigma)
    }

    /// Deposits a hill of nominal `height` centred at `cv_values`.
    ///
    /// When well-tempered, the stored height is scaled down by the bias
    /// already present at the centre.
    ///
    /// # Arguments
    ///
    /// * `time` - Simulation time of the deposit.
    /// * `cv_values` - One raw value per variable; periodic values are
    ///   canonicalized before use.
    /// * `height` - Nominal height in kJ/mol, before any well-tempered decay.
    /// * `sigma` - One Gaussian width per variable.
    ///
    /// # Return
    ///
    /// The record as stored, with its effective height and bias factor.
    ///
    /// # Errors
    ///
    /// Nothing is stored on error.
    ///
    /// * [`EngineError::DimensionMismatch`] if `cv_values` or `sigma` has the
    ///   wrong length.
    /// * [`EngineError::InvalidHill`] for a non-finite time, a negative or
    ///   non-finite height, or a non-positive width.
    /// * [`EngineError::InvalidCvValue`] for a non-finite value, or an
    ///   out-of-bounds one under [`BoundaryPolicy::Strict`].
    pub fn deposit(
        &mut self,
        time: f64,
        cv_values: &[f64],
        height: f64,
        sigma: &[f64],
    ) -> Result<HillRecord, EngineError> {
        let dimension = self.state.variables.len();
        for found in [cv_values.len(), sigma.len()] {
            if found != dimension {
                return Err(EngineError::DimensionMismatch {
                    expected: dimension,
                    found,
                });
            }
        }
        if !time.is_finite() {
            return Err(EngineError::InvalidHill(format!("non-finite time {}", time)));
        }
        if !(height.is_finite() && height >= 0.0) {
            return Err(EngineError::InvalidHill(format!(
                "height must be finite and non-negative, got {}",
                height
            )));
        }
        if let Some(s) = sigma.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(EngineError::InvalidHill(format!(
                "sigma must be finite and positive, got {}",
                s
            )));
        }

        let center = self.admit_center(cv_values)?;

        let (height, bias_factor) = match &self.state.well_tempered {
            Some(wt) => {
                let bias = self.state.bias_at(&center);
                (height * (-bias / wt.decay_energy()).exp(), Some(wt.bias_factor))
            }
            None => (height, None),
        };

        let record = HillRecord {
            time,
            center,
            sigma: sigma.to_vec(),
            height,
            bias_factor,
        };
        trace!(
            time,
            height = record.height,
            center = ?record.center,
            "Depositing hill"
        );
        self.push(record.clone());
        self.publish();
        Ok(record)
    }

    /// Appends a hill whose height is already effective, e.g. from a hill log.
    ///
    /// The record is not re-tempered; only its centre is canonicalized.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DimensionMismatch`] or [`EngineError::InvalidHill`]
    /// if the record does not fit the configured variables.
    pub fn append_record(&mut self, record: HillRecord) -> Result<(), EngineError> {
        self.push(self.validate_record(record)?);
        self.publish();
        Ok(())
    }

    /// Appends many records and publishes once.
    ///
    /// Nothing is appended if any record is invalid.
    ///
    /// # Return
    ///
    /// The number of records appended.
    ///
    /// # Errors
    ///
    /// The first error [`BiasAccumulator::append_record`] would report.
    pub fn append_records(
        &mut self,
        records: impl IntoIterator<Item = HillRecord>,
    ) -> Result<usize, EngineError> {
        let validated = records
            .into_iter()
            .map(|r| self.validate_record(r))
            .collect::<Result<Vec<_>, _>>()?;
        let count = validated.len();
        for record in validated {
            self.push(record);
        }
        if count > 0 {
            self.publish();
        }
        debug!(count, total = self.hill_count(), "Appended hill records");
        Ok(count)
    }

    fn validate_record(&self, mut record: HillRecord) -> Result<HillRecord, EngineError> {
        let dimension = self.state.variables.len();
        for found in [record.center.len(), record.sigma.len()] {
            if found != dimension {
                return Err(EngineError::DimensionMismatch {
                    expected: dimension,
                    found,
                });
            }
        }
        if !record.is_finite() || record.height < 0.0 || record.sigma.iter().any(|s| *s <= 0.0) {
            return Err(EngineError::InvalidHill(format!(
                "record at time {} has non-finite values, a negative height or a non-positive sigma",
                record.time
            )));
        }
        for (value, cv) in record.center.iter_mut().zip(self.state.variables.iter()) {
            *value = cv.canonicalize(*value);
        }
        Ok(record)
    }

    /// Canonicalizes periodic values and applies the boundary policy.
    fn admit_center(&self, cv_values: &[f64]) -> Result<Vec<f64>, EngineError> {
        self.state
            .variables
            .iter()
            .zip(cv_values)
            .enumerate()
            .map(|(index, (cv, &raw))| {
                if !raw.is_finite() {
                    return Err(EngineError::InvalidCvValue {
                        index,
                        value: raw,
                        lower: cv.lower,
                        upper: cv.upper,
                    });
                }
                let value = cv.canonicalize(raw);
                if cv.in_bounds(value) {
                    return Ok(value);
                }
                match self.boundary {
                    BoundaryPolicy::Strict => Err(EngineError::InvalidCvValue {
                        index,
                        value,
                        lower: cv.lower,
                        upper: cv.upper,
                    }),
                    BoundaryPolicy::Reflect => {
                        let reflected = cv.reflect(value);
                        trace!(index, value, reflected, "Reflected out-of-bounds value");
                        Ok(reflected)
                    }
                }
            })
            .collect()
    }

    fn push(&mut self, record: HillRecord) {
        self.state.hills.push(record);
        let pending = self.state.hills.len() - self.state.folded;
        let due = self.grid.is_some_and(|grid| pending >= grid.fold_stride);
        if due && self.state.mesh.is_some() {
            self.fold();
        }
    }

    /// Moves the pending tail into the mesh.
    fn fold(&mut self) {
        let BiasSnapshot {
            variables,
            hills,
            mesh,
            folded,
            ..
        } = &mut self.state;
        let Some(mesh) = mesh else {
            return;
        };
        let mesh = Arc::make_mut(mesh);
        let pending = hills.len() - *folded;
        for hill in hills.iter_from(*folded) {
            mesh.add_hill(hill, variables);
        }
        *folded = hills.len();
        debug!(pending, total = hills.len(), "Folded pending hills into the bias grid");
    }

    fn publish(&mut self) {
        self.publisher.publish(self.state.clone());
    }
}
