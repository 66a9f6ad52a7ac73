use crate::core::models::variable::CollectiveVariable;
use crate::core::units::thermal_energy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error(
        "Bias grid is too coarse for '{variable}': estimated interpolation error {estimate:.3e} exceeds tolerance {tolerance:.3e}"
    )]
    GridTooCoarse {
        variable: String,
        estimate: f64,
        tolerance: f64,
    },
}

fn invalid(name: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        name: name.into(),
        reason: reason.into(),
    }
}

/// What to do with a deposit whose CV value lies outside the variable's bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryPolicy {
    /// Reject the deposit with `InvalidCvValue`.
    #[default]
    Strict,
    /// Mirror the value back inside the bounds.
    Reflect,
}

/// How a session reacts to a rejected deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationMode {
    /// Report the violation and keep running.
    #[default]
    Soft,
    /// Report the violation and finish the run.
    Hard,
}

/// Well-tempered height decay: `h = h0 * exp(-V(s) / (k_B T (γ - 1)))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WellTemperedConfig {
    pub bias_factor: f64,
    /// Kelvin.
    pub temperature: f64,
}

impl WellTemperedConfig {
    /// `k_B T` in kJ/mol.
    pub fn thermal_energy(&self) -> f64 {
        thermal_energy(self.temperature)
    }

    /// `k_B T (γ - 1)`, the energy scale of the height decay.
    pub fn decay_energy(&self) -> f64 {
        self.thermal_energy() * (self.bias_factor - 1.0)
    }

    /// `γ / (γ - 1)`, mapping the converged bias onto `-F`.
    pub fn free_energy_scale(&self) -> f64 {
        self.bias_factor / (self.bias_factor - 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridConfig {
    /// Number of deposits kept as an exactly evaluated tail before they are
    /// folded into the mesh.
    pub fold_stride: usize,
    /// Upper bound, in kJ/mol, on the interpolation error of a single hill.
    pub tolerance: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            fold_stride: 100,
            tolerance: 1e-2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerConfig {
    pub seed: u64,
    pub max_stale_retries: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            max_stale_retries: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetadynamicsConfig {
    pub variables: Vec<CollectiveVariable>,
    /// Initial hill height in kJ/mol.
    pub initial_height: f64,
    /// Frames between deposits.
    pub pace: usize,
    pub well_tempered: Option<WellTemperedConfig>,
    pub grid: Option<GridConfig>,
    pub boundary: BoundaryPolicy,
    pub violation: ViolationMode,
    pub sampler: SamplerConfig,
}

impl MetadynamicsConfig {
    pub fn dimension(&self) -> usize {
        self.variables.len()
    }

    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|cv| cv.name == name)
    }

    pub fn sigmas(&self) -> Vec<f64> {
        self.variables.iter().map(|cv| cv.sigma).collect()
    }

    pub fn free_energy_scale(&self) -> f64 {
        self.well_tempered
            .map_or(1.0, |wt| wt.free_energy_scale())
    }
}

#[derive(Default)]
pub struct MetadynamicsConfigBuilder {
    variables: Vec<CollectiveVariable>,
    initial_height: Option<f64>,
    pace: Option<usize>,
    well_tempered: Option<WellTemperedConfig>,
    grid: Option<GridConfig>,
    boundary: BoundaryPolicy,
    violation: ViolationMode,
    sampler: SamplerConfig,
}

impl MetadynamicsConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variable(mut self, variable: CollectiveVariable) -> Self {
        self.variables.push(variable);
        self
    }
    pub fn variables(mut self, variables: Vec<CollectiveVariable>) -> Self {
        self.variables = variables;
        self
    }
    pub fn initial_height(mut self, height: f64) -> Self {
        self.initial_height = Some(height);
        self
    }
    pub fn pace(mut self, pace: usize) -> Self {
        self.pace = Some(pace);
        self
    }
    pub fn well_tempered(mut self, config: Option<WellTemperedConfig>) -> Self {
        self.well_tempered = config;
        self
    }
    pub fn grid(mut self, config: Option<GridConfig>) -> Self {
        self.grid = config;
        self
    }
    pub fn boundary(mut self, policy: BoundaryPolicy) -> Self {
        self.boundary = policy;
        self
    }
    pub fn violation(mut self, mode: ViolationMode) -> Self {
        self.violation = mode;
        self
    }
    pub fn sampler(mut self, config: SamplerConfig) -> Self {
        self.sampler = config;
        self
    }

    pub fn build(self) -> Result<MetadynamicsConfig, ConfigError> {
        if self.variables.is_empty() {
            return Err(ConfigError::MissingParameter("variables"));
        }
        let initial_height = self
            .initial_height
            .ok_or(ConfigError::MissingParameter("initial_height"))?;
        let pace = self.pace.ok_or(ConfigError::MissingParameter("pace"))?;

        if !initial_height.is_finite() || initial_height <= 0.0 {
            return Err(invalid("initial_height", "must be finite and positive"));
        }
        if pace == 0 {
            return Err(invalid("pace", "must be at least 1"));
        }
        for (i, cv) in self.variables.iter().enumerate() {
            validate_variable(cv)?;
            if self.variables[..i].iter().any(|other| other.name == cv.name) {
                return Err(invalid(
                    format!("variables.{}", cv.name),
                    "variable names must be unique",
                ));
            }
        }
        if let Some(wt) = &self.well_tempered {
            if !(wt.bias_factor.is_finite() && wt.bias_factor > 1.0) {
                return Err(invalid("well_tempered.bias_factor", "must be greater than 1"));
            }
            if !(wt.temperature.is_finite() && wt.temperature > 0.0) {
                return Err(invalid("well_tempered.temperature", "must be positive"));
            }
        }
        if let Some(grid) = &self.grid {
            validate_grid(grid, &self.variables, initial_height)?;
        }

        Ok(MetadynamicsConfig {
            variables: self.variables,
            initial_height,
            pace,
            well_tempered: self.well_tempered,
            grid: self.grid,
            boundary: self.boundary,
            violation: self.violation,
            sampler: self.sampler,
        })
    }
}

fn validate_variable(cv: &CollectiveVariable) -> Result<(), ConfigError> {
    let field = |suffix: &str| format!("variables.{}.{}", cv.name, suffix);

    if cv.name.trim().is_empty() || cv.name.contains(char::is_whitespace) {
        return Err(invalid("variables.name", "must be a non-empty word"));
    }
    if !(cv.sigma.is_finite() && cv.sigma > 0.0) {
        return Err(invalid(field("sigma"), "must be finite and positive"));
    }
    if let (Some(lower), Some(upper)) = (cv.lower, cv.upper) {
        if lower >= upper {
            return Err(invalid(field("bounds"), "lower bound must be below upper bound"));
        }
    }
    if let Some(spec) = &cv.grid {
        if !(spec.min.is_finite() && spec.max.is_finite() && spec.min < spec.max) {
            return Err(invalid(field("grid"), "min must be below max"));
        }
        if spec.bins == 0 {
            return Err(invalid(field("grid"), "bins must be at least 1"));
        }
    }
    Ok(())
}

/// Rejects meshes whose linear interpolation of a single hill of
/// `initial_height` may be off by more than the tolerance.
///
/// The estimate uses the second-derivative bound of a Gaussian,
/// `h * Σ_d (Δ_d / σ_d)² / 8`.
fn validate_grid(
    grid: &GridConfig,
    variables: &[CollectiveVariable],
    initial_height: f64,
) -> Result<(), ConfigError> {
    if grid.fold_stride == 0 {
        return Err(invalid("grid.fold_stride", "must be at least 1"));
    }
    if !(grid.tolerance.is_finite() && grid.tolerance > 0.0) {
        return Err(invalid("grid.tolerance", "must be finite and positive"));
    }

    let mut estimate = 0.0;
    let mut worst: Option<(&str, f64)> = None;
    for cv in variables {
        let spec = cv.grid.ok_or_else(|| {
            invalid(
                format!("variables.{}.grid", cv.name),
                "a bias grid requires every variable to define a grid axis",
            )
        })?;
        let spacing = (spec.max - spec.min) / spec.bins as f64;
        let contribution = initial_height * (spacing / cv.sigma).powi(2) / 8.0;
        estimate += contribution;
        if worst.is_none_or(|(_, c)| contribution > c) {
            worst = Some((cv.name.as_str(), contribution));
        }
    }

    if estimate > grid.tolerance {
        return Err(ConfigError::GridTooCoarse {
            variable: worst.map(|(name, _)| name.to_string()).unwrap_or_default(),
            estimate,
            tolerance: grid.tolerance,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn phi() -> CollectiveVariable {
        CollectiveVariable::torsion("phi", [0, 1, 2, 3], 0.35).with_grid(-PI, PI, 360)
    }

    fn base_builder() -> MetadynamicsConfigBuilder {
        MetadynamicsConfigBuilder::new()
            .variable(phi())
            .initial_height(1.2)
            .pace(10)
    }

    #[test]
    fn build_succeeds_with_required_parameters_and_defaults() {
        let config = base_builder().build().unwrap();
        assert_eq!(config.dimension(), 1);
        assert_eq!(config.boundary, BoundaryPolicy::Strict);
        assert_eq!(config.violation, ViolationMode::Soft);
        assert_eq!(config.sampler, SamplerConfig::default());
        assert_eq!(config.free_energy_scale(), 1.0);
        assert_eq!(config.variable_index("phi"), Some(0));
    }

    #[test]
    fn build_fails_without_variables() {
        let result = MetadynamicsConfigBuilder::new()
            .initial_height(1.0)
            .pace(1)
            .build();
        assert_eq!(result, Err(ConfigError::MissingParameter("variables")));
    }

    #[test]
    fn build_fails_without_height_or_pace() {
        let no_height = MetadynamicsConfigBuilder::new().variable(phi()).pace(1).build();
        assert_eq!(no_height, Err(ConfigError::MissingParameter("initial_height")));

        let no_pace = MetadynamicsConfigBuilder::new()
            .variable(phi())
            .initial_height(1.0)
            .build();
        assert_eq!(no_pace, Err(ConfigError::MissingParameter("pace")));
    }

    #[test]
    fn build_rejects_non_positive_sigma() {
        let result = base_builder()
            .variable(CollectiveVariable::distance("d", [0, 1], 0.0))
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidParameter { .. })));
    }

    #[test]
    fn build_rejects_duplicate_names() {
        let result = base_builder().variable(phi()).build();
        assert!(matches!(result, Err(ConfigError::InvalidParameter { .. })));
    }

    #[test]
    fn build_rejects_bias_factor_of_one() {
        let result = base_builder()
            .well_tempered(Some(WellTemperedConfig {
                bias_factor: 1.0,
                temperature: 300.0,
            }))
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidParameter { .. })));
    }

    #[test]
    fn well_tempered_scales_follow_bias_factor() {
        let wt = WellTemperedConfig {
            bias_factor: 10.0,
            temperature: 300.0,
        };
        assert!((wt.free_energy_scale() - 10.0 / 9.0).abs() < 1e-12);
        assert!((wt.decay_energy() - 9.0 * thermal_energy(300.0)).abs() < 1e-12);
    }

    #[test]
    fn grid_requires_axis_on_every_variable() {
        let result = base_builder()
            .variable(CollectiveVariable::distance("d", [0, 1], 0.1))
            .grid(Some(GridConfig::default()))
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidParameter { .. })));
    }

    #[test]
    fn grid_that_is_too_coarse_is_rejected() {
        let coarse = CollectiveVariable::distance("d", [0, 1], 0.1).with_grid(0.0, 2.0, 4);
        let result = MetadynamicsConfigBuilder::new()
            .variable(coarse)
            .initial_height(1.0)
            .pace(1)
            .grid(Some(GridConfig::default()))
            .build();
        match result {
            Err(ConfigError::GridTooCoarse { variable, .. }) => assert_eq!(variable, "d"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn fine_grid_is_accepted() {
        let config = base_builder().grid(Some(GridConfig::default())).build();
        assert!(config.is_ok());
    }
}
