mod defaults;

use self::defaults::DefaultsConfig;
use crate::cli::ConfigArgs;
use crate::error::{CliError, Result};
use metafes::core::models::variable::CollectiveVariable;
use metafes::core::units;
use metafes::engine::config::{
    BoundaryPolicy, GridConfig, MetadynamicsConfig, MetadynamicsConfigBuilder, SamplerConfig,
    ViolationMode, WellTemperedConfig,
};
use serde::Deserialize;
use serde::de::{DeserializeOwned, IntoDeserializer, value::StrDeserializer};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
enum PartialVariableKind {
    Torsion,
    Distance,
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(deny_unknown_fields)]
struct PartialGridAxis {
    min: f64,
    max: f64,
    bins: usize,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct PartialVariable {
    name: String,
    #[serde(rename = "type")]
    kind: PartialVariableKind,
    atoms: Vec<usize>,
    sigma: f64,
    lower: Option<f64>,
    upper: Option<f64>,
    grid: Option<PartialGridAxis>,
}

impl PartialVariable {
    fn into_core(self) -> Result<CollectiveVariable> {
        let wrong_count = |expected: usize| {
            CliError::Config(format!(
                "Variable '{}' needs exactly {} atom indices, found {}.",
                self.name,
                expected,
                self.atoms.len()
            ))
        };
        let variable = match self.kind {
            PartialVariableKind::Torsion => {
                let atoms: [usize; 4] = self
                    .atoms
                    .as_slice()
                    .try_into()
                    .map_err(|_| wrong_count(4))?;
                CollectiveVariable::torsion(self.name.clone(), atoms, self.sigma)
            }
            PartialVariableKind::Distance => {
                let atoms: [usize; 2] = self
                    .atoms
                    .as_slice()
                    .try_into()
                    .map_err(|_| wrong_count(2))?;
                CollectiveVariable::distance(self.name.clone(), atoms, self.sigma)
            }
        };
        let variable = variable.with_bounds(self.lower, self.upper);
        Ok(match self.grid {
            Some(grid) => variable.with_grid(grid.min, grid.max, grid.bins),
            None => variable,
        })
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
struct PartialWellTemperedConfig {
    #[serde(rename = "bias-factor")]
    bias_factor: Option<f64>,
    temperature: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
struct PartialGridConfig {
    #[serde(rename = "fold-stride")]
    fold_stride: Option<usize>,
    tolerance: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialMetadynamicsConfig {
    height: Option<f64>,
    pace: Option<usize>,
    boundary: Option<BoundaryPolicy>,
    violation: Option<ViolationMode>,
    #[serde(rename = "well-tempered")]
    well_tempered: Option<PartialWellTemperedConfig>,
    grid: Option<PartialGridConfig>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialSamplerConfig {
    seed: Option<u64>,
    #[serde(rename = "max-stale-retries")]
    max_stale_retries: Option<usize>,
}

/// Run configuration as read from TOML, before defaults and overrides.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    #[serde(rename = "energy-unit")]
    energy_unit: Option<String>,
    metadynamics: Option<PartialMetadynamicsConfig>,
    sampler: Option<PartialSamplerConfig>,
    #[serde(default)]
    variables: Vec<PartialVariable>,
}

/// Values given by dedicated command-line flags; these win over both the
/// file and `--set`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CliOverrides {
    pub height: Option<f64>,
    pub pace: Option<usize>,
    pub seed: Option<u64>,
}

/// Fully resolved configuration of one invocation.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub core: MetadynamicsConfig,
    pub energy_unit: String,
    /// Multiplier from `energy_unit` to kJ/mol.
    pub energy_factor: f64,
}

impl RunConfig {
    pub fn to_kj_per_mol(&self, value: f64) -> f64 {
        value * self.energy_factor
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.core.variables.iter().map(|cv| cv.name.clone()).collect()
    }
}

fn required(key: &str) -> CliError {
    CliError::Config(format!(
        "A value for '{}' is required either in the config file or via CLI argument.",
        key
    ))
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid numeric value for {}: {}", key, value)))
}

fn parse_keyword<T: DeserializeOwned>(key: &str, value: &str) -> Result<T> {
    let deserializer: StrDeserializer<'_, serde::de::value::Error> = value.trim().into_deserializer();
    T::deserialize(deserializer)
        .map_err(|e| CliError::Config(format!("Invalid value for {}: {} ({})", key, value, e)))
}

impl PartialConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Reading configuration from {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|e| CliError::parsing(path, e))?;
        toml::from_str(&content).map_err(|e| CliError::parsing(path, e))
    }

    /// Resolves the configuration of a metadynamics run.
    ///
    /// Precedence, highest first: dedicated flags, `--set`, the file, defaults.
    pub fn merge_with_cli(mut self, args: &ConfigArgs, overrides: &CliOverrides) -> Result<RunConfig> {
        self.apply_set_values(&args.set_values)?;
        let defaults = DefaultsConfig::default();
        let PartialConfig {
            energy_unit,
            metadynamics,
            sampler,
            variables,
        } = self;
        let metadynamics = metadynamics.unwrap_or_default();
        let sampler = sampler.unwrap_or_default();

        let well_tempered = Self::merge_well_tempered(metadynamics.well_tempered)?;
        let energy_unit = energy_unit.unwrap_or(defaults.energy_unit);
        let energy_factor =
            units::conversion_factor(&energy_unit, well_tempered.map(|wt| wt.temperature))
                .map_err(|e| CliError::Config(e.to_string()))?;

        let height = overrides
            .height
            .or(metadynamics.height)
            .ok_or_else(|| required("metadynamics.height"))?;

        let grid = metadynamics.grid.map(|grid| GridConfig {
            fold_stride: grid.fold_stride.unwrap_or(defaults.fold_stride),
            tolerance: grid
                .tolerance
                .map_or(defaults.grid_tolerance, |t| t * energy_factor),
        });

        let core = MetadynamicsConfigBuilder::new()
            .variables(Self::convert_variables(variables)?)
            .initial_height(height * energy_factor)
            .pace(overrides.pace.or(metadynamics.pace).unwrap_or(defaults.pace))
            .well_tempered(well_tempered)
            .grid(grid)
            .boundary(metadynamics.boundary.unwrap_or(defaults.boundary))
            .violation(metadynamics.violation.unwrap_or(defaults.violation))
            .sampler(SamplerConfig {
                seed: overrides.seed.or(sampler.seed).unwrap_or(defaults.seed),
                max_stale_retries: sampler
                    .max_stale_retries
                    .unwrap_or(defaults.max_stale_retries),
            })
            .build()
            .map_err(|e| CliError::Config(e.to_string()))?;

        debug!(?core, energy_unit = %energy_unit, "Configuration resolved");
        Ok(RunConfig {
            core,
            energy_unit,
            energy_factor,
        })
    }

    /// Resolves only the variable definitions, for commands that never deposit.
    pub fn variables_with_cli(mut self, args: &ConfigArgs) -> Result<Vec<CollectiveVariable>> {
        self.apply_set_values(&args.set_values)?;
        let variables = Self::convert_variables(self.variables)?;
        if variables.is_empty() {
            return Err(CliError::Config(
                "At least one `[[variables]]` entry is required.".to_string(),
            ));
        }
        for (i, cv) in variables.iter().enumerate() {
            if variables[..i].iter().any(|other| other.name == cv.name) {
                return Err(CliError::Config(format!(
                    "Variable name '{}' is used more than once.",
                    cv.name
                )));
            }
        }
        Ok(variables)
    }

    fn convert_variables(variables: Vec<PartialVariable>) -> Result<Vec<CollectiveVariable>> {
        variables.into_iter().map(PartialVariable::into_core).collect()
    }

    fn merge_well_tempered(
        partial: Option<PartialWellTemperedConfig>,
    ) -> Result<Option<WellTemperedConfig>> {
        let Some(p) = partial else {
            return Ok(None);
        };
        Ok(Some(WellTemperedConfig {
            bias_factor: p.bias_factor.ok_or_else(|| {
                CliError::Config("`well-tempered` requires `bias-factor`".to_string())
            })?,
            temperature: p.temperature.ok_or_else(|| {
                CliError::Config("`well-tempered` requires `temperature`".to_string())
            })?,
        }))
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let (key, value_str) = kv_pair.split_once('=').ok_or_else(|| {
                CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                ))
            })?;
            let key = key.trim();

            match key {
                "energy-unit" => {
                    self.energy_unit = Some(value_str.trim().to_string());
                }
                "metadynamics.height" => {
                    self.metadynamics().height = Some(parse_number(key, value_str)?);
                }
                "metadynamics.pace" => {
                    self.metadynamics().pace = Some(parse_number(key, value_str)?);
                }
                "metadynamics.boundary" => {
                    self.metadynamics().boundary = Some(parse_keyword(key, value_str)?);
                }
                "metadynamics.violation" => {
                    self.metadynamics().violation = Some(parse_keyword(key, value_str)?);
                }
                "metadynamics.well-tempered.bias-factor" => {
                    self.metadynamics()
                        .well_tempered
                        .get_or_insert_with(Default::default)
                        .bias_factor = Some(parse_number(key, value_str)?);
                }
                "metadynamics.well-tempered.temperature" => {
                    self.metadynamics()
                        .well_tempered
                        .get_or_insert_with(Default::default)
                        .temperature = Some(parse_number(key, value_str)?);
                }
                "metadynamics.grid.fold-stride" => {
                    self.metadynamics()
                        .grid
                        .get_or_insert_with(Default::default)
                        .fold_stride = Some(parse_number(key, value_str)?);
                }
                "metadynamics.grid.tolerance" => {
                    self.metadynamics()
                        .grid
                        .get_or_insert_with(Default::default)
                        .tolerance = Some(parse_number(key, value_str)?);
                }
                "sampler.seed" => {
                    self.sampler.get_or_insert_with(Default::default).seed =
                        Some(parse_number(key, value_str)?);
                }
                "sampler.max-stale-retries" => {
                    self.sampler
                        .get_or_insert_with(Default::default)
                        .max_stale_retries = Some(parse_number(key, value_str)?);
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }

    fn metadynamics(&mut self) -> &mut PartialMetadynamicsConfig {
        self.metadynamics.get_or_insert_with(Default::default)
    }
}
