use metafes::engine::config::{BoundaryPolicy, GridConfig, SamplerConfig, ViolationMode};

/// Values used when neither the config file nor the command line sets them.
pub struct DefaultsConfig {
    pub energy_unit: String,
    pub pace: usize,
    pub boundary: BoundaryPolicy,
    pub violation: ViolationMode,
    pub fold_stride: usize,
    pub grid_tolerance: f64,
    pub seed: u64,
    pub max_stale_retries: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        let grid = GridConfig::default();
        let sampler = SamplerConfig::default();
        Self {
            energy_unit: "kj/mol".to_string(),
            pace: 500,
            boundary: BoundaryPolicy::default(),
            violation: ViolationMode::default(),
            fold_stride: grid.fold_stride,
            grid_tolerance: grid.tolerance,
            seed: sampler.seed,
            max_stale_retries: sampler.max_stale_retries,
        }
    }
}
