/// A single Gaussian deposited on the bias.
///
/// `height` is the height actually added to the bias, i.e. already rescaled
/// when the run is well-tempered; `bias_factor` records the γ in effect at
/// deposit time so a hill log can be interpreted on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct HillRecord {
    pub time: f64,
    pub center: Vec<f64>,
    pub sigma: Vec<f64>,
    pub height: f64,
    pub bias_factor: Option<f64>,
}

impl HillRecord {
    pub fn new(time: f64, center: Vec<f64>, sigma: Vec<f64>, height: f64) -> Self {
        Self {
            time,
            center,
            sigma,
            height,
            bias_factor: None,
        }
    }

    pub fn with_bias_factor(mut self, bias_factor: f64) -> Self {
        self.bias_factor = Some(bias_factor);
        self
    }

    pub fn dimension(&self) -> usize {
        self.center.len()
    }

    pub fn is_finite(&self) -> bool {
        self.time.is_finite()
            && self.height.is_finite()
            && self.center.iter().all(|v| v.is_finite())
            && self.sigma.iter().all(|v| v.is_finite())
    }
}
