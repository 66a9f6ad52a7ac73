use nalgebra::Point3;

/// Atomic coordinates at one instant of a trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub time: f64,
    pub positions: Vec<Point3<f64>>,
}

impl Frame {
    pub fn new(time: f64, positions: Vec<Point3<f64>>) -> Self {
        Self { time, positions }
    }

    pub fn atom_count(&self) -> usize {
        self.positions.len()
    }
}

/// One row of a collective-variable time series.
#[derive(Debug, Clone, PartialEq)]
pub struct CvSample {
    pub time: f64,
    pub values: Vec<f64>,
}

impl CvSample {
    pub fn new(time: f64, values: Vec<f64>) -> Self {
        Self { time, values }
    }
}
