use crate::core::utils::geometry::{
    dihedral_angle, distance, periodic_difference, wrap_periodic,
};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CvError {
    #[error("Atom index {index} is out of range for a frame with {atom_count} atoms")]
    AtomIndexOutOfRange { index: usize, atom_count: usize },
    #[error("Torsion is undefined because three consecutive atoms are collinear")]
    DegenerateGeometry,
}

/// The function of atomic coordinates a collective variable computes.
///
/// Atom indices are zero-based positions in the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum CvKind {
    Torsion { atoms: [usize; 4] },
    Distance { atoms: [usize; 2] },
}

impl CvKind {
    pub fn atoms(&self) -> &[usize] {
        match self {
            CvKind::Torsion { atoms } => atoms,
            CvKind::Distance { atoms } => atoms,
        }
    }

    /// The period `[min, max)` of the variable, if it is periodic.
    pub fn periodicity(&self) -> Option<(f64, f64)> {
        match self {
            CvKind::Torsion { .. } => Some((-PI, PI)),
            CvKind::Distance { .. } => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            CvKind::Torsion { .. } => "torsion",
            CvKind::Distance { .. } => "distance",
        }
    }
}

/// Discretization of one CV axis, used both for the bias grid and for
/// free-energy surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridAxisSpec {
    pub min: f64,
    pub max: f64,
    pub bins: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectiveVariable {
    pub name: String,
    pub kind: CvKind,
    /// Gaussian hill width along this axis, in the variable's own units.
    pub sigma: f64,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub grid: Option<GridAxisSpec>,
}

impl CollectiveVariable {
    pub fn new(name: impl Into<String>, kind: CvKind, sigma: f64) -> Self {
        Self {
            name: name.into(),
            kind,
            sigma,
            lower: None,
            upper: None,
            grid: None,
        }
    }

    pub fn torsion(name: impl Into<String>, atoms: [usize; 4], sigma: f64) -> Self {
        Self::new(name, CvKind::Torsion { atoms }, sigma)
    }

    pub fn distance(name: impl Into<String>, atoms: [usize; 2], sigma: f64) -> Self {
        Self::new(name, CvKind::Distance { atoms }, sigma)
    }

    pub fn with_bounds(mut self, lower: Option<f64>, upper: Option<f64>) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    pub fn with_grid(mut self, min: f64, max: f64, bins: usize) -> Self {
        self.grid = Some(GridAxisSpec { min, max, bins });
        self
    }

    pub fn periodicity(&self) -> Option<(f64, f64)> {
        self.kind.periodicity()
    }

    pub fn is_periodic(&self) -> bool {
        self.periodicity().is_some()
    }

    pub fn kind_label(&self) -> &'static str {
        self.kind.label()
    }

    pub fn evaluate(&self, positions: &[Point3<f64>]) -> Result<f64, CvError> {
        let atom_count = positions.len();
        let fetch = |index: usize| {
            positions
                .get(index)
                .ok_or(CvError::AtomIndexOutOfRange { index, atom_count })
        };

        match &self.kind {
            CvKind::Torsion { atoms: [a, b, c, d] } => {
                dihedral_angle(fetch(*a)?, fetch(*b)?, fetch(*c)?, fetch(*d)?)
                    .map(|angle| self.canonicalize(angle))
                    .ok_or(CvError::DegenerateGeometry)
            }
            CvKind::Distance { atoms: [a, b] } => Ok(distance(fetch(*a)?, fetch(*b)?)),
        }
    }

    /// Brings a value into the canonical period `[min, max)`; identity for
    /// non-periodic variables. A torsion of exactly `π` maps to `-π`.
    pub fn canonicalize(&self, value: f64) -> f64 {
        match self.periodicity() {
            Some((min, max)) => wrap_periodic(value, min, max),
            None => value,
        }
    }

    /// `a - b`, using the minimum image along periodic axes.
    pub fn difference(&self, a: f64, b: f64) -> f64 {
        match self.periodicity() {
            Some((min, max)) => periodic_difference(a, b, max - min),
            None => a - b,
        }
    }

    pub fn has_bounds(&self) -> bool {
        self.lower.is_some() || self.upper.is_some()
    }

    pub fn in_bounds(&self, value: f64) -> bool {
        self.lower.is_none_or(|lower| value >= lower)
            && self.upper.is_none_or(|upper| value <= upper)
    }

    /// Mirrors an out-of-bounds value back across the violated wall.
    ///
    /// Values further than one interval width away are clamped to the wall.
    pub fn reflect(&self, value: f64) -> f64 {
        let mut reflected = value;
        if let Some(lower) = self.lower {
            if reflected < lower {
                reflected = 2.0 * lower - reflected;
            }
        }
        if let Some(upper) = self.upper {
            if reflected > upper {
                reflected = 2.0 * upper - reflected;
            }
        }
        if let Some(lower) = self.lower {
            reflected = reflected.max(lower);
        }
        if let Some(upper) = self.upper {
            reflected = reflected.min(upper);
        }
        reflected
    }
}

pub fn evaluate_all(
    variables: &[CollectiveVariable],
    positions: &[Point3<f64>],
) -> Result<Vec<f64>, (usize, CvError)> {
    variables
        .iter()
        .enumerate()
        .map(|(i, cv)| cv.evaluate(positions).map_err(|e| (i, e)))
        .collect()
}
