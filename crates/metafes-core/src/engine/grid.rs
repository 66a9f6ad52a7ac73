//! Dense bias mesh with multilinear interpolation.

use crate::core::kernel::{TRUNCATION_SIGMAS, axis_factor};
use crate::core::models::hill::HillRecord;
use crate::core::models::variable::{CollectiveVariable, GridAxisSpec};
use crate::core::utils::geometry::wrap_periodic;
use itertools::Itertools;

const PERIOD_MATCH_TOLERANCE: f64 = 1e-9;

/// One axis of a regular mesh.
///
/// A periodic axis covering a full period has `bins` nodes (the node at `max`
/// is the node at `min`); any other axis has `bins + 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridAxis {
    pub min: f64,
    pub max: f64,
    pub bins: usize,
    pub periodic: bool,
}

impl GridAxis {
    pub fn new(min: f64, max: f64, bins: usize, periodic: bool) -> Self {
        Self {
            min,
            max,
            bins,
            periodic,
        }
    }

    /// Builds an axis from a spec, treating it as periodic only when the
    /// variable is periodic and the spec spans exactly one period.
    pub fn from_spec(spec: &GridAxisSpec, variable: &CollectiveVariable) -> Self {
        let periodic = variable.periodicity().is_some_and(|(lo, hi)| {
            (spec.min - lo).abs() < PERIOD_MATCH_TOLERANCE
                && (spec.max - hi).abs() < PERIOD_MATCH_TOLERANCE
        });
        Self::new(spec.min, spec.max, spec.bins, periodic)
    }

    pub fn from_variable(variable: &CollectiveVariable) -> Option<Self> {
        variable
            .grid
            .as_ref()
            .map(|spec| Self::from_spec(spec, variable))
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        if self.periodic { self.bins } else { self.bins + 1 }
    }

    #[inline]
    pub fn spacing(&self) -> f64 {
        (self.max - self.min) / self.bins as f64
    }

    #[inline]
    pub fn position(&self, node: usize) -> f64 {
        self.min + node as f64 * self.spacing()
    }

    pub fn positions(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.node_count()).map(|i| self.position(i))
    }

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && (self.periodic || (value >= self.min && value <= self.max))
    }

    /// Lower bracketing node and the fractional offset towards the next one.
    pub fn locate(&self, value: f64) -> Option<(usize, f64)> {
        if !self.contains(value) {
            return None;
        }
        let value = if self.periodic {
            wrap_periodic(value, self.min, self.max)
        } else {
            value
        };
        let u = (value - self.min) / self.spacing();
        let node = (u.floor().max(0.0) as usize).min(self.bins - 1);
        Some((node, (u - node as f64).clamp(0.0, 1.0)))
    }

    #[inline]
    fn next(&self, node: usize) -> usize {
        if self.periodic {
            (node + 1) % self.bins
        } else {
            node + 1
        }
    }

    /// Nodes within the truncation radius of `center`.
    fn nodes_near(&self, center: f64, sigma: f64) -> Vec<usize> {
        let radius = TRUNCATION_SIGMAS * sigma;
        let spacing = self.spacing();
        let first = ((center - radius - self.min) / spacing).ceil() as i64;
        let last = ((center + radius - self.min) / spacing).floor() as i64;

        if self.periodic {
            let bins = self.bins as i64;
            if last - first + 1 >= bins {
                return (0..self.bins).collect();
            }
            (first..=last)
                .map(|i| i.rem_euclid(bins) as usize)
                .collect()
        } else {
            let first = first.max(0);
            let last = last.min(self.bins as i64);
            if first > last {
                return Vec::new();
            }
            (first as usize..=last as usize).collect()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BiasGrid {
    axes: Vec<GridAxis>,
    strides: Vec<usize>,
    values: Vec<f64>,
}

impl BiasGrid {
    pub fn new(axes: Vec<GridAxis>) -> Self {
        let mut strides = vec![1; axes.len()];
        for d in (0..axes.len().saturating_sub(1)).rev() {
            strides[d] = strides[d + 1] * axes[d + 1].node_count();
        }
        let size = axes.iter().map(GridAxis::node_count).product();
        Self {
            axes,
            strides,
            values: vec![0.0; size],
        }
    }

    /// Builds a mesh from the grid specs of `variables`, or `None` if any
    /// variable lacks one.
    pub fn for_variables(variables: &[CollectiveVariable]) -> Option<Self> {
        variables
            .iter()
            .map(GridAxis::from_variable)
            .collect::<Option<Vec<_>>>()
            .map(Self::new)
    }

    pub fn axes(&self) -> &[GridAxis] {
        &self.axes
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, point: &[f64]) -> bool {
        point.len() == self.axes.len()
            && self.axes.iter().zip(point).all(|(axis, &x)| axis.contains(x))
    }

    /// Adds a hill to every node within the truncation radius on each axis.
    pub fn add_hill(&mut self, hill: &HillRecord, variables: &[CollectiveVariable]) {
        let per_axis: Vec<Vec<(usize, f64)>> = self
            .axes
            .iter()
            .zip(variables)
            .zip(hill.center.iter().zip(&hill.sigma))
            .map(|((axis, cv), (&center, &sigma))| {
                axis.nodes_near(center, sigma)
                    .into_iter()
                    .map(|node| {
                        let delta = cv.difference(axis.position(node), center);
                        (node, axis_factor(delta, sigma))
                    })
                    .collect()
            })
            .collect();

        if per_axis.iter().any(Vec::is_empty) {
            return;
        }

        for combination in per_axis.iter().map(|nodes| nodes.iter()).multi_cartesian_product() {
            let mut index = 0;
            let mut weight = hill.height;
            for (d, &&(node, factor)) in combination.iter().enumerate() {
                index += node * self.strides[d];
                weight *= factor;
            }
            self.values[index] += weight;
        }
    }

    /// Multilinear interpolation; `None` outside the mesh.
    pub fn interpolate(&self, point: &[f64]) -> Option<f64> {
        if point.len() != self.axes.len() {
            return None;
        }
        let located = self
            .axes
            .iter()
            .zip(point)
            .map(|(axis, &x)| axis.locate(x))
            .collect::<Option<Vec<_>>>()?;

        let dimension = self.axes.len();
        let mut total = 0.0;
        for corner in 0..(1usize << dimension) {
            let mut weight = 1.0;
            let mut index = 0;
            for (d, (&(node, t), axis)) in located.iter().zip(&self.axes).enumerate() {
                let upper = (corner >> d) & 1 == 1;
                let (node, w) = if upper {
                    (axis.next(node), t)
                } else {
                    (node, 1.0 - t)
                };
                weight *= w;
                index += node * self.strides[d];
            }
            if weight > 0.0 {
                total += weight * self.values[index];
            }
        }
        Some(total)
    }
}
