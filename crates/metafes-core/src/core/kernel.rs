//! Gaussian hill kernel.
//!
//! A hill centred at `c` with widths `σ` and height `h` contributes
//! `h * exp(-Σ_d (x_d - c_d)² / (2 σ_d²))` at `x`, with the difference taken as
//! the minimum image along periodic variables.

use crate::core::models::hill::HillRecord;
use crate::core::models::variable::CollectiveVariable;

/// Per-axis distance, in units of σ, beyond which grid folding ignores a hill.
pub const TRUNCATION_SIGMAS: f64 = 6.0;

#[inline]
pub fn axis_factor(delta: f64, sigma: f64) -> f64 {
    let z = delta / sigma;
    (-0.5 * z * z).exp()
}

#[inline]
pub fn reduced_sq_distance(
    center: &[f64],
    sigma: &[f64],
    point: &[f64],
    variables: &[CollectiveVariable],
) -> f64 {
    center
        .iter()
        .zip(sigma)
        .zip(point)
        .zip(variables)
        .map(|(((&c, &s), &x), cv)| {
            let z = cv.difference(x, c) / s;
            z * z
        })
        .sum()
}

#[inline]
pub fn hill_value(hill: &HillRecord, point: &[f64], variables: &[CollectiveVariable]) -> f64 {
    hill.height * (-0.5 * reduced_sq_distance(&hill.center, &hill.sigma, point, variables)).exp()
}

/// Exact, untruncated sum of hills at `point`.
pub fn sum_hills<'a>(
    hills: impl IntoIterator<Item = &'a HillRecord>,
    point: &[f64],
    variables: &[CollectiveVariable],
) -> f64 {
    hills
        .into_iter()
        .map(|hill| hill_value(hill, point, variables))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const TOLERANCE: f64 = 1e-12;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    fn distance_cv() -> CollectiveVariable {
        CollectiveVariable::distance("d", [0, 1], 0.2)
    }

    #[test]
    fn hill_value_at_center_equals_height() {
        let hill = HillRecord::new(0.0, vec![1.0], vec![0.2], 2.5);
        assert!(f64_approx_equal(hill_value(&hill, &[1.0], &[distance_cv()]), 2.5));
    }

    #[test]
    fn hill_value_one_sigma_away_decays_by_exp_half() {
        let hill = HillRecord::new(0.0, vec![1.0], vec![0.2], 1.0);
        let value = hill_value(&hill, &[1.2], &[distance_cv()]);
        assert!(f64_approx_equal(value, (-0.5f64).exp()));
    }

    #[test]
    fn two_dimensional_hill_is_product_of_axis_factors() {
        let variables = vec![distance_cv(), CollectiveVariable::distance("e", [1, 2], 0.5)];
        let hill = HillRecord::new(0.0, vec![0.0, 0.0], vec![0.2, 0.5], 1.0);
        let value = hill_value(&hill, &[0.1, 0.4], &variables);
        let expected = axis_factor(0.1, 0.2) * axis_factor(0.4, 0.5);
        assert!(f64_approx_equal(value, expected));
    }

    #[test]
    fn periodic_hill_wraps_across_boundary() {
        let phi = CollectiveVariable::torsion("phi", [0, 1, 2, 3], 0.3);
        let hill = HillRecord::new(0.0, vec![PI - 0.1], vec![0.3], 1.0);
        let across = hill_value(&hill, &[-PI + 0.1], &[phi.clone()]);
        let inside = hill_value(&hill, &[PI - 0.3], &[phi]);
        assert!((across - inside).abs() < 1e-9);
    }

    #[test]
    fn sum_hills_adds_contributions() {
        let hills = vec![
            HillRecord::new(0.0, vec![0.0], vec![0.2], 1.0),
            HillRecord::new(1.0, vec![0.0], vec![0.2], 0.5),
        ];
        let total = sum_hills(&hills, &[0.0], &[distance_cv()]);
        assert!(f64_approx_equal(total, 1.5));
    }
}
