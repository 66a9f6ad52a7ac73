use nalgebra::{Point3, Vector3};

const DEGENERACY_EPSILON: f64 = 1e-12;

pub fn distance(a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    (b - a).norm()
}

/// Signed dihedral angle in radians, in `(-π, π]`.
///
/// Follows the IUPAC convention: looking down the `p1 -> p2` bond, the angle is
/// positive when `p0` must rotate clockwise to eclipse `p3`. Returns `None` when
/// three consecutive points are collinear and the angle is undefined.
pub fn dihedral_angle(
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    p2: &Point3<f64>,
    p3: &Point3<f64>,
) -> Option<f64> {
    let b1: Vector3<f64> = p1 - p0;
    let b2: Vector3<f64> = p2 - p1;
    let b3: Vector3<f64> = p3 - p2;

    let n1 = b1.cross(&b2);
    let n2 = b2.cross(&b3);
    if n1.norm_squared() < DEGENERACY_EPSILON || n2.norm_squared() < DEGENERACY_EPSILON {
        return None;
    }

    let y = b2.norm() * b1.dot(&n2);
    let x = n1.dot(&n2);
    Some(y.atan2(x))
}

/// Maps `value` into the half-open period `[min, max)`.
pub fn wrap_periodic(value: f64, min: f64, max: f64) -> f64 {
    let period = max - min;
    let wrapped = value - period * ((value - min) / period).floor();
    // floor() can land exactly on max through rounding
    if wrapped >= max { min } else { wrapped }
}

/// Minimum-image difference `a - b` on a circle of circumference `period`.
pub fn periodic_difference(a: f64, b: f64, period: f64) -> f64 {
    let delta = a - b;
    delta - period * (delta / period).round()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    #[test]
    fn distance_between_points_is_euclidean() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(3.0, 4.0, 0.0);
        assert!(f64_approx_equal(distance(&a, &b), 5.0));
    }

    #[test]
    fn dihedral_of_cis_arrangement_is_zero() {
        let angle = dihedral_angle(
            &Point3::new(1.0, 1.0, 0.0),
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(0.0, 0.0, 1.0),
            &Point3::new(1.0, 1.0, 1.0),
        )
        .unwrap();
        assert!(f64_approx_equal(angle, 0.0));
    }

    #[test]
    fn dihedral_of_trans_arrangement_is_pi() {
        let angle = dihedral_angle(
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(0.0, 0.0, 1.0),
            &Point3::new(-1.0, 0.0, 1.0),
        )
        .unwrap();
        assert!(f64_approx_equal(angle.abs(), PI));
    }

    #[test]
    fn dihedral_sign_follows_handedness() {
        let p0 = Point3::new(1.0, 0.0, 0.0);
        let p1 = Point3::new(0.0, 0.0, 0.0);
        let p2 = Point3::new(0.0, 0.0, 1.0);
        let plus = dihedral_angle(&p0, &p1, &p2, &Point3::new(0.0, 1.0, 1.0)).unwrap();
        let minus = dihedral_angle(&p0, &p1, &p2, &Point3::new(0.0, -1.0, 1.0)).unwrap();
        assert!(f64_approx_equal(plus, PI / 2.0));
        assert!(f64_approx_equal(minus, -PI / 2.0));
    }

    #[test]
    fn dihedral_with_collinear_atoms_is_undefined() {
        let angle = dihedral_angle(
            &Point3::new(0.0, 0.0, -1.0),
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(0.0, 0.0, 1.0),
            &Point3::new(1.0, 0.0, 1.0),
        );
        assert!(angle.is_none());
    }

    #[test]
    fn wrap_periodic_maps_values_into_the_period() {
        assert!(f64_approx_equal(wrap_periodic(3.0 * PI / 2.0, -PI, PI), -PI / 2.0));
        assert!(f64_approx_equal(wrap_periodic(-3.0 * PI / 2.0, -PI, PI), PI / 2.0));
        assert!(f64_approx_equal(wrap_periodic(PI, -PI, PI), -PI));
        assert!(f64_approx_equal(wrap_periodic(0.25, -PI, PI), 0.25));
    }

    #[test]
    fn periodic_difference_uses_minimum_image() {
        let period = 2.0 * PI;
        let delta = periodic_difference(PI - 0.1, -PI + 0.1, period);
        assert!(f64_approx_equal(delta, -0.2));
        assert!(f64_approx_equal(periodic_difference(0.5, 0.2, period), 0.3));
    }
}
