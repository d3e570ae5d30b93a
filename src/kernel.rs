//! Pairwise gravitational force kernel.
//!
//! Grounded in `original_source/misc/model.cpp`'s `eval_force`. That source
//! returns a quantity proportional to `m1 * m2` (a force) and divides by
//! `m1` in the integrator to get acceleration; per spec.md §9 either
//! convention is acceptable as long as it's documented and consistent with
//! the §8 test suite. This implementation picks **acceleration**: the
//! returned vector is the acceleration imparted on body 1 by point mass 2,
//! with no `m1` dependence.

use nalgebra::SVector;

/// Acceleration on body 1 (position `r1`) from a point mass `m2` at `r2`,
/// under gravitational constant `g` with softening radius `r_soft`.
///
/// `denom = max(|r1 - r2|, r_soft)^3` keeps close encounters from
/// singularities. Self-interaction (`r1 == r2`) is excluded by the caller
/// (the tree walk), not here.
pub fn eval_force<const D: usize>(
    r1: &SVector<f64, D>,
    r2: &SVector<f64, D>,
    m2: f64,
    g: f64,
    r_soft: f64,
) -> SVector<f64, D> {
    let d = r1 - r2;
    let n = d.norm();
    let denom = n.max(r_soft).powi(3);
    -d * (g * m2 / denom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_two_bodies_one_rank() {
        // spec.md §8 scenario 1.
        let r1 = SVector::from([1.0, 1.0, 1.0]);
        let r2 = SVector::from([3.0, 3.0, 3.0]);
        let a = eval_force(&r1, &r2, 1.0, 1.0, 0.1);
        let expected_mag = 3f64.powf(-1.5) * 3f64.sqrt();
        assert!((a.norm() - expected_mag).abs() < 1e-9);
        // Acceleration on body 1 points toward body 2: +1 in each axis.
        assert!(a.x > 0.0 && a.y > 0.0 && a.z > 0.0);
    }

    #[test]
    fn softening_floor_bounds_close_encounters() {
        let r1 = SVector::from([0.0, 0.0, 0.0]);
        let r2 = SVector::from([1e-9, 0.0, 0.0]);
        let a = eval_force(&r1, &r2, 1.0, 1.0, 0.1);
        let unsoftened_mag = 1.0 / (1e-9f64).powi(2);
        assert!(a.norm() < unsoftened_mag);
    }
}
