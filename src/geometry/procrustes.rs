//! Point based registration (orthogonal Procrustes).
//!
//! Finds the rigid transform that best maps `moving` points onto their
//! `fixed` counterparts in the least squares sense:
//!
//! ```text
//! fixed_i ≈ R * moving_i + t
//! ```
//!
//! Solved in closed form from the SVD of the cross-covariance of the
//! centred point sets, with a determinant check so the result is a proper
//! rotation rather than a reflection. Typical use: fiducials picked with the
//! tracked pointer (reference frame) against the same fiducials on the model
//! gives `reference_T_model`.

use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

use super::SE3;

/// Minimum number of corresponding points.
pub const MIN_PROCRUSTES_POINTS: usize = 3;

/// Singular values below this (relative to the largest) count as zero.
const RANK_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProcrustesError {
    #[error("point registration needs at least {MIN_PROCRUSTES_POINTS} points, got {0}")]
    NotEnoughPoints(usize),
    #[error("point registration needs matching point lists, got {fixed} fixed and {moving} moving")]
    CountMismatch { fixed: usize, moving: usize },
    #[error("points are collinear or coincident, the rotation is not determined")]
    Degenerate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcrustesResult {
    /// `fixed_T_moving`.
    pub transform: SE3,
    /// Fiducial registration error: RMS distance of the mapped moving
    /// points to the fixed points.
    pub fre: f64,
}

fn centroid(points: &[Vector3<f64>]) -> Vector3<f64> {
    points.iter().sum::<Vector3<f64>>() / points.len() as f64
}

pub fn orthogonal_procrustes(
    fixed: &[Vector3<f64>],
    moving: &[Vector3<f64>],
) -> Result<ProcrustesResult, ProcrustesError> {
    if fixed.len() != moving.len() {
        return Err(ProcrustesError::CountMismatch {
            fixed: fixed.len(),
            moving: moving.len(),
        });
    }
    if fixed.len() < MIN_PROCRUSTES_POINTS {
        return Err(ProcrustesError::NotEnoughPoints(fixed.len()));
    }

    let fixed_centre = centroid(fixed);
    let moving_centre = centroid(moving);
    let h: Matrix3<f64> = moving
        .iter()
        .zip(fixed)
        .map(|(p, q)| (p - moving_centre) * (q - fixed_centre).transpose())
        .sum();

    let svd = h.svd(true, true);
    let max_sv = svd.singular_values.max();
    let rank = svd
        .singular_values
        .iter()
        .filter(|&&s| s > RANK_TOLERANCE * max_sv.max(1.0))
        .count();
    // Coplanar points (rank 2) are fine: the determinant fixes the normal.
    if rank < 2 {
        return Err(ProcrustesError::Degenerate);
    }
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(ProcrustesError::Degenerate);
    };

    let v = v_t.transpose();
    let mut correction = Matrix3::identity();
    correction[(2, 2)] = (v * u.transpose()).determinant().signum();
    let rotation = v * correction * u.transpose();
    let translation = fixed_centre - rotation * moving_centre;
    let transform = SE3::from_rt(rotation, translation);

    let sum_sq: f64 = moving
        .iter()
        .zip(fixed)
        .map(|(p, q)| (transform.transform_point(p) - q).norm_squared())
        .sum();
    let fre = (sum_sq / fixed.len() as f64).sqrt();

    Ok(ProcrustesResult { transform, fre })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Unit, UnitQuaternion};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_points(rng: &mut StdRng, n: usize) -> Vec<Vector3<f64>> {
        (0..n)
            .map(|_| {
                Vector3::new(
                    rng.gen_range(-100.0..100.0),
                    rng.gen_range(-100.0..100.0),
                    rng.gen_range(-100.0..100.0),
                )
            })
            .collect()
    }

    #[test]
    fn test_recovers_known_transform() {
        let mut rng = StdRng::seed_from_u64(7);
        let truth = SE3 {
            rotation: UnitQuaternion::from_axis_angle(
                &Unit::new_normalize(Vector3::new(0.3, -1.0, 0.5)),
                2.1,
            ),
            translation: Vector3::new(15.0, -4.0, 230.0),
        };
        let moving = random_points(&mut rng, 6);
        let fixed: Vec<_> = moving.iter().map(|p| truth.transform_point(p)).collect();

        let result = orthogonal_procrustes(&fixed, &moving).unwrap();
        assert!(result.transform.approx_eq(&truth, 1e-6));
        assert!(result.fre < 1e-6);
    }

    #[test]
    fn test_fre_reflects_noise() {
        let mut rng = StdRng::seed_from_u64(11);
        let truth = SE3::from_translation(Vector3::new(0.0, 0.0, 50.0));
        let moving = random_points(&mut rng, 8);
        let fixed: Vec<_> = moving
            .iter()
            .map(|p| {
                let noise = Vector3::new(
                    rng.gen_range(-0.5..0.5),
                    rng.gen_range(-0.5..0.5),
                    rng.gen_range(-0.5..0.5),
                );
                truth.transform_point(p) + noise
            })
            .collect();

        let result = orthogonal_procrustes(&fixed, &moving).unwrap();
        assert!(result.fre > 0.0 && result.fre < 1.0, "fre {}", result.fre);
        assert_relative_eq!(result.transform.translation, truth.translation, epsilon = 1.0);
    }

    #[test]
    fn test_coplanar_points_give_a_rotation() {
        let moving = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(10.0, 0.0, 0.0),
            Vector3::new(0.0, 10.0, 0.0),
            Vector3::new(10.0, 10.0, 0.0),
        ];
        let truth = SE3 {
            rotation: UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.7),
            translation: Vector3::new(1.0, 2.0, 3.0),
        };
        let fixed: Vec<_> = moving.iter().map(|p| truth.transform_point(p)).collect();
        let result = orthogonal_procrustes(&fixed, &moving).unwrap();
        assert_relative_eq!(result.transform.rotation_matrix().determinant(), 1.0, epsilon = 1e-9);
        assert!(result.transform.approx_eq(&truth, 1e-6));
    }

    #[test]
    fn test_rejects_bad_input() {
        let p = Vector3::new(1.0, 2.0, 3.0);
        assert_eq!(
            orthogonal_procrustes(&[p, p], &[p, p]).unwrap_err(),
            ProcrustesError::NotEnoughPoints(2)
        );
        assert_eq!(
            orthogonal_procrustes(&[p, p, p], &[p, p]).unwrap_err(),
            ProcrustesError::CountMismatch { fixed: 3, moving: 2 }
        );
        let line: Vec<_> = (0..4).map(|i| Vector3::new(i as f64, 0.0, 0.0)).collect();
        assert_eq!(
            orthogonal_procrustes(&line, &line).unwrap_err(),
            ProcrustesError::Degenerate
        );
    }
}
