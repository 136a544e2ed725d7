//! Pivot calibration for tracked pointers.
//!
//! The pointer is pivoted about a fixed point while its marker is tracked.
//! Each tracking matrix `T_i = [R_i | t_i]` satisfies
//!
//! ```text
//! R_i * t_tip + t_i = p_pivot
//! ```
//!
//! Stacking all samples gives the over-determined system
//! `[R_i | -I] [t_tip; p_pivot] = -t_i`, solved by SVD least squares.

use nalgebra::{DMatrix, DVector, Vector3};
use thiserror::Error;

use super::SE3;

/// Minimum number of poses for a well-posed solve.
pub const MIN_PIVOT_POSES: usize = 3;

/// Singular values below this (relative to the largest) count as zero.
const RANK_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PivotError {
    #[error("pivot calibration needs at least {MIN_PIVOT_POSES} poses, got {0}")]
    NotEnoughPoses(usize),
    #[error("pivot calibration is rank deficient (rank {rank} < 6); rotate the pointer more")]
    RankDeficient { rank: usize },
    #[error("pivot calibration solve failed: {0}")]
    Solve(String),
}

/// Result of a pivot calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotResult {
    /// Tip position in the pointer marker frame.
    pub tip_offset: Vector3<f64>,
    /// Pivot point in the tracker frame.
    pub pivot_point: Vector3<f64>,
    /// RMS distance between each pose's tip estimate and the pivot point.
    pub residual_rms: f64,
}

impl PivotResult {
    /// Tip calibration transform (pure translation).
    pub fn tip_transform(&self) -> SE3 {
        SE3::from_translation(self.tip_offset)
    }
}

pub fn pivot_calibration(poses: &[SE3]) -> Result<PivotResult, PivotError> {
    if poses.len() < MIN_PIVOT_POSES {
        return Err(PivotError::NotEnoughPoses(poses.len()));
    }

    let rows = poses.len() * 3;
    let mut a = DMatrix::<f64>::zeros(rows, 6);
    let mut b = DVector::<f64>::zeros(rows);

    for (i, pose) in poses.iter().enumerate() {
        let r = pose.rotation_matrix();
        let row = i * 3;
        a.view_mut((row, 0), (3, 3)).copy_from(&r);
        a.view_mut((row, 3), (3, 3))
            .copy_from(&(-nalgebra::Matrix3::<f64>::identity()));
        b.rows_mut(row, 3).copy_from(&(-pose.translation));
    }

    let svd = a.svd(true, true);
    let max_sv = svd.singular_values.max();
    let rank = svd
        .singular_values
        .iter()
        .filter(|&&s| s > RANK_TOLERANCE * max_sv.max(1.0))
        .count();
    if rank < 6 {
        return Err(PivotError::RankDeficient { rank });
    }

    let x = svd
        .solve(&b, RANK_TOLERANCE)
        .map_err(|e| PivotError::Solve(e.to_string()))?;

    let tip_offset = Vector3::new(x[0], x[1], x[2]);
    let pivot_point = Vector3::new(x[3], x[4], x[5]);

    let sum_sq: f64 = poses
        .iter()
        .map(|pose| (pose.transform_point(&tip_offset) - pivot_point).norm_squared())
        .sum();
    let residual_rms = (sum_sq / poses.len() as f64).sqrt();

    Ok(PivotResult {
        tip_offset,
        pivot_point,
        residual_rms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Unit, UnitQuaternion};

    /// Poses of a pointer whose tip sits at `tip` (marker frame) on `pivot`.
    fn synthetic_poses(tip: Vector3<f64>, pivot: Vector3<f64>) -> Vec<SE3> {
        let axes = [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(0.0, 1.0, 1.0),
            Vector3::new(1.0, 0.0, 1.0),
        ];
        let mut poses = Vec::new();
        for (i, axis) in axes.iter().enumerate() {
            let angle = 0.2 + 0.15 * i as f64;
            let rotation = UnitQuaternion::from_axis_angle(&Unit::new_normalize(*axis), angle);
            // R * tip + t = pivot  =>  t = pivot - R * tip
            let translation = pivot - rotation * tip;
            poses.push(SE3 {
                rotation,
                translation,
            });
        }
        poses
    }

    #[test]
    fn test_recovers_tip_and_pivot() {
        let tip = Vector3::new(0.0, 0.0, -150.0);
        let pivot = Vector3::new(12.0, -40.0, 800.0);
        let result = pivot_calibration(&synthetic_poses(tip, pivot)).unwrap();

        assert_relative_eq!(result.tip_offset, tip, epsilon = 1e-6);
        assert_relative_eq!(result.pivot_point, pivot, epsilon = 1e-6);
        assert!(result.residual_rms < 1e-6);
    }

    #[test]
    fn test_rejects_too_few_poses() {
        let err = pivot_calibration(&[SE3::identity(), SE3::identity()]).unwrap_err();
        assert_eq!(err, PivotError::NotEnoughPoses(2));
    }

    #[test]
    fn test_rejects_pure_translation() {
        let poses: Vec<SE3> = (0..4)
            .map(|i| SE3::from_translation(Vector3::new(i as f64, 0.0, 0.0)))
            .collect();
        assert!(matches!(
            pivot_calibration(&poses),
            Err(PivotError::RankDeficient { .. })
        ));
    }
}
