//! SE3: 6-DOF rigid transformation (rotation + translation).
//!
//! Rotations are stored as unit quaternions so that chains of compositions
//! never go through Euler angles. Naming follows `T_target_source`:
//! `camera_T_model.transform_point(p_model)` yields the point in camera space.

use nalgebra::{Matrix3, Matrix4, Rotation3, UnitQuaternion, Vector3};
use serde::Serialize;

/// Tolerance used when checking that a 4x4 matrix is a rigid transform.
pub const RIGIDITY_TOLERANCE: f64 = 1e-6;

/// Rigid transformation: p' = R * p + t.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Pure translation.
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation,
        }
    }

    /// Construct from a rotation matrix and translation.
    pub fn from_rt(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let rot3 = Rotation3::from_matrix(&rotation);
        Self {
            rotation: UnitQuaternion::from_rotation_matrix(&rot3),
            translation,
        }
    }

    /// Construct from quaternion (w, x, y, z) and translation.
    pub fn from_quaternion(qw: f64, qx: f64, qy: f64, qz: f64, translation: Vector3<f64>) -> Self {
        let rotation = UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(qw, qx, qy, qz));
        Self {
            rotation,
            translation,
        }
    }

    /// Construct from a homogeneous 4x4 matrix `[R | t; 0 | 1]`.
    ///
    /// The rotation block is re-orthonormalised; use [`is_rigid_matrix`] first
    /// when the input comes from an untrusted file.
    pub fn from_matrix(mat: Matrix4<f64>) -> Self {
        let r = mat.fixed_view::<3, 3>(0, 0).into_owned();
        let t = Vector3::new(mat[(0, 3)], mat[(1, 3)], mat[(2, 3)]);
        Self::from_rt(r, t)
    }

    /// Convert to homogeneous 4x4 matrix.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        let mut mat = Matrix4::identity();
        mat.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.rotation.to_rotation_matrix().into_inner());
        mat[(0, 3)] = self.translation.x;
        mat[(1, 3)] = self.translation.y;
        mat[(2, 3)] = self.translation.z;
        mat
    }

    /// Inverse: [R^T | -R^T t].
    pub fn inverse(&self) -> Self {
        let rot_inv = self.rotation.inverse();
        Self {
            rotation: rot_inv,
            translation: -(rot_inv * self.translation),
        }
    }

    /// Compose two transforms: self ∘ other.
    ///
    /// `other` is applied first, then `self`:
    /// (T1 ∘ T2)(p) = R1 (R2 p + t2) + t1.
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// Compare as 4x4 matrices, which sidesteps the q / -q ambiguity.
    pub fn approx_eq(&self, other: &SE3, epsilon: f64) -> bool {
        (self.to_matrix() - other.to_matrix()).amax() <= epsilon
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}

/// True when `mat` is `[R | t; 0 0 0 1]` with R orthonormal and det(R) = +1.
pub fn is_rigid_matrix(mat: &Matrix4<f64>, tolerance: f64) -> bool {
    let r = mat.fixed_view::<3, 3>(0, 0).into_owned();
    let orthonormal = (r.transpose() * r - Matrix3::identity()).amax() <= tolerance;
    let proper = (r.determinant() - 1.0).abs() <= tolerance;
    let bottom = (mat[(3, 0)].abs() + mat[(3, 1)].abs() + mat[(3, 2)].abs()) <= tolerance
        && (mat[(3, 3)] - 1.0).abs() <= tolerance;
    orthonormal && proper && bottom
}
