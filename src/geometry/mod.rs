//! Geometry utilities: SE3 transforms, frame conventions, pivot calibration
//! and point based registration.

pub mod frames;
pub mod pivot;
pub mod procrustes;
pub mod se3;

pub use frames::FrameConverter;
pub use pivot::{PivotError, PivotResult, pivot_calibration};
pub use procrustes::{ProcrustesError, ProcrustesResult, orthogonal_procrustes};
pub use se3::SE3;
