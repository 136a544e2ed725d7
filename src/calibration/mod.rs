//! Calibration store: camera intrinsics, distortion, hand-eye and the static
//! per-model / pointer transforms named by the configuration.
//!
//! Everything is loaded once at startup into an immutable [`CalibrationSet`].

pub mod matrix_io;

use std::path::{Path, PathBuf};

use nalgebra::Matrix3;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ModelId, ResolvedConfiguration, TrackerKind, TransformSource};
use crate::geometry::{FrameConverter, SE3};

pub use matrix_io::{
    read_matrix, read_points, read_rigid_transform, read_tip_transform, read_values, write_matrix,
};

/// Defaults used when no calibration directory is configured.
pub const DEFAULT_FOCAL_LENGTH: f64 = 1000.0;
pub const DEFAULT_PRINCIPAL_POINT: (f64, f64) = (320.0, 240.0);
pub const DEFAULT_DISTORTION_COEFFS: usize = 5;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("calibration file {0} does not exist")]
    MissingFile(PathBuf),
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{path}: `{token}` is not a number")]
    Parse { path: PathBuf, token: String },
    #[error("{path}: expected {expected} values, found {found}")]
    Shape {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
    #[error("{0} does not hold a rigid transform")]
    NonRigid(PathBuf),
    #[error("{path}: invalid camera intrinsics: {reason}")]
    InvalidIntrinsics { path: PathBuf, reason: String },
}

/// Immutable calibration for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSet {
    /// Camera matrix `[fx 0 cx; 0 fy cy; 0 0 1]`.
    pub intrinsics: Matrix3<f64>,
    pub distortion: Vec<f64>,
    /// `camera_T_tracker`, only meaningful for trackers that are not the camera.
    pub hand_eye: Option<SE3>,
    /// `reference_T_model`, indexed by [`ModelId`].
    pub reference_to_model: Vec<SE3>,
    /// `pointer_T_tip`.
    pub pointer_tip: Option<SE3>,
}

impl CalibrationSet {
    pub fn fx(&self) -> f64 {
        self.intrinsics[(0, 0)]
    }

    pub fn fy(&self) -> f64 {
        self.intrinsics[(1, 1)]
    }

    pub fn cx(&self) -> f64 {
        self.intrinsics[(0, 2)]
    }

    pub fn cy(&self) -> f64 {
        self.intrinsics[(1, 2)]
    }

    pub fn reference_to_model(&self, id: ModelId) -> SE3 {
        self.reference_to_model
            .get(id.0)
            .copied()
            .unwrap_or_else(SE3::identity)
    }

    /// Frame converter for the given tracker.
    ///
    /// Marker trackers report poses in the camera frame already, so the
    /// hand-eye transform is ignored for them.
    pub fn frame_converter(&self, kind: TrackerKind) -> FrameConverter {
        match kind {
            TrackerKind::Aruco => FrameConverter::aligned(),
            TrackerKind::Ndi | TrackerKind::Replay => {
                FrameConverter::from_hand_eye(self.hand_eye)
            }
        }
    }
}

/// Loads a [`CalibrationSet`] from a resolved configuration.
pub struct CalibrationStore;

impl CalibrationStore {
    /// Load every calibration artefact the configuration references.
    ///
    /// Relative paths are interpreted against `base_dir`.
    pub fn load(
        config: &ResolvedConfiguration,
        base_dir: &Path,
    ) -> Result<CalibrationSet, CalibrationError> {
        let (intrinsics, distortion) = match &config.camera.calibration_dir {
            Some(dir) => {
                let dir = base_dir.join(dir);
                let prefix = &config.camera.calibration_prefix;
                let intrinsics_path = dir.join(format!("{prefix}.intrinsics.txt"));
                let intrinsics: Matrix3<f64> = read_matrix(&intrinsics_path)?;
                validate_intrinsics(&intrinsics, &intrinsics_path)?;

                let distortion_path = dir.join(format!("{prefix}.distortion.txt"));
                let distortion = read_values(&distortion_path)?;
                if distortion.is_empty() {
                    return Err(CalibrationError::Shape {
                        path: distortion_path,
                        expected: DEFAULT_DISTORTION_COEFFS,
                        found: 0,
                    });
                }

                info!(
                    dir = %dir.display(),
                    fx = intrinsics[(0, 0)],
                    fy = intrinsics[(1, 1)],
                    "loaded camera calibration"
                );
                (intrinsics, distortion)
            }
            None => {
                info!("no calibration directory configured, using default intrinsics");
                let (cx, cy) = DEFAULT_PRINCIPAL_POINT;
                (
                    Matrix3::new(
                        DEFAULT_FOCAL_LENGTH,
                        0.0,
                        cx,
                        0.0,
                        DEFAULT_FOCAL_LENGTH,
                        cy,
                        0.0,
                        0.0,
                        1.0,
                    ),
                    vec![0.0; DEFAULT_DISTORTION_COEFFS],
                )
            }
        };

        // The hand-eye belongs to the tracker, whose directory defaults to
        // the camera's.
        let hand_eye = match &config.tracker.calibration_dir {
            Some(dir) => {
                let prefix = &config.camera.calibration_prefix;
                let path = base_dir.join(dir).join(format!("{prefix}.handeye.txt"));
                if path.is_file() {
                    info!(path = %path.display(), "loaded hand-eye calibration");
                    Some(read_rigid_transform(&path)?)
                } else {
                    debug!(path = %path.display(), "no hand-eye calibration");
                    None
                }
            }
            None => None,
        };

        let reference_to_model = config
            .models
            .iter()
            .map(|model| {
                let source = &model.reference_to_model;
                let t = resolve_transform(source, base_dir, read_rigid_transform)?;
                debug!(model = %model.name, "reference_T_model ready");
                Ok(t)
            })
            .collect::<Result<Vec<_>, CalibrationError>>()?;

        let pointer_tip = config
            .pointer
            .as_ref()
            .map(|pointer| resolve_transform(&pointer.tip, base_dir, read_tip_transform))
            .transpose()?;

        Ok(CalibrationSet {
            intrinsics,
            distortion,
            hand_eye,
            reference_to_model,
            pointer_tip,
        })
    }
}

fn resolve_transform(
    source: &TransformSource,
    base_dir: &Path,
    read: fn(&Path) -> Result<SE3, CalibrationError>,
) -> Result<SE3, CalibrationError> {
    match source {
        TransformSource::Identity => Ok(SE3::identity()),
        TransformSource::Inline(t) => Ok(*t),
        TransformSource::File(path) => read(&base_dir.join(path)),
    }
}

fn validate_intrinsics(k: &Matrix3<f64>, path: &Path) -> Result<(), CalibrationError> {
    let invalid = |reason: &str| CalibrationError::InvalidIntrinsics {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    if k[(0, 0)] <= 0.0 || k[(1, 1)] <= 0.0 {
        return Err(invalid("focal lengths must be positive"));
    }
    if (k[(2, 2)] - 1.0).abs() > 1e-9 || k[(2, 0)] != 0.0 || k[(2, 1)] != 0.0 {
        return Err(invalid("last row must be [0 0 1]"));
    }
    Ok(())
}
