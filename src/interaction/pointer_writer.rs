//! Writes the tracked pointer pose and tip location on request.
//!
//! Output layout under the configured directory:
//!
//! ```text
//! <out>/bard_pointer_matrices/<stamp>.txt   reference_T_pointer (4x4)
//! <out>/bard_pointer_tips/<stamp>.txt       tip in the reference frame (3x1)
//! ```

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::calibration::{CalibrationError, write_matrix};
use crate::registration::RegistrationSnapshot;

pub const MATRIX_DIR: &str = "bard_pointer_matrices";
pub const TIP_DIR: &str = "bard_pointer_tips";

#[derive(Debug, Clone, PartialEq)]
pub struct PointerWrite {
    pub matrix_path: PathBuf,
    pub tip_path: PathBuf,
}

pub struct PointerWriter {
    output_dir: PathBuf,
}

impl PointerWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write using a wall-clock stamp (100 ns ticks since the epoch).
    pub fn write(
        &self,
        snapshot: &RegistrationSnapshot,
    ) -> Result<Option<PointerWrite>, CalibrationError> {
        let ticks = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() / 100)
            .unwrap_or_default();
        self.write_stamped(snapshot, &ticks.to_string())
    }

    /// `Ok(None)` when the pointer or the reference is not tracked this frame.
    pub fn write_stamped(
        &self,
        snapshot: &RegistrationSnapshot,
        stamp: &str,
    ) -> Result<Option<PointerWrite>, CalibrationError> {
        let Some(pointer) = &snapshot.pointer else {
            warn!("no pointer configured, nothing written");
            return Ok(None);
        };
        let (Some(reference_t_pointer), Some(tip)) =
            (pointer.reference_t_pointer, pointer.tip_in_reference)
        else {
            warn!(frame = snapshot.frame_index, "no pointer matrix available");
            return Ok(None);
        };

        let filename = format!("{stamp}.txt");
        let matrix_path = self.output_dir.join(MATRIX_DIR).join(&filename);
        let tip_path = self.output_dir.join(TIP_DIR).join(&filename);
        write_matrix(&matrix_path, &reference_t_pointer.to_matrix())?;
        write_matrix(&tip_path, &tip)?;

        info!(matrix = %matrix_path.display(), tip = %tip_path.display(), "pointer written");
        Ok(Some(PointerWrite {
            matrix_path,
            tip_path,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{read_rigid_transform, read_values};
    use crate::geometry::SE3;
    use crate::registration::{PointerRegistration, RegistrationStatus};
    use nalgebra::Vector3;

    fn snapshot(pointer: Option<PointerRegistration>) -> RegistrationSnapshot {
        RegistrationSnapshot {
            frame_index: 3,
            timestamp_ns: 0,
            models: Vec::new(),
            pointer,
            opacity: 1.0,
        }
    }

    #[test]
    fn test_writes_matrix_and_tip() {
        let dir = tempfile::tempdir().unwrap();
        let writer = PointerWriter::new(dir.path());
        let reference_t_pointer = SE3::from_translation(Vector3::new(20.0, 0.0, 100.0));
        let snap = snapshot(Some(PointerRegistration {
            transform: Some(SE3::identity()),
            status: RegistrationStatus::Current,
            reference_t_pointer: Some(reference_t_pointer),
            tip_in_reference: Some(Vector3::new(20.0, 0.0, 0.0)),
        }));

        let written = writer.write_stamped(&snap, "42").unwrap().unwrap();
        assert!(written.matrix_path.ends_with("bard_pointer_matrices/42.txt"));
        assert!(read_rigid_transform(&written.matrix_path)
            .unwrap()
            .approx_eq(&reference_t_pointer, 1e-12));
        assert_eq!(read_values(&written.tip_path).unwrap(), vec![20.0, 0.0, 0.0]);
    }

    #[test]
    fn test_nothing_written_without_pointer_pose() {
        let dir = tempfile::tempdir().unwrap();
        let writer = PointerWriter::new(dir.path());
        let snap = snapshot(Some(PointerRegistration {
            transform: None,
            status: RegistrationStatus::NeverRegistered,
            reference_t_pointer: None,
            tip_in_reference: None,
        }));
        assert_eq!(writer.write(&snap).unwrap(), None);
        assert!(!dir.path().join(MATRIX_DIR).exists());
        assert_eq!(writer.write(&snapshot(None)).unwrap(), None);
    }
}
