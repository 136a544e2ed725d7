//! Whitespace separated numeric text files.
//!
//! One matrix row per line, `#` starts a comment line. This is the format of
//! every calibration file (intrinsics, distortion, hand-eye, model and tip
//! transforms) as well as the pointer matrices written during a session.

use std::fs;
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use nalgebra::{Matrix4, SMatrix, Vector3};

use super::CalibrationError;
use crate::geometry::SE3;
use crate::geometry::se3::{RIGIDITY_TOLERANCE, is_rigid_matrix};

/// Read every number of a text matrix file in row-major order.
pub fn read_values(path: &Path) -> Result<Vec<f64>, CalibrationError> {
    if !path.is_file() {
        return Err(CalibrationError::MissingFile(path.to_path_buf()));
    }
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b' ')
        .flexible(true)
        .comment(Some(b'#'))
        .from_path(path)
        .map_err(|source| CalibrationError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

    let mut values = Vec::new();
    for rec in rdr.records() {
        let rec = rec.map_err(|source| CalibrationError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        // Runs of spaces give empty fields; tabs stay inside one field.
        for token in rec.iter().flat_map(str::split_whitespace) {
            let value = token.parse::<f64>().map_err(|_| CalibrationError::Parse {
                path: path.to_path_buf(),
                token: token.to_string(),
            })?;
            values.push(value);
        }
    }
    Ok(values)
}

/// Read a fixed size matrix.
pub fn read_matrix<const R: usize, const C: usize>(
    path: &Path,
) -> Result<SMatrix<f64, R, C>, CalibrationError> {
    let values = read_values(path)?;
    if values.len() != R * C {
        return Err(CalibrationError::Shape {
            path: path.to_path_buf(),
            expected: R * C,
            found: values.len(),
        });
    }
    Ok(SMatrix::<f64, R, C>::from_row_slice(&values))
}

/// Read a 4x4 rigid transform, rejecting scaled or sheared matrices.
pub fn read_rigid_transform(path: &Path) -> Result<SE3, CalibrationError> {
    let mat: Matrix4<f64> = read_matrix(path)?;
    if !is_rigid_matrix(&mat, RIGIDITY_TOLERANCE) {
        return Err(CalibrationError::NonRigid(path.to_path_buf()));
    }
    Ok(SE3::from_matrix(mat))
}

/// Read a tip calibration: a 3-vector offset or a full 4x4 transform.
pub fn read_tip_transform(path: &Path) -> Result<SE3, CalibrationError> {
    let values = read_values(path)?;
    match values.len() {
        3 => Ok(SE3::from_translation(Vector3::new(
            values[0], values[1], values[2],
        ))),
        16 => {
            let mat = Matrix4::from_row_slice(&values);
            if !is_rigid_matrix(&mat, RIGIDITY_TOLERANCE) {
                return Err(CalibrationError::NonRigid(path.to_path_buf()));
            }
            Ok(SE3::from_matrix(mat))
        }
        found => Err(CalibrationError::Shape {
            path: path.to_path_buf(),
            expected: 16,
            found,
        }),
    }
}

/// Read an `n x 3` point list, one point per line.
pub fn read_points(path: &Path) -> Result<Vec<Vector3<f64>>, CalibrationError> {
    let values = read_values(path)?;
    if values.is_empty() || values.len() % 3 != 0 {
        return Err(CalibrationError::Shape {
            path: path.to_path_buf(),
            expected: (values.len() / 3 + 1) * 3,
            found: values.len(),
        });
    }
    Ok(values
        .chunks_exact(3)
        .map(|p| Vector3::new(p[0], p[1], p[2]))
        .collect())
}

/// Write a matrix, one row per line, creating parent directories.
pub fn write_matrix<const R: usize, const C: usize>(
    path: &Path,
    mat: &SMatrix<f64, R, C>,
) -> Result<(), CalibrationError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| CalibrationError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let csv_err = |source: csv::Error| CalibrationError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .delimiter(b' ')
        .from_path(path)
        .map_err(csv_err)?;
    for r in 0..R {
        let row: Vec<String> = (0..C).map(|c| format!("{}", mat[(r, c)])).collect();
        wtr.write_record(&row).map_err(csv_err)?;
    }
    wtr.flush().map_err(|source| CalibrationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, UnitQuaternion};
    use std::fs;

    #[test]
    fn test_reads_commented_whitespace_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calib.intrinsics.txt");
        fs::write(
            &path,
            "# camera matrix\n800  0 320\n0\t810 240\n0 0 1\n",
        )
        .unwrap();
        let k: Matrix3<f64> = read_matrix(&path).unwrap();
        assert_eq!(k[(0, 0)], 800.0);
        assert_eq!(k[(1, 1)], 810.0);
        assert_eq!(k[(1, 2)], 240.0);
    }

    #[test]
    fn test_wrong_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.txt");
        fs::write(&path, "1 2 3\n4 5 6\n").unwrap();
        let err = read_matrix::<3, 3>(&path).unwrap_err();
        assert!(matches!(err, CalibrationError::Shape { expected: 9, found: 6, .. }));
    }

    #[test]
    fn test_bad_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.txt");
        fs::write(&path, "1 2 x\n").unwrap();
        assert!(matches!(
            read_values(&path),
            Err(CalibrationError::Parse { token, .. }) if token == "x"
        ));
    }

    #[test]
    fn test_write_then_read_transform() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.txt");
        let t = SE3 {
            rotation: UnitQuaternion::from_euler_angles(0.1, -0.2, 0.3),
            translation: Vector3::new(1.0, 2.0, 3.0),
        };
        write_matrix(&path, &t.to_matrix()).unwrap();
        let back = read_rigid_transform(&path).unwrap();
        assert_relative_eq!(back.to_matrix(), t.to_matrix(), epsilon = 1e-9);
    }

    #[test]
    fn test_tip_as_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tip.txt");
        fs::write(&path, "0 0 -120.5\n").unwrap();
        let tip = read_tip_transform(&path).unwrap();
        assert_eq!(tip.translation, Vector3::new(0.0, 0.0, -120.5));
    }

    #[test]
    fn test_point_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fiducials.txt");
        fs::write(&path, "# x y z\n1 2 3\n4 5 6\n").unwrap();
        let points = read_points(&path).unwrap();
        assert_eq!(points, vec![Vector3::new(1.0, 2.0, 3.0), Vector3::new(4.0, 5.0, 6.0)]);

        fs::write(&path, "1 2 3\n4 5\n").unwrap();
        assert!(matches!(
            read_points(&path),
            Err(CalibrationError::Shape { expected: 6, found: 5, .. })
        ));
    }

    #[test]
    fn test_scaled_transform_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaled.txt");
        fs::write(&path, "2 0 0 0\n0 2 0 0\n0 0 2 0\n0 0 0 1\n").unwrap();
        assert!(matches!(
            read_rigid_transform(&path),
            Err(CalibrationError::NonRigid(_))
        ));
    }
}
