//! Playback of recorded tracking data.
//!
//! Recording format, one observation per line (`#` comments allowed):
//!
//! ```text
//! timestamp_ns,name,tx,ty,tz,qw,qx,qy,qz[,valid]
//! ```
//!
//! Lines sharing a timestamp form one batch. Batches are released against
//! wall time relative to the first timestamp.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use csv::{ReaderBuilder, StringRecord, Trim};
use nalgebra::Vector3;
use tracing::{debug, info};

use super::backend::{TrackerAcquisitionError, TrackerBackend};
use super::pose::BodyObservation;
use crate::geometry::SE3;

const MIN_COLUMNS: usize = 9;

pub struct ReplayBackend {
    path: PathBuf,
    looped: bool,
    paced: bool,
    batches: Batches,
    cursor: usize,
    /// Wall-clock instant matching the first recorded timestamp.
    origin: Option<Instant>,
    connected: bool,
}

impl ReplayBackend {
    pub fn new(path: impl Into<PathBuf>, looped: bool) -> Self {
        Self {
            path: path.into(),
            looped,
            paced: true,
            batches: Vec::new(),
            cursor: 0,
            origin: None,
            connected: false,
        }
    }

    /// Release batches as fast as they are read instead of in real time.
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    fn recording_error(&self, reason: impl Into<String>) -> TrackerAcquisitionError {
        TrackerAcquisitionError::Recording {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    fn wait_until_due(&mut self, ts: u64, timeout: Duration) -> bool {
        if !self.paced {
            return true;
        }
        let first_ts = self.batches.first().map_or(ts, |(t, _)| *t);
        let origin = *self.origin.get_or_insert_with(Instant::now);
        let due = origin + Duration::from_nanos(ts.saturating_sub(first_ts));
        let now = Instant::now();
        if due <= now {
            return true;
        }
        let wait = due - now;
        if wait > timeout {
            thread::sleep(timeout);
            return false;
        }
        thread::sleep(wait);
        true
    }
}

impl TrackerBackend for ReplayBackend {
    fn connect(&mut self) -> Result<(), TrackerAcquisitionError> {
        if self.batches.is_empty() {
            self.batches = load_recording(&self.path)?;
            info!(
                path = %self.path.display(),
                batches = self.batches.len(),
                "loaded tracking recording"
            );
        }
        self.origin = None;
        self.connected = true;
        Ok(())
    }

    fn read(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Vec<BodyObservation>>, TrackerAcquisitionError> {
        if !self.connected {
            return Err(TrackerAcquisitionError::NotConnected);
        }
        if self.batches.is_empty() {
            return Err(self.recording_error("recording holds no observations"));
        }
        if self.cursor >= self.batches.len() {
            if !self.looped {
                return Err(TrackerAcquisitionError::Exhausted);
            }
            debug!("replay wrapped around");
            self.cursor = 0;
            self.origin = None;
        }

        let ts = self.batches[self.cursor].0;
        if !self.wait_until_due(ts, timeout) {
            return Ok(None);
        }
        let batch = self.batches[self.cursor].1.clone();
        self.cursor += 1;
        Ok(Some(batch))
    }
}

type Batches = Vec<(u64, Vec<BodyObservation>)>;

fn load_recording(path: &Path) -> Result<Batches, TrackerAcquisitionError> {
    let err = |reason: String| TrackerAcquisitionError::Recording {
        path: path.to_path_buf(),
        reason,
    };
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(|e| err(e.to_string()))?;

    let mut batches: Batches = Vec::new();
    for (line, rec) in rdr.records().enumerate() {
        let rec = rec.map_err(|e| err(e.to_string()))?;
        if rec.get(0) == Some("timestamp_ns") {
            continue;
        }
        let obs = parse_record(&rec)
            .map_err(|reason| err(format!("record {}: {reason}", line + 1)))?;
        match batches.last_mut() {
            Some((ts, batch)) if *ts == obs.timestamp_ns => batch.push(obs),
            Some((ts, _)) if *ts > obs.timestamp_ns => {
                return Err(err(format!(
                    "record {}: timestamps must not decrease",
                    line + 1
                )));
            }
            _ => batches.push((obs.timestamp_ns, vec![obs])),
        }
    }
    Ok(batches)
}

fn parse_record(rec: &StringRecord) -> Result<BodyObservation, String> {
    if rec.len() < MIN_COLUMNS {
        return Err(format!("expected at least {MIN_COLUMNS} columns, got {}", rec.len()));
    }
    let num = |i: usize| -> Result<f64, String> {
        rec[i]
            .parse::<f64>()
            .map_err(|_| format!("column {} is not a number: `{}`", i + 1, &rec[i]))
    };
    let timestamp_ns: u64 = rec[0]
        .parse()
        .map_err(|_| format!("bad timestamp `{}`", &rec[0]))?;
    let valid = match rec.get(9) {
        None | Some("") | Some("1") | Some("true") => true,
        Some("0") | Some("false") => false,
        Some(other) => return Err(format!("bad validity flag `{other}`")),
    };
    let translation = Vector3::new(num(2)?, num(3)?, num(4)?);
    let (qw, qx, qy, qz) = (num(5)?, num(6)?, num(7)?, num(8)?);
    let norm = (qw * qw + qx * qx + qy * qy + qz * qz).sqrt();
    if valid && norm < 1e-9 {
        return Err("zero quaternion on a valid pose".to_string());
    }
    let pose = if norm < 1e-9 {
        SE3::from_translation(translation)
    } else {
        SE3::from_quaternion(qw, qx, qy, qz, translation)
    };
    Ok(BodyObservation {
        name: rec[1].to_string(),
        pose,
        timestamp_ns,
        valid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const RECORDING: &str = "\
timestamp_ns,name,tx,ty,tz,qw,qx,qy,qz,valid
# two bodies, second frame loses the pointer
1000,reference,0,0,500,1,0,0,0
1000,pointer,10,0,400,1,0,0,0,1
2000,reference,1,0,500,1,0,0,0
2000,pointer,0,0,0,0,0,0,0,0
";

    fn write_recording(dir: &Path) -> PathBuf {
        let path = dir.join("poses.csv");
        fs::write(&path, RECORDING).unwrap();
        path
    }

    #[test]
    fn test_groups_by_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = ReplayBackend::new(write_recording(dir.path()), false).unpaced();
        backend.connect().unwrap();
        assert_eq!(backend.len(), 2);

        let first = backend.read(Duration::ZERO).unwrap().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].name, "pointer");
        assert!(first[1].valid);

        let second = backend.read(Duration::ZERO).unwrap().unwrap();
        assert!(!second[1].valid);
        assert_eq!(second[0].pose.translation.x, 1.0);
    }

    #[test]
    fn test_paced_read_before_due_is_nothing_new() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slow.csv");
        fs::write(&path, "0,a,0,0,0,1,0,0,0\n60000000000,a,0,0,0,1,0,0,0\n").unwrap();
        let mut backend = ReplayBackend::new(path, false);
        backend.connect().unwrap();
        assert!(backend.read(Duration::ZERO).unwrap().is_some());
        assert_eq!(backend.read(Duration::ZERO).unwrap(), None);
    }

    #[test]
    fn test_exhausts_without_loop() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = ReplayBackend::new(write_recording(dir.path()), false).unpaced();
        backend.connect().unwrap();
        backend.read(Duration::ZERO).unwrap();
        backend.read(Duration::ZERO).unwrap();
        assert!(matches!(
            backend.read(Duration::ZERO),
            Err(TrackerAcquisitionError::Exhausted)
        ));
    }

    #[test]
    fn test_loops() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = ReplayBackend::new(write_recording(dir.path()), true).unpaced();
        backend.connect().unwrap();
        for _ in 0..5 {
            assert_eq!(backend.read(Duration::ZERO).unwrap().unwrap().len(), 2);
        }
    }

    #[test]
    fn test_missing_file() {
        let mut backend = ReplayBackend::new("/nonexistent/poses.csv", false);
        assert!(matches!(
            backend.connect(),
            Err(TrackerAcquisitionError::Recording { .. })
        ));
    }

    #[test]
    fn test_decreasing_timestamps_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "2000,a,0,0,0,1,0,0,0\n1000,a,0,0,0,1,0,0,0\n").unwrap();
        let mut backend = ReplayBackend::new(path, false);
        assert!(backend.connect().is_err());
    }
}
