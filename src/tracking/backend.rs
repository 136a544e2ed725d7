//! Tracker backend seam and the channel-fed backend.
//!
//! Marker detection (ArUco on the video image, NDI optical tracking) lives
//! outside this crate. Such drivers push observations into a [`FeedBackend`]
//! through a [`FeedSender`]; dropping every sender reads as device loss.

use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use thiserror::Error;

use super::pose::BodyObservation;

/// Recoverable acquisition failures. Handled inside the tracker adapter.
#[derive(Debug, Error)]
pub enum TrackerAcquisitionError {
    #[error("tracker is not connected")]
    NotConnected,
    #[error("tracking device lost: {0}")]
    DeviceLost(String),
    #[error("recorded tracking data exhausted")]
    Exhausted,
    #[error("failed to read tracking recording {path}: {reason}")]
    Recording { path: PathBuf, reason: String },
}

/// Source of raw rigid-body observations.
pub trait TrackerBackend: Send {
    /// (Re)establish the connection to the device.
    fn connect(&mut self) -> Result<(), TrackerAcquisitionError>;

    /// The newest batch of observations, waiting at most `timeout` for one.
    ///
    /// `None` means nothing new arrived. A delivered batch is a complete
    /// frame: bodies missing from it are not currently observed, so an empty
    /// batch means every marker is occluded.
    fn read(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Vec<BodyObservation>>, TrackerAcquisitionError>;
}

pub type FeedSender = Sender<Vec<BodyObservation>>;

/// Backend fed by an external detector over a bounded channel.
pub struct FeedBackend {
    receiver: Receiver<Vec<BodyObservation>>,
    connected: bool,
}

/// Create a connected sender / backend pair.
pub fn feed_channel(capacity: usize) -> (FeedSender, FeedBackend) {
    let (sender, receiver) = bounded(capacity);
    (
        sender,
        FeedBackend {
            receiver,
            connected: false,
        },
    )
}

impl TrackerBackend for FeedBackend {
    fn connect(&mut self) -> Result<(), TrackerAcquisitionError> {
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
        let mut batch = match self.receiver.recv_timeout(timeout) {
            Ok(batch) => batch,
            Err(RecvTimeoutError::Timeout) => return Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                self.connected = false;
                return Err(TrackerAcquisitionError::DeviceLost(
                    "detector feed closed".to_string(),
                ));
            }
        };
        // Older frames queued behind this one are superseded.
        if let Some(newest) = self.receiver.try_iter().last() {
            batch = newest;
        }
        Ok(Some(batch))
    }
}
