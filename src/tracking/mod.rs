//! Tracker adapter: rigid-body poses from tracking hardware or recordings.
//!
//! - [`TrackerBackend`]: seam to the device (external detector feed, replay)
//! - [`TrackerAdapter`]: name -> id mapping, smoothing, reconnect backoff
//! - [`PoseBoard`]: last-value store read by the frame loop

pub mod adapter;
pub mod backend;
pub mod board;
pub mod pose;
pub mod replay;
pub mod smoothing;
pub mod state;

use std::path::Path;

pub use adapter::{Backoff, TrackerAdapter};
pub use backend::{
    FeedBackend, FeedSender, TrackerAcquisitionError, TrackerBackend, feed_channel,
};
pub use board::PoseBoard;
pub use pose::{BodyObservation, TrackedPose};
pub use replay::ReplayBackend;
pub use smoothing::PoseSmoother;
pub use state::ConnectionState;

use crate::config::{TrackerConfig, TrackerKind};

/// Capacity of the detector feed channel.
const FEED_CHANNEL_CAPACITY: usize = 8;

/// Backend for the configured tracker type.
///
/// Device trackers return the sender their detector driver pushes into.
pub fn backend_for(
    config: &TrackerConfig,
    base_dir: &Path,
) -> (Box<dyn TrackerBackend>, Option<FeedSender>) {
    match (config.kind, &config.replay) {
        (TrackerKind::Replay, Some(replay)) => (
            Box::new(ReplayBackend::new(base_dir.join(&replay.path), replay.looped)),
            None,
        ),
        _ => {
            let (sender, backend) = feed_channel(FEED_CHANNEL_CAPACITY);
            (Box::new(backend), Some(sender))
        }
    }
}
