//! Pose records produced by tracker backends and the adapter.

use serde::Serialize;

use crate::config::RigidBodyId;
use crate::geometry::SE3;

/// Raw observation from a backend, keyed by rigid-body name.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyObservation {
    pub name: String,
    /// `tracker_T_body`.
    pub pose: SE3,
    pub timestamp_ns: u64,
    pub valid: bool,
}

/// Pose of one configured rigid body at one instant.
///
/// An invalid pose means "not seen"; its transform carries no information.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackedPose {
    pub rigid_body: RigidBodyId,
    /// `tracker_T_body`.
    pub pose: SE3,
    pub timestamp_ns: u64,
    pub valid: bool,
}

impl TrackedPose {
    pub fn invalid(rigid_body: RigidBodyId, timestamp_ns: u64) -> Self {
        Self {
            rigid_body,
            pose: SE3::identity(),
            timestamp_ns,
            valid: false,
        }
    }
}
