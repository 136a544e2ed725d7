use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::pose::TrackedPose;
use crate::config::RigidBodyId;

/// Last-value store of tracked poses, one slot per rigid body.
///
/// Written by the tracker polling loop, read by the frame loop. Readers get
/// whatever is there and never wait for fresher data.
pub struct PoseBoard {
    poses: RwLock<Vec<TrackedPose>>,
    updates: AtomicU64,
}

impl PoseBoard {
    /// Board with every body invalid.
    pub fn new(body_count: usize) -> Self {
        Self {
            poses: RwLock::new(
                (0..body_count)
                    .map(|i| TrackedPose::invalid(RigidBodyId(i), 0))
                    .collect(),
            ),
            updates: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, poses: &[TrackedPose]) {
        {
            let mut slots = self.poses.write();
            for pose in poses {
                if let Some(slot) = slots.get_mut(pose.rigid_body.0) {
                    *slot = *pose;
                }
            }
        }
        self.updates.fetch_add(1, Ordering::Release);
    }

    /// Mark every body invalid, keeping the last timestamps.
    pub fn invalidate_all(&self) {
        {
            let mut slots = self.poses.write();
            for slot in slots.iter_mut() {
                *slot = TrackedPose::invalid(slot.rigid_body, slot.timestamp_ns);
            }
        }
        self.updates.fetch_add(1, Ordering::Release);
    }

    pub fn latest(&self, id: RigidBodyId) -> Option<TrackedPose> {
        self.poses.read().get(id.0).copied()
    }

    pub fn snapshot(&self) -> Vec<TrackedPose> {
        self.poses.read().clone()
    }

    /// Number of publishes so far.
    pub fn generation(&self) -> u64 {
        self.updates.load(Ordering::Acquire)
    }
}
