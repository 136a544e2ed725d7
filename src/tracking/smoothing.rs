use std::collections::VecDeque;

use nalgebra::{Quaternion, UnitQuaternion, Vector3, Vector4};

use crate::geometry::SE3;

/// Rolling mean over the last `capacity` valid poses of one rigid body.
///
/// Translations are averaged directly. Quaternions are sign-aligned to the
/// newest sample before averaging, which is accurate for the small spread a
/// tracked body shows over a few frames.
#[derive(Debug, Clone)]
pub struct PoseSmoother {
    capacity: usize,
    window: VecDeque<SE3>,
}

impl PoseSmoother {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, pose: SE3) -> SE3 {
        if self.capacity == 1 {
            return pose;
        }
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(pose);
        self.mean(&pose)
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    fn mean(&self, newest: &SE3) -> SE3 {
        let n = self.window.len() as f64;
        let anchor = newest.rotation.coords;

        let mut translation = Vector3::zeros();
        let mut q_sum = Vector4::zeros();
        for pose in &self.window {
            translation += pose.translation;
            let q = pose.rotation.coords;
            q_sum += if q.dot(&anchor) < 0.0 { -q } else { q };
        }

        SE3 {
            rotation: UnitQuaternion::from_quaternion(Quaternion::from(q_sum / n)),
            translation: translation / n,
        }
    }
}
