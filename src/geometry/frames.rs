//! Coordinate frame definitions for tracked overlay registration.
//!
//! # Frames
//!
//! 1. **Camera** - the video camera's optical frame (OpenCV convention:
//!    X right, Y down, Z forward). Everything handed to the overlay
//!    compositor is expressed here.
//! 2. **Tracker** - the frame in which the tracking system reports rigid-body
//!    poses. For marker trackers that detect tags in the video image this *is*
//!    the camera frame. For an external optical tracker it is the tracker's
//!    own base frame, related to the camera by a hand-eye calibration.
//! 3. **Reference** - the local frame of a tracked rigid body (the marker
//!    pattern attached near the anatomy, or the pointer's marker).
//! 4. **Model** - the local frame of a 3D anatomical model.
//! 5. **Tip** - the pointer's physical tip.
//!
//! # Naming
//!
//! `T_target_source` maps points from `source` into `target`:
//! ```text
//! p_camera = camera_T_model * p_model
//! ```
//!
//! # Pipeline
//!
//! ```text
//! camera_T_model = camera_T_tracker ∘ tracker_T_reference ∘ reference_T_model
//!                  (hand-eye)          (tracked pose)        (static calibration)
//! ```
//!
//! The rightmost transform is applied first.

use super::SE3;

/// Converts tracker-frame poses into camera-frame poses.
///
/// Holds the hand-eye calibration `camera_T_tracker`. Marker trackers that
/// work on the video image use [`FrameConverter::aligned`].
#[derive(Debug, Clone, Copy)]
pub struct FrameConverter {
    pub camera_t_tracker: SE3,
    pub tracker_t_camera: SE3,
}

impl FrameConverter {
    pub fn new(camera_t_tracker: SE3) -> Self {
        let tracker_t_camera = camera_t_tracker.inverse();
        Self {
            camera_t_tracker,
            tracker_t_camera,
        }
    }

    /// Tracker and camera frames coincide.
    pub fn aligned() -> Self {
        Self::new(SE3::identity())
    }

    /// Build from an optional hand-eye calibration.
    pub fn from_hand_eye(hand_eye: Option<SE3>) -> Self {
        match hand_eye {
            Some(camera_t_tracker) => Self::new(camera_t_tracker),
            None => Self::aligned(),
        }
    }

    /// camera_T_body = camera_T_tracker ∘ tracker_T_body
    pub fn tracker_pose_to_camera(&self, tracker_t_body: &SE3) -> SE3 {
        self.camera_t_tracker.compose(tracker_t_body)
    }

    /// tracker_T_body = tracker_T_camera ∘ camera_T_body
    pub fn camera_pose_to_tracker(&self, camera_t_body: &SE3) -> SE3 {
        self.tracker_t_camera.compose(camera_t_body)
    }
}

impl Default for FrameConverter {
    fn default() -> Self {
        Self::aligned()
    }
}

/// Camera-space pose of a body carrying a static local offset.
///
/// `camera_T_local = camera_T_tracker ∘ tracker_T_reference ∘ reference_T_local`
pub fn chain_to_camera(
    converter: &FrameConverter,
    tracker_t_reference: &SE3,
    reference_t_local: &SE3,
) -> SE3 {
    converter
        .tracker_pose_to_camera(tracker_t_reference)
        .compose(reference_t_local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_aligned_is_identity() {
        let converter = FrameConverter::aligned();
        let pose = SE3::from_translation(Vector3::new(1.0, 2.0, 3.0));
        assert!(converter.tracker_pose_to_camera(&pose).approx_eq(&pose, 1e-12));
    }

    #[test]
    fn test_hand_eye_roundtrip() {
        let hand_eye = SE3 {
            rotation: UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.3),
            translation: Vector3::new(10.0, -5.0, 100.0),
        };
        let converter = FrameConverter::from_hand_eye(Some(hand_eye));
        let pose = SE3 {
            rotation: UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -0.7),
            translation: Vector3::new(1.0, 2.0, 3.0),
        };
        let back = converter.camera_pose_to_tracker(&converter.tracker_pose_to_camera(&pose));
        assert!(back.approx_eq(&pose, 1e-9));
    }

    #[test]
    fn test_chain_applies_static_offset_first() {
        let converter = FrameConverter::aligned();
        let tracked = SE3 {
            rotation: UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2),
            translation: Vector3::new(0.0, 0.0, 50.0),
        };
        let offset = SE3::from_translation(Vector3::new(10.0, 0.0, 0.0));

        let camera_t_tip = chain_to_camera(&converter, &tracked, &offset);
        // Offset (10,0,0) rotated onto +Y, then lifted by 50 along Z
        assert_relative_eq!(
            camera_t_tip.transform_point(&Vector3::zeros()),
            Vector3::new(0.0, 10.0, 50.0),
            epsilon = 1e-12
        );
    }
}
