//! Registration engine: tracked poses -> camera-space model transforms.
//!
//! For each model, per frame:
//!
//! ```text
//! camera_T_model = camera_T_tracker ∘ tracker_T_reference ∘ offset ∘ reference_T_model
//! ```
//!
//! `offset` is the manual correction from the keyboard nudge keys, identity
//! unless the user moved the models.
//!
//! A body that is not tracked this frame keeps its last valid transform and
//! is marked [`RegistrationStatus::Stale`]; staleness is data, not an error.

use tracing::{debug, info, trace};

use super::snapshot::{
    ModelRegistration, PointerRegistration, RegistrationSnapshot, RegistrationStatus,
};
use crate::calibration::CalibrationSet;
use crate::config::{ModelEntry, ResolvedConfiguration, RigidBodyId};
use crate::geometry::frames::chain_to_camera;
use crate::geometry::{FrameConverter, SE3};
use crate::interaction::VisibilityState;
use crate::tracking::TrackedPose;

struct ModelSlot {
    entry: ModelEntry,
    reference_t_model: SE3,
    last: Option<SE3>,
    status: RegistrationStatus,
}

struct PointerSlot {
    rigid_body: RigidBodyId,
    pointer_t_tip: SE3,
    last: Option<SE3>,
    status: RegistrationStatus,
}

pub struct RegistrationEngine {
    converter: FrameConverter,
    models: Vec<ModelSlot>,
    pointer: Option<PointerSlot>,
    frame_index: u64,
}

fn find_valid(poses: &[TrackedPose], id: RigidBodyId) -> Option<SE3> {
    poses
        .iter()
        .find(|p| p.rigid_body == id && p.valid)
        .map(|p| p.pose)
}

/// Shared rule for models and the pointer: fresh pose wins, otherwise the
/// last valid one is reused.
fn update(
    last: &mut Option<SE3>,
    fresh: Option<SE3>,
) -> (Option<SE3>, RegistrationStatus) {
    match fresh {
        Some(t) => {
            *last = Some(t);
            (Some(t), RegistrationStatus::Current)
        }
        None => match last {
            Some(t) => (Some(*t), RegistrationStatus::Stale),
            None => (None, RegistrationStatus::NeverRegistered),
        },
    }
}

impl RegistrationEngine {
    pub fn new(config: &ResolvedConfiguration, calibration: &CalibrationSet) -> Self {
        Self::with_converter(
            config,
            calibration,
            calibration.frame_converter(config.tracker.kind),
        )
    }

    pub fn with_converter(
        config: &ResolvedConfiguration,
        calibration: &CalibrationSet,
        converter: FrameConverter,
    ) -> Self {
        let models = config
            .models
            .iter()
            .map(|entry| ModelSlot {
                entry: entry.clone(),
                reference_t_model: calibration.reference_to_model(entry.id),
                last: None,
                status: RegistrationStatus::NeverRegistered,
            })
            .collect();
        let pointer = config.pointer.as_ref().map(|p| PointerSlot {
            rigid_body: p.rigid_body,
            pointer_t_tip: calibration.pointer_tip.unwrap_or_else(SE3::identity),
            last: None,
            status: RegistrationStatus::NeverRegistered,
        });
        Self {
            converter,
            models,
            pointer,
            frame_index: 0,
        }
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Register one frame against the latest poses.
    pub fn register(
        &mut self,
        poses: &[TrackedPose],
        visibility: &VisibilityState,
        timestamp_ns: u64,
    ) -> RegistrationSnapshot {
        let converter = self.converter;
        let frame_index = self.frame_index;
        let offset = visibility.model_offset();

        let models = self
            .models
            .iter_mut()
            .map(|slot| {
                let reference_t_model = offset.compose(&slot.reference_t_model);
                let fresh = find_valid(poses, slot.entry.rigid_body).map(|tracker_t_reference| {
                    chain_to_camera(&converter, &tracker_t_reference, &reference_t_model)
                });
                let (transform, status) = update(&mut slot.last, fresh);
                if status != slot.status {
                    let model = &slot.entry.name;
                    if status == RegistrationStatus::Current
                        && slot.status == RegistrationStatus::NeverRegistered
                    {
                        info!(model = %model, frame = frame_index, "model registered");
                    } else {
                        debug!(
                            model = %model,
                            ?status,
                            frame = frame_index,
                            "registration status changed"
                        );
                    }
                    slot.status = status;
                }
                ModelRegistration {
                    id: slot.entry.id,
                    name: slot.entry.name.clone(),
                    group: slot.entry.group,
                    target: slot.entry.target,
                    transform,
                    status,
                    visible: visibility.is_model_visible(&slot.entry),
                }
            })
            .collect::<Vec<_>>();

        let reference_body = self.models.first().map(|slot| slot.entry.rigid_body);
        let pointer = self.pointer.as_mut().map(|slot| {
            let tracker_t_pointer = find_valid(poses, slot.rigid_body);
            let fresh =
                tracker_t_pointer.map(|t| chain_to_camera(&converter, &t, &slot.pointer_t_tip));
            let (transform, status) = update(&mut slot.last, fresh);
            if status != slot.status {
                debug!(?status, frame = frame_index, "pointer status changed");
                slot.status = status;
            }

            // Both poses are tracker-frame, so the hand-eye cancels out.
            let reference_t_pointer = reference_body
                .and_then(|id| find_valid(poses, id))
                .zip(tracker_t_pointer)
                .map(|(tracker_t_reference, tracker_t_pointer)| {
                    tracker_t_reference.inverse().compose(&tracker_t_pointer)
                });
            let tip_in_reference =
                reference_t_pointer.map(|t| t.compose(&slot.pointer_t_tip).translation);

            PointerRegistration {
                transform,
                status,
                reference_t_pointer,
                tip_in_reference,
            }
        });

        trace!(
            frame = frame_index,
            current = models.iter().filter(|m| m.status == RegistrationStatus::Current).count(),
            "frame registered"
        );
        self.frame_index += 1;

        RegistrationSnapshot {
            frame_index,
            timestamp_ns,
            models,
            pointer,
            opacity: visibility.opacity(),
        }
    }
}
