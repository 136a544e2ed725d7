//! Registration results for a single video frame.
//!
//! These types describe what the overlay should draw for one frame:
//! - per model camera-space transform and whether it is fresh
//! - pointer tip location
//! - presentation state (visibility, opacity)

use nalgebra::Vector3;
use serde::Serialize;

use crate::config::{GroupId, ModelId};
use crate::geometry::SE3;

/// Freshness of a registered transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// The rigid body was tracked this frame.
    Current,
    /// Not tracked this frame; the last valid transform is reused.
    Stale,
    /// Never tracked; no transform exists.
    #[default]
    NeverRegistered,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRegistration {
    pub id: ModelId,
    pub name: String,
    pub group: GroupId,
    pub target: bool,
    /// `camera_T_model`; `None` only when never registered.
    pub transform: Option<SE3>,
    pub status: RegistrationStatus,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointerRegistration {
    /// `camera_T_tip`.
    pub transform: Option<SE3>,
    pub status: RegistrationStatus,
    /// `reference_T_pointer` against the first model's rigid body, present
    /// only when both bodies are tracked this frame.
    pub reference_t_pointer: Option<SE3>,
    /// Tip position in the reference frame, same condition.
    pub tip_in_reference: Option<Vector3<f64>>,
}

/// Summary of registration for a single frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationSnapshot {
    pub frame_index: u64,
    pub timestamp_ns: u64,
    /// Indexed by [`ModelId`].
    pub models: Vec<ModelRegistration>,
    pub pointer: Option<PointerRegistration>,
    pub opacity: f64,
}

impl RegistrationSnapshot {
    pub fn model(&self, id: ModelId) -> Option<&ModelRegistration> {
        self.models.get(id.0)
    }

    pub fn count(&self, status: RegistrationStatus) -> usize {
        self.models.iter().filter(|m| m.status == status).count()
    }
}
