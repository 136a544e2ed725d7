//! Fully resolved configuration.
//!
//! Built once by the resolver and read-only afterwards. Cross references
//! (model -> rigid body, pointer -> rigid body) are dense indices, so no
//! component ever looks a rigid body up by name at runtime.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::geometry::SE3;

/// Index into [`TrackerConfig::rigid_bodies`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RigidBodyId(pub usize);

/// Index into [`ResolvedConfiguration::models`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModelId(pub usize);

/// Visible-anatomy grouping id (`visible_anatomy` in the document).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Video source: an OpenCV style device index or a file / stream name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum VideoSource {
    Device(i64),
    Path(String),
}

impl Default for VideoSource {
    fn default() -> Self {
        Self::Device(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraConfig {
    pub source: VideoSource,
    pub window_size: Option<(u32, u32)>,
    pub calibration_dir: Option<PathBuf>,
    pub calibration_prefix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerKind {
    /// Marker tracker working on the video image (ArUco).
    Aruco,
    /// External optical tracker (NDI).
    Ndi,
    /// Recorded poses played back from a file.
    Replay,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplaySettings {
    pub path: PathBuf,
    pub looped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RigidBodyDescriptor {
    pub name: String,
    /// Marker definition file.
    pub filename: Option<PathBuf>,
    /// Tracker specific marker dictionary tag.
    pub dictionary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerConfig {
    pub kind: TrackerKind,
    pub source: VideoSource,
    pub calibration_dir: Option<PathBuf>,
    pub rigid_bodies: Vec<RigidBodyDescriptor>,
    pub smoothing_buffer: usize,
    pub replay: Option<ReplaySettings>,
}

impl TrackerConfig {
    pub fn rigid_body(&self, id: RigidBodyId) -> &RigidBodyDescriptor {
        &self.rigid_bodies[id.0]
    }

    pub fn find(&self, name: &str) -> Option<RigidBodyId> {
        self.rigid_bodies
            .iter()
            .position(|rb| rb.name == name)
            .map(RigidBodyId)
    }
}

/// Where a static calibration transform comes from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformSource {
    Identity,
    Inline(SE3),
    /// Loaded by the calibration store.
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelEntry {
    pub id: ModelId,
    pub name: String,
    pub asset: Option<PathBuf>,
    pub rigid_body: RigidBodyId,
    pub reference_to_model: TransformSource,
    pub group: GroupId,
    pub visible: bool,
    /// Target anatomy (normally hidden structures the overlay locates).
    pub target: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointerEntry {
    pub rigid_body: RigidBodyId,
    pub tip: TransformSource,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionConfig {
    pub keyboard: bool,
    pub footswitch: bool,
    pub mouse: bool,
    /// Debounce window per input source.
    pub maximum_delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfiguration {
    pub camera: CameraConfig,
    pub tracker: TrackerConfig,
    pub models: Vec<ModelEntry>,
    pub pointer: Option<PointerEntry>,
    pub interaction: InteractionConfig,
}

impl ResolvedConfiguration {
    pub fn model(&self, id: ModelId) -> &ModelEntry {
        &self.models[id.0]
    }

    /// Every group id used by at least one model, ascending.
    pub fn groups(&self) -> BTreeSet<GroupId> {
        self.models.iter().map(|m| m.group).collect()
    }
}
