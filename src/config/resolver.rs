//! Ordered resolution pass: raw document -> [`ResolvedConfiguration`].
//!
//! Passes run in a fixed order so that later sections can inherit from
//! earlier ones:
//!
//! 1. command-line calibration directory override (on the raw document)
//! 2. camera
//! 3. tracker (inherits source and calibration directory from the camera)
//! 4. models (rigid-body references resolved to ids)
//! 5. pointer (same)
//! 6. interaction
//!
//! Synonyms are collapsed here and nowhere else.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nalgebra::{Matrix4, Vector3};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::error::ConfigurationError;
use super::types::{
    CameraConfig, GroupId, InteractionConfig, ModelEntry, ModelId, PointerEntry, ReplaySettings,
    ResolvedConfiguration, RigidBodyDescriptor, RigidBodyId, TrackerConfig, TrackerKind,
    TransformSource, VideoSource,
};
use crate::geometry::SE3;
use crate::geometry::se3::{RIGIDITY_TOLERANCE, is_rigid_matrix};

pub const DEFAULT_CALIBRATION_PREFIX: &str = "calib";
pub const DEFAULT_MARKER_DICTIONARY: &str = "DICT_ARUCO_ORIGINAL";
pub const DEFAULT_MAXIMUM_DELAY_S: f64 = 0.1;
pub const DEFAULT_POINTER_OUTPUT_DIR: &str = "bard_output";
pub const DEFAULT_SMOOTHING_BUFFER: usize = 1;

/// Rigid body a model falls back to when it names none.
pub const REFERENCE_BODY: &str = "reference";
/// Rigid body the pointer falls back to when it names none.
pub const POINTER_BODY: &str = "pointer";

const ROOT: &str = "<root>";

type Result<T> = std::result::Result<T, ConfigurationError>;

#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Command-line calibration directory; wins over the document.
    pub calibration_dir_override: Option<PathBuf>,
}

/// Resolve a raw configuration document.
///
/// Pure: the same document and options always give the same result.
pub fn resolve(raw: &Value, options: &ResolveOptions) -> Result<ResolvedConfiguration> {
    let mut doc = raw.clone();
    if let Some(dir) = &options.calibration_dir_override {
        apply_calibration_override(&mut doc, dir)?;
    }

    let empty = Map::new();
    let root = match &doc {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => {
            return Err(ConfigurationError::MalformedSection {
                section: ROOT.to_string(),
                reason: "expected an object at the top level".to_string(),
            });
        }
    };

    let camera = resolve_camera(&Section::top(root, "camera")?)?;
    let tracker = resolve_tracker(&Section::top(root, "tracker")?, &camera)?;

    let mut registry = RigidBodyRegistry::new(tracker.rigid_bodies.clone())?;
    let models = resolve_models(root, &mut registry)?;
    let pointer = resolve_pointer(root, &mut registry)?;
    let interaction = resolve_interaction(&Section::top(root, "interaction")?)?;

    Ok(ResolvedConfiguration {
        camera,
        tracker: TrackerConfig {
            rigid_bodies: registry.into_descriptors(),
            ..tracker
        },
        models,
        pointer,
        interaction,
    })
}

/// Replace the camera calibration directory with `dir`.
///
/// The tracker's directory is replaced as well when the tracker reads the
/// same video source as the camera (or names none); a tracker on another
/// video source keeps its own calibration.
pub fn apply_calibration_override(doc: &mut Value, dir: &Path) -> Result<()> {
    if doc.is_null() {
        *doc = Value::Object(Map::new());
    }
    let root = doc
        .as_object_mut()
        .ok_or_else(|| ConfigurationError::MalformedSection {
            section: ROOT.to_string(),
            reason: "expected an object at the top level".to_string(),
        })?;
    let dir_value = Value::String(dir.to_string_lossy().into_owned());

    let camera_source = root
        .get("camera")
        .and_then(|camera| camera.get("source"))
        .and_then(lenient_video_source)
        .unwrap_or_default();

    let camera = root
        .entry("camera")
        .or_insert_with(|| Value::Object(Map::new()));
    if camera.is_null() {
        *camera = Value::Object(Map::new());
    }
    camera
        .as_object_mut()
        .ok_or_else(|| ConfigurationError::MalformedSection {
            section: "camera".to_string(),
            reason: "expected an object".to_string(),
        })?
        .insert("calibration directory".to_string(), dir_value.clone());

    if let Some(tracker) = root.get_mut("tracker").and_then(Value::as_object_mut) {
        let tracker_source = tracker
            .get("source")
            .or_else(|| tracker.get("video source"))
            .and_then(lenient_video_source);
        let shares_camera = tracker_source.is_none_or(|source| source == camera_source);
        if shares_camera {
            tracker.insert("calibration directory".to_string(), dir_value);
        } else {
            debug!("tracker reads another video source, keeping its calibration directory");
        }
    }
    Ok(())
}

fn lenient_video_source(value: &Value) -> Option<VideoSource> {
    match value {
        Value::Number(n) => n.as_i64().map(VideoSource::Device),
        Value::String(s) => Some(VideoSource::Path(s.clone())),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Typed access to one section
// ---------------------------------------------------------------------------

struct Section<'a> {
    name: String,
    map: Option<&'a Map<String, Value>>,
}

impl<'a> Section<'a> {
    /// Optional top-level section; absent and `null` are the same.
    fn top(root: &'a Map<String, Value>, key: &str) -> Result<Self> {
        let map = match root.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(_) => {
                return Err(ConfigurationError::MalformedSection {
                    section: key.to_string(),
                    reason: "expected an object".to_string(),
                });
            }
        };
        Ok(Self {
            name: key.to_string(),
            map,
        })
    }

    fn entry(name: String, value: &'a Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self {
                name,
                map: Some(map),
            }),
            _ => Err(ConfigurationError::MalformedSection {
                section: name,
                reason: "expected an object".to_string(),
            }),
        }
    }

    fn is_present(&self) -> bool {
        self.map.is_some()
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map
            .and_then(|map| map.get(key))
            .filter(|value| !value.is_null())
    }

    /// Two keys meaning the same thing; both present must agree.
    fn synonym(&self, primary: &'static str, alias: &'static str) -> Result<Option<&'a Value>> {
        match (self.get(primary), self.get(alias)) {
            (Some(a), Some(b)) if a != b => Err(ConfigurationError::ConflictingSynonyms {
                section: self.name.clone(),
                first: primary,
                second: alias,
            }),
            (Some(a), _) => Ok(Some(a)),
            (None, b) => Ok(b),
        }
    }

    fn bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(ConfigurationError::wrong_type(&self.name, key, "a boolean")),
        }
    }

    fn string(&self, key: &str) -> Result<Option<String>> {
        self.get(key)
            .map(|value| self.as_string(key, value))
            .transpose()
    }

    fn as_string(&self, key: &str, value: &Value) -> Result<String> {
        match value {
            Value::String(s) => Ok(s.clone()),
            _ => Err(ConfigurationError::wrong_type(&self.name, key, "a string")),
        }
    }

    fn path(&self, key: &str) -> Result<Option<PathBuf>> {
        Ok(self.string(key)?.map(PathBuf::from))
    }

    fn f64(&self, key: &str) -> Result<Option<f64>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| ConfigurationError::wrong_type(&self.name, key, "a number")),
            Some(_) => Err(ConfigurationError::wrong_type(&self.name, key, "a number")),
        }
    }

    fn u64(&self, key: &str) -> Result<Option<u64>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(|| {
                ConfigurationError::wrong_type(&self.name, key, "a non-negative integer")
            }),
            Some(_) => Err(ConfigurationError::wrong_type(
                &self.name,
                key,
                "a non-negative integer",
            )),
        }
    }

    fn video_source(&self, key: &str, value: &Value) -> Result<VideoSource> {
        match value {
            Value::Number(n) => n.as_i64().map(VideoSource::Device).ok_or_else(|| {
                ConfigurationError::wrong_type(
                    &self.name,
                    key,
                    "an integer device index or a source name",
                )
            }),
            Value::String(s) => Ok(VideoSource::Path(s.clone())),
            _ => Err(ConfigurationError::wrong_type(
                &self.name,
                key,
                "an integer device index or a source name",
            )),
        }
    }

    /// Static calibration transform: a file path or an inline matrix.
    ///
    /// Inline forms are 16 numbers (row-major 4x4, flat or nested) and, when
    /// `allow_vector` is set, a 3-vector meaning a pure translation.
    fn transform(&self, key: &str, allow_vector: bool) -> Result<TransformSource> {
        let value = match self.get(key) {
            None => return Ok(TransformSource::Identity),
            Some(value) => value,
        };
        match value {
            Value::String(s) => Ok(TransformSource::File(PathBuf::from(s))),
            Value::Array(items) => {
                let values = flatten_numbers(items).ok_or_else(|| {
                    ConfigurationError::wrong_type(&self.name, key, "an array of numbers")
                })?;
                match values.len() {
                    3 if allow_vector => Ok(TransformSource::Inline(SE3::from_translation(
                        Vector3::new(values[0], values[1], values[2]),
                    ))),
                    16 => {
                        let mat = Matrix4::from_row_slice(&values);
                        if !is_rigid_matrix(&mat, RIGIDITY_TOLERANCE) {
                            return Err(ConfigurationError::invalid(
                                &self.name,
                                key,
                                "matrix is not a rigid transform",
                            ));
                        }
                        Ok(TransformSource::Inline(SE3::from_matrix(mat)))
                    }
                    n => Err(ConfigurationError::invalid(
                        &self.name,
                        key,
                        if allow_vector {
                            format!("expected 3 or 16 numbers, got {n}")
                        } else {
                            format!("expected 16 numbers, got {n}")
                        },
                    )),
                }
            }
            _ => Err(ConfigurationError::wrong_type(
                &self.name,
                key,
                "a file path or an inline matrix",
            )),
        }
    }
}

fn flatten_numbers(items: &[Value]) -> Option<Vec<f64>> {
    let mut out = Vec::with_capacity(items.len() * 4);
    for item in items {
        match item {
            Value::Number(n) => out.push(n.as_f64()?),
            Value::Array(row) => {
                for v in row {
                    out.push(v.as_f64()?);
                }
            }
            _ => return None,
        }
    }
    Some(out)
}

// ---------------------------------------------------------------------------
// Camera / tracker
// ---------------------------------------------------------------------------

fn resolve_camera(section: &Section) -> Result<CameraConfig> {
    let source = match section.get("source") {
        Some(value) => section.video_source("source", value)?,
        None => VideoSource::default(),
    };

    let window_size = match section.get("window size") {
        Some(Value::Array(dims)) if dims.len() == 2 => {
            let w = dims[0].as_u64().filter(|&w| w > 0 && w <= u32::MAX as u64);
            let h = dims[1].as_u64().filter(|&h| h > 0 && h <= u32::MAX as u64);
            match (w, h) {
                (Some(w), Some(h)) => Some((w as u32, h as u32)),
                _ => {
                    return Err(ConfigurationError::wrong_type(
                        &section.name,
                        "window size",
                        "two positive integers",
                    ));
                }
            }
        }
        Some(_) => {
            return Err(ConfigurationError::wrong_type(
                &section.name,
                "window size",
                "two positive integers",
            ));
        }
        None => {
            if section.is_present() {
                warn!(
                    "camera window size was not specified, \
                     the overlay may not match the calibrated image size"
                );
            }
            None
        }
    };

    Ok(CameraConfig {
        source,
        window_size,
        calibration_dir: section.path("calibration directory")?,
        calibration_prefix: section
            .string("calibration prefix")?
            .unwrap_or_else(|| DEFAULT_CALIBRATION_PREFIX.to_string()),
    })
}

fn tracker_kind(name: &str) -> Result<TrackerKind> {
    match name {
        "sksaruco" | "aruco" => Ok(TrackerKind::Aruco),
        "sksnditracker" | "ndi" => Ok(TrackerKind::Ndi),
        "replay" => Ok(TrackerKind::Replay),
        other => Err(ConfigurationError::UnsupportedTracker(other.to_string())),
    }
}

fn resolve_tracker(section: &Section, camera: &CameraConfig) -> Result<TrackerConfig> {
    let kind = match section.string("type")? {
        Some(name) => tracker_kind(&name)?,
        None => TrackerKind::Aruco,
    };

    let source = match section.synonym("source", "video source")? {
        Some(value) => section.video_source("source", value)?,
        None => camera.source.clone(),
    };

    let calibration_dir = match section.path("calibration directory")? {
        Some(dir) => Some(dir),
        None => camera.calibration_dir.clone(),
    };

    let rigid_bodies = match section.synonym("rigid_bodies", "rigid bodies")? {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                rigid_body_descriptor(&Section::entry(format!("tracker.rigid_bodies[{i}]"), item)?)
            })
            .collect::<Result<Vec<_>>>()?,
        Some(_) => {
            return Err(ConfigurationError::wrong_type(
                &section.name,
                "rigid_bodies",
                "a list of rigid body objects",
            ));
        }
    };

    let smoothing_buffer = match section.u64("smoothing buffer")? {
        None => DEFAULT_SMOOTHING_BUFFER,
        Some(0) => {
            return Err(ConfigurationError::invalid(
                &section.name,
                "smoothing buffer",
                "must be at least 1",
            ));
        }
        Some(n) => n as usize,
    };

    let replay = if kind == TrackerKind::Replay {
        let path = section
            .path("filename")?
            .ok_or_else(|| ConfigurationError::missing(&section.name, "filename"))?;
        Some(ReplaySettings {
            path,
            looped: section.bool("loop", false)?,
        })
    } else {
        None
    };

    Ok(TrackerConfig {
        kind,
        source,
        calibration_dir,
        rigid_bodies,
        smoothing_buffer,
        replay,
    })
}

fn rigid_body_descriptor(section: &Section) -> Result<RigidBodyDescriptor> {
    let name = section
        .string("name")?
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ConfigurationError::missing(&section.name, "name"))?;
    Ok(RigidBodyDescriptor {
        name,
        filename: section.path("filename")?,
        dictionary: section
            .string("aruco dictionary")?
            .unwrap_or_else(|| DEFAULT_MARKER_DICTIONARY.to_string()),
    })
}

// ---------------------------------------------------------------------------
// Rigid-body references
// ---------------------------------------------------------------------------

struct RigidBodyRegistry {
    bodies: Vec<RigidBodyDescriptor>,
}

impl RigidBodyRegistry {
    fn new(bodies: Vec<RigidBodyDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for body in &bodies {
            if !seen.insert(body.name.as_str()) {
                return Err(ConfigurationError::DuplicateRigidBody(body.name.clone()));
            }
        }
        Ok(Self { bodies })
    }

    fn into_descriptors(self) -> Vec<RigidBodyDescriptor> {
        self.bodies
    }

    fn by_name(&self, section: &str, name: &str) -> Result<RigidBodyId> {
        self.bodies
            .iter()
            .position(|rb| rb.name == name)
            .map(RigidBodyId)
            .ok_or_else(|| ConfigurationError::UnresolvedRigidBody {
                section: section.to_string(),
                name: name.to_string(),
            })
    }

    /// Legacy marker-file reference; declares the body when no descriptor
    /// uses that file yet.
    fn by_file(
        &mut self,
        section: &str,
        filename: &Path,
        default_name: &str,
    ) -> Result<RigidBodyId> {
        let matches: Vec<usize> = self
            .bodies
            .iter()
            .enumerate()
            .filter(|(_, rb)| rb.filename.as_deref() == Some(filename))
            .map(|(i, _)| i)
            .collect();

        match matches.as_slice() {
            [only] => Ok(RigidBodyId(*only)),
            [] => {
                if self.bodies.iter().any(|rb| rb.name == default_name) {
                    return Err(ConfigurationError::RigidBodyNameTaken {
                        section: section.to_string(),
                        name: default_name.to_string(),
                        filename: filename.to_path_buf(),
                    });
                }
                debug!(
                    section,
                    name = default_name,
                    filename = %filename.display(),
                    "declaring rigid body from legacy marker file"
                );
                self.bodies.push(RigidBodyDescriptor {
                    name: default_name.to_string(),
                    filename: Some(filename.to_path_buf()),
                    dictionary: DEFAULT_MARKER_DICTIONARY.to_string(),
                });
                Ok(RigidBodyId(self.bodies.len() - 1))
            }
            many => Err(ConfigurationError::AmbiguousRigidBody {
                section: section.to_string(),
                filename: filename.to_path_buf(),
                count: many.len(),
            }),
        }
    }

    fn resolve(
        &mut self,
        section: &str,
        port_handle: Option<String>,
        legacy_file: Option<PathBuf>,
        default_name: &str,
    ) -> Result<RigidBodyId> {
        match (port_handle, legacy_file) {
            (Some(handle), legacy) => {
                if let Some(file) = legacy {
                    debug!(
                        section,
                        port_handle = %handle,
                        legacy_file = %file.display(),
                        "port handle takes precedence over legacy marker file"
                    );
                }
                self.by_name(section, &handle)
            }
            (None, Some(file)) => self.by_file(section, &file, default_name),
            (None, None) => self.by_name(section, default_name),
        }
    }
}

// ---------------------------------------------------------------------------
// Models / pointer / interaction
// ---------------------------------------------------------------------------

fn resolve_models(
    root: &Map<String, Value>,
    registry: &mut RigidBodyRegistry,
) -> Result<Vec<ModelEntry>> {
    let sections: Vec<Section> = match root.get("models") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(single @ Value::Object(_)) => vec![Section::entry("models".to_string(), single)?],
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| Section::entry(format!("models[{i}]"), item))
            .collect::<Result<Vec<_>>>()?,
        Some(_) => {
            return Err(ConfigurationError::MalformedSection {
                section: "models".to_string(),
                reason: "expected an object or a list of objects".to_string(),
            });
        }
    };

    let mut names = HashSet::new();
    let mut models = Vec::with_capacity(sections.len());
    for (index, section) in sections.iter().enumerate() {
        let asset = match section.get("model") {
            Some(_) => section.path("model")?,
            None => section.path("models_dir")?,
        };

        let name = match section.string("name")? {
            Some(name) => name,
            None => asset
                .as_deref()
                .and_then(Path::file_stem)
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("model_{index}")),
        };
        if !names.insert(name.clone()) {
            return Err(ConfigurationError::invalid(
                &section.name,
                "name",
                format!("model name `{name}` is used twice"),
            ));
        }

        let rigid_body = registry.resolve(
            &section.name,
            section.string("port handle")?,
            section.path("ref_file")?,
            REFERENCE_BODY,
        )?;

        let group = match section.u64("visible_anatomy")? {
            None => GroupId(0),
            Some(g) => GroupId(u32::try_from(g).map_err(|_| {
                ConfigurationError::invalid(
                    &section.name,
                    "visible_anatomy",
                    "group id out of range",
                )
            })?),
        };

        models.push(ModelEntry {
            id: ModelId(index),
            name,
            asset,
            rigid_body,
            reference_to_model: section.transform("reference_to_model", false)?,
            group,
            visible: section.bool("visible", true)?,
            target: section.bool("target", false)?,
        });
    }
    Ok(models)
}

fn resolve_pointer(
    root: &Map<String, Value>,
    registry: &mut RigidBodyRegistry,
) -> Result<Option<PointerEntry>> {
    let present = |key: &str| root.get(key).filter(|v| !v.is_null());
    let key = match (present("pointer"), present("pointerData")) {
        (Some(a), Some(b)) if a != b => {
            return Err(ConfigurationError::ConflictingSynonyms {
                section: ROOT.to_string(),
                first: "pointer",
                second: "pointerData",
            });
        }
        (Some(_), _) => "pointer",
        (None, Some(_)) => "pointerData",
        (None, None) => return Ok(None),
    };
    let section = Section::top(root, key)?;

    let rigid_body = registry.resolve(
        &section.name,
        section.string("port handle")?,
        section.path("pointer_tag_file")?,
        POINTER_BODY,
    )?;

    Ok(Some(PointerEntry {
        rigid_body,
        tip: section.transform("pointer_tag_to_tip", true)?,
        output_dir: section
            .path("output directory")?
            .unwrap_or_else(|| PathBuf::from(DEFAULT_POINTER_OUTPUT_DIR)),
    }))
}

fn resolve_interaction(section: &Section) -> Result<InteractionConfig> {
    let seconds = section.f64("maximum delay")?.unwrap_or(DEFAULT_MAXIMUM_DELAY_S);
    let maximum_delay = Duration::try_from_secs_f64(seconds).map_err(|_| {
        ConfigurationError::invalid(
            &section.name,
            "maximum delay",
            "must be a non-negative number of seconds",
        )
    })?;
    Ok(InteractionConfig {
        keyboard: section.bool("keyboard", false)?,
        footswitch: section.bool("footswitch", false)?,
        mouse: section.bool("mouse", false)?,
        maximum_delay,
    })
}
