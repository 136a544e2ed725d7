//! Configuration document loading and resolution.
//!
//! The document is JSON5-like (comments, unquoted keys, trailing commas).
//! It is parsed into a `serde_json::Value` tree and then resolved into a
//! [`ResolvedConfiguration`] by [`resolve`].

pub mod error;
pub mod resolver;
pub mod types;

use std::fs;
use std::path::Path;

use serde_json::Value;

pub use error::ConfigurationError;
pub use resolver::{ResolveOptions, apply_calibration_override, resolve};
pub use types::{
    CameraConfig, GroupId, InteractionConfig, ModelEntry, ModelId, PointerEntry, ReplaySettings,
    ResolvedConfiguration, RigidBodyDescriptor, RigidBodyId, TrackerConfig, TrackerKind,
    TransformSource, VideoSource,
};

/// Parse a configuration document from text.
pub fn parse_document(text: &str) -> Result<Value, ConfigurationError> {
    json5::from_str::<Value>(text).map_err(|e| ConfigurationError::Parse(e.to_string()))
}

/// Read and parse a configuration file.
pub fn load_document(path: &Path) -> Result<Value, ConfigurationError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_document(&text)
}

/// Read, parse and resolve a configuration file in one step.
pub fn load(
    path: &Path,
    options: &ResolveOptions,
) -> Result<ResolvedConfiguration, ConfigurationError> {
    resolve(&load_document(path)?, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json5_features() {
        let text = r#"
        {
            // comment
            camera: { source: 0, 'window size': [640, 480], },
            "tracker": { "type": "sksaruco" },
        }
        "#;
        let doc = parse_document(text).unwrap();
        assert_eq!(doc["camera"]["window size"][1], serde_json::json!(480));
        assert_eq!(doc["tracker"]["type"], serde_json::json!("sksaruco"));
    }

    #[test]
    fn test_parse_error_reported() {
        assert!(matches!(
            parse_document("{ camera: "),
            Err(ConfigurationError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = load_document(Path::new("/nonexistent/bard.json")).unwrap_err();
        assert!(matches!(err, ConfigurationError::Io { .. }));
    }
}
