use std::path::PathBuf;

use thiserror::Error;

/// Fatal configuration problems, raised before any device is opened.
///
/// Every variant names the section (and key, where there is one) so the
/// message points straight at the offending line of the document.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("configuration document could not be parsed: {0}")]
    Parse(String),
    #[error("section `{section}` is malformed: {reason}")]
    MalformedSection { section: String, reason: String },
    #[error("`{section}.{key}` has the wrong type: expected {expected}")]
    WrongType {
        section: String,
        key: String,
        expected: &'static str,
    },
    #[error("`{section}.{key}` is required")]
    MissingField { section: String, key: String },
    #[error("`{section}.{key}` is invalid: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        reason: String,
    },
    #[error("`{section}`: `{first}` and `{second}` are synonyms but hold different values")]
    ConflictingSynonyms {
        section: String,
        first: &'static str,
        second: &'static str,
    },
    #[error("`tracker.type`: unsupported tracker type `{0}`")]
    UnsupportedTracker(String),
    #[error("`tracker.rigid_bodies`: rigid body `{0}` is declared more than once")]
    DuplicateRigidBody(String),
    #[error("`{section}` references rigid body `{name}`, which the tracker does not declare")]
    UnresolvedRigidBody { section: String, name: String },
    #[error("`{section}`: {count} rigid bodies use marker file `{filename}`, cannot choose one")]
    AmbiguousRigidBody {
        section: String,
        filename: PathBuf,
        count: usize,
    },
    #[error(
        "`{section}`: cannot declare rigid body `{name}` for marker file `{filename}`, \
         that name already belongs to another marker file"
    )]
    RigidBodyNameTaken {
        section: String,
        name: String,
        filename: PathBuf,
    },
}

impl ConfigurationError {
    pub(crate) fn wrong_type(section: &str, key: &str, expected: &'static str) -> Self {
        Self::WrongType {
            section: section.to_string(),
            key: key.to_string(),
            expected,
        }
    }

    pub(crate) fn missing(section: &str, key: &str) -> Self {
        Self::MissingField {
            section: section.to_string(),
            key: key.to_string(),
        }
    }

    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
