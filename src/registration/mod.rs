//! Per-frame registration of models and the pointer into the camera frame.

pub mod engine;
pub mod snapshot;

pub use engine::RegistrationEngine;
pub use snapshot::{
    ModelRegistration, PointerRegistration, RegistrationSnapshot, RegistrationStatus,
};
