pub mod calibration;
pub mod config;
pub mod geometry;
pub mod interaction;
pub mod overlay;
pub mod registration;
pub mod system;
pub mod tracking;
