//! System orchestration and thread management.
//!
//! `BardSystem` spawns and coordinates the tracker polling and interaction
//! threads around the caller's frame loop; `SharedState` is what they share.

mod bard_system;
pub mod shared_state;

pub use bard_system::BardSystem;
pub use shared_state::SharedState;
