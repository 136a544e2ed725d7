//! Interaction controller: keyboard, footswitch and mouse input mutating
//! anatomy visibility, target selection and overlay opacity.

pub mod bindings;
pub mod controller;
pub mod events;
pub mod pointer_writer;
pub mod visibility;

pub use bindings::InputBindings;
pub use controller::InteractionController;
pub use events::{Action, Arrow, EventOutcome, InputSource, InteractionEvent, Pedal, RawInput};
pub use pointer_writer::{PointerWrite, PointerWriter};
pub use visibility::{GroupVisibility, VisibilityState};
