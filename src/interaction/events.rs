use serde::Serialize;

use crate::config::GroupId;
use crate::geometry::SE3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    Keyboard,
    Footswitch,
    Mouse,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Toggle(GroupId),
    /// Mouse-driven stepping; `y` is the normalised vertical position.
    StepVisibility { y: f64 },
    NextTarget,
    ShowAllTargets,
    SetOpacity(f64),
    WritePointerTip,
    /// Move every model by this increment, in the reference frame.
    NudgeModels(SE3),
    StopTracking,
    StartTracking,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InteractionEvent {
    pub source: InputSource,
    pub action: Action,
    pub timestamp_ns: u64,
}

/// Pedals of the three-button USB footswitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pedal {
    Left,
    Middle,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrow {
    Up,
    Down,
}

/// Raw input as delivered by the windowing layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawInput {
    Key(char),
    Arrow(Arrow),
    Pedal(Pedal),
    /// Click position normalised to the window, both axes in `[0, 1]`.
    MouseClick { x: f64, y: f64 },
}

/// What the controller did with an event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventOutcome {
    Applied,
    /// Dropped: arrived within the source's debounce window.
    Debounced,
    /// Routed nowhere (e.g. unknown group); a warning was logged.
    Ignored,
}
