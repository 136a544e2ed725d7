//! Raw input -> [`InteractionEvent`] mapping.
//!
//! | input                  | action                              |
//! |------------------------|-------------------------------------|
//! | key `b`, left pedal    | toggle the primary (lowest) group   |
//! | keys `1`-`4`           | toggle that group id                |
//! | key `n`, middle pedal  | next target                         |
//! | key `m`, right pedal   | show all targets                    |
//! | key `d`                | write pointer tip                   |
//! | keys `5` / `t`         | move models +x / -x                 |
//! | keys `6` / `y`         | move models +y / -y                 |
//! | keys `7` / `u`         | move models +z / -z                 |
//! | keys `8` / `i`         | rotate models about +x / -x         |
//! | keys `9` / `o`         | rotate models about +y / -y         |
//! | keys `0` / `p`         | rotate models about +z / -z         |
//! | arrow up / down        | stop / start tracking               |
//! | click, right 20%       | step visibility by vertical half    |
//! | click, left 20%        | opacity = vertical position         |

use std::collections::BTreeSet;

use nalgebra::{Unit, UnitQuaternion, Vector3};

use super::events::{Action, Arrow, InputSource, InteractionEvent, Pedal, RawInput};
use crate::config::{GroupId, InteractionConfig};
use crate::geometry::SE3;

pub const MOUSE_RIGHT_EDGE: f64 = 0.8;
pub const MOUSE_LEFT_EDGE: f64 = 0.2;

/// Model nudge per key press, millimetres.
pub const NUDGE_TRANSLATION_MM: f64 = 1.0;
/// Model nudge per key press, degrees.
pub const NUDGE_ROTATION_DEG: f64 = 1.0;

/// Highest group id reachable with a digit key; higher digits nudge.
const MAX_DIGIT_GROUP: u32 = 4;

fn axis(index: usize) -> Unit<Vector3<f64>> {
    match index {
        0 => Vector3::x_axis(),
        1 => Vector3::y_axis(),
        _ => Vector3::z_axis(),
    }
}

/// Increment for a nudge key, or `None` if the key is not one.
fn nudge(key: char) -> Option<SE3> {
    const TRANSLATE: [(char, char); 3] = [('5', 't'), ('6', 'y'), ('7', 'u')];
    const ROTATE: [(char, char); 3] = [('8', 'i'), ('9', 'o'), ('0', 'p')];

    // Axis index and direction of `key` within a (plus, minus) table.
    let lookup = |table: &[(char, char); 3]| {
        table.iter().enumerate().find_map(|(i, &(plus, minus))| {
            if key == plus {
                Some((i, 1.0))
            } else if key == minus {
                Some((i, -1.0))
            } else {
                None
            }
        })
    };

    if let Some((i, sign)) = lookup(&TRANSLATE) {
        let step = axis(i).into_inner() * (sign * NUDGE_TRANSLATION_MM);
        return Some(SE3::from_translation(step));
    }
    lookup(&ROTATE).map(|(i, sign)| SE3 {
        rotation: UnitQuaternion::from_axis_angle(&axis(i), sign * NUDGE_ROTATION_DEG.to_radians()),
        translation: Vector3::zeros(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputBindings {
    keyboard: bool,
    footswitch: bool,
    mouse: bool,
    primary_group: GroupId,
}

impl InputBindings {
    pub fn new(config: &InteractionConfig, groups: &BTreeSet<GroupId>) -> Self {
        Self {
            keyboard: config.keyboard,
            footswitch: config.footswitch,
            mouse: config.mouse,
            primary_group: groups.first().copied().unwrap_or(GroupId(0)),
        }
    }

    pub fn primary_group(&self) -> GroupId {
        self.primary_group
    }

    /// `None` for disabled channels and unbound inputs.
    pub fn translate(&self, input: RawInput, timestamp_ns: u64) -> Option<InteractionEvent> {
        let (source, action) = match input {
            RawInput::Key(key) if self.keyboard => (InputSource::Keyboard, self.key_action(key)?),
            RawInput::Arrow(arrow) if self.keyboard => {
                let action = match arrow {
                    Arrow::Up => Action::StopTracking,
                    Arrow::Down => Action::StartTracking,
                };
                (InputSource::Keyboard, action)
            }
            RawInput::Pedal(pedal) if self.footswitch => {
                let action = match pedal {
                    Pedal::Left => Action::Toggle(self.primary_group),
                    Pedal::Middle => Action::NextTarget,
                    Pedal::Right => Action::ShowAllTargets,
                };
                (InputSource::Footswitch, action)
            }
            RawInput::MouseClick { x, y } if self.mouse => {
                let action = if x > MOUSE_RIGHT_EDGE {
                    Action::StepVisibility { y }
                } else if x < MOUSE_LEFT_EDGE {
                    Action::SetOpacity(y)
                } else {
                    return None;
                };
                (InputSource::Mouse, action)
            }
            _ => return None,
        };
        Some(InteractionEvent {
            source,
            action,
            timestamp_ns,
        })
    }

    fn key_action(&self, key: char) -> Option<Action> {
        match key {
            'b' => Some(Action::Toggle(self.primary_group)),
            'n' => Some(Action::NextTarget),
            'm' => Some(Action::ShowAllTargets),
            'd' => Some(Action::WritePointerTip),
            other => match other.to_digit(10) {
                Some(g) if (1..=MAX_DIGIT_GROUP).contains(&g) => Some(Action::Toggle(GroupId(g))),
                _ => nudge(other).map(Action::NudgeModels),
            },
        }
    }
}
