//! Visibility of anatomy groups and target models, overlay opacity, and the
//! other presentation switches driven by user input.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{GroupId, ModelEntry, ModelId, ResolvedConfiguration};
use crate::geometry::SE3;

pub const DEFAULT_OPACITY: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupVisibility {
    Hidden,
    Visible,
}

impl GroupVisibility {
    pub fn is_visible(self) -> bool {
        self == Self::Visible
    }

    fn toggled(self) -> Self {
        match self {
            Self::Hidden => Self::Visible,
            Self::Visible => Self::Hidden,
        }
    }
}

impl From<bool> for GroupVisibility {
    fn from(visible: bool) -> Self {
        if visible { Self::Visible } else { Self::Hidden }
    }
}

/// Mutable presentation state. Only the interaction controller writes it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisibilityState {
    groups: BTreeMap<GroupId, GroupVisibility>,
    /// Target models in configuration order, with their own on/off switch.
    targets: Vec<(ModelId, bool)>,
    opacity: f64,
    pointer_write_requests: u64,
    /// Manual correction applied to every model, in the reference frame.
    model_offset: SE3,
    tracking_enabled: bool,
}

impl VisibilityState {
    /// Initial state: a group is visible when any of its models is
    /// configured visible.
    pub fn from_config(config: &ResolvedConfiguration) -> Self {
        let mut groups: BTreeMap<GroupId, GroupVisibility> = BTreeMap::new();
        for model in &config.models {
            let entry = groups.entry(model.group).or_insert(GroupVisibility::Hidden);
            if model.visible {
                *entry = GroupVisibility::Visible;
            }
        }
        let targets = config
            .models
            .iter()
            .filter(|m| m.target)
            .map(|m| (m.id, m.visible))
            .collect();
        Self {
            groups,
            targets,
            opacity: DEFAULT_OPACITY,
            pointer_write_requests: 0,
            model_offset: SE3::identity(),
            tracking_enabled: true,
        }
    }

    pub fn group(&self, group: GroupId) -> Option<GroupVisibility> {
        self.groups.get(&group).copied()
    }

    pub fn groups(&self) -> impl Iterator<Item = (GroupId, GroupVisibility)> + '_ {
        self.groups.iter().map(|(g, v)| (*g, *v))
    }

    /// Whether a model is drawn: its group is visible and, for target
    /// anatomy, its target switch is on.
    pub fn is_model_visible(&self, model: &ModelEntry) -> bool {
        let group_visible = self.group(model.group).is_some_and(GroupVisibility::is_visible);
        let target_on = !model.target
            || self
                .targets
                .iter()
                .find(|(id, _)| *id == model.id)
                .is_some_and(|(_, on)| *on);
        group_visible && target_on
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn pointer_write_requests(&self) -> u64 {
        self.pointer_write_requests
    }

    /// `offset_T_model`: applied after the configured `reference_T_model`.
    pub fn model_offset(&self) -> SE3 {
        self.model_offset
    }

    pub fn is_tracking_enabled(&self) -> bool {
        self.tracking_enabled
    }

    /// Returns false when the group does not exist.
    pub fn toggle(&mut self, group: GroupId) -> bool {
        match self.groups.get_mut(&group) {
            Some(v) => {
                *v = v.toggled();
                true
            }
            None => false,
        }
    }

    /// Upper half (`y > 0.5`) hides the first visible group; otherwise the
    /// last hidden group is shown. Returns the group changed, if any.
    pub fn step(&mut self, y: f64) -> Option<GroupId> {
        if y > 0.5 {
            self.groups
                .iter_mut()
                .find(|(_, v)| v.is_visible())
                .map(|(g, v)| {
                    *v = GroupVisibility::Hidden;
                    *g
                })
        } else {
            self.groups
                .iter_mut()
                .rev()
                .find(|(_, v)| !v.is_visible())
                .map(|(g, v)| {
                    *v = GroupVisibility::Visible;
                    *g
                })
        }
    }

    /// Show only the target after the last one currently shown, wrapping.
    pub fn next_target(&mut self) -> Option<ModelId> {
        if self.targets.is_empty() {
            return None;
        }
        let next = self
            .targets
            .iter()
            .rposition(|(_, on)| *on)
            .map_or(0, |last| (last + 1) % self.targets.len());
        for (i, (_, on)) in self.targets.iter_mut().enumerate() {
            *on = i == next;
        }
        Some(self.targets[next].0)
    }

    pub fn show_all_targets(&mut self) {
        for (_, on) in &mut self.targets {
            *on = true;
        }
    }

    pub fn set_opacity(&mut self, opacity: f64) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    pub fn request_pointer_write(&mut self) {
        self.pointer_write_requests += 1;
    }

    /// Accumulate a manual model move; the newest increment is applied last.
    pub fn nudge_models(&mut self, increment: &SE3) {
        self.model_offset = increment.compose(&self.model_offset);
    }

    /// Returns false when tracking was already in that state.
    pub fn set_tracking(&mut self, enabled: bool) -> bool {
        let changed = self.tracking_enabled != enabled;
        self.tracking_enabled = enabled;
        changed
    }
}
