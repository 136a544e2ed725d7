//! Interaction controller: the single writer of [`VisibilityState`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::RwLock;
use tracing::{debug, info, trace, warn};

use super::events::{Action, EventOutcome, InputSource, InteractionEvent};
use super::visibility::VisibilityState;

/// How often the event loop checks the shutdown flag while idle.
const IDLE_POLL: Duration = Duration::from_millis(50);

pub struct InteractionController {
    maximum_delay_ns: u64,
    last_accepted: HashMap<InputSource, u64>,
    visibility: Arc<RwLock<VisibilityState>>,
}

impl InteractionController {
    pub fn new(maximum_delay: Duration, visibility: Arc<RwLock<VisibilityState>>) -> Self {
        Self {
            maximum_delay_ns: u64::try_from(maximum_delay.as_nanos()).unwrap_or(u64::MAX),
            last_accepted: HashMap::new(),
            visibility,
        }
    }

    pub fn visibility(&self) -> Arc<RwLock<VisibilityState>> {
        Arc::clone(&self.visibility)
    }

    /// Apply one event.
    ///
    /// Events from a source arriving within the maximum delay of that
    /// source's last accepted event are dropped, not queued.
    pub fn handle(&mut self, event: &InteractionEvent) -> EventOutcome {
        if let Some(&last) = self.last_accepted.get(&event.source) {
            if event.timestamp_ns.saturating_sub(last) < self.maximum_delay_ns
                || event.timestamp_ns < last
            {
                trace!(source = ?event.source, "debounced");
                return EventOutcome::Debounced;
            }
        }
        self.last_accepted.insert(event.source, event.timestamp_ns);

        let mut state = self.visibility.write();
        match event.action {
            Action::Toggle(group) => {
                if !state.toggle(group) {
                    warn!(source = ?event.source, %group, "no anatomy in group, ignoring toggle");
                    return EventOutcome::Ignored;
                }
                debug!(%group, visibility = ?state.group(group), "group toggled");
            }
            Action::StepVisibility { y } => match state.step(y) {
                Some(group) => {
                    debug!(%group, visibility = ?state.group(group), "visibility stepped")
                }
                None => debug!(y, "nothing to step"),
            },
            Action::NextTarget => {
                if state.next_target().is_none() {
                    warn!("no target anatomy configured, ignoring next target");
                    return EventOutcome::Ignored;
                }
            }
            Action::ShowAllTargets => state.show_all_targets(),
            Action::SetOpacity(opacity) => state.set_opacity(opacity),
            Action::WritePointerTip => state.request_pointer_write(),
            Action::NudgeModels(increment) => {
                state.nudge_models(&increment);
                debug!(offset = ?state.model_offset().to_matrix(), "models moved");
            }
            Action::StopTracking | Action::StartTracking => {
                let enabled = event.action == Action::StartTracking;
                if !state.set_tracking(enabled) {
                    return EventOutcome::Ignored;
                }
                info!(enabled, "tracking switched");
            }
        }
        EventOutcome::Applied
    }

    /// Consume events until the channel closes or `shutdown` is set.
    pub fn run(mut self, events: Receiver<InteractionEvent>, shutdown: &AtomicBool) {
        info!("interaction controller started");
        while !shutdown.load(Ordering::SeqCst) {
            match events.recv_timeout(IDLE_POLL) {
                Ok(event) => {
                    self.handle(&event);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!("interaction controller stopped");
    }
}
