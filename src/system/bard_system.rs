//! BARD system: main entry point and thread orchestration.
//!
//! `BardSystem` owns the shared state and spawns the tracker polling and
//! interaction threads. The frame loop runs on the caller's thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Sender, unbounded};
use tracing::{debug, info, warn};

use crate::calibration::{CalibrationSet, CalibrationStore};
use crate::config::ResolvedConfiguration;
use crate::interaction::{
    InputBindings, InteractionController, InteractionEvent, PointerWriter, RawInput,
    VisibilityState,
};
use crate::overlay::{FrameSource, OverlayCompositor, VideoFrame};
use crate::registration::{RegistrationEngine, RegistrationSnapshot};
use crate::tracking::{self, ConnectionState, FeedSender, TrackerAdapter, TrackerBackend};

use super::shared_state::SharedState;

/// Pause between polls while the tracker is disconnected.
const DISCONNECTED_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct BardSystem {
    config: ResolvedConfiguration,

    /// Kept alive until both threads have been joined.
    calibration: Arc<CalibrationSet>,

    shared: Arc<SharedState>,

    /// Registration runs in the frame loop (caller thread).
    engine: RegistrationEngine,

    pointer_writer: Option<PointerWriter>,

    bindings: InputBindings,

    /// Channel sender for interaction events (inputs -> interaction thread).
    event_sender: Sender<InteractionEvent>,

    /// Detector feed for device trackers; `None` for replay.
    tracker_feed: Option<FeedSender>,

    tracker_handle: Option<JoinHandle<()>>,
    interaction_handle: Option<JoinHandle<()>>,

    /// Pointer-write requests already serviced by the frame loop.
    handled_pointer_writes: u64,
}

impl BardSystem {
    /// Start the system around an already constructed tracker backend.
    pub fn new(
        config: ResolvedConfiguration,
        calibration: CalibrationSet,
        backend: Box<dyn TrackerBackend>,
    ) -> Self {
        let visibility = VisibilityState::from_config(&config);
        let shared = SharedState::new(config.tracker.rigid_bodies.len(), visibility);

        let engine = RegistrationEngine::new(&config, &calibration);
        let bindings = InputBindings::new(&config.interaction, &config.groups());
        let pointer_writer = config
            .pointer
            .as_ref()
            .map(|p| PointerWriter::new(p.output_dir.clone()));

        let adapter = TrackerAdapter::new(backend, &config.tracker);
        let tracker_handle = Self::spawn_tracker_polling(Arc::clone(&shared), adapter);

        let (event_sender, event_receiver) = unbounded::<InteractionEvent>();
        let controller = InteractionController::new(
            config.interaction.maximum_delay,
            Arc::clone(&shared.visibility),
        );
        let interaction_shared = Arc::clone(&shared);
        let interaction_handle = thread::spawn(move || {
            controller.run(event_receiver, &interaction_shared.shutdown_requested);
        });

        info!(
            tracker = ?config.tracker.kind,
            rigid_bodies = config.tracker.rigid_bodies.len(),
            models = config.models.len(),
            pointer = config.pointer.is_some(),
            "BARD system started"
        );

        Self {
            config,
            calibration: Arc::new(calibration),
            shared,
            engine,
            pointer_writer,
            bindings,
            event_sender,
            tracker_feed: None,
            tracker_handle: Some(tracker_handle),
            interaction_handle: Some(interaction_handle),
            handled_pointer_writes: 0,
        }
    }

    /// Load calibration and pick the tracker backend from the configuration.
    ///
    /// Relative paths are resolved against `base_dir`. `output_dir` replaces
    /// the configured pointer output directory.
    pub fn from_config(
        mut config: ResolvedConfiguration,
        base_dir: &Path,
        output_dir: Option<PathBuf>,
    ) -> Result<Self> {
        if let (Some(pointer), Some(dir)) = (config.pointer.as_mut(), output_dir) {
            pointer.output_dir = dir;
        }
        let calibration = CalibrationStore::load(&config, base_dir)
            .context("failed to load calibration")?;
        let (backend, feed) = tracking::backend_for(&config.tracker, base_dir);
        let mut system = Self::new(config, calibration, backend);
        system.tracker_feed = feed;
        Ok(system)
    }

    fn spawn_tracker_polling(
        shared: Arc<SharedState>,
        mut adapter: TrackerAdapter,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            info!("tracker polling started");
            let mut stopped = false;
            while !shared.is_shutdown_requested() {
                // The device keeps being drained while stopped so a detector
                // feed never backs up.
                let poses = adapter.poll();
                if !shared.visibility.read().is_tracking_enabled() {
                    if !stopped {
                        shared.poses.invalidate_all();
                        stopped = true;
                    }
                } else {
                    stopped = false;
                    if !poses.is_empty() {
                        shared.poses.publish(&poses);
                    }
                }
                if adapter.is_exhausted() {
                    shared.set_tracker_exhausted();
                    break;
                }
                let state = adapter.state();
                if matches!(state, ConnectionState::Lost | ConnectionState::NotConnected) {
                    thread::sleep(DISCONNECTED_POLL_INTERVAL);
                }
            }
            info!("tracker polling stopped");
        })
    }

    pub fn config(&self) -> &ResolvedConfiguration {
        &self.config
    }

    pub fn calibration(&self) -> &CalibrationSet {
        &self.calibration
    }

    pub fn shared_state(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub fn bindings(&self) -> &InputBindings {
        &self.bindings
    }

    /// Sender for already translated interaction events.
    pub fn events(&self) -> Sender<InteractionEvent> {
        self.event_sender.clone()
    }

    /// Where an external marker detector pushes observations.
    pub fn tracker_feed(&self) -> Option<FeedSender> {
        self.tracker_feed.clone()
    }

    /// Translate a raw input and hand it to the interaction thread.
    ///
    /// Returns `false` when the input is disabled or unbound.
    pub fn submit(&self, input: RawInput, timestamp_ns: u64) -> bool {
        let Some(event) = self.bindings.translate(input, timestamp_ns) else {
            debug!(?input, "input not bound");
            return false;
        };
        self.event_sender.send(event).is_ok()
    }

    /// Register the latest poses against one video frame and compose it.
    pub fn process_frame(
        &mut self,
        frame: &VideoFrame,
        compositor: &mut dyn OverlayCompositor,
    ) -> Result<RegistrationSnapshot> {
        let poses = self.shared.poses.snapshot();
        let visibility = self.shared.visibility.read().clone();
        let snapshot = self.engine.register(&poses, &visibility, frame.timestamp_ns);

        let requested = visibility.pointer_write_requests();
        if requested > self.handled_pointer_writes {
            self.handled_pointer_writes = requested;
            match &self.pointer_writer {
                Some(writer) => {
                    if let Err(e) = writer.write(&snapshot) {
                        warn!(error = %e, "failed to write pointer");
                    }
                }
                None => warn!("pointer write requested but no pointer is configured"),
            }
        }

        compositor
            .compose(frame, &snapshot)
            .with_context(|| format!("failed to compose frame {}", frame.index))?;
        Ok(snapshot)
    }

    /// Drive the frame loop until the source ends, `max_frames` frames are
    /// composed, or a non-looping replay runs out.
    ///
    /// Returns the number of frames composed.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        compositor: &mut dyn OverlayCompositor,
        max_frames: Option<u64>,
    ) -> Result<u64> {
        let mut composed = 0u64;
        while max_frames.is_none_or(|max| composed < max) {
            if self.shared.is_tracker_exhausted() {
                info!(frames = composed, "tracking recording exhausted, stopping");
                break;
            }
            let Some(frame) = source.grab().context("failed to grab video frame")? else {
                info!(frames = composed, "video source ended");
                break;
            };
            self.process_frame(&frame, compositor)?;
            composed += 1;
        }
        Ok(composed)
    }

    /// Signal every loop to stop and wait for the threads.
    pub fn shutdown(&mut self) {
        self.shared.request_shutdown();
        if let Some(handle) = self.tracker_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.interaction_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for BardSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}
