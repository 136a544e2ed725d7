//! Shared state between the frame loop, tracker polling and interaction
//! threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::interaction::VisibilityState;
use crate::tracking::PoseBoard;

pub struct SharedState {
    /// Latest pose per rigid body. Written by tracker polling only.
    pub poses: PoseBoard,

    /// Written by the interaction controller only; the frame loop reads.
    pub visibility: Arc<RwLock<VisibilityState>>,

    /// Stop acquisition, polling and interaction loops.
    pub shutdown_requested: AtomicBool,

    /// Set by tracker polling when a non-looping recording has ended.
    pub tracker_exhausted: AtomicBool,
}

impl SharedState {
    pub fn new(body_count: usize, visibility: VisibilityState) -> Arc<Self> {
        Arc::new(Self {
            poses: PoseBoard::new(body_count),
            visibility: Arc::new(RwLock::new(visibility)),
            shutdown_requested: AtomicBool::new(false),
            tracker_exhausted: AtomicBool::new(false),
        })
    }

    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn set_tracker_exhausted(&self) {
        self.tracker_exhausted.store(true, Ordering::SeqCst);
    }

    pub fn is_tracker_exhausted(&self) -> bool {
        self.tracker_exhausted.load(Ordering::SeqCst)
    }
}
