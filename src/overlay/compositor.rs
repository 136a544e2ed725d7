use anyhow::Result;
use tracing::{debug, info};

use super::frame::VideoFrame;
use crate::registration::{RegistrationSnapshot, RegistrationStatus};

/// Draws registered models over a video frame.
///
/// Rendering lives outside this crate; implementations receive one
/// snapshot per frame and must not block the frame loop for long.
pub trait OverlayCompositor: Send {
    fn compose(&mut self, frame: &VideoFrame, snapshot: &RegistrationSnapshot) -> Result<()>;
}

/// Compositor that only reports what it would draw.
pub struct LoggingCompositor {
    /// Emit an `info!` summary every this many frames.
    summary_every: u64,
    frames: u64,
    last_current: usize,
}

impl LoggingCompositor {
    pub fn new(summary_every: u64) -> Self {
        Self {
            summary_every: summary_every.max(1),
            frames: 0,
            last_current: 0,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Models registered `Current` in the last composed frame.
    pub fn last_current(&self) -> usize {
        self.last_current
    }
}

impl Default for LoggingCompositor {
    fn default() -> Self {
        Self::new(30)
    }
}

impl OverlayCompositor for LoggingCompositor {
    fn compose(&mut self, frame: &VideoFrame, snapshot: &RegistrationSnapshot) -> Result<()> {
        let current = snapshot.count(RegistrationStatus::Current);
        let stale = snapshot.count(RegistrationStatus::Stale);
        let visible = snapshot.models.iter().filter(|m| m.visible && m.transform.is_some()).count();

        debug!(
            frame = frame.index,
            registration_frame = snapshot.frame_index,
            current,
            stale,
            visible,
            opacity = snapshot.opacity,
            "overlay composed"
        );
        if self.frames % self.summary_every == 0 {
            let pointer = snapshot.pointer.as_ref().map(|p| p.status);
            info!(
                frame = frame.index,
                models = snapshot.models.len(),
                current,
                stale,
                visible,
                pointer = ?pointer,
                "overlay"
            );
        }

        self.frames += 1;
        self.last_current = current;
        Ok(())
    }
}
