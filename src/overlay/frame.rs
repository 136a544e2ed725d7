//! Video frames and frame sources.
//!
//! Capturing from a real device is outside this crate; a [`FrameSource`] is
//! the seam. [`LatestFrameGrabber`] runs any source on its own thread and
//! only ever hands out the most recent frame, so a slow frame loop drops
//! frames instead of queueing them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Result;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

/// One video frame, BGR8 row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub index: u64,
    pub timestamp_ns: u64,
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<Vec<u8>>,
}

pub trait FrameSource: Send {
    /// Next frame; `None` at end of stream.
    fn grab(&mut self) -> Result<Option<VideoFrame>>;
}

/// Blank frames at a fixed rate.
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    interval: Duration,
    limit: Option<u64>,
    next_index: u64,
    start: Option<Instant>,
    blank: Arc<Vec<u8>>,
}

impl SyntheticFrameSource {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        let interval = if fps > 0.0 {
            Duration::from_secs_f64(1.0 / fps)
        } else {
            Duration::ZERO
        };
        Self {
            width,
            height,
            interval,
            limit: None,
            next_index: 0,
            start: None,
            blank: Arc::new(vec![0; width as usize * height as usize * 3]),
        }
    }

    /// End the stream after `frames` frames.
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }
}

impl FrameSource for SyntheticFrameSource {
    fn grab(&mut self) -> Result<Option<VideoFrame>> {
        if self.limit.is_some_and(|limit| self.next_index >= limit) {
            return Ok(None);
        }
        let start = *self.start.get_or_insert_with(Instant::now);
        let offset = self.interval * u32::try_from(self.next_index).unwrap_or(u32::MAX);
        let due = start + offset;
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
        let frame = VideoFrame {
            index: self.next_index,
            timestamp_ns: u64::try_from(offset.as_nanos()).unwrap_or(u64::MAX),
            width: self.width,
            height: self.height,
            pixels: Arc::clone(&self.blank),
        };
        self.next_index += 1;
        Ok(Some(frame))
    }
}

struct Latest {
    frame: Mutex<Option<VideoFrame>>,
    arrived: Condvar,
    frame_id: AtomicU64,
    ended: AtomicBool,
}

/// Runs a frame source on a dedicated acquisition thread, keeping only the
/// latest frame.
pub struct LatestFrameGrabber {
    latest: Arc<Latest>,
    stop: Arc<AtomicBool>,
    consumed: u64,
    handle: Option<JoinHandle<()>>,
}

impl LatestFrameGrabber {
    pub fn start(mut source: Box<dyn FrameSource>) -> Self {
        let latest = Arc::new(Latest {
            frame: Mutex::new(None),
            arrived: Condvar::new(),
            frame_id: AtomicU64::new(0),
            ended: AtomicBool::new(false),
        });
        let stop = Arc::new(AtomicBool::new(false));
        let latest_ref = Arc::clone(&latest);
        let stop_ref = Arc::clone(&stop);

        let handle = thread::spawn(move || {
            while !stop_ref.load(Ordering::SeqCst) {
                match source.grab() {
                    Ok(Some(frame)) => {
                        let mut slot = latest_ref.frame.lock();
                        *slot = Some(frame);
                        latest_ref.frame_id.fetch_add(1, Ordering::Release);
                        drop(slot);
                        latest_ref.arrived.notify_all();
                    }
                    Ok(None) => {
                        debug!("frame source ended");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "frame grab failed, stopping acquisition");
                        break;
                    }
                }
            }
            let guard = latest_ref.frame.lock();
            latest_ref.ended.store(true, Ordering::SeqCst);
            drop(guard);
            latest_ref.arrived.notify_all();
        });

        Self {
            latest,
            stop,
            consumed: 0,
            handle: Some(handle),
        }
    }

    /// Frames produced so far, including dropped ones.
    pub fn frame_id(&self) -> u64 {
        self.latest.frame_id.load(Ordering::Acquire)
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl FrameSource for LatestFrameGrabber {
    /// Blocks until a frame newer than the last one handed out arrives.
    fn grab(&mut self) -> Result<Option<VideoFrame>> {
        let mut guard = self.latest.frame.lock();
        loop {
            let id = self.latest.frame_id.load(Ordering::Acquire);
            if id > self.consumed {
                let dropped = id - self.consumed - 1;
                if dropped > 0 {
                    debug!(dropped, "frame loop behind acquisition");
                }
                self.consumed = id;
                return Ok(guard.clone());
            }
            if self.latest.ended.load(Ordering::SeqCst) {
                return Ok(None);
            }
            self.latest.arrived.wait(&mut guard);
        }
    }
}

impl Drop for LatestFrameGrabber {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_limit_and_timestamps() {
        let mut source = SyntheticFrameSource::new(4, 2, 1000.0).with_limit(3);
        let frames: Vec<VideoFrame> = std::iter::from_fn(|| source.grab().unwrap()).collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].index, 2);
        assert!(frames[1].timestamp_ns.abs_diff(1_000_000) <= 1);
        assert_eq!(frames[0].pixels.len(), 4 * 2 * 3);
    }

    #[test]
    fn test_grabber_delivers_then_ends() {
        let source = SyntheticFrameSource::new(2, 2, 500.0).with_limit(5);
        let mut grabber = LatestFrameGrabber::start(Box::new(source));
        let mut seen = Vec::new();
        while let Some(frame) = grabber.grab().unwrap() {
            seen.push(frame.index);
        }
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(grabber.frame_id(), 5);
    }
}
