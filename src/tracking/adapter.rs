//! Tracker adapter: backend observations -> one [`TrackedPose`] per rigid body.
//!
//! The adapter owns the name -> id mapping (built once from the resolved
//! tracker configuration), optional smoothing, and device-loss recovery.
//! Acquisition errors never leave this module: a lost device reads as every
//! body invalid while the adapter reconnects with exponential backoff.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::backend::{TrackerAcquisitionError, TrackerBackend};
use super::pose::{BodyObservation, TrackedPose};
use super::smoothing::PoseSmoother;
use super::state::ConnectionState;
use crate::config::{RigidBodyId, TrackerConfig};

pub const RECONNECT_INITIAL_DELAY: Duration = Duration::from_millis(100);
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Doubling delay, capped.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: None,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = match self.current {
            None => self.initial,
            Some(current) => (current * 2).min(self.max),
        };
        self.current = Some(delay);
        delay
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(RECONNECT_INITIAL_DELAY, RECONNECT_MAX_DELAY)
    }
}

pub struct TrackerAdapter {
    backend: Box<dyn TrackerBackend>,
    ids: HashMap<String, RigidBodyId>,
    smoothers: Vec<PoseSmoother>,
    state: ConnectionState,
    backoff: Backoff,
    retry_at: Option<Instant>,
    read_timeout: Duration,
    last_timestamp_ns: u64,
    unknown_names: HashSet<String>,
}

impl TrackerAdapter {
    pub fn new(backend: Box<dyn TrackerBackend>, config: &TrackerConfig) -> Self {
        let ids = config
            .rigid_bodies
            .iter()
            .enumerate()
            .map(|(i, rb)| (rb.name.clone(), RigidBodyId(i)))
            .collect();
        let smoothers = config
            .rigid_bodies
            .iter()
            .map(|_| PoseSmoother::new(config.smoothing_buffer))
            .collect();
        Self {
            backend,
            ids,
            smoothers,
            state: ConnectionState::default(),
            backoff: Backoff::default(),
            retry_at: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
            last_timestamp_ns: 0,
            unknown_names: HashSet::new(),
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == ConnectionState::Exhausted
    }

    /// Number of configured rigid bodies; every non-empty poll returns this
    /// many poses.
    pub fn body_count(&self) -> usize {
        self.smoothers.len()
    }

    /// Earliest instant of the next reconnect attempt, while the device is lost.
    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    /// One pose per configured body, in id order, or an empty vector when the
    /// backend had nothing new within the read timeout. Bodies missing from a
    /// delivered batch, including an empty one, are reported invalid.
    pub fn poll(&mut self) -> Vec<TrackedPose> {
        self.poll_at(Instant::now())
    }

    /// Poll with an explicit clock, for deterministic backoff.
    pub fn poll_at(&mut self, now: Instant) -> Vec<TrackedPose> {
        match self.state {
            ConnectionState::Exhausted => return self.all_invalid(),
            ConnectionState::Connected => {}
            ConnectionState::NotConnected | ConnectionState::Lost => {
                if self.retry_at.is_some_and(|at| now < at) {
                    return self.all_invalid();
                }
                match self.backend.connect() {
                    Ok(()) => {
                        info!(previous = ?self.state, "tracker connected");
                        self.state = ConnectionState::Connected;
                        self.backoff.reset();
                        self.retry_at = None;
                    }
                    Err(e) => {
                        self.lose_device(now, &e);
                        return self.all_invalid();
                    }
                }
            }
        }

        match self.backend.read(self.read_timeout) {
            Ok(None) => Vec::new(),
            Ok(Some(observations)) => self.integrate(observations),
            Err(TrackerAcquisitionError::Exhausted) => {
                info!("tracking recording finished");
                self.state = ConnectionState::Exhausted;
                self.all_invalid()
            }
            Err(e) => {
                self.lose_device(now, &e);
                self.all_invalid()
            }
        }
    }

    fn lose_device(&mut self, now: Instant, error: &TrackerAcquisitionError) {
        let delay = self.backoff.next_delay();
        warn!(error = %error, retry_in_ms = delay.as_millis() as u64, "tracker unavailable");
        self.state = ConnectionState::Lost;
        self.retry_at = Some(now + delay);
        for smoother in &mut self.smoothers {
            smoother.clear();
        }
    }

    fn all_invalid(&self) -> Vec<TrackedPose> {
        (0..self.smoothers.len())
            .map(|i| TrackedPose::invalid(RigidBodyId(i), self.last_timestamp_ns))
            .collect()
    }

    fn integrate(&mut self, observations: Vec<BodyObservation>) -> Vec<TrackedPose> {
        let mut latest: Vec<Option<BodyObservation>> = vec![None; self.smoothers.len()];
        for obs in observations {
            self.last_timestamp_ns = self.last_timestamp_ns.max(obs.timestamp_ns);
            match self.ids.get(&obs.name) {
                Some(id) => latest[id.0] = Some(obs),
                None => {
                    if self.unknown_names.insert(obs.name.clone()) {
                        debug!(name = %obs.name, "ignoring observation of unconfigured rigid body");
                    }
                }
            }
        }

        latest
            .into_iter()
            .enumerate()
            .map(|(i, obs)| {
                let id = RigidBodyId(i);
                match obs {
                    Some(obs) if obs.valid => TrackedPose {
                        rigid_body: id,
                        pose: self.smoothers[i].push(obs.pose),
                        timestamp_ns: obs.timestamp_ns,
                        valid: true,
                    },
                    Some(obs) => {
                        self.smoothers[i].clear();
                        TrackedPose::invalid(id, obs.timestamp_ns)
                    }
                    None => {
                        self.smoothers[i].clear();
                        TrackedPose::invalid(id, self.last_timestamp_ns)
                    }
                }
            })
            .collect()
    }
}
