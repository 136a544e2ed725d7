//! Connection state of the tracker adapter.

/// State of the tracker connection, as seen by the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection attempted yet.
    #[default]
    NotConnected,
    /// Backend connected, observations flowing.
    Connected,
    /// Device lost; reconnecting with backoff.
    Lost,
    /// Recorded source ran out of data and does not loop.
    Exhausted,
}
