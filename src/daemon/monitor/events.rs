use std::time::Duration;

use crate::store::entities::TrackerId;

pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 16;

/// What the monitor tells its subscribers. Delivered over a broadcast
/// channel: dropping a receiver unsubscribes, a lagging receiver misses old
/// events instead of stalling the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// The active-session set went from empty to non-empty or back, and the
    /// monitor started or stopped watching accordingly.
    MonitorStateChanged { monitoring: bool },
    /// User inactivity crossed the threshold. Sent once per crossing, right
    /// before the forced stop.
    UserInactive { idle: Duration },
    /// The session cap elapsed without being rearmed.
    AutoStopExpired,
    /// Outcome of a forced stop of all sessions.
    SessionsStopped {
        stopped: Vec<TrackerId>,
        failed: Vec<TrackerId>,
    },
}
