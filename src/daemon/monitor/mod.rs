//! Watches running sessions and force-stops them when the user walks away or
//! a session cap elapses. One task owns all monitor state; every tick
//! re-reads the active set from the ledger, so decisions are never made on a
//! stale view.

pub mod events;
pub mod idle;

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::{
    sync::{broadcast, watch},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    engine::SessionControl, store::entities::TrackerId, system::IdleProbe, utils::clock::Clock,
};

use events::EVENT_CHANNEL_CAPACITY;
pub use events::MonitorEvent;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Tunables of the monitor. Updated at runtime through the
/// [`MonitorHandle`]; an update counts as a settings change and rearms the
/// session cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Idle span that counts as the user being away.
    pub idle_threshold: Duration,
    /// Whether idleness is watched at all.
    pub monitor_enabled: bool,
    /// Longest a stretch of tracking may run before being cut, off when
    /// `None`.
    pub auto_stop: Option<Duration>,
}

impl Default for MonitorConfig {
    fn default() -> MonitorConfig {
        MonitorConfig {
            idle_threshold: Duration::from_secs(60),
            monitor_enabled: true,
            auto_stop: None,
        }
    }
}

/// The caller's side of a running monitor: push config updates, subscribe to
/// events.
pub struct MonitorHandle {
    config: watch::Sender<MonitorConfig>,
    events: broadcast::Sender<MonitorEvent>,
}

impl MonitorHandle {
    pub fn update_config(&self, config: MonitorConfig) {
        // The monitor picks the change up on its next tick. If it is gone,
        // there is nobody left to configure.
        let _ = self.config.send(config);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }
}

/// One-shot deadline for the session cap, together with the active set it
/// was armed for. Any difference between that set and the current one counts
/// as activity and rearms the cap.
#[derive(Default)]
struct AutoStopTimer {
    deadline: Option<Instant>,
    watched: BTreeMap<TrackerId, DateTime<Utc>>,
}

impl AutoStopTimer {
    fn arm(&mut self, deadline: Instant, watched: BTreeMap<TrackerId, DateTime<Utc>>) {
        self.deadline = Some(deadline);
        self.watched = watched;
    }

    fn disarm(&mut self) {
        self.deadline = None;
        self.watched.clear();
    }
}

pub struct MonitorModule {
    sessions: Arc<dyn SessionControl>,
    probe: Box<dyn IdleProbe>,
    config: watch::Receiver<MonitorConfig>,
    events: broadcast::Sender<MonitorEvent>,
    shutdown: CancellationToken,
    poll_interval: Duration,
    clock: Box<dyn Clock>,
    /// On while at least one session runs. While off, the idle probe is
    /// never touched.
    monitoring: bool,
    idle: idle::IdleEvaluator,
    auto_stop: AutoStopTimer,
}

impl MonitorModule {
    pub fn new(
        sessions: Arc<dyn SessionControl>,
        probe: Box<dyn IdleProbe>,
        config: MonitorConfig,
        poll_interval: Duration,
        shutdown: CancellationToken,
        clock: Box<dyn Clock>,
    ) -> (MonitorModule, MonitorHandle) {
        let (config_tx, config_rx) = watch::channel(config.clone());
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let module = MonitorModule {
            sessions,
            probe,
            config: config_rx,
            events: events_tx.clone(),
            shutdown,
            poll_interval,
            clock,
            monitoring: false,
            idle: idle::IdleEvaluator::new(config.idle_threshold),
            auto_stop: AutoStopTimer::default(),
        };
        let handle = MonitorHandle {
            config: config_tx,
            events: events_tx,
        };
        (module, handle)
    }

    /// Executes the monitor event loop. Wakes at the poll cadence, or earlier
    /// when the session cap would expire before the next poll.
    pub async fn run(mut self) -> Result<()> {
        info!(
            "Session monitor running, polling every {:?}",
            self.poll_interval
        );
        let mut poll_point = self.clock.instant() + self.poll_interval;
        self.tick().await;
        loop {
            let wake_point = match self.auto_stop.deadline {
                Some(deadline) if deadline < poll_point => deadline,
                _ => poll_point,
            };
            tokio::select! {
                // Cancelation means we stop execution of the event loop.
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.clock.sleep_until(wake_point) => ()
            }
            self.tick().await;
            // Keep the poll cadence: only step over points actually reached,
            // a deadline wake-up must not shift the schedule.
            while poll_point <= self.clock.instant() {
                poll_point += self.poll_interval;
            }
        }
    }

    async fn tick(&mut self) {
        let settings_changed = self.config.has_changed().unwrap_or(false);
        if settings_changed {
            let config = self.config.borrow_and_update().clone();
            info!("Monitor settings changed: {config:?}");
            self.idle.set_threshold(config.idle_threshold);
        }
        let config = self.config.borrow().clone();

        let active = match self.sessions.active_sessions().await {
            Ok(active) => active,
            Err(e) => {
                // Degrade and poll again rather than killing the loop.
                warn!("Could not read active sessions: {e}");
                return;
            }
        };

        if active.is_empty() {
            self.to_idle_state();
            return;
        }
        if !self.monitoring {
            self.monitoring = true;
            self.idle.reset();
            info!("Sessions active, monitoring started");
            let _ = self
                .events
                .send(MonitorEvent::MonitorStateChanged { monitoring: true });
        }

        match config.auto_stop {
            None => self.auto_stop.disarm(),
            Some(limit) => {
                let watched: BTreeMap<TrackerId, DateTime<Utc>> = active
                    .iter()
                    .map(|(id, session)| (*id, session.start_time))
                    .collect();
                if settings_changed
                    || self.auto_stop.deadline.is_none()
                    || watched != self.auto_stop.watched
                {
                    debug!("Arming session cap of {limit:?}");
                    self.auto_stop.arm(self.clock.instant() + limit, watched);
                }
            }
        }

        if let Some(deadline) = self.auto_stop.deadline {
            if self.clock.instant() >= deadline {
                info!("Session cap reached, stopping all sessions");
                let _ = self.events.send(MonitorEvent::AutoStopExpired);
                self.auto_stop.disarm();
                self.stop_all_sessions().await;
                return;
            }
        }

        if !config.monitor_enabled {
            return;
        }
        let idle = match self.probe.idle_millis() {
            Ok(millis) => Duration::from_millis(millis),
            Err(e) => {
                warn!("Idle probe failed: {e}");
                return;
            }
        };
        if self.idle.observe(idle) {
            info!("User inactive for {idle:?}, stopping all sessions");
            let _ = self.events.send(MonitorEvent::UserInactive { idle });
            self.stop_all_sessions().await;
        }
    }

    fn to_idle_state(&mut self) {
        self.auto_stop.disarm();
        if self.monitoring {
            self.monitoring = false;
            self.idle.reset();
            info!("No sessions active, monitoring stopped");
            let _ = self
                .events
                .send(MonitorEvent::MonitorStateChanged { monitoring: false });
        }
    }

    async fn stop_all_sessions(&mut self) {
        match self.sessions.stop_all().await {
            Ok(outcome) => {
                for (id, error) in &outcome.failed {
                    warn!("Session of tracker {id} would not stop: {error}");
                }
                let _ = self.events.send(MonitorEvent::SessionsStopped {
                    stopped: outcome
                        .stopped
                        .iter()
                        .map(|session| session.tracker_id)
                        .collect(),
                    failed: outcome.failed.iter().map(|(id, _)| *id).collect(),
                });
                // Trust the ledger over our own view of what stopped.
                match self.sessions.active_sessions().await {
                    Ok(active) if active.is_empty() => self.to_idle_state(),
                    Ok(active) => {
                        debug!("{} sessions survived the stop, keeping watch", active.len())
                    }
                    Err(e) => warn!("Could not re-read active sessions: {e}"),
                }
            }
            Err(e) => {
                error!("Stopping sessions failed entirely: {e:?}");
            }
        }
    }
}
