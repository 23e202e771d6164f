//! Tracker and session operations over a [`StoreDir`]. Every operation takes
//! the store lock, re-reads the files it touches and writes them back before
//! releasing, so concurrent commands and the daemon always see settled state.
//! Nothing is cached between calls.

pub mod error;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Local;
use tracing::{info, instrument, warn};

use crate::{
    stats::{
        self, DailyTotal, DateRange, TodayStats, TrackerShare, TrendPoint, WorkStats, round2,
    },
    store::{
        StoreDir, StoreError,
        entities::{ActiveSession, NewTracker, Session, Tracker, TrackerId, TrackerPatch, WorkDays},
        trackers::next_tracker_id,
    },
    utils::clock::{Clock, DefaultClock},
};

pub use error::{EngineError, EngineResult, ErrorClass};

const MAX_NAME_CHARS: usize = 100;
const MAX_DESCRIPTION_CHARS: usize = 500;

pub struct TrackerEngine {
    store: StoreDir,
    clock: Box<dyn Clock>,
}

impl TrackerEngine {
    pub fn new(store: StoreDir) -> TrackerEngine {
        TrackerEngine::with_clock(store, Box::new(DefaultClock))
    }

    pub fn with_clock(store: StoreDir, clock: Box<dyn Clock>) -> TrackerEngine {
        TrackerEngine { store, clock }
    }

    pub fn store(&self) -> &StoreDir {
        &self.store
    }

    pub async fn create_tracker(&self, new: NewTracker) -> EngineResult<Tracker> {
        validate_new(&new)?;
        let lock = self.store.lock_exclusive().await?;
        let mut trackers = self.store.load_trackers().await?;
        let now = self.clock.time();
        let tracker = Tracker {
            id: next_tracker_id(&trackers),
            name: new.name.trim().to_string(),
            target_hours: new.target_hours,
            work_days: new.work_days.unwrap_or_else(WorkDays::weekdays),
            archived: false,
            description: normalize_description(new.description),
            created_at: now,
            updated_at: now,
        };
        trackers.push(tracker.clone());
        self.store.save_trackers(&trackers).await?;
        lock.release().await?;
        info!("Created tracker {} ({})", tracker.id, tracker.name);
        Ok(tracker)
    }

    pub async fn update_tracker(&self, id: TrackerId, patch: TrackerPatch) -> EngineResult<Tracker> {
        validate_patch(&patch)?;
        let lock = self.store.lock_exclusive().await?;
        let mut trackers = self.store.load_trackers().await?;
        let tracker = trackers
            .iter_mut()
            .find(|tracker| tracker.id == id)
            .ok_or(EngineError::TrackerNotFound(id))?;

        if let Some(name) = patch.name {
            tracker.name = name.trim().to_string();
        }
        if let Some(target_hours) = patch.target_hours {
            tracker.target_hours = target_hours;
        }
        if let Some(work_days) = patch.work_days {
            tracker.work_days = work_days;
        }
        if let Some(description) = patch.description {
            tracker.description = normalize_description(Some(description));
        }
        tracker.updated_at = self.clock.time();
        let updated = tracker.clone();

        self.store.save_trackers(&trackers).await?;
        lock.release().await?;
        Ok(updated)
    }

    /// Hides a tracker from day-to-day listings, stopping its running session
    /// first so no time keeps accruing. Archiving an archived tracker changes
    /// nothing.
    #[instrument(skip(self))]
    pub async fn archive_tracker(&self, id: TrackerId) -> EngineResult<Tracker> {
        let lock = self.store.lock_exclusive().await?;
        let mut trackers = self.store.load_trackers().await?;
        let index = trackers
            .iter()
            .position(|tracker| tracker.id == id)
            .ok_or(EngineError::TrackerNotFound(id))?;

        let mut active = self.store.load_active().await?;
        if let Some(session) = active.remove(&id) {
            let completed = Session::close(&session, self.clock.time());
            self.store.append_session(&completed).await?;
            self.store.save_active(&active).await?;
            info!("Stopped running session of tracker {id} before archiving");
        }

        if !trackers[index].archived {
            trackers[index].archived = true;
            trackers[index].updated_at = self.clock.time();
            self.store.save_trackers(&trackers).await?;
        }
        let tracker = trackers[index].clone();
        lock.release().await?;
        Ok(tracker)
    }

    pub async fn unarchive_tracker(&self, id: TrackerId) -> EngineResult<Tracker> {
        let lock = self.store.lock_exclusive().await?;
        let mut trackers = self.store.load_trackers().await?;
        let index = trackers
            .iter()
            .position(|tracker| tracker.id == id)
            .ok_or(EngineError::TrackerNotFound(id))?;

        if trackers[index].archived {
            trackers[index].archived = false;
            trackers[index].updated_at = self.clock.time();
            self.store.save_trackers(&trackers).await?;
        }
        let tracker = trackers[index].clone();
        lock.release().await?;
        Ok(tracker)
    }

    /// Removes the tracker together with its whole ledger: the completed
    /// session file and any running session go with it.
    #[instrument(skip(self))]
    pub async fn delete_tracker(&self, id: TrackerId) -> EngineResult<()> {
        let lock = self.store.lock_exclusive().await?;
        let mut trackers = self.store.load_trackers().await?;
        let index = trackers
            .iter()
            .position(|tracker| tracker.id == id)
            .ok_or(EngineError::TrackerNotFound(id))?;
        trackers.remove(index);
        self.store.save_trackers(&trackers).await?;

        let mut active = self.store.load_active().await?;
        if active.remove(&id).is_some() {
            self.store.save_active(&active).await?;
        }
        self.store.remove_sessions(id).await?;
        lock.release().await?;
        info!("Deleted tracker {id} and its ledger");
        Ok(())
    }

    /// Trackers in creation order. Archived ones only show up when asked for.
    pub async fn list_trackers(&self, include_archived: bool) -> EngineResult<Vec<Tracker>> {
        let lock = self.store.lock_shared().await?;
        let mut trackers = self.store.load_trackers().await?;
        lock.release().await?;
        if !include_archived {
            trackers.retain(|tracker| !tracker.archived);
        }
        Ok(trackers)
    }

    /// Starts the tracker's session. A tracker can only run once at a time;
    /// the check and the insert happen under the exclusive store lock, so two
    /// racing starts resolve to one winner and one conflict.
    #[instrument(skip(self))]
    pub async fn start_session(&self, id: TrackerId) -> EngineResult<ActiveSession> {
        let lock = self.store.lock_exclusive().await?;
        let trackers = self.store.load_trackers().await?;
        let tracker = trackers
            .iter()
            .find(|tracker| tracker.id == id)
            .ok_or(EngineError::TrackerNotFound(id))?;
        if tracker.archived {
            return Err(EngineError::Archived(id));
        }

        let mut active = self.store.load_active().await?;
        if active.contains_key(&id) {
            return Err(EngineError::AlreadyRunning(id));
        }
        let session = ActiveSession {
            tracker_id: id,
            start_time: self.clock.time(),
        };
        active.insert(id, session.clone());
        self.store.save_active(&active).await?;
        lock.release().await?;
        info!("Started session for tracker {id}");
        Ok(session)
    }

    /// Finishes the tracker's running session: appends the completed entry to
    /// the ledger, then clears the active slot.
    #[instrument(skip(self))]
    pub async fn stop_session(&self, id: TrackerId) -> EngineResult<Session> {
        let lock = self.store.lock_exclusive().await?;
        let trackers = self.store.load_trackers().await?;
        if !trackers.iter().any(|tracker| tracker.id == id) {
            return Err(EngineError::TrackerNotFound(id));
        }

        let mut active = self.store.load_active().await?;
        let session = active
            .remove(&id)
            .ok_or(EngineError::NoActiveSession(id))?;
        let completed = Session::close(&session, self.clock.time());
        self.store.append_session(&completed).await?;
        self.store.save_active(&active).await?;
        lock.release().await?;
        info!(
            "Stopped session for tracker {id} after {} minutes",
            completed.duration_minutes
        );
        Ok(completed)
    }

    pub async fn active_sessions(&self) -> EngineResult<BTreeMap<TrackerId, ActiveSession>> {
        let lock = self.store.lock_shared().await?;
        let active = self.store.load_active().await?;
        lock.release().await?;
        Ok(active)
    }

    /// Completed sessions of a tracker, oldest first, optionally narrowed to
    /// the local dates of a range. Unknown trackers have logged nothing and
    /// yield an empty list.
    pub async fn completed_sessions(
        &self,
        id: TrackerId,
        range: Option<&DateRange>,
    ) -> EngineResult<Vec<Session>> {
        let lock = self.store.lock_shared().await?;
        let mut sessions = self.store.read_sessions(id).await?;
        lock.release().await?;
        if let Some(range) = range {
            sessions.retain(|session| range.contains(stats::session_date(session.start_time, &Local)));
        }
        Ok(sessions)
    }

    /// Stops every running session. Sessions fail or succeed one by one; a
    /// bad entry never blocks the rest, and the outcome reports both sides.
    #[instrument(skip(self))]
    pub async fn stop_all(&self) -> EngineResult<StopAllOutcome> {
        let lock = self.store.lock_exclusive().await?;
        let trackers = self.store.load_trackers().await?;
        let mut active = self.store.load_active().await?;
        let now = self.clock.time();

        let mut outcome = StopAllOutcome::default();
        let running: Vec<ActiveSession> = active.values().cloned().collect();
        for session in running {
            let id = session.tracker_id;
            let stopped = async {
                if !trackers.iter().any(|tracker| tracker.id == id) {
                    return Err(EngineError::TrackerNotFound(id));
                }
                let completed = Session::close(&session, now);
                self.store.append_session(&completed).await?;
                Ok(completed)
            }
            .await;

            match stopped {
                Ok(completed) => {
                    active.remove(&id);
                    outcome.stopped.push(completed);
                }
                Err(e) => {
                    warn!("Could not stop session of tracker {id}: {e}");
                    outcome.failed.push((id, e));
                }
            }
        }
        self.store.save_active(&active).await?;
        lock.release().await?;
        info!(
            "Stopped {} sessions, {} failed",
            outcome.stopped.len(),
            outcome.failed.len()
        );
        Ok(outcome)
    }

    /// Per-date logged minutes in the local calendar, zero-filled across the
    /// range. With `live`, running sessions count up to now.
    pub async fn daily_totals(
        &self,
        scope: Option<TrackerId>,
        range: &DateRange,
        live: bool,
    ) -> EngineResult<Vec<DailyTotal>> {
        let lock = self.store.lock_shared().await?;
        let sessions = self.sessions_in_scope(scope).await?;
        let active = if live {
            self.active_in_scope(scope).await?
        } else {
            vec![]
        };
        lock.release().await?;
        Ok(stats::daily_totals_live(
            &sessions,
            &active,
            self.clock.time(),
            range,
            &Local,
        ))
    }

    pub async fn work_stats(&self, id: TrackerId, range: &DateRange) -> EngineResult<WorkStats> {
        let lock = self.store.lock_shared().await?;
        let trackers = self.store.load_trackers().await?;
        let tracker = trackers
            .iter()
            .find(|tracker| tracker.id == id)
            .ok_or(EngineError::TrackerNotFound(id))?
            .clone();
        let sessions = self.store.read_sessions(id).await?;
        lock.release().await?;
        Ok(stats::work_stats(&tracker, &sessions, range, &Local))
    }

    /// Today's progress, for one tracker or for all live trackers together.
    pub async fn today_stats(&self, scope: Option<TrackerId>) -> EngineResult<TodayStats> {
        let lock = self.store.lock_shared().await?;
        let in_scope = self.trackers_in_scope(scope).await?;
        let sessions = self.sessions_in_scope(scope).await?;
        let active = self.active_in_scope(scope).await?;
        lock.release().await?;
        Ok(stats::today_stats(
            &in_scope,
            &sessions,
            &active,
            self.clock.time(),
            &Local,
        ))
    }

    pub async fn productivity_trend(
        &self,
        scope: Option<TrackerId>,
        range: &DateRange,
    ) -> EngineResult<Vec<TrendPoint>> {
        let lock = self.store.lock_shared().await?;
        let in_scope = self.trackers_in_scope(scope).await?;
        let sessions = self.sessions_in_scope(scope).await?;
        lock.release().await?;
        Ok(stats::productivity_trend(&in_scope, &sessions, range, &Local))
    }

    pub async fn task_distribution(&self, range: &DateRange) -> EngineResult<Vec<TrackerShare>> {
        let lock = self.store.lock_shared().await?;
        let trackers = self.store.load_trackers().await?;
        let sessions = self.store.read_all_sessions().await?;
        lock.release().await?;
        Ok(stats::task_distribution(&trackers, &sessions, range, &Local))
    }

    pub async fn total_hours(
        &self,
        scope: Option<TrackerId>,
        range: &DateRange,
        live: bool,
    ) -> EngineResult<f64> {
        let totals = self.daily_totals(scope, range, live).await?;
        Ok(round2(stats::total_minutes(&totals) as f64 / 60.))
    }

    async fn trackers_in_scope(&self, scope: Option<TrackerId>) -> EngineResult<Vec<Tracker>> {
        let trackers = self.store.load_trackers().await?;
        Ok(match scope {
            Some(id) => vec![
                trackers
                    .into_iter()
                    .find(|tracker| tracker.id == id)
                    .ok_or(EngineError::TrackerNotFound(id))?,
            ],
            None => trackers
                .into_iter()
                .filter(|tracker| !tracker.archived)
                .collect(),
        })
    }

    async fn sessions_in_scope(&self, scope: Option<TrackerId>) -> Result<Vec<Session>, StoreError> {
        match scope {
            Some(id) => self.store.read_sessions(id).await,
            None => self.store.read_all_sessions().await,
        }
    }

    async fn active_in_scope(
        &self,
        scope: Option<TrackerId>,
    ) -> Result<Vec<ActiveSession>, StoreError> {
        let active = self.store.load_active().await?;
        Ok(match scope {
            Some(id) => active.get(&id).cloned().into_iter().collect(),
            None => active.into_values().collect(),
        })
    }
}

/// Result of [`TrackerEngine::stop_all`]. Sessions that could not be stopped
/// stay active and are reported alongside the ones that were.
#[derive(Debug, Default)]
pub struct StopAllOutcome {
    pub stopped: Vec<Session>,
    pub failed: Vec<(TrackerId, EngineError)>,
}

/// The slice of the engine the idle monitor needs: observing and force-ending
/// sessions. Kept narrow so the monitor can be driven by a test double.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionControl: Send + Sync {
    async fn active_sessions(&self) -> EngineResult<BTreeMap<TrackerId, ActiveSession>>;

    async fn stop_all(&self) -> EngineResult<StopAllOutcome>;
}

#[async_trait]
impl SessionControl for TrackerEngine {
    async fn active_sessions(&self) -> EngineResult<BTreeMap<TrackerId, ActiveSession>> {
        TrackerEngine::active_sessions(self).await
    }

    async fn stop_all(&self) -> EngineResult<StopAllOutcome> {
        TrackerEngine::stop_all(self).await
    }
}

fn validate_new(new: &NewTracker) -> EngineResult<()> {
    if new.name.trim().is_empty() {
        return Err(EngineError::validation("tracker name must not be empty"));
    }
    if !new.target_hours.is_finite() || new.target_hours < 0. {
        return Err(EngineError::validation(
            "target hours must be a non-negative number",
        ));
    }
    Ok(())
}

fn validate_patch(patch: &TrackerPatch) -> EngineResult<()> {
    if let Some(name) = &patch.name {
        if name.trim().is_empty() {
            return Err(EngineError::validation("tracker name must not be empty"));
        }
        if name.chars().count() > MAX_NAME_CHARS {
            return Err(EngineError::validation(format!(
                "tracker name is limited to {MAX_NAME_CHARS} characters"
            )));
        }
    }
    if let Some(target_hours) = patch.target_hours {
        if !(0.5..=24.).contains(&target_hours) {
            return Err(EngineError::validation(
                "target hours must be between 0.5 and 24",
            ));
        }
    }
    if let Some(description) = &patch.description {
        if description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(EngineError::validation(format!(
                "description is limited to {MAX_DESCRIPTION_CHARS} characters"
            )));
        }
    }
    Ok(())
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description.filter(|text| !text.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use tempfile::TempDir;

    use crate::{stats::TrackerStatus, utils::clock::ManualClock};

    use super::*;

    fn monday_morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap()
    }

    fn new_tracker(name: &str) -> NewTracker {
        NewTracker {
            name: name.into(),
            target_hours: 4.,
            work_days: None,
            description: None,
        }
    }

    fn test_engine(start: DateTime<Utc>) -> (TempDir, ManualClock, TrackerEngine) {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(start);
        let store = StoreDir::new(dir.path().to_path_buf()).unwrap();
        let engine = TrackerEngine::with_clock(store, Box::new(clock.clone()));
        (dir, clock, engine)
    }

    #[tokio::test]
    async fn creating_assigns_ids_and_defaults() {
        let (_dir, _clock, engine) = test_engine(monday_morning());

        let first = engine.create_tracker(new_tracker("writing")).await.unwrap();
        let second = engine.create_tracker(new_tracker("review")).await.unwrap();

        assert_eq!(first.id, TrackerId(1));
        assert_eq!(second.id, TrackerId(2));
        assert_eq!(first.work_days, WorkDays::weekdays());
        assert!(!first.archived);
        assert_eq!(first.created_at, monday_morning());
        assert_eq!(
            engine
                .list_trackers(false)
                .await
                .unwrap()
                .iter()
                .map(|tracker| tracker.name.as_str())
                .collect::<Vec<_>>(),
            vec!["writing", "review"]
        );
    }

    #[tokio::test]
    async fn creating_validates_name_and_target() {
        let (_dir, _clock, engine) = test_engine(monday_morning());

        let empty = engine.create_tracker(new_tracker("   ")).await;
        assert!(matches!(empty, Err(EngineError::Validation(_))));

        let negative = engine
            .create_tracker(NewTracker {
                target_hours: -1.,
                ..new_tracker("writing")
            })
            .await;
        assert!(matches!(negative, Err(EngineError::Validation(_))));

        // Zero-target trackers only record time, they are legal.
        assert!(engine
            .create_tracker(NewTracker {
                target_hours: 0.,
                ..new_tracker("reading")
            })
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn updating_patches_only_given_fields() {
        let (_dir, clock, engine) = test_engine(monday_morning());
        let tracker = engine
            .create_tracker(NewTracker {
                description: Some("longhand drafts".into()),
                ..new_tracker("writing")
            })
            .await
            .unwrap();

        clock.advance(TimeDelta::hours(1));
        let updated = engine
            .update_tracker(
                tracker.id,
                TrackerPatch {
                    target_hours: Some(6.),
                    description: Some("".into()),
                    ..TrackerPatch::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "writing");
        assert_eq!(updated.target_hours, 6.);
        // An empty description clears the stored one.
        assert_eq!(updated.description, None);
        assert_eq!(updated.created_at, tracker.created_at);
        assert_eq!(updated.updated_at, tracker.created_at + TimeDelta::hours(1));
    }

    #[tokio::test]
    async fn update_validation_is_stricter_than_create() {
        let (_dir, _clock, engine) = test_engine(monday_morning());
        let tracker = engine.create_tracker(new_tracker("writing")).await.unwrap();

        for patch in [
            TrackerPatch {
                target_hours: Some(0.4),
                ..TrackerPatch::default()
            },
            TrackerPatch {
                target_hours: Some(24.5),
                ..TrackerPatch::default()
            },
            TrackerPatch {
                name: Some("x".repeat(101)),
                ..TrackerPatch::default()
            },
            TrackerPatch {
                description: Some("y".repeat(501)),
                ..TrackerPatch::default()
            },
        ] {
            let result = engine.update_tracker(tracker.id, patch).await;
            assert!(matches!(result, Err(EngineError::Validation(_))));
        }

        let missing = engine
            .update_tracker(TrackerId(99), TrackerPatch::default())
            .await;
        assert!(matches!(missing, Err(EngineError::TrackerNotFound(_))));
    }

    #[tokio::test]
    async fn starting_twice_conflicts_and_keeps_the_first_session() {
        let (_dir, clock, engine) = test_engine(monday_morning());
        let tracker = engine.create_tracker(new_tracker("writing")).await.unwrap();

        let first = engine.start_session(tracker.id).await.unwrap();
        clock.advance(TimeDelta::minutes(5));
        let second = engine.start_session(tracker.id).await;

        assert!(matches!(second, Err(EngineError::AlreadyRunning(_))));
        assert_eq!(second.unwrap_err().class(), ErrorClass::Conflict);

        let active = engine.active_sessions().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[&tracker.id].start_time, first.start_time);

        // Stopping clears the slot, so the tracker is startable again.
        engine.stop_session(tracker.id).await.unwrap();
        engine.start_session(tracker.id).await.unwrap();
    }

    #[tokio::test]
    async fn starting_needs_a_live_tracker() {
        let (_dir, _clock, engine) = test_engine(monday_morning());
        let tracker = engine.create_tracker(new_tracker("writing")).await.unwrap();

        let missing = engine.start_session(TrackerId(99)).await;
        assert!(matches!(missing, Err(EngineError::TrackerNotFound(_))));

        engine.archive_tracker(tracker.id).await.unwrap();
        let archived = engine.start_session(tracker.id).await;
        assert!(matches!(archived, Err(EngineError::Archived(_))));
        assert_eq!(archived.unwrap_err().class(), ErrorClass::Conflict);
    }

    #[tokio::test]
    async fn stopping_records_whole_minutes() {
        let (_dir, clock, engine) = test_engine(monday_morning());
        let tracker = engine.create_tracker(new_tracker("writing")).await.unwrap();

        engine.start_session(tracker.id).await.unwrap();
        clock.advance(TimeDelta::seconds(95 * 60 + 30));
        let session = engine.stop_session(tracker.id).await.unwrap();

        assert_eq!(session.duration_minutes, 95);
        assert_eq!(session.start_time, monday_morning());
        assert!(engine.active_sessions().await.unwrap().is_empty());

        let completed = engine.completed_sessions(tracker.id, None).await.unwrap();
        assert_eq!(completed, vec![session]);
    }

    #[tokio::test]
    async fn stopping_without_a_running_session_is_not_found() {
        let (_dir, _clock, engine) = test_engine(monday_morning());
        let tracker = engine.create_tracker(new_tracker("writing")).await.unwrap();

        let result = engine.stop_session(tracker.id).await;
        assert!(matches!(result, Err(EngineError::NoActiveSession(_))));
        assert_eq!(result.unwrap_err().class(), ErrorClass::NotFound);
    }

    #[tokio::test]
    async fn archiving_stops_the_running_session_and_is_idempotent() {
        let (_dir, clock, engine) = test_engine(monday_morning());
        let tracker = engine.create_tracker(new_tracker("writing")).await.unwrap();

        engine.start_session(tracker.id).await.unwrap();
        clock.advance(TimeDelta::minutes(30));
        let archived = engine.archive_tracker(tracker.id).await.unwrap();

        assert!(archived.archived);
        assert!(engine.active_sessions().await.unwrap().is_empty());
        let completed = engine.completed_sessions(tracker.id, None).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].duration_minutes, 30);

        clock.advance(TimeDelta::minutes(5));
        let again = engine.archive_tracker(tracker.id).await.unwrap();
        assert_eq!(again, archived);
        assert_eq!(
            engine
                .completed_sessions(tracker.id, None)
                .await
                .unwrap()
                .len(),
            1
        );

        engine.unarchive_tracker(tracker.id).await.unwrap();
        engine.start_session(tracker.id).await.unwrap();
    }

    #[tokio::test]
    async fn deleting_cascades_to_the_whole_ledger() {
        let (_dir, clock, engine) = test_engine(monday_morning());
        let writing = engine.create_tracker(new_tracker("writing")).await.unwrap();
        let review = engine.create_tracker(new_tracker("review")).await.unwrap();

        engine.start_session(writing.id).await.unwrap();
        clock.advance(TimeDelta::minutes(10));
        engine.stop_session(writing.id).await.unwrap();
        engine.start_session(writing.id).await.unwrap();

        engine.delete_tracker(writing.id).await.unwrap();

        assert!(engine.active_sessions().await.unwrap().is_empty());
        assert!(engine
            .completed_sessions(writing.id, None)
            .await
            .unwrap()
            .is_empty());
        assert!(!engine.store().session_path(writing.id).exists());
        assert_eq!(
            engine
                .list_trackers(true)
                .await
                .unwrap()
                .iter()
                .map(|tracker| tracker.id)
                .collect::<Vec<_>>(),
            vec![review.id]
        );

        let again = engine.delete_tracker(writing.id).await;
        assert!(matches!(again, Err(EngineError::TrackerNotFound(_))));
    }

    #[tokio::test]
    async fn stop_all_ends_every_running_session() {
        let (_dir, clock, engine) = test_engine(monday_morning());
        let writing = engine.create_tracker(new_tracker("writing")).await.unwrap();
        let review = engine.create_tracker(new_tracker("review")).await.unwrap();

        engine.start_session(writing.id).await.unwrap();
        engine.start_session(review.id).await.unwrap();
        clock.advance(TimeDelta::minutes(20));

        let outcome = engine.stop_all().await.unwrap();
        assert_eq!(outcome.stopped.len(), 2);
        assert!(outcome.failed.is_empty());
        assert!(engine.active_sessions().await.unwrap().is_empty());
        assert_eq!(
            engine
                .completed_sessions(review.id, None)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn stop_all_isolates_failures_per_session() {
        let (_dir, clock, engine) = test_engine(monday_morning());
        let writing = engine.create_tracker(new_tracker("writing")).await.unwrap();
        engine.start_session(writing.id).await.unwrap();

        // An entry for a tracker that no longer exists, as a tampered store
        // would leave behind.
        let mut active = engine.store().load_active().await.unwrap();
        active.insert(
            TrackerId(99),
            ActiveSession {
                tracker_id: TrackerId(99),
                start_time: monday_morning(),
            },
        );
        engine.store().save_active(&active).await.unwrap();

        clock.advance(TimeDelta::minutes(15));
        let outcome = engine.stop_all().await.unwrap();

        assert_eq!(outcome.stopped.len(), 1);
        assert_eq!(outcome.stopped[0].tracker_id, writing.id);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, TrackerId(99));
        assert!(matches!(
            outcome.failed[0].1,
            EngineError::TrackerNotFound(_)
        ));

        // The failed entry stays active for a later retry.
        let remaining = engine.active_sessions().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining.contains_key(&TrackerId(99)));
    }

    #[tokio::test]
    async fn completed_sessions_narrow_to_local_dates() {
        let (_dir, clock, engine) = test_engine(monday_morning());
        let tracker = engine.create_tracker(new_tracker("writing")).await.unwrap();

        engine.start_session(tracker.id).await.unwrap();
        clock.advance(TimeDelta::minutes(60));
        engine.stop_session(tracker.id).await.unwrap();

        clock.advance(TimeDelta::days(3));
        engine.start_session(tracker.id).await.unwrap();
        clock.advance(TimeDelta::minutes(30));
        let later = engine.stop_session(tracker.id).await.unwrap();

        let day = stats::session_date(later.start_time, &Local);
        let range = DateRange::single(day);
        let narrowed = engine
            .completed_sessions(tracker.id, Some(&range))
            .await
            .unwrap();
        assert_eq!(narrowed, vec![later]);
    }

    #[tokio::test]
    async fn state_survives_reopening_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(monday_morning());
        let id = {
            let store = StoreDir::new(dir.path().to_path_buf()).unwrap();
            let engine = TrackerEngine::with_clock(store, Box::new(clock.clone()));
            let tracker = engine.create_tracker(new_tracker("writing")).await.unwrap();
            engine.start_session(tracker.id).await.unwrap();
            clock.advance(TimeDelta::minutes(45));
            engine.stop_session(tracker.id).await.unwrap();
            engine.start_session(tracker.id).await.unwrap();
            tracker.id
        };

        let store = StoreDir::new(dir.path().to_path_buf()).unwrap();
        let engine = TrackerEngine::with_clock(store, Box::new(clock.clone()));
        assert_eq!(engine.list_trackers(false).await.unwrap().len(), 1);
        let completed = engine.completed_sessions(id, None).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].duration_minutes, 45);
        assert!(engine.active_sessions().await.unwrap().contains_key(&id));
    }

    #[tokio::test]
    async fn live_accounting_sees_the_running_session() {
        let (_dir, clock, engine) = test_engine(monday_morning());
        let tracker = engine.create_tracker(new_tracker("writing")).await.unwrap();

        engine.start_session(tracker.id).await.unwrap();
        clock.advance(TimeDelta::minutes(30));

        let today = engine.today_stats(Some(tracker.id)).await.unwrap();
        assert_eq!(today.hours_worked, 0.5);
        assert_eq!(today.session_count, 1);
        assert_eq!(today.status, TrackerStatus::InProgress);

        let day = stats::session_date(monday_morning(), &Local);
        let range = DateRange::single(day);
        let live = engine
            .total_hours(Some(tracker.id), &range, true)
            .await
            .unwrap();
        assert_eq!(live, 0.5);
        let settled = engine
            .total_hours(Some(tracker.id), &range, false)
            .await
            .unwrap();
        assert_eq!(settled, 0.);
    }

    #[tokio::test]
    async fn today_stats_for_unknown_tracker_is_not_found() {
        let (_dir, _clock, engine) = test_engine(monday_morning());
        let result = engine.today_stats(Some(TrackerId(4))).await;
        assert!(matches!(result, Err(EngineError::TrackerNotFound(_))));
    }
}
