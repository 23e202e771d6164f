//! Reporting views derived from the ledger: a day-by-day productivity trend
//! and the split of logged time between trackers.

use std::collections::BTreeMap;

use chrono::{NaiveDate, TimeZone};
use serde::Serialize;

use crate::{
    store::entities::{Session, Tracker, TrackerId},
    utils::percentage::Percentage,
};

use super::{DateRange, daily_totals, round1, round2, session_date, target_for_date};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    /// Percent of that day's target met, 0 to 100, one decimal. Days without
    /// a target score zero.
    pub score: f64,
}

pub fn productivity_trend<Tz: TimeZone>(
    trackers: &[Tracker],
    sessions: &[Session],
    range: &DateRange,
    tz: &Tz,
) -> Vec<TrendPoint> {
    daily_totals(sessions, range, tz)
        .into_iter()
        .map(|day| {
            let target = target_for_date(trackers, day.date);
            let worked = day.total_minutes as f64 / 60.;
            let score = if target > 0. {
                (worked / target * 100.).min(100.)
            } else {
                0.
            };
            TrendPoint {
                date: day.date,
                score: round1(score),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerShare {
    pub tracker_id: TrackerId,
    pub name: String,
    pub minutes: i64,
    pub hours: f64,
    pub share: Percentage,
}

/// How the time logged inside `range` splits between trackers, largest share
/// first. Empty when nothing was logged.
pub fn task_distribution<Tz: TimeZone>(
    trackers: &[Tracker],
    sessions: &[Session],
    range: &DateRange,
    tz: &Tz,
) -> Vec<TrackerShare> {
    let mut minutes_by_tracker: BTreeMap<TrackerId, i64> = BTreeMap::new();
    for session in sessions {
        if range.contains(session_date(session.start_time, tz)) {
            *minutes_by_tracker.entry(session.tracker_id).or_default() +=
                session.duration_minutes;
        }
    }

    let total: i64 = minutes_by_tracker.values().sum();
    let mut shares: Vec<TrackerShare> = minutes_by_tracker
        .into_iter()
        .filter_map(|(tracker_id, minutes)| {
            let share = Percentage::of_minutes(minutes, total)?;
            let name = trackers
                .iter()
                .find(|tracker| tracker.id == tracker_id)
                .map(|tracker| tracker.name.clone())
                .unwrap_or_else(|| format!("tracker {tracker_id}"));
            Some(TrackerShare {
                tracker_id,
                name,
                minutes,
                hours: round2(minutes as f64 / 60.),
                share,
            })
        })
        .collect();

    shares.sort_by(|a, b| b.minutes.cmp(&a.minutes).then(a.tracker_id.cmp(&b.tracker_id)));
    shares
}
