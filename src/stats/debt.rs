//! Debt and advance accounting: how far behind or ahead of the configured
//! daily targets a tracker is, plus the "today" summary shown on every
//! surface.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::store::entities::{ActiveSession, Session, Tracker};

use super::{DailyTotal, DateRange, daily_totals, daily_totals_live, round2, target_for_date, total_minutes};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkStats {
    pub total_worked_hours: f64,
    pub target_hours: f64,
    /// Work days of the tracker inside the queried range.
    pub work_days: u32,
    pub work_debt: f64,
    pub work_advance: f64,
    pub daily: Vec<DailyTotal>,
}

/// Target-versus-worked accounting for one tracker over a date range.
///
/// The target counts only the tracker's designated work days inside the
/// range; hours logged on off days still count toward the total. Exactly one
/// of debt and advance is positive, both are rounded to two decimals.
pub fn work_stats<Tz: TimeZone>(
    tracker: &Tracker,
    sessions: &[Session],
    range: &DateRange,
    tz: &Tz,
) -> WorkStats {
    let daily = daily_totals(sessions, range, tz);
    let total_worked_hours = total_minutes(&daily) as f64 / 60.;

    let work_days = range
        .days()
        .filter(|date| tracker.work_days.contains(date.weekday()))
        .count() as u32;
    let target_hours = work_days as f64 * tracker.target_hours;

    let difference = target_hours - total_worked_hours;
    let (work_debt, work_advance) = if difference > 0. {
        (difference, 0.)
    } else {
        (0., -difference)
    };

    WorkStats {
        total_worked_hours: round2(total_worked_hours),
        target_hours: round2(target_hours),
        work_days,
        work_debt: round2(work_debt),
        work_advance: round2(work_advance),
        daily,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TodayStats {
    pub date: NaiveDate,
    pub hours_worked: f64,
    pub target_hours: f64,
    /// Worked share of today's target. Overworking pushes it past 100; zero
    /// when today has no target.
    pub progress_percentage: u32,
    pub is_working_day: bool,
    pub remaining_hours: f64,
    pub session_count: usize,
    pub status: TrackerStatus,
}

/// Today's progress against the combined daily target of `trackers`.
/// Running sessions count up to `now`. A target of zero means there is
/// nothing left to do, so such a day reads completed once queried.
pub fn today_stats<Tz: TimeZone>(
    trackers: &[Tracker],
    sessions: &[Session],
    active: &[ActiveSession],
    now: DateTime<Utc>,
    tz: &Tz,
) -> TodayStats {
    let date = now.with_timezone(tz).date_naive();
    let range = DateRange::single(date);
    let today = daily_totals_live(sessions, active, now, &range, tz)
        .pop()
        .unwrap_or(DailyTotal {
            date,
            total_minutes: 0,
            session_count: 0,
        });

    let hours_worked = today.total_minutes as f64 / 60.;
    let target_hours = target_for_date(trackers, date);
    let is_working_day = trackers
        .iter()
        .any(|tracker| tracker.work_days.contains(date.weekday()));

    let progress_percentage = if target_hours > 0. {
        (hours_worked / target_hours * 100.).round() as u32
    } else {
        0
    };
    let status = if hours_worked >= target_hours {
        TrackerStatus::Completed
    } else if hours_worked > 0. {
        TrackerStatus::InProgress
    } else {
        TrackerStatus::NotStarted
    };

    TodayStats {
        date,
        hours_worked: round2(hours_worked),
        target_hours: round2(target_hours),
        progress_percentage,
        is_working_day,
        remaining_hours: round2((target_hours - hours_worked).max(0.)),
        session_count: today.session_count,
        status,
    }
}
