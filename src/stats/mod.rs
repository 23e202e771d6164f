//! Accounting over the session ledger. Everything here is a pure function of
//! the sessions, trackers and clock readings passed in; persistence and
//! locking stay in the engine. Sessions are bucketed by the calendar date of
//! their start in the caller's timezone and are never split across midnight.

pub mod debt;
pub mod report;

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use clap::ValueEnum;
use now::DateTimeNow;
use serde::{Deserialize, Serialize};

use crate::store::entities::{ActiveSession, Session};

pub use debt::{TodayStats, TrackerStatus, WorkStats, today_stats, work_stats};
pub use report::{TrackerShare, TrendPoint, productivity_trend, task_distribution};

/// Inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new_opt(start: NaiveDate, end: NaiveDate) -> Option<DateRange> {
        if start > end {
            None
        } else {
            Some(DateRange { start, end })
        }
    }

    pub fn single(date: NaiveDate) -> DateRange {
        DateRange {
            start: date,
            end: date,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |date| *date <= end)
    }
}

/// Named spans the interface offers, each resolved against "now" into an
/// inclusive range ending today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RangeKind {
    Day,
    Week,
    Month,
    Year,
}

impl RangeKind {
    pub fn resolve<Tz: TimeZone>(self, now: DateTime<Tz>) -> DateRange {
        let today = now.date_naive();
        let start = match self {
            RangeKind::Day => today,
            RangeKind::Week => now.beginning_of_week().date_naive(),
            RangeKind::Month => now.beginning_of_month().date_naive(),
            RangeKind::Year => now.beginning_of_year().date_naive(),
        };
        DateRange {
            start,
            end: today,
        }
    }
}

/// The calendar date a session is attributed to: the date of its start in
/// `tz`. The whole duration lands on that date, even when the session runs
/// past midnight.
pub fn session_date<Tz: TimeZone>(start: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    start.with_timezone(tz).date_naive()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub total_minutes: i64,
    pub session_count: usize,
}

/// Per-date minutes over `range`, one entry per date, zero-filled where
/// nothing was logged.
pub fn daily_totals<Tz: TimeZone>(
    sessions: &[Session],
    range: &DateRange,
    tz: &Tz,
) -> Vec<DailyTotal> {
    daily_totals_live(sessions, &[], DateTime::<Utc>::MIN_UTC, range, tz)
}

/// Like [`daily_totals`], with running sessions counted up to `now` on the
/// date they started.
pub fn daily_totals_live<Tz: TimeZone>(
    sessions: &[Session],
    active: &[ActiveSession],
    now: DateTime<Utc>,
    range: &DateRange,
    tz: &Tz,
) -> Vec<DailyTotal> {
    let mut by_date: BTreeMap<NaiveDate, DailyTotal> = range
        .days()
        .map(|date| {
            (
                date,
                DailyTotal {
                    date,
                    total_minutes: 0,
                    session_count: 0,
                },
            )
        })
        .collect();

    for session in sessions {
        if let Some(total) = by_date.get_mut(&session_date(session.start_time, tz)) {
            total.total_minutes += session.duration_minutes;
            total.session_count += 1;
        }
    }
    for session in active {
        if let Some(total) = by_date.get_mut(&session_date(session.start_time, tz)) {
            total.total_minutes += (now.max(session.start_time) - session.start_time).num_minutes();
            total.session_count += 1;
        }
    }

    by_date.into_values().collect()
}

pub fn total_minutes(totals: &[DailyTotal]) -> i64 {
    totals.iter().map(|total| total.total_minutes).sum()
}

/// Weekday-aware daily target across `trackers`, in hours, for one date.
pub fn target_for_date(trackers: &[crate::store::entities::Tracker], date: NaiveDate) -> f64 {
    trackers
        .iter()
        .filter(|tracker| tracker.work_days.contains(date.weekday()))
        .map(|tracker| tracker.target_hours)
        .sum()
}

pub fn round2(value: f64) -> f64 {
    (value * 100.).round() / 100.
}

pub fn round1(value: f64) -> f64 {
    (value * 10.).round() / 10.
}
