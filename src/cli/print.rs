//! Terminal rendering of engine results. Everything prints tab-separated
//! lines; color is reserved for verdicts (debt, advance, status) so piped
//! output stays grep-friendly.

use std::collections::BTreeMap;

use ansi_term::Colour;
use chrono::{DateTime, Local, TimeDelta, Utc};

use crate::{
    engine::StopAllOutcome,
    settings::Settings,
    stats::{DailyTotal, TodayStats, TrackerShare, TrackerStatus, TrendPoint, WorkStats},
    store::entities::{ActiveSession, Session, Tracker, TrackerId, WorkDays},
    utils::percentage::Percentage,
};

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

pub fn format_minutes(minutes: i64) -> String {
    if minutes >= 60 {
        format!("{}h{}m", minutes / 60, minutes % 60)
    } else {
        format!("{minutes}m")
    }
}

pub fn format_work_days(days: WorkDays) -> String {
    if days.is_empty() {
        return "none".into();
    }
    days.indices()
        .iter()
        .map(|index| DAY_NAMES[*index as usize])
        .collect::<Vec<_>>()
        .join(",")
}

fn format_local(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%x %H:%M").to_string()
}

pub fn print_trackers(trackers: &[Tracker]) {
    for tracker in trackers {
        let mut line = format!(
            "{}\t{}\t{}h/day\t{}",
            tracker.id,
            tracker.name,
            tracker.target_hours,
            format_work_days(tracker.work_days),
        );
        if tracker.archived {
            line = format!("{line}\t{}", Colour::Yellow.paint("archived"));
        }
        if let Some(description) = &tracker.description {
            line = format!("{line}\t{description}");
        }
        println!("{line}");
    }
    if trackers.is_empty() {
        println!("No trackers yet. Create one with `stint add`.");
    }
}

pub fn print_active(active: &BTreeMap<TrackerId, ActiveSession>, trackers: &[Tracker]) {
    if active.is_empty() {
        println!("Nothing is running.");
        return;
    }
    let now = Utc::now();
    for session in active.values() {
        let elapsed = (now - session.start_time).max(TimeDelta::zero());
        println!(
            "{}\t{}\tsince {}\t{}",
            session.tracker_id,
            tracker_name(trackers, session.tracker_id),
            format_local(session.start_time),
            format_minutes(elapsed.num_minutes()),
        );
    }
}

pub fn print_sessions(sessions: &[Session]) {
    for session in sessions {
        println!(
            "{}\t{} - {}\t{}",
            session
                .start_time
                .with_timezone(&Local)
                .format("%x"),
            session.start_time.with_timezone(&Local).format("%H:%M"),
            session.end_time.with_timezone(&Local).format("%H:%M"),
            format_minutes(session.duration_minutes),
        );
    }
    if sessions.is_empty() {
        println!("No sessions in this range.");
    }
}

pub fn print_stopped(outcome: &StopAllOutcome) {
    for session in &outcome.stopped {
        println!(
            "Stopped tracker {} at {}",
            session.tracker_id,
            format_minutes(session.duration_minutes)
        );
    }
    for (id, error) in &outcome.failed {
        println!(
            "{} tracker {id}: {error}",
            Colour::Red.paint("Could not stop")
        );
    }
    if outcome.stopped.is_empty() && outcome.failed.is_empty() {
        println!("Nothing was running.");
    }
}

pub fn print_daily(totals: &[DailyTotal]) {
    for total in totals {
        println!(
            "{}\t{}\t{} {}",
            total.date.format("%x"),
            format_minutes(total.total_minutes),
            total.session_count,
            if total.session_count == 1 {
                "session"
            } else {
                "sessions"
            },
        );
    }
}

pub fn print_work_stats(stats: &WorkStats) {
    println!(
        "worked {}h of {}h across {} work days",
        stats.total_worked_hours, stats.target_hours, stats.work_days
    );
    if stats.work_debt > 0. {
        println!("{} {}h", Colour::Red.paint("behind by"), stats.work_debt);
    } else if stats.work_advance > 0. {
        println!("{} {}h", Colour::Green.paint("ahead by"), stats.work_advance);
    } else {
        println!("{}", Colour::Green.paint("exactly on target"));
    }
    print_daily(&stats.daily);
}

pub fn print_today(stats: &TodayStats) {
    let status = match stats.status {
        TrackerStatus::NotStarted => Colour::Yellow.paint("not started"),
        TrackerStatus::InProgress => Colour::Cyan.paint("in progress"),
        TrackerStatus::Completed => Colour::Green.paint("completed"),
    };
    let day_kind = if stats.is_working_day {
        "a work day"
    } else {
        "an off day"
    };
    println!("{}, {day_kind}\t{status}", stats.date.format("%x"));
    println!(
        "worked {}h of {}h ({}%)\tremaining {}h\t{} {}",
        stats.hours_worked,
        stats.target_hours,
        stats.progress_percentage,
        stats.remaining_hours,
        stats.session_count,
        if stats.session_count == 1 {
            "session"
        } else {
            "sessions"
        },
    );
}

pub fn print_trend(points: &[TrendPoint]) {
    for point in points {
        let bar = "#".repeat((point.score / 10.).round() as usize);
        println!("{}\t{:>5.1}\t{bar}", point.date.format("%x"), point.score);
    }
}

pub fn print_distribution(shares: &[TrackerShare], min_share: Percentage) {
    let shown: Vec<_> = shares
        .iter()
        .filter(|share| *share.share >= *min_share)
        .collect();
    for share in &shown {
        println!(
            "{}\t{}\t{}\t{:.1}%",
            share.tracker_id,
            share.name,
            format_minutes(share.minutes),
            *share.share,
        );
    }
    if shown.is_empty() {
        println!("Nothing logged in this range.");
    }
}

pub fn print_settings(settings: &Settings) {
    println!(
        "idle threshold\t{}s\nidle monitor\t{}\nauto stop\t{}\nauto stop after\t{}m",
        settings.idle_threshold_secs,
        on_off(settings.monitor_enabled),
        on_off(settings.auto_stop_enabled),
        settings.auto_stop_minutes,
    );
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

fn tracker_name(trackers: &[Tracker], id: TrackerId) -> String {
    trackers
        .iter()
        .find(|tracker| tracker.id == id)
        .map(|tracker| tracker.name.clone())
        .unwrap_or_else(|| format!("tracker {id}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_format_tiers() {
        assert_eq!(format_minutes(0), "0m");
        assert_eq!(format_minutes(59), "59m");
        assert_eq!(format_minutes(60), "1h0m");
        assert_eq!(format_minutes(135), "2h15m");
    }

    #[test]
    fn work_days_read_as_names() {
        assert_eq!(format_work_days(WorkDays::weekdays()), "Mon,Tue,Wed,Thu,Fri");
        assert_eq!(format_work_days(WorkDays::EMPTY), "none");
    }
}
