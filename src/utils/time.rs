use chrono::{DateTime, Utc, Weekday};

/// Days of the week are numbered 0 (Sunday) through 6 (Saturday) everywhere a
/// work-day list is stored or parsed.
pub fn weekday_index(day: Weekday) -> u8 {
    day.num_days_from_sunday() as u8
}

/// Whole minutes between two timestamps, truncated toward zero.
pub fn whole_minutes(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_minutes()
}
