use std::{fmt::Display, str::FromStr};

use anyhow::anyhow;
use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::utils::time::{weekday_index, whole_minutes};

/// Identifier of a tracker. Assigned once by the store and never reused while
/// the tracker exists, referenced by every ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackerId(pub u64);

impl Display for TrackerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TrackerId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TrackerId(s.parse()?))
    }
}

#[derive(Debug, Error)]
#[error("invalid work day index {0}, expected 0 (Sunday) through 6 (Saturday)")]
pub struct InvalidWorkDay(pub u8);

/// Set of week days a tracker expects work on, stored as a bitmask over indices
/// 0 (Sunday) through 6 (Saturday). Serialized as the sorted index list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkDays(u8);

impl WorkDays {
    pub const EMPTY: WorkDays = WorkDays(0);

    /// Monday through Friday, the default for new trackers.
    pub fn weekdays() -> WorkDays {
        WorkDays(0b0011_1110)
    }

    pub fn from_indices(indices: impl IntoIterator<Item = u8>) -> Result<WorkDays, InvalidWorkDay> {
        let mut mask = 0u8;
        for index in indices {
            if index > 6 {
                return Err(InvalidWorkDay(index));
            }
            mask |= 1 << index;
        }
        Ok(WorkDays(mask))
    }

    pub fn indices(&self) -> Vec<u8> {
        (0..7).filter(|i| self.0 & (1 << i) != 0).collect()
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << weekday_index(day)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }
}

impl Display for WorkDays {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for index in self.indices() {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{index}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for WorkDays {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(WorkDays::EMPTY);
        }
        let indices = s
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<u8>()
                    .map_err(|_| anyhow!("Can't parse {part:?} into a work day index"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(WorkDays::from_indices(indices)?)
    }
}

impl Serialize for WorkDays {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.indices())
    }
}

impl<'de> Deserialize<'de> for WorkDays {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let indices = Vec::<u8>::deserialize(deserializer)?;
        WorkDays::from_indices(indices).map_err(serde::de::Error::custom)
    }
}

/// A tracked activity with a per-day hour target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tracker {
    pub id: TrackerId,
    pub name: String,
    /// Hours expected on each work day. Zero means the tracker only records
    /// time and is never behind.
    pub target_hours: f64,
    pub work_days: WorkDays,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a tracker. Missing work days default to Monday-Friday.
#[derive(Debug, Clone, Default)]
pub struct NewTracker {
    pub name: String,
    pub target_hours: f64,
    pub work_days: Option<WorkDays>,
    pub description: Option<String>,
}

/// Partial update of a tracker. `None` fields are left untouched; an empty
/// description string clears the description.
#[derive(Debug, Clone, Default)]
pub struct TrackerPatch {
    pub name: Option<String>,
    pub target_hours: Option<f64>,
    pub work_days: Option<WorkDays>,
    pub description: Option<String>,
}

/// A finished stretch of work, appended to the ledger when a session stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub tracker_id: TrackerId,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub end_time: DateTime<Utc>,
    /// Whole minutes between start and end, truncated.
    pub duration_minutes: i64,
}

impl Session {
    /// Closes an active session at `end_time`. A wall clock stepping backwards
    /// could produce an end before the recorded start; the end is clamped so
    /// durations stay non-negative.
    pub fn close(active: &ActiveSession, end_time: DateTime<Utc>) -> Session {
        let end_time = end_time.max(active.start_time);
        Session {
            tracker_id: active.tracker_id,
            start_time: active.start_time,
            end_time,
            duration_minutes: whole_minutes(active.start_time, end_time),
        }
    }

    pub fn duration(&self) -> chrono::TimeDelta {
        self.end_time - self.start_time
    }
}

/// A running session. At most one exists per tracker at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub tracker_id: TrackerId,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start_time: DateTime<Utc>,
}
