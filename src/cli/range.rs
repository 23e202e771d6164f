use std::fmt::Display;

use anyhow::Result;
use chrono::Local;
use chrono_english::parse_date_string;
use clap::{CommandFactory, ValueEnum};

use crate::stats::{DateRange, RangeKind};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

/// Date-range flags shared by the reporting commands. Either a named
/// calendar range or free-form start/end dates; sessions are attributed to
/// whole local dates, so times inside the strings only pick the date.
#[derive(Debug, clap::Args)]
pub struct RangeArgs {
    #[arg(
        long,
        value_enum,
        conflicts_with_all = ["start_date", "end_date"],
        help = "Named range ending today. Repeats the last used one when nothing else is given"
    )]
    range: Option<RangeKind>,
    #[arg(
        long = "start",
        short,
        help = "Start of the range. Examples are \"yesterday\", \"last monday\", \"15/03/2025\""
    )]
    start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "End of the range, today when omitted. Same formats as --start"
    )]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
}

/// A resolved range plus the named kind it came from, when it came from one.
/// The kind is what gets remembered as the next default.
pub struct RangeSelection {
    pub range: DateRange,
    pub named: Option<RangeKind>,
}

impl RangeArgs {
    /// Also provides sensible defaults: explicit dates win, then `--range`,
    /// then `remembered`, then the current week.
    pub fn resolve(self, remembered: Option<RangeKind>) -> Result<RangeSelection> {
        let now = Local::now();
        if self.start_date.is_none() && self.end_date.is_none() {
            let kind = self.range.or(remembered).unwrap_or(RangeKind::Week);
            return Ok(RangeSelection {
                range: kind.resolve(now),
                named: Some(kind),
            });
        }

        let dialect: chrono_english::Dialect = self.date_style.into();
        let end = match self.end_date.map(|s| parse_date_string(&s, now, dialect)) {
            Some(Ok(v)) => v.with_timezone(&Local).date_naive(),
            Some(Err(e)) => {
                return Err(Args::command()
                    .error(
                        clap::error::ErrorKind::ValueValidation,
                        format!("Failed to validate end date {e}"),
                    )
                    .into());
            }
            None => now.date_naive(),
        };
        let start = match self.start_date.map(|s| parse_date_string(&s, now, dialect)) {
            Some(Ok(v)) => v.with_timezone(&Local).date_naive(),
            Some(Err(e)) => {
                return Err(Args::command()
                    .error(
                        clap::error::ErrorKind::ValueValidation,
                        format!("Failed to validate start date {e}"),
                    )
                    .into());
            }
            None => end,
        };
        let Some(range) = DateRange::new_opt(start, end) else {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Start date {start} is after end date {end}"),
                )
                .into());
        };
        Ok(RangeSelection { range, named: None })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, NaiveDate};

    use super::*;

    fn args(
        range: Option<RangeKind>,
        start: Option<&str>,
        end: Option<&str>,
    ) -> RangeArgs {
        RangeArgs {
            range,
            start_date: start.map(String::from),
            end_date: end.map(String::from),
            date_style: DateStyle::Uk,
        }
    }

    #[test]
    fn explicit_dates_form_an_inclusive_range() {
        let selection = args(None, Some("15/03/2025"), Some("18/03/2025"))
            .resolve(None)
            .unwrap();
        assert_eq!(
            selection.range.start(),
            NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()
        );
        assert_eq!(
            selection.range.end(),
            NaiveDate::from_ymd_opt(2025, 3, 18).unwrap()
        );
        assert_eq!(selection.named, None);
    }

    #[test]
    fn missing_start_collapses_to_the_end_date() {
        let selection = args(None, None, Some("15/03/2025")).resolve(None).unwrap();
        assert_eq!(selection.range.start(), selection.range.end());
    }

    #[test]
    fn us_style_swaps_day_and_month() {
        let mut args = args(None, Some("03/15/2025"), Some("03/15/2025"));
        args.date_style = DateStyle::Us;
        let selection = args.resolve(None).unwrap();
        assert_eq!(
            selection.range.start(),
            NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()
        );
    }

    #[test]
    fn backwards_dates_are_rejected() {
        assert!(
            args(None, Some("18/03/2025"), Some("15/03/2025"))
                .resolve(None)
                .is_err()
        );
    }

    #[test]
    fn garbage_dates_are_rejected() {
        assert!(
            args(None, Some("somewhen around spring"), None)
                .resolve(None)
                .is_err()
        );
    }

    #[test]
    fn named_range_beats_the_remembered_one() {
        let selection = args(Some(RangeKind::Day), None, None)
            .resolve(Some(RangeKind::Year))
            .unwrap();
        assert_eq!(selection.named, Some(RangeKind::Day));
        assert_eq!(selection.range.start(), selection.range.end());
    }

    #[test]
    fn remembered_range_fills_in_when_nothing_is_given() {
        let selection = args(None, None, None)
            .resolve(Some(RangeKind::Month))
            .unwrap();
        assert_eq!(selection.named, Some(RangeKind::Month));
        assert_eq!(selection.range.start().day(), 1);
        assert!(selection.range.contains(Local::now().date_naive()));
    }

    #[test]
    fn default_is_the_current_week() {
        let selection = args(None, None, None).resolve(None).unwrap();
        assert_eq!(selection.named, Some(RangeKind::Week));
        assert!(selection.range.contains(Local::now().date_naive()));
    }
}
