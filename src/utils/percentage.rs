use std::{fmt::Display, ops::Deref, str::FromStr};

use anyhow::anyhow;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Percentage(f64);

impl Display for Percentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl Percentage {
    pub fn new_opt(value: f64) -> Option<Percentage> {
        if value < 0. {
            None
        } else {
            Some(Percentage(value))
        }
    }

    /// Share of `whole` taken by `part`, in percent. `None` when the whole is
    /// empty and no meaningful share exists.
    pub fn of_minutes(part: i64, whole: i64) -> Option<Percentage> {
        if whole <= 0 {
            return None;
        }
        Percentage::new_opt(part as f64 / whole as f64 * 100.)
    }
}

impl FromStr for Percentage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // This means that 100%% also works, but I think I'm fine with that
        let s = s.trim_end_matches("%");
        let v = s.parse::<f64>()?;
        Percentage::new_opt(v).ok_or_else(|| anyhow!("Can't parse {s} into percentage"))
    }
}

impl Deref for Percentage {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_and_without_sign() {
        assert_eq!(*"12.5%".parse::<Percentage>().unwrap(), 12.5);
        assert_eq!(*"40".parse::<Percentage>().unwrap(), 40.);
        assert!("-3".parse::<Percentage>().is_err());
    }

    #[test]
    fn share_of_empty_whole_is_none() {
        assert_eq!(Percentage::of_minutes(30, 0), None);
        assert_eq!(*Percentage::of_minutes(30, 120).unwrap(), 25.);
    }
}
