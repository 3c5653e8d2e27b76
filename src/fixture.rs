use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Score {
    pub home: u32,
    pub away: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Score {
    pub fn new(home: u32, away: u32) -> Self {
        Self { home, away }
    }

    pub fn outcome(&self) -> Outcome {
        if self.home > self.away {
            Outcome::Home
        } else if self.home < self.away {
            Outcome::Away
        } else {
            Outcome::Draw
        }
    }

    /// The canonical scoreline used by the win/draw/loss generators.
    pub fn from_outcome(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Home => Self::new(1, 0),
            Outcome::Draw => Self::new(0, 0),
            Outcome::Away => Self::new(0, 1),
        }
    }
}

impl FromStr for Score {
    type Err = ForecastError;

    /// Parses `"2 x 1"`; spacing around the separator is optional.
    fn from_str(raw: &str) -> Result<Self> {
        let malformed = || ForecastError::MalformedResult(raw.to_string());
        let (home, away) = raw
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(malformed)?;
        let home = home.trim().parse::<u32>().map_err(|_| malformed())?;
        let away = away.trim().parse::<u32>().map_err(|_| malformed())?;
        Ok(Self { home, away })
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x {}", self.home, self.away)
    }
}

/// One league match. Fit-set fixtures carry the real result; the orchestrator only ever
/// writes simulated scores into its own per-trial buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct Fixture {
    pub home: String,
    pub away: String,
    pub score: Score,
    pub round: u32,
    pub year: i32,
    pub date: NaiveDate,
}

impl Fixture {
    pub fn new(
        home: impl Into<String>,
        away: impl Into<String>,
        score: Score,
        round: u32,
        year: i32,
        date: NaiveDate,
    ) -> Self {
        Self {
            home: home.into(),
            away: away.into(),
            score,
            round,
            year,
            date,
        }
    }
}
