use std::collections::HashMap;

use crate::error::{ForecastError, Result};
use crate::fixture::Fixture;

pub const DEFAULT_SEASON_SIZE: usize = 20;

/// Ordered set of the clubs taking part in one season.
///
/// The order fixes the layout of the parameter vector: club `i` owns the `i`-th chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClubRegistry {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl ClubRegistry {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::default();
        for name in names {
            registry.insert(name.into());
        }
        registry
    }

    /// Registers clubs in order of first appearance (home before away) and fails as soon
    /// as a club beyond `season_size` shows up.
    pub fn from_fixtures(fixtures: &[Fixture], season_size: usize) -> Result<Self> {
        let mut registry = Self::default();
        for fixture in fixtures {
            for club in [&fixture.home, &fixture.away] {
                if registry.contains(club) {
                    continue;
                }
                if registry.len() == season_size {
                    return Err(ForecastError::SeasonSizeExceeded {
                        year: fixture.year,
                        limit: season_size,
                        club: club.clone(),
                    });
                }
                registry.insert(club.clone());
            }
        }
        Ok(registry)
    }

    fn insert(&mut self, name: String) {
        if self.index.contains_key(&name) {
            return;
        }
        self.index.insert(name.clone(), self.names.len());
        self.names.push(name);
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, club: &str) -> bool {
        self.index.contains_key(club)
    }

    pub fn index_of(&self, club: &str) -> Result<usize> {
        self.index
            .get(club)
            .copied()
            .ok_or_else(|| ForecastError::UnknownClub(club.to_string()))
    }

    pub fn name(&self, idx: usize) -> Option<&str> {
        self.names.get(idx).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::fixture::Score;

    fn fx(home: &str, away: &str) -> Fixture {
        let date = NaiveDate::from_ymd_opt(2020, 8, 1).unwrap();
        Fixture::new(home, away, Score::new(1, 0), 1, 2020, date)
    }

    #[test]
    fn first_appearance_order() {
        let fixtures = vec![fx("B", "A"), fx("C", "B"), fx("A", "D")];
        let registry = ClubRegistry::from_fixtures(&fixtures, 20).unwrap();
        assert_eq!(registry.names(), ["B", "A", "C", "D"]);
        assert_eq!(registry.index_of("C").unwrap(), 2);
    }

    #[test]
    fn exceeding_season_size_is_an_error() {
        let fixtures = vec![fx("A", "B"), fx("C", "D")];
        let err = ClubRegistry::from_fixtures(&fixtures, 3).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::SeasonSizeExceeded { limit: 3, ref club, .. } if club == "D"
        ));
    }

    #[test]
    fn unknown_club_lookup() {
        let registry = ClubRegistry::new(["A", "B"]);
        assert!(matches!(
            registry.index_of("Z"),
            Err(ForecastError::UnknownClub(ref c)) if c == "Z"
        ));
    }
}
