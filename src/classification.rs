use std::cmp::Ordering;
use std::collections::HashMap;

use crate::fixture::Score;

/// A result fed to the standings table, borrowed so simulated trials do not clone names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayedMatch<'a> {
    pub home: &'a str,
    pub away: &'a str,
    pub score: Score,
}

/// Ranks clubs from a set of results. Implementations must be deterministic for a fixed
/// input; the orchestrator calls them from many threads at once.
pub trait Classifier: Sync {
    fn classify<'a>(&self, matches: &[PlayedMatch<'a>]) -> Vec<&'a str>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableRow {
    pub played: u32,
    pub points: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_for: u64,
    pub goals_against: u64,
}

impl TableRow {
    pub fn goal_difference(&self) -> i64 {
        self.goals_for as i64 - self.goals_against as i64
    }

    fn record(&mut self, scored: u32, conceded: u32) {
        self.played += 1;
        self.goals_for += u64::from(scored);
        self.goals_against += u64::from(conceded);
        match scored.cmp(&conceded) {
            Ordering::Greater => {
                self.wins += 1;
                self.points += 3;
            }
            Ordering::Equal => {
                self.draws += 1;
                self.points += 1;
            }
            Ordering::Less => self.losses += 1,
        }
    }
}

/// Three points for a win, one for a draw; ties broken by wins, goal difference, goals
/// scored and finally club name.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardClassifier;

impl StandardClassifier {
    pub fn table<'a>(&self, matches: &[PlayedMatch<'a>]) -> Vec<(&'a str, TableRow)> {
        let mut rows: HashMap<&'a str, TableRow> = HashMap::new();
        for m in matches {
            rows.entry(m.home)
                .or_default()
                .record(m.score.home, m.score.away);
            rows.entry(m.away)
                .or_default()
                .record(m.score.away, m.score.home);
        }
        let mut table: Vec<(&'a str, TableRow)> = rows.into_iter().collect();
        table.sort_by(|(name_a, a), (name_b, b)| {
            b.points
                .cmp(&a.points)
                .then(b.wins.cmp(&a.wins))
                .then(b.goal_difference().cmp(&a.goal_difference()))
                .then(b.goals_for.cmp(&a.goals_for))
                .then(name_a.cmp(name_b))
        });
        table
    }
}

impl Classifier for StandardClassifier {
    fn classify<'a>(&self, matches: &[PlayedMatch<'a>]) -> Vec<&'a str> {
        self.table(matches).into_iter().map(|(name, _)| name).collect()
    }
}
