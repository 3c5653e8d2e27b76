use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Per-club finishing counts for one round cutoff. `counts[p - 1]` is the number of trials
/// that ended with the club in position `p`.
pub type PositionCounts = BTreeMap<String, Vec<u64>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseTimings {
    /// Seconds spent fitting the model.
    pub training: f64,
    /// Seconds spent running every trial and tallying positions.
    pub simulation: f64,
}

/// Outcome of one `(model, year, round)` run, merged by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundReport {
    pub year: i32,
    pub round: u32,
    pub n_sims: u64,
    pub fit_matches: usize,
    pub simulated_matches: usize,
    pub converged: Option<bool>,
    /// Whether the fit started from the previous round's strengths; `None` for models
    /// without fitted strengths.
    pub warm_started: Option<bool>,
    pub positions: PositionCounts,
    pub timing: PhaseTimings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationTally {
    pub years: BTreeMap<i32, BTreeMap<u32, PositionCounts>>,
}

impl SimulationTally {
    pub fn round(&self, year: i32, round: u32) -> Option<&PositionCounts> {
        self.years.get(&year)?.get(&round)
    }

    pub fn count(&self, year: i32, round: u32, club: &str, position: usize) -> u64 {
        if position == 0 {
            return 0;
        }
        self.round(year, round)
            .and_then(|clubs| clubs.get(club))
            .and_then(|counts| counts.get(position - 1))
            .copied()
            .unwrap_or(0)
    }

    pub fn trials(&self, year: i32, round: u32, club: &str) -> u64 {
        self.round(year, round)
            .and_then(|clubs| clubs.get(club))
            .map(|counts| counts.iter().sum())
            .unwrap_or(0)
    }

    /// Share of trials ending in each position, 1st place first.
    pub fn probabilities(&self, year: i32, round: u32, club: &str) -> Option<Vec<f64>> {
        let counts = self.round(year, round)?.get(club)?;
        let total: u64 = counts.iter().sum();
        if total == 0 {
            return None;
        }
        Some(counts.iter().map(|c| *c as f64 / total as f64).collect())
    }

    pub fn expected_position(&self, year: i32, round: u32, club: &str) -> Option<f64> {
        let probs = self.probabilities(year, round, club)?;
        Some(
            probs
                .iter()
                .enumerate()
                .map(|(idx, p)| (idx + 1) as f64 * p)
                .sum(),
        )
    }

    fn add(&mut self, year: i32, round: u32, positions: PositionCounts) {
        let slot = self.years.entry(year).or_default().entry(round).or_default();
        for (club, counts) in positions {
            let acc = slot.entry(club).or_default();
            if acc.len() < counts.len() {
                acc.resize(counts.len(), 0);
            }
            for (a, c) in acc.iter_mut().zip(counts) {
                *a += c;
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingLog {
    pub years: BTreeMap<i32, BTreeMap<u32, PhaseTimings>>,
}

impl TimingLog {
    pub fn get(&self, year: i32, round: u32) -> Option<PhaseTimings> {
        self.years.get(&year)?.get(&round).copied()
    }

    fn add(&mut self, year: i32, round: u32, timing: PhaseTimings) {
        let slot = self.years.entry(year).or_default().entry(round).or_default();
        slot.training += timing.training;
        slot.simulation += timing.simulation;
    }
}

/// Accumulated output of a model run. Merging only ever adds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastResults {
    pub tally: SimulationTally,
    pub timings: TimingLog,
}

impl ForecastResults {
    pub fn merge(&mut self, report: RoundReport) {
        self.tally.add(report.year, report.round, report.positions);
        self.timings.add(report.year, report.round, report.timing);
    }
}
