//! Stochastic match outcome generators.
//!
//! Every generator resolves a fixture into a [`FixtureSampler`] once (looking up clubs,
//! building the Poisson distributions) and the sampler then produces one independent
//! scoreline per call. Nothing is remembered between calls.

use std::collections::HashMap;

use rand::Rng;
use rand_distr::{Distribution, Poisson};
use serde::{Deserialize, Serialize};

use crate::codec::StrengthMap;
use crate::error::{ForecastError, Result};
use crate::fixture::{Outcome, Score};

/// Win/draw/loss shares seen from the home side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Retrospect {
    pub win: f64,
    pub draw: f64,
    pub loss: f64,
}

impl Retrospect {
    pub fn uniform() -> Self {
        Self {
            win: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            loss: 1.0 / 3.0,
        }
    }

    pub fn new(win: f64, draw: f64, loss: f64) -> Result<Self> {
        let shares = [win, draw, loss];
        let total: f64 = shares.iter().sum();
        if shares.iter().any(|p| !p.is_finite() || *p < 0.0) || (total - 1.0).abs() > 1e-6 {
            return Err(ForecastError::InvalidParameter(format!(
                "retrospect shares must be non-negative and sum to 1, got [{win}, {draw}, {loss}]"
            )));
        }
        Ok(Self { win, draw, loss })
    }

    /// Shares from raw counts; an empty record falls back to uniform thirds.
    pub fn from_counts(counts: [u32; 3]) -> Self {
        let total: u32 = counts.iter().sum();
        if total == 0 {
            return Self::uniform();
        }
        let n = total as f64;
        Self {
            win: counts[0] as f64 / n,
            draw: counts[1] as f64 / n,
            loss: counts[2] as f64 / n,
        }
    }

    pub fn average(&self, other: &Retrospect) -> Self {
        Self {
            win: (self.win + other.win) / 2.0,
            draw: (self.draw + other.draw) / 2.0,
            loss: (self.loss + other.loss) / 2.0,
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Outcome {
        let p: f64 = rng.gen_range(0.0..1.0);
        if p <= self.win {
            Outcome::Home
        } else if p <= self.win + self.draw {
            Outcome::Draw
        } else {
            Outcome::Away
        }
    }
}

/// A club's record split by the venue it played at, both from the home side's view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VenueRetrospect {
    pub home: Retrospect,
    pub away: Retrospect,
}

/// Rejection sampling loses precision far beyond any real scoring rate, so draws are capped.
const MAX_GOAL_RATE: f64 = 1.0e4;

#[derive(Debug, Clone, Copy)]
enum GoalDraw {
    Zero,
    Poisson(Poisson<f64>),
}

impl GoalDraw {
    fn new(rate: f64) -> Result<Self> {
        if rate == 0.0 {
            return Ok(GoalDraw::Zero);
        }
        if !rate.is_finite() || rate < 0.0 {
            return Err(ForecastError::InvalidParameter(format!(
                "goal rate must be finite and non-negative, got {rate}"
            )));
        }
        Poisson::new(rate.min(MAX_GOAL_RATE))
            .map(GoalDraw::Poisson)
            .map_err(|err| ForecastError::InvalidParameter(format!("poisson rate {rate}: {err}")))
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        match self {
            GoalDraw::Zero => 0,
            GoalDraw::Poisson(dist) => dist.sample(rng) as u32,
        }
    }
}

/// Pre-resolved sampling rule for one fixture.
#[derive(Debug, Clone, Copy)]
pub enum FixtureSampler {
    Outcome(Retrospect),
    Goals { home: GoalSampler, away: GoalSampler },
}

#[derive(Debug, Clone, Copy)]
pub struct GoalSampler {
    rate: f64,
    draw: GoalDraw,
}

impl GoalSampler {
    pub fn new(rate: f64) -> Result<Self> {
        Ok(Self {
            rate,
            draw: GoalDraw::new(rate)?,
        })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

impl FixtureSampler {
    pub fn goals(home_rate: f64, away_rate: f64) -> Result<Self> {
        Ok(FixtureSampler::Goals {
            home: GoalSampler::new(home_rate)?,
            away: GoalSampler::new(away_rate)?,
        })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Score {
        match self {
            FixtureSampler::Outcome(retrospect) => Score::from_outcome(retrospect.sample(rng)),
            FixtureSampler::Goals { home, away } => {
                Score::new(home.draw.sample(rng), away.draw.sample(rng))
            }
        }
    }
}

/// Shared capability of the outcome generators: turn pre-computed parameters into one
/// simulated result for a fixture.
pub trait OutcomeGenerator {
    fn prepare(&self, home: &str, away: &str) -> Result<FixtureSampler>;

    fn generate<R: Rng + ?Sized>(&self, home: &str, away: &str, rng: &mut R) -> Result<Score> {
        Ok(self.prepare(home, away)?.sample(rng))
    }
}

/// Home win, draw and away win each with probability 1/3.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveGenerator;

impl OutcomeGenerator for NaiveGenerator {
    fn prepare(&self, _home: &str, _away: &str) -> Result<FixtureSampler> {
        Ok(FixtureSampler::Outcome(Retrospect::uniform()))
    }
}

/// Every fixture follows one fixed retrospect.
#[derive(Debug, Clone, Copy)]
pub struct SemiNaiveGenerator {
    pub retrospect: Retrospect,
}

impl OutcomeGenerator for SemiNaiveGenerator {
    fn prepare(&self, _home: &str, _away: &str) -> Result<FixtureSampler> {
        Ok(FixtureSampler::Outcome(self.retrospect))
    }
}

/// Averages the home club's home record with the away club's away record.
#[derive(Debug, Clone, Default)]
pub struct ObserverGenerator {
    pub clubs: HashMap<String, VenueRetrospect>,
}

impl OutcomeGenerator for ObserverGenerator {
    fn prepare(&self, home: &str, away: &str) -> Result<FixtureSampler> {
        let h = self
            .clubs
            .get(home)
            .ok_or_else(|| ForecastError::UnknownClub(home.to_string()))?;
        let a = self
            .clubs
            .get(away)
            .ok_or_else(|| ForecastError::UnknownClub(away.to_string()))?;
        Ok(FixtureSampler::Outcome(h.home.average(&a.away)))
    }
}

/// Both sides score at half the league's mean goals per match.
#[derive(Debug, Clone, Copy)]
pub struct NeutralPoissonGenerator {
    pub goals_mean: f64,
}

impl OutcomeGenerator for NeutralPoissonGenerator {
    fn prepare(&self, _home: &str, _away: &str) -> Result<FixtureSampler> {
        FixtureSampler::goals(self.goals_mean / 2.0, self.goals_mean / 2.0)
    }
}

/// Separate league-wide means for the home and the away side.
#[derive(Debug, Clone, Copy)]
pub struct SplitPoissonGenerator {
    pub home_mean: f64,
    pub away_mean: f64,
}

impl OutcomeGenerator for SplitPoissonGenerator {
    fn prepare(&self, _home: &str, _away: &str) -> Result<FixtureSampler> {
        FixtureSampler::goals(self.home_mean, self.away_mean)
    }
}

/// Goals drawn at `attack / opposing defense`.
///
/// Whether venue-specific entries are used follows the strengths themselves: neutral
/// strengths give the non-venue rule, venue-split strengths (with or without decay)
/// select the home entry of the home club and the away entry of the away club.
#[derive(Debug, Clone)]
pub struct StrengthPoissonGenerator {
    pub strengths: StrengthMap,
}

impl StrengthPoissonGenerator {
    pub fn venue_aware(&self) -> bool {
        self.strengths.variant().venue_aware()
    }
}

impl OutcomeGenerator for StrengthPoissonGenerator {
    fn prepare(&self, home: &str, away: &str) -> Result<FixtureSampler> {
        let (home_rate, away_rate) = self.strengths.rates_for(home, away)?;
        FixtureSampler::goals(home_rate, away_rate)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::codec::CodecVariant;
    use crate::registry::ClubRegistry;

    const DRAWS: usize = 100_000;

    fn frequencies(sampler: &FixtureSampler, seed: u64) -> [f64; 3] {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut counts = [0usize; 3];
        for _ in 0..DRAWS {
            match sampler.sample(&mut rng).outcome() {
                Outcome::Home => counts[0] += 1,
                Outcome::Draw => counts[1] += 1,
                Outcome::Away => counts[2] += 1,
            }
        }
        counts.map(|c| c as f64 / DRAWS as f64)
    }

    #[test]
    fn semi_naive_frequencies_converge() {
        let generator = SemiNaiveGenerator {
            retrospect: Retrospect::new(0.5, 0.3, 0.2).unwrap(),
        };
        let sampler = generator.prepare("A", "B").unwrap();
        let [home, draw, away] = frequencies(&sampler, 7);
        assert!((home - 0.5).abs() < 0.01, "home {home}");
        assert!((draw - 0.3).abs() < 0.01, "draw {draw}");
        assert!((away - 0.2).abs() < 0.01, "away {away}");
    }

    #[test]
    fn naive_is_thirds() {
        let sampler = NaiveGenerator.prepare("A", "B").unwrap();
        for f in frequencies(&sampler, 11) {
            assert!((f - 1.0 / 3.0).abs() < 0.01);
        }
    }

    #[test]
    fn observer_averages_venue_records() {
        let mut clubs = HashMap::new();
        clubs.insert(
            "H".to_string(),
            VenueRetrospect {
                home: Retrospect::new(0.6, 0.2, 0.2).unwrap(),
                away: Retrospect::uniform(),
            },
        );
        clubs.insert(
            "A".to_string(),
            VenueRetrospect {
                home: Retrospect::uniform(),
                away: Retrospect::new(0.4, 0.4, 0.2).unwrap(),
            },
        );
        let generator = ObserverGenerator { clubs };
        let FixtureSampler::Outcome(p) = generator.prepare("H", "A").unwrap() else {
            panic!("observer should sample outcomes");
        };
        assert!((p.win - 0.5).abs() < 1e-12);
        assert!((p.draw - 0.3).abs() < 1e-12);
        assert!((p.loss - 0.2).abs() < 1e-12);

        assert!(matches!(
            generator.prepare("H", "Nobody"),
            Err(ForecastError::UnknownClub(_))
        ));
    }

    #[test]
    fn poisson_split_means_are_respected() {
        let generator = SplitPoissonGenerator {
            home_mean: 1.6,
            away_mean: 0.9,
        };
        let sampler = generator.prepare("A", "B").unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let (mut home, mut away) = (0u64, 0u64);
        for _ in 0..DRAWS {
            let s = sampler.sample(&mut rng);
            home += s.home as u64;
            away += s.away as u64;
        }
        assert!((home as f64 / DRAWS as f64 - 1.6).abs() < 0.03);
        assert!((away as f64 / DRAWS as f64 - 0.9).abs() < 0.03);
    }

    #[test]
    fn zero_mean_never_scores() {
        let sampler = NeutralPoissonGenerator { goals_mean: 0.0 }
            .prepare("A", "B")
            .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(sampler.sample(&mut rng), Score::new(0, 0));
        }
        assert!(
            NeutralPoissonGenerator { goals_mean: f64::NAN }
                .prepare("A", "B")
                .is_err()
        );
    }

    #[test]
    fn strength_generator_uses_ratio_rule() {
        let reg = ClubRegistry::new(["H", "A"]);
        let neutral =
            StrengthMap::decode(&[1.0, 0.5, 0.8, 2.0], &reg, CodecVariant::Neutral).unwrap();
        let generator = StrengthPoissonGenerator { strengths: neutral };
        assert!(!generator.venue_aware());
        let FixtureSampler::Goals { home, away } = generator.prepare("H", "A").unwrap() else {
            panic!("strength generator should sample goals");
        };
        assert!((home.rate() - 0.5).abs() < 1e-12);
        assert!((away.rate() - 1.6).abs() < 1e-12);

        assert!(matches!(
            generator.generate("H", "Elsewhere", &mut StdRng::seed_from_u64(0)),
            Err(ForecastError::UnknownClub(ref c)) if c == "Elsewhere"
        ));
    }

    #[test]
    fn same_seed_same_draws() {
        let sampler = FixtureSampler::goals(1.4, 1.1).unwrap();
        let mut a = StdRng::seed_from_u64(99);
        let mut b = StdRng::seed_from_u64(99);
        for _ in 0..50 {
            assert_eq!(sampler.sample(&mut a), sampler.sample(&mut b));
        }
    }
}
