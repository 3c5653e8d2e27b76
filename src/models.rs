use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::codec::{CodecVariant, StrengthMap};
use crate::error::{ForecastError, Result};
use crate::estimator::{EstimatorOptions, FitReport, StrengthEstimator};
use crate::fixture::{Fixture, Outcome};
use crate::generators::{
    FixtureSampler, NaiveGenerator, NeutralPoissonGenerator, ObserverGenerator,
    OutcomeGenerator, Retrospect, SemiNaiveGenerator, SplitPoissonGenerator,
    StrengthPoissonGenerator, VenueRetrospect,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    Naive,
    SemiNaive,
    Observer,
    PoissonNeutral,
    PoissonSplit,
    PoissonStrength,
    PoissonStrengthVenue,
    PoissonStrengthDecay,
}

/// What a model's generator consumes, fixed when the model is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    /// Number of per-fixture inputs: none, one shared value, or one entry per club.
    pub parameter_count: u8,
    pub venue_aware: bool,
}

/// How a round number becomes a fit/test split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutoffRule {
    /// Fit on rounds `<= r`, simulate rounds `> r`.
    Round,
    /// Fit on dates before the first match of round `r`, simulate from that date on.
    Date,
}

impl CutoffRule {
    /// Every distinct round in `fixtures`, ascending. The date rule drops the opening
    /// round since nothing is dated before it.
    pub fn usable_rounds(self, fixtures: &[Fixture]) -> Vec<u32> {
        let rounds: BTreeSet<u32> = fixtures.iter().map(|f| f.round).collect();
        let skip = match self {
            CutoffRule::Round => 0,
            CutoffRule::Date => 1,
        };
        rounds.into_iter().skip(skip).collect()
    }
}

impl ModelKind {
    pub const ALL: [ModelKind; 8] = [
        ModelKind::Naive,
        ModelKind::SemiNaive,
        ModelKind::Observer,
        ModelKind::PoissonNeutral,
        ModelKind::PoissonSplit,
        ModelKind::PoissonStrength,
        ModelKind::PoissonStrengthVenue,
        ModelKind::PoissonStrengthDecay,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::Naive => "naive",
            ModelKind::SemiNaive => "semi-naive",
            ModelKind::Observer => "observer",
            ModelKind::PoissonNeutral => "poisson-neutral",
            ModelKind::PoissonSplit => "poisson-split",
            ModelKind::PoissonStrength => "poisson-strength",
            ModelKind::PoissonStrengthVenue => "poisson-strength-venue",
            ModelKind::PoissonStrengthDecay => "poisson-strength-decay",
        }
    }

    pub fn capability(self) -> Capability {
        let (parameter_count, venue_aware) = match self {
            ModelKind::Naive => (0, false),
            ModelKind::SemiNaive => (1, false),
            ModelKind::Observer => (2, true),
            ModelKind::PoissonNeutral => (1, false),
            ModelKind::PoissonSplit => (1, false),
            ModelKind::PoissonStrength => (2, false),
            ModelKind::PoissonStrengthVenue => (2, true),
            ModelKind::PoissonStrengthDecay => (2, true),
        };
        Capability {
            parameter_count,
            venue_aware,
        }
    }

    pub fn cutoff_rule(self) -> CutoffRule {
        match self {
            ModelKind::PoissonStrengthDecay => CutoffRule::Date,
            _ => CutoffRule::Round,
        }
    }

    /// Parameter layout of the maximum-likelihood models; `None` for the closed-form ones.
    pub fn codec(self) -> Option<CodecVariant> {
        match self {
            ModelKind::PoissonStrength => Some(CodecVariant::Neutral),
            ModelKind::PoissonStrengthVenue => Some(CodecVariant::VenueSplit),
            ModelKind::PoissonStrengthDecay => Some(CodecVariant::VenueSplitDecay),
            _ => None,
        }
    }

    /// Trains the model on `fit`. Only the strength models use `warm_start`, and only the
    /// decay model uses `reference`.
    pub fn train(
        self,
        fit: &[Fixture],
        warm_start: Option<&StrengthMap>,
        reference: Option<NaiveDate>,
        options: &EstimatorOptions,
    ) -> Result<Trained> {
        let model = match self {
            ModelKind::Naive => TrainedModel::Naive(NaiveGenerator),
            ModelKind::SemiNaive => TrainedModel::SemiNaive(SemiNaiveGenerator {
                retrospect: league_retrospect(fit)?,
            }),
            ModelKind::Observer => {
                if fit.is_empty() {
                    return Err(ForecastError::EmptyFitSet);
                }
                TrainedModel::Observer(ObserverGenerator {
                    clubs: club_retrospects(fit),
                })
            }
            ModelKind::PoissonNeutral => TrainedModel::PoissonNeutral(NeutralPoissonGenerator {
                goals_mean: mean_goals_per_match(fit)?,
            }),
            ModelKind::PoissonSplit => {
                let (home_mean, away_mean) = mean_goals_by_side(fit)?;
                TrainedModel::PoissonSplit(SplitPoissonGenerator {
                    home_mean,
                    away_mean,
                })
            }
            ModelKind::PoissonStrength
            | ModelKind::PoissonStrengthVenue
            | ModelKind::PoissonStrengthDecay => {
                let variant = self.codec().ok_or_else(|| {
                    ForecastError::InvalidParameter(format!("{self} has no parameter codec"))
                })?;
                let fit = StrengthEstimator::new(variant, *options).fit(fit, warm_start, reference)?;
                return Ok(Trained {
                    model: TrainedModel::PoissonStrength(StrengthPoissonGenerator {
                        strengths: fit.strengths,
                    }),
                    report: Some(fit.report),
                });
            }
        };
        Ok(Trained {
            model,
            report: None,
        })
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = ForecastError;

    fn from_str(raw: &str) -> Result<Self> {
        let key = raw.trim().to_ascii_lowercase().replace('_', "-");
        ModelKind::ALL
            .into_iter()
            .find(|m| m.name() == key)
            .ok_or_else(|| ForecastError::InvalidParameter(format!("unknown model `{raw}`")))
    }
}

#[derive(Debug, Clone)]
pub struct Trained {
    pub model: TrainedModel,
    pub report: Option<FitReport>,
}

#[derive(Debug, Clone)]
pub enum TrainedModel {
    Naive(NaiveGenerator),
    SemiNaive(SemiNaiveGenerator),
    Observer(ObserverGenerator),
    PoissonNeutral(NeutralPoissonGenerator),
    PoissonSplit(SplitPoissonGenerator),
    PoissonStrength(StrengthPoissonGenerator),
}

impl TrainedModel {
    /// Parameters carried into the next round's fit.
    pub fn warm_start(&self) -> Option<&StrengthMap> {
        match self {
            TrainedModel::PoissonStrength(g) => Some(&g.strengths),
            _ => None,
        }
    }
}

impl OutcomeGenerator for TrainedModel {
    fn prepare(&self, home: &str, away: &str) -> Result<FixtureSampler> {
        match self {
            TrainedModel::Naive(g) => g.prepare(home, away),
            TrainedModel::SemiNaive(g) => g.prepare(home, away),
            TrainedModel::Observer(g) => g.prepare(home, away),
            TrainedModel::PoissonNeutral(g) => g.prepare(home, away),
            TrainedModel::PoissonSplit(g) => g.prepare(home, away),
            TrainedModel::PoissonStrength(g) => g.prepare(home, away),
        }
    }
}

fn outcome_slot(outcome: Outcome) -> usize {
    match outcome {
        Outcome::Home => 0,
        Outcome::Draw => 1,
        Outcome::Away => 2,
    }
}

/// League-wide home-perspective win/draw/loss shares.
pub fn league_retrospect(fit: &[Fixture]) -> Result<Retrospect> {
    if fit.is_empty() {
        return Err(ForecastError::EmptyFitSet);
    }
    let mut counts = [0u32; 3];
    for m in fit {
        counts[outcome_slot(m.score.outcome())] += 1;
    }
    Ok(Retrospect::from_counts(counts))
}

/// Per-club records split by venue; both are counted from the home side's view, so a
/// club's away record is its opponents' home record against it.
pub fn club_retrospects(fit: &[Fixture]) -> HashMap<String, VenueRetrospect> {
    let mut counts: HashMap<&str, ([u32; 3], [u32; 3])> = HashMap::new();
    for m in fit {
        let slot = outcome_slot(m.score.outcome());
        counts.entry(m.home.as_str()).or_default().0[slot] += 1;
        counts.entry(m.away.as_str()).or_default().1[slot] += 1;
    }
    counts
        .into_iter()
        .map(|(club, (home, away))| {
            (
                club.to_string(),
                VenueRetrospect {
                    home: Retrospect::from_counts(home),
                    away: Retrospect::from_counts(away),
                },
            )
        })
        .collect()
}

pub fn mean_goals_per_match(fit: &[Fixture]) -> Result<f64> {
    let (home, away) = mean_goals_by_side(fit)?;
    Ok(home + away)
}

pub fn mean_goals_by_side(fit: &[Fixture]) -> Result<(f64, f64)> {
    if fit.is_empty() {
        return Err(ForecastError::EmptyFitSet);
    }
    let n = fit.len() as f64;
    let home: u64 = fit.iter().map(|m| u64::from(m.score.home)).sum();
    let away: u64 = fit.iter().map(|m| u64::from(m.score.away)).sum();
    Ok((home as f64 / n, away as f64 / n))
}
