//! Monte Carlo season replay.
//!
//! For every model, year and round cutoff the fixtures are split into a fit set and a
//! test set, the model is trained on the fit set (warm-started from the previous round of
//! the same year) and the test set is replayed `n_sims` times. Each replay is classified
//! together with the real fit-set results and every club's finishing position is counted.
//!
//! Rounds of one year form a chain through the warm start and run in order. Years and
//! models share nothing and run in parallel, as do the trials of a round.

use std::collections::HashMap;
use std::time::Instant;

use chrono::NaiveDate;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::classification::{Classifier, PlayedMatch, StandardClassifier};
use crate::codec::StrengthMap;
use crate::config::ForecastConfig;
use crate::error::{ForecastError, Result};
use crate::fixture::Fixture;
use crate::generators::{FixtureSampler, OutcomeGenerator};
use crate::models::{CutoffRule, ModelKind, Trained};
use crate::results::{ForecastResults, PhaseTimings, PositionCounts, RoundReport};

/// Fit/test partition of one year at one round cutoff.
#[derive(Debug, Clone)]
pub struct Split {
    pub fit: Vec<Fixture>,
    pub test: Vec<Fixture>,
    /// Cutoff date for the date rule; the decay weights are measured against it.
    pub reference: Option<NaiveDate>,
}

pub fn split_fixtures(
    rule: CutoffRule,
    year_fixtures: &[Fixture],
    year: i32,
    round: u32,
) -> Result<Split> {
    match rule {
        CutoffRule::Round => {
            let (fit, test) = year_fixtures
                .iter()
                .cloned()
                .partition(|f| f.round <= round);
            Ok(Split {
                fit,
                test,
                reference: None,
            })
        }
        CutoffRule::Date => {
            let cutoff = year_fixtures
                .iter()
                .filter(|f| f.round == round)
                .map(|f| f.date)
                .min()
                .ok_or(ForecastError::EmptyRound { year, round })?;
            let (fit, test) = year_fixtures
                .iter()
                .cloned()
                .partition(|f| f.date < cutoff);
            Ok(Split {
                fit,
                test,
                reference: Some(cutoff),
            })
        }
    }
}

#[derive(Debug)]
pub struct ModelRun {
    pub model: ModelKind,
    pub result: Result<ForecastResults>,
}

pub struct Forecaster<C = StandardClassifier> {
    config: ForecastConfig,
    classifier: C,
}

impl Forecaster<StandardClassifier> {
    pub fn new(config: ForecastConfig) -> Self {
        Self::with_classifier(config, StandardClassifier)
    }
}

impl<C: Classifier> Forecaster<C> {
    pub fn with_classifier(config: ForecastConfig, classifier: C) -> Self {
        Self { config, classifier }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Runs each model independently; one model failing does not stop the others.
    pub fn run_models(
        &self,
        models: &[ModelKind],
        fixtures: &[Fixture],
        years: &[i32],
        rounds: &[u32],
    ) -> Vec<ModelRun> {
        with_pool(self.config.threads, || {
            models
                .par_iter()
                .map(|model| {
                    let result = self.run_model_in_pool(*model, fixtures, years, rounds);
                    if let Err(err) = &result {
                        warn!(model = %model, "model run failed: {err}");
                    }
                    ModelRun {
                        model: *model,
                        result,
                    }
                })
                .collect()
        })
    }

    pub fn run_model(
        &self,
        model: ModelKind,
        fixtures: &[Fixture],
        years: &[i32],
        rounds: &[u32],
    ) -> Result<ForecastResults> {
        with_pool(self.config.threads, || {
            self.run_model_in_pool(model, fixtures, years, rounds)
        })
    }

    fn run_model_in_pool(
        &self,
        model: ModelKind,
        fixtures: &[Fixture],
        years: &[i32],
        rounds: &[u32],
    ) -> Result<ForecastResults> {
        let seed = self.config.seed.unwrap_or_else(rand::random);
        let mut rounds = rounds.to_vec();
        rounds.sort_unstable();
        rounds.dedup();

        let reports = years
            .par_iter()
            .map(|year| {
                let year_fixtures: Vec<Fixture> =
                    fixtures.iter().filter(|f| f.year == *year).cloned().collect();
                self.run_year(model, &year_fixtures, *year, &rounds, seed)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut results = ForecastResults::default();
        for report in reports.into_iter().flatten() {
            results.merge(report);
        }
        Ok(results)
    }

    /// Walks the round cutoffs of one year in ascending order, carrying the fitted
    /// strengths forward as the next warm start.
    pub fn run_year(
        &self,
        model: ModelKind,
        year_fixtures: &[Fixture],
        year: i32,
        rounds: &[u32],
        seed: u64,
    ) -> Result<Vec<RoundReport>> {
        if year_fixtures.is_empty() {
            return Err(ForecastError::Dataset(format!("no fixtures for season {year}")));
        }
        info!(model = %model, year, rounds = rounds.len(), "running season");

        let mut warm_start: Option<StrengthMap> = None;
        let mut reports = Vec::with_capacity(rounds.len());
        for &round in rounds {
            let (report, trained) =
                self.run_round(model, year_fixtures, year, round, warm_start.as_ref(), seed)?;
            warm_start = trained.model.warm_start().cloned();
            reports.push(report);
        }
        Ok(reports)
    }

    pub fn run_round(
        &self,
        model: ModelKind,
        year_fixtures: &[Fixture],
        year: i32,
        round: u32,
        warm_start: Option<&StrengthMap>,
        seed: u64,
    ) -> Result<(RoundReport, Trained)> {
        let split = split_fixtures(model.cutoff_rule(), year_fixtures, year, round)?;

        let train_started = Instant::now();
        let trained = model.train(
            &split.fit,
            warm_start,
            split.reference,
            &self.config.estimator_options(),
        )?;
        let training = train_started.elapsed().as_secs_f64();

        let sim_started = Instant::now();
        let positions = simulate_round(
            &trained,
            &split.fit,
            &split.test,
            self.config.n_sims,
            RoundSeed { seed, year, round },
            &self.classifier,
        )?;
        let simulation = sim_started.elapsed().as_secs_f64();

        debug!(
            model = %model,
            year,
            round,
            fit = split.fit.len(),
            test = split.test.len(),
            training,
            simulation,
            "round finished"
        );

        let report = RoundReport {
            year,
            round,
            n_sims: self.config.n_sims as u64,
            fit_matches: split.fit.len(),
            simulated_matches: split.test.len(),
            converged: trained.report.as_ref().map(|r| r.converged()),
            warm_started: trained.report.as_ref().map(|r| r.warm_started),
            positions,
            timing: PhaseTimings {
                training,
                simulation,
            },
        };
        Ok((report, trained))
    }
}

#[derive(Debug, Clone, Copy)]
struct RoundSeed {
    seed: u64,
    year: i32,
    round: u32,
}

impl RoundSeed {
    /// Independent stream per trial, so results do not depend on thread scheduling.
    fn trial(&self, trial: usize) -> u64 {
        let mut x = self.seed;
        for part in [self.year as u64, self.round as u64, trial as u64] {
            x = splitmix64(x ^ part);
        }
        x
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

fn simulate_round<C: Classifier>(
    trained: &Trained,
    fit: &[Fixture],
    test: &[Fixture],
    n_sims: usize,
    seed: RoundSeed,
    classifier: &C,
) -> Result<PositionCounts> {
    // Resolving every test fixture up front surfaces unknown clubs before any trial runs.
    let samplers: Vec<FixtureSampler> = test
        .iter()
        .map(|f| trained.model.prepare(&f.home, &f.away))
        .collect::<Result<_>>()?;

    let mut clubs: Vec<&str> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for f in fit.iter().chain(test) {
        for club in [f.home.as_str(), f.away.as_str()] {
            index.entry(club).or_insert_with(|| {
                clubs.push(club);
                clubs.len() - 1
            });
        }
    }
    let n = clubs.len();

    let base: Vec<PlayedMatch<'_>> = fit
        .iter()
        .chain(test)
        .map(|f| PlayedMatch {
            home: &f.home,
            away: &f.away,
            score: f.score,
        })
        .collect();
    let fit_len = fit.len();

    let (counts, _) = (0..n_sims)
        .into_par_iter()
        .try_fold(
            || (vec![vec![0u64; n]; n], base.clone()),
            |(mut counts, mut played), trial| {
                let mut rng = StdRng::seed_from_u64(seed.trial(trial));
                for (slot, sampler) in played[fit_len..].iter_mut().zip(&samplers) {
                    slot.score = sampler.sample(&mut rng);
                }
                let table = classifier.classify(&played);
                if table.len() > n {
                    return Err(ForecastError::InvalidParameter(format!(
                        "classification returned {} rows for {n} clubs",
                        table.len()
                    )));
                }
                for (position, club) in table.into_iter().enumerate() {
                    let idx = *index
                        .get(club)
                        .ok_or_else(|| ForecastError::UnknownClub(club.to_string()))?;
                    counts[idx][position] += 1;
                }
                Ok::<_, ForecastError>((counts, played))
            },
        )
        .try_reduce(
            || (vec![vec![0u64; n]; n], Vec::new()),
            |(mut a, buf), (b, _)| {
                for (row_a, row_b) in a.iter_mut().zip(b) {
                    for (x, y) in row_a.iter_mut().zip(row_b) {
                        *x += y;
                    }
                }
                Ok((a, buf))
            },
        )?;

    Ok(clubs
        .into_iter()
        .zip(counts)
        .map(|(club, row)| (club.to_string(), row))
        .collect())
}

fn with_pool<T: Send>(threads: Option<usize>, action: impl FnOnce() -> T + Send) -> T {
    let pool = threads.and_then(|n| rayon::ThreadPoolBuilder::new().num_threads(n).build().ok());
    match pool {
        Some(pool) => pool.install(action),
        None => action(),
    }
}
