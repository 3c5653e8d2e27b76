use std::cell::RefCell;
use std::time::Instant;

use argmin::core::{
    CostFunction, Error as ArgminError, Executor, Gradient, State, TerminationReason,
    TerminationStatus,
};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, warn};

use crate::codec::{CodecVariant, StrengthMap};
use crate::error::{ForecastError, Result};
use crate::fixture::Fixture;
use crate::likelihood::LogSpaceObjective;
use crate::registry::{ClubRegistry, DEFAULT_SEASON_SIZE};

#[derive(Debug, Clone, Copy)]
pub struct EstimatorOptions {
    pub season_size: usize,
    pub max_iters: u64,
    pub lbfgs_memory: usize,
}

impl Default for EstimatorOptions {
    fn default() -> Self {
        Self {
            season_size: DEFAULT_SEASON_SIZE,
            max_iters: 200,
            lbfgs_memory: 7,
        }
    }
}

/// Diagnostic attached to a fit whose minimizer stopped early. The fitted strengths are
/// still the best point found and remain usable.
#[derive(Debug, Clone, Error)]
#[error("optimizer did not converge after {iterations} iterations: {reason}")]
pub struct OptimizerNonConvergence {
    pub iterations: u64,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct FitReport {
    pub clubs: usize,
    pub matches: usize,
    pub iterations: u64,
    pub cost: f64,
    pub warm_started: bool,
    pub non_convergence: Option<OptimizerNonConvergence>,
}

impl FitReport {
    pub fn converged(&self) -> bool {
        self.non_convergence.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct StrengthFit {
    pub strengths: StrengthMap,
    pub report: FitReport,
}

/// Maximum-likelihood estimator of per-club strengths for one codec variant.
#[derive(Debug, Clone, Copy)]
pub struct StrengthEstimator {
    variant: CodecVariant,
    options: EstimatorOptions,
}

impl StrengthEstimator {
    pub fn new(variant: CodecVariant, options: EstimatorOptions) -> Self {
        Self { variant, options }
    }

    pub fn variant(&self) -> CodecVariant {
        self.variant
    }

    /// Fits strengths to `fixtures`.
    ///
    /// `warm_start` seeds the minimizer when it covers every club of the new registry with
    /// the same variant; otherwise the all-ones vector is used. `reference` is the cutoff
    /// date the decay variant measures elapsed time against.
    ///
    /// The result is normalized by its first component, which removes the joint scale
    /// factor the attack/defense ratios cannot identify.
    pub fn fit(
        &self,
        fixtures: &[Fixture],
        warm_start: Option<&StrengthMap>,
        reference: Option<NaiveDate>,
    ) -> Result<StrengthFit> {
        if fixtures.is_empty() {
            return Err(ForecastError::EmptyFitSet);
        }
        let registry = ClubRegistry::from_fixtures(fixtures, self.options.season_size)?;
        let objective = LogSpaceObjective::new(&registry, fixtures, self.variant, reference)?;

        let warm = warm_start
            .and_then(|w| w.warm_start_for(&registry, self.variant))
            .filter(|v| v.iter().all(|x| x.is_finite() && *x > 0.0));
        let warm_started = warm.is_some();
        let x0 = warm.unwrap_or_else(|| vec![1.0; objective.len()]);
        let theta0: Vec<f64> = x0.iter().map(|x| x.ln()).collect();

        let started = Instant::now();
        let outcome = minimize(&objective, theta0, &self.options);
        let theta = outcome.theta;

        let mut x = objective.parameters(&theta);
        let scale = x[0];
        for v in &mut x {
            *v /= scale;
        }
        let strengths = StrengthMap::decode(&x, &registry, self.variant)?;

        if let Some(diag) = &outcome.non_convergence {
            warn!(variant = ?self.variant, "{diag}");
        }
        debug!(
            variant = ?self.variant,
            clubs = registry.len(),
            matches = objective.match_count(),
            iterations = outcome.iterations,
            cost = outcome.cost,
            warm_started,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fitted strengths"
        );

        Ok(StrengthFit {
            strengths,
            report: FitReport {
                clubs: registry.len(),
                matches: objective.match_count(),
                iterations: outcome.iterations,
                cost: outcome.cost,
                warm_started,
                non_convergence: outcome.non_convergence,
            },
        })
    }
}

struct MinimizeOutcome {
    theta: Vec<f64>,
    cost: f64,
    iterations: u64,
    non_convergence: Option<OptimizerNonConvergence>,
}

#[derive(Debug, Default)]
struct BestPoint {
    cost: f64,
    theta: Option<Vec<f64>>,
}

/// Adapter exposing the objective to argmin while remembering the best point evaluated,
/// so a solver error still leaves a usable vector behind.
struct TrackedObjective<'a> {
    objective: &'a LogSpaceObjective,
    best: &'a RefCell<BestPoint>,
}

impl CostFunction for TrackedObjective<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, theta: &Self::Param) -> std::result::Result<Self::Output, ArgminError> {
        let cost = self.objective.cost(theta);
        if cost.is_finite() {
            let mut best = self.best.borrow_mut();
            if best.theta.is_none() || cost < best.cost {
                best.cost = cost;
                best.theta = Some(theta.clone());
            }
        }
        Ok(cost)
    }
}

impl Gradient for TrackedObjective<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, theta: &Self::Param) -> std::result::Result<Self::Gradient, ArgminError> {
        Ok(self.objective.gradient(theta))
    }
}

fn minimize(
    objective: &LogSpaceObjective,
    theta0: Vec<f64>,
    options: &EstimatorOptions,
) -> MinimizeOutcome {
    let best = RefCell::new(BestPoint::default());
    let problem = TrackedObjective {
        objective,
        best: &best,
    };
    let linesearch: MoreThuenteLineSearch<Vec<f64>, Vec<f64>, f64> = MoreThuenteLineSearch::new();
    let solver: LBFGS<_, Vec<f64>, Vec<f64>, f64> =
        LBFGS::new(linesearch, options.lbfgs_memory.max(1));

    let run = Executor::new(problem, solver)
        .configure(|state| state.param(theta0.clone()).max_iters(options.max_iters))
        .run();

    let (iterations, non_convergence) = match run {
        Ok(result) => {
            let state = result.state();
            let iterations = state.get_iter();
            let diag = match state.get_termination_status() {
                TerminationStatus::Terminated(
                    TerminationReason::SolverConverged | TerminationReason::TargetCostReached,
                ) => None,
                status => Some(OptimizerNonConvergence {
                    iterations,
                    reason: format!("{status:?}"),
                }),
            };
            (iterations, diag)
        }
        Err(err) => (
            0,
            Some(OptimizerNonConvergence {
                iterations: 0,
                reason: err.to_string(),
            }),
        ),
    };

    let best = best.into_inner();
    let theta = best.theta.unwrap_or(theta0);
    let cost = objective.cost(&theta);
    MinimizeOutcome {
        theta,
        cost,
        iterations,
        non_convergence,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::fixture::Score;
    use crate::likelihood::negative_log_likelihood;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 4, 1).unwrap() + chrono::Duration::days(offset)
    }

    /// Double round robin over four clubs where "Strong" scores freely and "Weak" rarely.
    fn season() -> Vec<Fixture> {
        let clubs = ["Strong", "Mid", "Other", "Weak"];
        let goals = |club: &str| match club {
            "Strong" => 3,
            "Weak" => 0,
            _ => 1,
        };
        let mut out = Vec::new();
        let mut n = 0;
        for home in clubs {
            for away in clubs {
                if home == away {
                    continue;
                }
                let score = Score::new(goals(home), goals(away));
                out.push(Fixture::new(home, away, score, 1 + n / 2, 2022, day(n as i64 * 3)));
                n += 1;
            }
        }
        out
    }

    #[test]
    fn first_component_is_normalized_to_one() {
        let fixtures = season();
        let fit = StrengthEstimator::new(CodecVariant::Neutral, EstimatorOptions::default())
            .fit(&fixtures, None, None)
            .unwrap();
        let v = fit.strengths.encode();
        assert!((v[0] - 1.0).abs() < 1e-12);
        assert!(v.iter().all(|x| *x > 0.0));
    }

    #[test]
    fn strong_attack_beats_weak_attack() {
        let fixtures = season();
        let fit = StrengthEstimator::new(CodecVariant::Neutral, EstimatorOptions::default())
            .fit(&fixtures, None, None)
            .unwrap();
        let strong = fit.strengths.neutral("Strong").unwrap();
        let weak = fit.strengths.neutral("Weak").unwrap();
        assert!(strong.attack > weak.attack);
    }

    #[test]
    fn fit_improves_on_starting_point() {
        let fixtures = season();
        let registry = ClubRegistry::from_fixtures(&fixtures, 20).unwrap();
        for variant in [CodecVariant::Neutral, CodecVariant::VenueSplit] {
            let ones = vec![1.0; variant.vector_len(registry.len())];
            let start = negative_log_likelihood(&ones, &registry, &fixtures, variant, None).unwrap();
            let fit = StrengthEstimator::new(variant, EstimatorOptions::default())
                .fit(&fixtures, None, None)
                .unwrap();
            let fitted = negative_log_likelihood(
                &fit.strengths.encode(),
                &registry,
                &fixtures,
                variant,
                None,
            )
            .unwrap();
            assert!(fitted < start, "{variant:?}: {fitted} >= {start}");
        }
    }

    #[test]
    fn decay_fit_reports_parameters() {
        let fixtures = season();
        let options = EstimatorOptions {
            max_iters: 50,
            ..EstimatorOptions::default()
        };
        let fit = StrengthEstimator::new(CodecVariant::VenueSplitDecay, options)
            .fit(&fixtures, None, Some(day(60)))
            .unwrap();
        let decay = fit.strengths.decay().unwrap();
        assert!(decay.k > 0.0 && decay.c > 0.0);
    }

    #[test]
    fn warm_start_is_used_when_layout_matches() {
        let fixtures = season();
        let estimator = StrengthEstimator::new(CodecVariant::VenueSplit, EstimatorOptions::default());
        let first = estimator.fit(&fixtures, None, None).unwrap();
        assert!(!first.report.warm_started);
        let second = estimator.fit(&fixtures, Some(&first.strengths), None).unwrap();
        assert!(second.report.warm_started);

        let neutral = StrengthEstimator::new(CodecVariant::Neutral, EstimatorOptions::default());
        let third = neutral.fit(&fixtures, Some(&first.strengths), None).unwrap();
        assert!(!third.report.warm_started);
    }

    #[test]
    fn empty_fit_set_is_rejected() {
        let err = StrengthEstimator::new(CodecVariant::Neutral, EstimatorOptions::default())
            .fit(&[], None, None)
            .unwrap_err();
        assert!(matches!(err, ForecastError::EmptyFitSet));
    }
}
