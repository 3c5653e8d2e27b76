//! Negative log-likelihood of observed goal counts under independent Poisson rates
//! `attack(scorer) / defense(conceder)`.
//!
//! The decay variant adds `ln(weight)` per goal count, where the weight comes from
//! [`crate::decay::decay_weight`] evaluated at the number of days between the match and
//! the reference cutoff. Matches on or after the cutoff do not contribute at all.

use chrono::NaiveDate;

use crate::codec::{CodecVariant, StrengthMap};
use crate::decay::{decay_weight, ln_weight};
use crate::error::{ForecastError, Result};
use crate::fixture::Fixture;
use crate::registry::ClubRegistry;

// Keeps exp() finite while the line search probes far-off points.
const MAX_LOG_RATE: f64 = 50.0;
// Box on every log-parameter; the decay pair in particular drifts without one.
pub const LOG_PARAM_BOUND: f64 = 30.0;

/// Objective evaluated directly on a parameter vector (strictly positive entries).
pub fn negative_log_likelihood(
    vector: &[f64],
    registry: &ClubRegistry,
    fixtures: &[Fixture],
    variant: CodecVariant,
    reference: Option<NaiveDate>,
) -> Result<f64> {
    let strengths = StrengthMap::decode(vector, registry, variant)?;
    let decay = match strengths.decay() {
        Some(params) => {
            let reference = reference.ok_or_else(|| {
                ForecastError::InvalidParameter("decay objective needs a reference date".into())
            })?;
            Some((reference, params))
        }
        None => None,
    };

    let mut nll = 0.0;
    for fixture in fixtures {
        let home = registry.index_of(&fixture.home)?;
        let away = registry.index_of(&fixture.away)?;
        let mut penalty = 0.0;
        if let Some((reference, params)) = decay {
            let days = elapsed_days(fixture.date, reference);
            if days <= 0.0 {
                continue;
            }
            penalty = decay_weight(days, params.c, params.k)?.ln();
        }
        let (rate_home, rate_away) = strengths.rates(home, away);
        nll += poisson_nll(fixture.score.home, rate_home) + penalty;
        nll += poisson_nll(fixture.score.away, rate_away) + penalty;
    }
    Ok(nll)
}

pub fn elapsed_days(date: NaiveDate, reference: NaiveDate) -> f64 {
    (reference - date).num_days() as f64
}

/// `-ln P(goals | rate)` for a Poisson count.
pub fn poisson_nll(goals: u32, rate: f64) -> f64 {
    rate - goals as f64 * rate.ln() + ln_factorial(goals)
}

fn ln_factorial(n: u32) -> f64 {
    (2..=n).map(|i| (i as f64).ln()).sum()
}

#[derive(Debug, Clone)]
struct PreparedMatch {
    home_attack: usize,
    home_defense: usize,
    away_attack: usize,
    away_defense: usize,
    goals_home: f64,
    goals_away: f64,
    ln_factorials: f64,
    ln_elapsed: Option<f64>,
}

/// The objective with fixtures resolved to vector indices once, evaluated in log space
/// (`x = exp(theta)`) so the minimizer stays inside the positive orthant.
#[derive(Debug, Clone)]
pub struct LogSpaceObjective {
    variant: CodecVariant,
    len: usize,
    decay_offset: Option<usize>,
    matches: Vec<PreparedMatch>,
}

impl LogSpaceObjective {
    pub fn new(
        registry: &ClubRegistry,
        fixtures: &[Fixture],
        variant: CodecVariant,
        reference: Option<NaiveDate>,
    ) -> Result<Self> {
        let chunk = variant.chunk_len();
        let (home_def_off, away_att_off, away_def_off) = if variant.venue_aware() {
            (1, 2, 3)
        } else {
            (1, 0, 1)
        };
        let reference = match variant {
            CodecVariant::VenueSplitDecay => Some(reference.ok_or_else(|| {
                ForecastError::InvalidParameter("decay objective needs a reference date".into())
            })?),
            _ => None,
        };

        let mut matches = Vec::with_capacity(fixtures.len());
        for fixture in fixtures {
            let h = registry.index_of(&fixture.home)? * chunk;
            let a = registry.index_of(&fixture.away)? * chunk;
            let ln_elapsed = match reference {
                Some(reference) => {
                    let days = elapsed_days(fixture.date, reference);
                    if days <= 0.0 {
                        continue;
                    }
                    Some(days.ln())
                }
                None => None,
            };
            matches.push(PreparedMatch {
                home_attack: h,
                home_defense: h + home_def_off,
                away_attack: a + away_att_off,
                away_defense: a + away_def_off,
                goals_home: fixture.score.home as f64,
                goals_away: fixture.score.away as f64,
                ln_factorials: ln_factorial(fixture.score.home) + ln_factorial(fixture.score.away),
                ln_elapsed,
            });
        }

        let body = registry.len() * chunk;
        Ok(Self {
            variant,
            len: variant.vector_len(registry.len()),
            decay_offset: (variant == CodecVariant::VenueSplitDecay).then_some(body),
            matches,
        })
    }

    pub fn variant(&self) -> CodecVariant {
        self.variant
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    /// Maps log-parameters back to the positive vector the codec decodes.
    pub fn parameters(&self, theta: &[f64]) -> Vec<f64> {
        theta.iter().map(|t| bounded(*t).exp()).collect()
    }

    pub fn cost(&self, theta: &[f64]) -> f64 {
        let theta: Vec<f64> = theta.iter().copied().map(bounded).collect();
        let decay = self.decay_offset.map(|o| (theta[o].exp(), theta[o + 1].exp()));
        let mut nll = 0.0;
        for m in &self.matches {
            let eta_home = theta[m.home_attack] - theta[m.away_defense];
            let eta_away = theta[m.away_attack] - theta[m.home_defense];
            nll += log_rate(eta_home).exp() - m.goals_home * eta_home;
            nll += log_rate(eta_away).exp() - m.goals_away * eta_away;
            nll += m.ln_factorials;
            if let (Some((k, c)), Some(ln_t)) = (decay, m.ln_elapsed) {
                nll += 2.0 * ln_weight(ln_t, c, k);
            }
        }
        nll
    }

    pub fn gradient(&self, raw: &[f64]) -> Vec<f64> {
        let theta: Vec<f64> = raw.iter().copied().map(bounded).collect();
        let mut grad = vec![0.0; self.len];
        let decay = self.decay_offset.map(|o| (theta[o].exp(), theta[o + 1].exp()));
        for m in &self.matches {
            let eta_home = theta[m.home_attack] - theta[m.away_defense];
            let eta_away = theta[m.away_attack] - theta[m.home_defense];
            let d_home = log_rate(eta_home).exp() - m.goals_home;
            let d_away = log_rate(eta_away).exp() - m.goals_away;
            grad[m.home_attack] += d_home;
            grad[m.away_defense] -= d_home;
            grad[m.away_attack] += d_away;
            grad[m.home_defense] -= d_away;

            if let (Some(offset), Some((k, c)), Some(ln_t)) = (self.decay_offset, decay, m.ln_elapsed) {
                let share = c * ln_t / (c * ln_t + k);
                grad[offset] += 2.0 * share;
                grad[offset + 1] -= 2.0 * share;
            }
        }
        // Projected gradient: no pull past the box.
        for (g, t) in grad.iter_mut().zip(raw) {
            if (*t >= LOG_PARAM_BOUND && *g < 0.0) || (*t <= -LOG_PARAM_BOUND && *g > 0.0) {
                *g = 0.0;
            }
        }
        grad
    }
}

fn log_rate(eta: f64) -> f64 {
    eta.min(MAX_LOG_RATE)
}

fn bounded(theta: f64) -> f64 {
    theta.clamp(-LOG_PARAM_BOUND, LOG_PARAM_BOUND)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::Score;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 3, d).unwrap()
    }

    fn fixtures() -> Vec<Fixture> {
        vec![
            Fixture::new("A", "B", Score::new(2, 1), 1, 2021, day(1)),
            Fixture::new("C", "A", Score::new(0, 0), 1, 2021, day(2)),
            Fixture::new("B", "C", Score::new(1, 3), 2, 2021, day(8)),
            Fixture::new("A", "C", Score::new(4, 2), 2, 2021, day(9)),
        ]
    }

    fn registry() -> ClubRegistry {
        ClubRegistry::new(["A", "B", "C"])
    }

    fn vector(variant: CodecVariant) -> Vec<f64> {
        (0..variant.vector_len(3))
            .map(|i| 0.6 + 0.17 * i as f64)
            .collect()
    }

    #[test]
    fn scale_invariance() {
        let reg = registry();
        let fx = fixtures();
        for variant in [
            CodecVariant::Neutral,
            CodecVariant::VenueSplit,
            CodecVariant::VenueSplitDecay,
        ] {
            let v = vector(variant);
            let base = negative_log_likelihood(&v, &reg, &fx, variant, Some(day(20))).unwrap();
            for s in [0.01, 0.5, 3.0, 250.0] {
                let scaled: Vec<f64> = v.iter().map(|x| x * s).collect();
                let value =
                    negative_log_likelihood(&scaled, &reg, &fx, variant, Some(day(20))).unwrap();
                assert!((value - base).abs() < 1e-9 * base.abs().max(1.0), "{variant:?} s={s}");
            }
        }
    }

    #[test]
    fn matches_hand_computed_value() {
        let reg = ClubRegistry::new(["A", "B"]);
        let fx = vec![Fixture::new("A", "B", Score::new(2, 0), 1, 2021, day(1))];
        // home rate 2/1, away rate 1/4
        let v = [2.0, 4.0, 1.0, 1.0];
        let nll = negative_log_likelihood(&v, &reg, &fx, CodecVariant::Neutral, None).unwrap();
        let expected = (2.0 - 2.0 * 2.0_f64.ln() + 2.0_f64.ln()) + 0.25;
        assert!((nll - expected).abs() < 1e-12);
    }

    #[test]
    fn decay_skips_matches_on_or_after_reference() {
        let reg = registry();
        let fx = fixtures();
        let v = vector(CodecVariant::VenueSplitDecay);
        let cutoff = day(8);
        let all = negative_log_likelihood(&v, &reg, &fx, CodecVariant::VenueSplitDecay, Some(cutoff)).unwrap();
        let early = negative_log_likelihood(&v, &reg, &fx[..2], CodecVariant::VenueSplitDecay, Some(cutoff)).unwrap();
        assert!((all - early).abs() < 1e-12);
    }

    #[test]
    fn decay_needs_reference_date() {
        let reg = registry();
        let v = vector(CodecVariant::VenueSplitDecay);
        let err = negative_log_likelihood(&v, &reg, &fixtures(), CodecVariant::VenueSplitDecay, None)
            .unwrap_err();
        assert!(matches!(err, ForecastError::InvalidParameter(_)));
    }

    #[test]
    fn unknown_club_in_fit_set() {
        let reg = ClubRegistry::new(["A", "B"]);
        let err = negative_log_likelihood(&[1.0; 4], &reg, &fixtures(), CodecVariant::Neutral, None)
            .unwrap_err();
        assert!(matches!(err, ForecastError::UnknownClub(ref c) if c == "C"));
    }

    #[test]
    fn log_space_matches_direct_objective() {
        let reg = registry();
        let fx = fixtures();
        for variant in [
            CodecVariant::Neutral,
            CodecVariant::VenueSplit,
            CodecVariant::VenueSplitDecay,
        ] {
            let v = vector(variant);
            let theta: Vec<f64> = v.iter().map(|x| x.ln()).collect();
            let objective = LogSpaceObjective::new(&reg, &fx, variant, Some(day(20))).unwrap();
            let direct = negative_log_likelihood(&v, &reg, &fx, variant, Some(day(20))).unwrap();
            assert!((objective.cost(&theta) - direct).abs() < 1e-9);
        }
    }

    #[test]
    fn gradient_agrees_with_finite_differences() {
        let reg = registry();
        let fx = fixtures();
        for variant in [CodecVariant::VenueSplit, CodecVariant::VenueSplitDecay] {
            let objective = LogSpaceObjective::new(&reg, &fx, variant, Some(day(20))).unwrap();
            let theta: Vec<f64> = vector(variant).iter().map(|x| x.ln()).collect();
            let grad = objective.gradient(&theta);
            let h = 1e-6;
            for i in 0..theta.len() {
                let mut up = theta.clone();
                let mut down = theta.clone();
                up[i] += h;
                down[i] -= h;
                let numeric = (objective.cost(&up) - objective.cost(&down)) / (2.0 * h);
                assert!((numeric - grad[i]).abs() < 1e-5, "{variant:?} i={i}");
            }
        }
    }
}
