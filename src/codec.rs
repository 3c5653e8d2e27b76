//! Mapping between the flat vector the optimizer works on and per-club strengths.
//!
//! Layout: one contiguous chunk per club in registry order, `[attack, defense]` for the
//! neutral variant and `[home attack, home defense, away attack, away defense]` for the
//! venue-split variants. The decay variant appends `[k, c]` once, after the last club.

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::registry::ClubRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Strength {
    pub attack: f64,
    pub defense: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VenueStrength {
    pub home: Strength,
    pub away: Strength,
}

/// Forgetting parameters of the decay model, see [`crate::decay::decay_weight`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayParams {
    pub k: f64,
    pub c: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodecVariant {
    Neutral,
    VenueSplit,
    VenueSplitDecay,
}

impl CodecVariant {
    pub fn chunk_len(self) -> usize {
        match self {
            CodecVariant::Neutral => 2,
            CodecVariant::VenueSplit | CodecVariant::VenueSplitDecay => 4,
        }
    }

    pub fn tail_len(self) -> usize {
        match self {
            CodecVariant::VenueSplitDecay => 2,
            _ => 0,
        }
    }

    pub fn vector_len(self, clubs: usize) -> usize {
        clubs * self.chunk_len() + self.tail_len()
    }

    pub fn venue_aware(self) -> bool {
        !matches!(self, CodecVariant::Neutral)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClubStrengths {
    Neutral(Vec<Strength>),
    Venue(Vec<VenueStrength>),
}

/// Fitted strengths of every registered club, plus the decay pair when the variant has one.
#[derive(Debug, Clone, PartialEq)]
pub struct StrengthMap {
    registry: ClubRegistry,
    strengths: ClubStrengths,
    decay: Option<DecayParams>,
}

impl StrengthMap {
    pub fn decode(vector: &[f64], registry: &ClubRegistry, variant: CodecVariant) -> Result<Self> {
        let expected = variant.vector_len(registry.len());
        if vector.len() != expected {
            return Err(ForecastError::InvalidVectorLength {
                actual: vector.len(),
                expected,
                clubs: registry.len(),
            });
        }

        let (body, tail) = vector.split_at(registry.len() * variant.chunk_len());
        let chunks = body.chunks_exact(variant.chunk_len());
        let strengths = match variant {
            CodecVariant::Neutral => ClubStrengths::Neutral(
                chunks
                    .map(|c| strength(c[0], c[1]))
                    .collect::<Result<Vec<_>>>()?,
            ),
            CodecVariant::VenueSplit | CodecVariant::VenueSplitDecay => ClubStrengths::Venue(
                chunks
                    .map(|c| {
                        Ok(VenueStrength {
                            home: strength(c[0], c[1])?,
                            away: strength(c[2], c[3])?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
        };

        let decay = match tail {
            [k, c] => Some(decay_params(*k, *c)?),
            _ => None,
        };

        Ok(Self {
            registry: registry.clone(),
            strengths,
            decay,
        })
    }

    pub fn encode(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.variant().vector_len(self.registry.len()));
        match &self.strengths {
            ClubStrengths::Neutral(rows) => {
                for s in rows {
                    out.extend([s.attack, s.defense]);
                }
            }
            ClubStrengths::Venue(rows) => {
                for v in rows {
                    out.extend([v.home.attack, v.home.defense, v.away.attack, v.away.defense]);
                }
            }
        }
        if let Some(d) = self.decay {
            out.extend([d.k, d.c]);
        }
        out
    }

    /// Re-encodes these strengths against another registry, matching clubs by name.
    ///
    /// Returns `None` when the layouts differ or a club of `registry` has no strengths
    /// here, in which case the caller starts from its default vector.
    pub fn warm_start_for(&self, registry: &ClubRegistry, variant: CodecVariant) -> Option<Vec<f64>> {
        if variant != self.variant() {
            return None;
        }
        let mut out = Vec::with_capacity(variant.vector_len(registry.len()));
        for club in registry.iter() {
            let idx = self.registry.index_of(club).ok()?;
            match &self.strengths {
                ClubStrengths::Neutral(rows) => {
                    let s = rows[idx];
                    out.extend([s.attack, s.defense]);
                }
                ClubStrengths::Venue(rows) => {
                    let v = rows[idx];
                    out.extend([v.home.attack, v.home.defense, v.away.attack, v.away.defense]);
                }
            }
        }
        if let Some(d) = self.decay {
            out.extend([d.k, d.c]);
        }
        Some(out)
    }

    pub fn variant(&self) -> CodecVariant {
        match (&self.strengths, self.decay) {
            (ClubStrengths::Neutral(_), _) => CodecVariant::Neutral,
            (ClubStrengths::Venue(_), None) => CodecVariant::VenueSplit,
            (ClubStrengths::Venue(_), Some(_)) => CodecVariant::VenueSplitDecay,
        }
    }

    pub fn registry(&self) -> &ClubRegistry {
        &self.registry
    }

    pub fn strengths(&self) -> &ClubStrengths {
        &self.strengths
    }

    pub fn decay(&self) -> Option<DecayParams> {
        self.decay
    }

    pub fn neutral(&self, club: &str) -> Result<Strength> {
        let idx = self.registry.index_of(club)?;
        match &self.strengths {
            ClubStrengths::Neutral(rows) => Ok(rows[idx]),
            ClubStrengths::Venue(_) => Err(ForecastError::InvalidParameter(
                "venue-split strengths have no neutral entry".to_string(),
            )),
        }
    }

    pub fn venue(&self, club: &str) -> Result<VenueStrength> {
        let idx = self.registry.index_of(club)?;
        match &self.strengths {
            ClubStrengths::Venue(rows) => Ok(rows[idx]),
            ClubStrengths::Neutral(_) => Err(ForecastError::InvalidParameter(
                "neutral strengths have no venue entries".to_string(),
            )),
        }
    }

    /// Poisson rates `(home goals, away goals)` for a fixture between two registry indices.
    ///
    /// Venue-split strengths use the home entry of the home club and the away entry of
    /// the away club.
    pub fn rates(&self, home: usize, away: usize) -> (f64, f64) {
        match &self.strengths {
            ClubStrengths::Neutral(rows) => {
                let (h, a) = (rows[home], rows[away]);
                (h.attack / a.defense, a.attack / h.defense)
            }
            ClubStrengths::Venue(rows) => {
                let (h, a) = (rows[home].home, rows[away].away);
                (h.attack / a.defense, a.attack / h.defense)
            }
        }
    }

    pub fn rates_for(&self, home: &str, away: &str) -> Result<(f64, f64)> {
        let h = self.registry.index_of(home)?;
        let a = self.registry.index_of(away)?;
        Ok(self.rates(h, a))
    }
}

fn strength(attack: f64, defense: f64) -> Result<Strength> {
    for (label, v) in [("attack", attack), ("defense", defense)] {
        if !(v.is_finite() && v > 0.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "{label} strength must be positive and finite, got {v}"
            )));
        }
    }
    Ok(Strength { attack, defense })
}

fn decay_params(k: f64, c: f64) -> Result<DecayParams> {
    if !(k.is_finite() && k > 0.0) || !(c.is_finite() && c >= 0.0) {
        return Err(ForecastError::InvalidParameter(format!(
            "decay parameters need k > 0 and c >= 0, got k={k}, c={c}"
        )));
    }
    Ok(DecayParams { k, c })
}
