use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::estimator::EstimatorOptions;
use crate::registry::DEFAULT_SEASON_SIZE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub n_sims: usize,
    pub season_size: usize,
    /// Fixed seed for reproducible runs; a random one is drawn per run when unset.
    pub seed: Option<u64>,
    pub max_iters: u64,
    pub lbfgs_memory: usize,
    /// Size of a dedicated rayon pool; the global pool is used when unset.
    pub threads: Option<usize>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        let estimator = EstimatorOptions::default();
        Self {
            n_sims: 10_000,
            season_size: DEFAULT_SEASON_SIZE,
            seed: None,
            max_iters: estimator.max_iters,
            lbfgs_memory: estimator.lbfgs_memory,
            threads: None,
        }
    }
}

impl ForecastConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: ForecastConfig =
            serde_json::from_str(&raw).with_context(|| format!("parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse("N_SIMS") {
            self.n_sims = v;
        }
        if let Some(v) = env_parse("SEASON_SIZE") {
            self.season_size = v;
        }
        if let Some(v) = env_parse("FORECAST_SEED") {
            self.seed = Some(v);
        }
        if let Some(v) = env_parse("FORECAST_MAX_ITERS") {
            self.max_iters = v;
        }
        if let Some(v) = env_parse::<usize>("FORECAST_THREADS") {
            self.threads = Some(v.clamp(1, 256));
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.season_size < 2 {
            bail!("season_size must be at least 2, got {}", self.season_size);
        }
        if self.max_iters == 0 {
            bail!("max_iters must be positive");
        }
        Ok(())
    }

    pub fn estimator_options(&self) -> EstimatorOptions {
        EstimatorOptions {
            season_size: self.season_size,
            max_iters: self.max_iters,
            lbfgs_memory: self.lbfgs_memory.max(1),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: ForecastConfig = serde_json::from_str(r#"{"n_sims": 250, "seed": 7}"#).unwrap();
        assert_eq!(config.n_sims, 250);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.season_size, 20);
        assert_eq!(config.estimator_options().max_iters, 200);
    }

    #[test]
    fn validation_rejects_tiny_seasons() {
        let config = ForecastConfig {
            season_size: 1,
            ..ForecastConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(ForecastConfig::default().validate().is_ok());
    }
}
