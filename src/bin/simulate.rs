use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use league_forecast::config::ForecastConfig;
use league_forecast::dataset;
use league_forecast::models::{CutoffRule, ModelKind};
use league_forecast::orchestrator::Forecaster;
use league_forecast::results::ForecastResults;

const DEFAULT_DATA_PATH: &str = "data/matches.csv";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let data_path = parse_path_arg("--data").unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_PATH));
    let fixtures = dataset::load_fixtures(&data_path)
        .with_context(|| format!("load fixtures from {}", data_path.display()))?;
    if fixtures.is_empty() {
        bail!("{} contains no fixtures", data_path.display());
    }

    let mut config = match parse_path_arg("--config") {
        Some(path) => ForecastConfig::load(&path)?,
        None => ForecastConfig::default(),
    }
    .with_env_overrides();
    if let Some(n) = parse_arg::<usize>("--sims") {
        config.n_sims = n;
    }
    if let Some(seed) = parse_arg::<u64>("--seed") {
        config.seed = Some(seed);
    }
    config.validate()?;

    let models = match arg_value("--models") {
        Some(raw) => raw
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(ModelKind::from_str)
            .collect::<std::result::Result<Vec<_>, _>>()?,
        None => ModelKind::ALL.to_vec(),
    };

    let years = match arg_value("--years") {
        Some(raw) => parse_span_list::<i32>(&raw)?,
        None => fixtures
            .iter()
            .map(|f| f.year)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    };
    let explicit_rounds = arg_value("--rounds")
        .map(|raw| parse_span_list::<u32>(&raw))
        .transpose()?;
    let rounds_for = |rule: CutoffRule| match &explicit_rounds {
        Some(rounds) => rounds.clone(),
        None => rule.usable_rounds(&fixtures),
    };
    let rounds = rounds_for(CutoffRule::Round);
    let date_rounds = rounds_for(CutoffRule::Date);

    info!(
        fixtures = fixtures.len(),
        models = models.len(),
        years = years.len(),
        rounds = rounds.len(),
        n_sims = config.n_sims,
        "starting forecast"
    );

    let started = Instant::now();
    let forecaster = Forecaster::new(config);
    let (date_models, round_models): (Vec<ModelKind>, Vec<ModelKind>) = models
        .iter()
        .copied()
        .partition(|m| m.cutoff_rule() == CutoffRule::Date);
    let mut runs = forecaster.run_models(&round_models, &fixtures, &years, &rounds);
    runs.extend(forecaster.run_models(&date_models, &fixtures, &years, &date_rounds));

    let mut report = serde_json::Map::new();
    let mut failures = 0usize;
    for run in runs {
        match run.result {
            Ok(results) => {
                print_summary(run.model, &results);
                report.insert(run.model.name().to_string(), serde_json::to_value(&results)?);
            }
            Err(err) => {
                failures += 1;
                warn!(model = %run.model, "skipped: {err}");
                report.insert(
                    run.model.name().to_string(),
                    json!({ "error": err.to_string() }),
                );
            }
        }
    }
    info!(
        elapsed_secs = started.elapsed().as_secs_f64(),
        failures,
        "forecast finished"
    );

    if let Some(out) = parse_path_arg("--out") {
        if let Some(parent) = out.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output dir {}", parent.display()))?;
        }
        let body = serde_json::to_string_pretty(&report).context("serialize results")?;
        fs::write(&out, body).with_context(|| format!("write {}", out.display()))?;
        println!("wrote {}", out.display());
    }

    if failures == models.len() {
        return Err(anyhow!("every model failed"));
    }
    Ok(())
}

fn print_summary(model: ModelKind, results: &ForecastResults) {
    for (year, rounds) in &results.tally.years {
        let Some((round, clubs)) = rounds.iter().next_back() else {
            continue;
        };
        let mut rows = clubs
            .keys()
            .filter_map(|club| {
                results
                    .tally
                    .expected_position(*year, *round, club)
                    .map(|pos| (club.as_str(), pos))
            })
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(b.0)));

        println!("{model} | {year} after round {round}");
        for (club, pos) in rows {
            let title = results
                .tally
                .probabilities(*year, *round, club)
                .and_then(|p| p.first().copied())
                .unwrap_or(0.0);
            println!("  {club:<24} exp {pos:>5.2}  title {:>5.1}%", title * 100.0);
        }
    }
}

/// Comma separated values, each either a single value or an inclusive `a-b` span.
fn parse_span_list<T>(raw: &str) -> Result<Vec<T>>
where
    T: FromStr + Copy + Ord + Into<i64> + TryFrom<i64>,
{
    let mut out = BTreeSet::new();
    for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let parse = |s: &str| {
            s.trim()
                .parse::<T>()
                .map_err(|_| anyhow!("invalid value `{s}` in `{raw}`"))
        };
        match part.split_once('-') {
            Some((lo, hi)) if !lo.trim().is_empty() => {
                let (lo, hi): (i64, i64) = (parse(lo)?.into(), parse(hi)?.into());
                if lo > hi {
                    bail!("empty span `{part}`");
                }
                for v in lo..=hi {
                    out.insert(T::try_from(v).map_err(|_| anyhow!("span `{part}` out of range"))?);
                }
            }
            _ => {
                out.insert(parse(part)?);
            }
        }
    }
    Ok(out.into_iter().collect())
}

fn arg_value(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(v) = arg.strip_prefix(&format!("{name}="))
            && !v.trim().is_empty()
        {
            return Some(v.trim().to_string());
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn parse_arg<T: FromStr>(name: &str) -> Option<T> {
    arg_value(name).and_then(|v| v.parse::<T>().ok())
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    arg_value(name).map(PathBuf::from)
}
