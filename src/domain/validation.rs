//! Retrospective point-in-time validation of historical scores.
//!
//! Scores as of T0 (supplied or recomputed from series fenced at T0) are
//! compared with realised forward returns over one or more horizons.

use super::error::FundrankError;
use super::instrument::Scope;
use super::pipeline::{score_universe, ScoringSettings};
use super::price::PriceSeries;
use super::ranking::{quartile, rank_scope, MIN_SCOPE_SIZE};
use super::scoring::CompositeScore;
use super::simulation::required_date;
use super::stats::{mean, spearman};
use crate::ports::config_port::ConfigPort;
use crate::ports::price_port::PricePort;
use chrono::{Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_HORIZONS: [u32; 3] = [3, 6, 12];
pub const DEFAULT_CHECKPOINT_EVERY: usize = 100;

/// What a forward return must beat to count as outperformance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutperformanceThreshold {
    Fixed(f64),
    /// The benchmark's own forward return over the same horizon.
    Benchmark(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub run_id: String,
    pub t0: NaiveDate,
    pub horizons_months: Vec<u32>,
    pub threshold: OutperformanceThreshold,
    pub staleness_days: i64,
    pub min_scope_size: usize,
    /// Emit a checkpoint after this many instruments; 0 disables.
    pub checkpoint_every: usize,
}

impl ValidationConfig {
    pub fn new(t0: NaiveDate) -> Self {
        ValidationConfig {
            run_id: format!("validation-{t0}"),
            t0,
            horizons_months: DEFAULT_HORIZONS.to_vec(),
            threshold: OutperformanceThreshold::Fixed(0.0),
            staleness_days: 5,
            min_scope_size: MIN_SCOPE_SIZE,
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
        }
    }

    pub fn validate(&self) -> Result<(), FundrankError> {
        if self.horizons_months.is_empty() || self.horizons_months.contains(&0) {
            return Err(FundrankError::config_invalid(
                "validation",
                "horizons",
                "at least one positive horizon is required",
            ));
        }
        if self.staleness_days < 0 {
            return Err(FundrankError::config_invalid(
                "validation",
                "staleness_days",
                "must not be negative",
            ));
        }
        if let OutperformanceThreshold::Fixed(t) = self.threshold {
            if !t.is_finite() {
                return Err(FundrankError::config_invalid(
                    "validation",
                    "threshold",
                    "must be finite",
                ));
            }
        }
        Ok(())
    }

    /// Reads `[validation]`: `t0`, `horizons = 3,6,12`, `threshold` or
    /// `benchmark`, `staleness_days`, `checkpoint_every`.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FundrankError> {
        let t0 = required_date(config, "validation", "t0")?;
        let mut v = ValidationConfig::new(t0);

        if let Some(id) = config.get_string("validation", "run_id") {
            v.run_id = id;
        }
        if let Some(raw) = config.get_string("validation", "horizons") {
            v.horizons_months = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<u32>().map_err(|_| {
                        FundrankError::config_invalid(
                            "validation",
                            "horizons",
                            format!("'{s}' is not a month count"),
                        )
                    })
                })
                .collect::<Result<_, _>>()?;
        }
        v.threshold = match config.get_string("validation", "benchmark") {
            Some(b) if !b.trim().is_empty() => {
                OutperformanceThreshold::Benchmark(b.trim().to_string())
            }
            _ => OutperformanceThreshold::Fixed(config.get_double("validation", "threshold", 0.0)),
        };
        v.staleness_days = config.get_int("validation", "staleness_days", v.staleness_days);
        v.min_scope_size = config
            .get_int("ranking", "min_scope_size", v.min_scope_size as i64)
            .max(1) as usize;
        v.checkpoint_every = config
            .get_int("validation", "checkpoint_every", v.checkpoint_every as i64)
            .max(0) as usize;
        v.validate()?;
        Ok(v)
    }

    fn horizon_end(&self, months: u32) -> Result<NaiveDate, FundrankError> {
        self.t0
            .checked_add_months(Months::new(months))
            .ok_or_else(|| {
                FundrankError::config_invalid("validation", "horizons", "horizon out of range")
            })
    }
}

/// Where the T0 scores come from.
#[derive(Debug, Clone)]
pub enum ScoreSnapshot {
    /// Previously stored scores; any dated after T0 abort the run.
    Supplied(Vec<CompositeScore>),
    /// Scores recomputed from series fenced at T0.
    Recompute(ScoringSettings),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonOutcome {
    pub horizon_months: u32,
    pub forward_return: Option<f64>,
    /// Quartile by forward return among instruments with an outcome.
    pub realized_quartile: Option<u8>,
    pub quartile_stable: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub instrument_id: String,
    pub score_date: NaiveDate,
    pub historical_score: f64,
    pub predicted_quartile: u8,
    pub outcomes: Vec<HorizonOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonSummary {
    pub horizon_months: u32,
    pub sample_size: usize,
    pub threshold: Option<f64>,
    pub rank_correlation: Option<f64>,
    /// Share of each T0 quartile (Q1 first) that beat the threshold.
    pub hit_rate_by_quartile: [Option<f64>; 4],
    pub accuracy: Option<f64>,
    pub q1_mean_return: Option<f64>,
    pub q4_mean_return: Option<f64>,
    pub q1_beats_q4: Option<bool>,
    pub quartile_stability: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub run_id: String,
    pub t0: NaiveDate,
    pub records: Vec<ValidationRecord>,
    pub summary: Vec<HorizonSummary>,
}

/// Resumable progress of a validation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: String,
    pub t0: Option<NaiveDate>,
    pub processed: Vec<String>,
    pub records: Vec<ValidationRecord>,
}

fn forward_return(
    series: &PriceSeries,
    t0: NaiveDate,
    end: NaiveDate,
    staleness_days: i64,
) -> Option<f64> {
    let base = series.nearest(t0, staleness_days)?;
    let outcome = series
        .nearest(end, staleness_days)
        .filter(|p| p.date > t0)?;
    Some((outcome.value - base.value) / base.value)
}

fn load_forward_series(
    port: &dyn PricePort,
    id: &str,
    config: &ValidationConfig,
    last_end: NaiveDate,
) -> Result<PriceSeries, FundrankError> {
    let points = port.get_series(id, config.t0 - Duration::days(config.staleness_days), last_end)?;
    Ok(PriceSeries::new(id, points))
}

fn snapshot_scores(
    port: &dyn PricePort,
    config: &ValidationConfig,
    snapshot: ScoreSnapshot,
) -> Result<Vec<CompositeScore>, FundrankError> {
    match snapshot {
        ScoreSnapshot::Supplied(scores) => {
            if let Some(late) = scores.iter().find(|s| s.score_date > config.t0) {
                return Err(FundrankError::TemporalViolation {
                    reason: format!(
                        "score for {} is dated {}, after T0 {}",
                        late.instrument_id, late.score_date, config.t0
                    ),
                });
            }
            Ok(scores)
        }
        ScoreSnapshot::Recompute(settings) => {
            let instruments = port.list_instruments()?;
            let universe = score_universe(
                port,
                &instruments,
                config.t0,
                &settings,
                &mut |_: &[CompositeScore]| Ok(()),
            )?;
            Ok(universe.scores)
        }
    }
}

/// Runs a validation as of `config.t0`.
///
/// `resume` continues from an earlier checkpoint of the same T0. Progress is
/// passed to `on_checkpoint` every `checkpoint_every` instruments and once at
/// the end.
pub fn run_validation(
    port: &dyn PricePort,
    config: &ValidationConfig,
    snapshot: ScoreSnapshot,
    resume: Option<Checkpoint>,
    on_checkpoint: &mut dyn FnMut(&Checkpoint) -> Result<(), FundrankError>,
) -> Result<ValidationReport, FundrankError> {
    config.validate()?;

    let scores = snapshot_scores(port, config, snapshot)?;
    let refs: Vec<&CompositeScore> = scores.iter().collect();
    let ranked = rank_scope(Scope::Overall, &refs, config.min_scope_size)?.into_records()?;

    let ends: Vec<NaiveDate> = config
        .horizons_months
        .iter()
        .map(|&h| config.horizon_end(h))
        .collect::<Result<_, _>>()?;
    let last_end = ends.iter().copied().max().unwrap_or(config.t0);

    let thresholds: Vec<Option<f64>> = match &config.threshold {
        OutperformanceThreshold::Fixed(t) => vec![Some(*t); ends.len()],
        OutperformanceThreshold::Benchmark(id) => {
            let series = load_forward_series(port, id, config, last_end)?;
            ends.iter()
                .map(|&end| {
                    let r = forward_return(&series, config.t0, end, config.staleness_days);
                    if r.is_none() {
                        tracing::warn!(benchmark = %id, %end, "benchmark outcome unavailable");
                    }
                    r
                })
                .collect()
        }
    };

    let mut checkpoint = match resume {
        Some(cp) if cp.t0.is_some_and(|t| t != config.t0) => {
            return Err(FundrankError::config_invalid(
                "validation",
                "resume",
                format!("checkpoint is for a different T0 than {}", config.t0),
            ));
        }
        Some(cp) => {
            tracing::info!(
                run = %config.run_id,
                processed = cp.processed.len(),
                "resuming validation"
            );
            cp
        }
        None => Checkpoint::default(),
    };
    checkpoint.run_id = config.run_id.clone();
    checkpoint.t0 = Some(config.t0);

    let done: BTreeSet<String> = checkpoint.processed.iter().cloned().collect();
    let mut attempted = 0usize;
    let mut unavailable = None;
    let mut unavailable_count = 0usize;
    let mut since_checkpoint = 0usize;

    for record in ranked.iter().filter(|r| !done.contains(&r.instrument_id)) {
        attempted += 1;
        let id = &record.instrument_id;
        let series = match load_forward_series(port, id, config, last_end) {
            Ok(s) => Some(s),
            // Left out of the checkpoint so a resumed run measures it again.
            Err(e @ FundrankError::SourceUnavailable { .. }) => {
                tracing::warn!(instrument = %id, error = %e, "source unavailable, left for resume");
                unavailable_count += 1;
                unavailable = Some(e);
                continue;
            }
            Err(e) if e.is_per_instrument() => {
                tracing::warn!(instrument = %id, error = %e, "forward prices unavailable");
                None
            }
            Err(e) => return Err(e),
        };

        let outcomes = config
            .horizons_months
            .iter()
            .zip(&ends)
            .map(|(&h, &end)| HorizonOutcome {
                horizon_months: h,
                forward_return: series
                    .as_ref()
                    .and_then(|s| forward_return(s, config.t0, end, config.staleness_days)),
                realized_quartile: None,
                quartile_stable: None,
            })
            .collect();

        checkpoint.records.push(ValidationRecord {
            instrument_id: id.clone(),
            score_date: record.score_date,
            historical_score: record.total_score,
            predicted_quartile: record.quartile,
            outcomes,
        });
        checkpoint.processed.push(id.clone());

        since_checkpoint += 1;
        if config.checkpoint_every > 0 && since_checkpoint >= config.checkpoint_every {
            on_checkpoint(&checkpoint)?;
            since_checkpoint = 0;
        }
    }
    if since_checkpoint > 0 {
        on_checkpoint(&checkpoint)?;
    }

    if attempted > 0 && unavailable_count == attempted {
        if let Some(e) = unavailable {
            return Err(e);
        }
    }

    let mut records = checkpoint.records;
    records.sort_by(|a, b| {
        a.predicted_quartile
            .cmp(&b.predicted_quartile)
            .then_with(|| b.historical_score.total_cmp(&a.historical_score))
            .then_with(|| a.instrument_id.cmp(&b.instrument_id))
    });

    let summary = config
        .horizons_months
        .iter()
        .enumerate()
        .map(|(i, &h)| summarize_horizon(&mut records, i, h, thresholds[i]))
        .collect();

    Ok(ValidationReport {
        run_id: config.run_id.clone(),
        t0: config.t0,
        records,
        summary,
    })
}

/// Fills realised quartiles for horizon `index` and summarises it.
fn summarize_horizon(
    records: &mut [ValidationRecord],
    index: usize,
    horizon_months: u32,
    threshold: Option<f64>,
) -> HorizonSummary {
    let included: Vec<usize> = (0..records.len())
        .filter(|&i| {
            records[i]
                .outcomes
                .get(index)
                .and_then(|o| o.forward_return)
                .is_some()
        })
        .collect();
    let n = included.len();
    let fr = |r: &ValidationRecord| r.outcomes[index].forward_return.unwrap_or(f64::NAN);

    // Re-rank the included set both ways so quartiles are comparable.
    let mut by_score = included.clone();
    by_score.sort_by(|&a, &b| {
        records[b]
            .historical_score
            .total_cmp(&records[a].historical_score)
            .then_with(|| records[a].instrument_id.cmp(&records[b].instrument_id))
    });
    let mut by_return = included.clone();
    by_return.sort_by(|&a, &b| {
        fr(&records[b])
            .total_cmp(&fr(&records[a]))
            .then_with(|| records[a].instrument_id.cmp(&records[b].instrument_id))
    });

    let score_quartile: BTreeMap<usize, u8> = by_score
        .iter()
        .enumerate()
        .map(|(rank, &i)| (i, quartile(rank + 1, n)))
        .collect();
    let mut stable = 0usize;
    for (rank, &i) in by_return.iter().enumerate() {
        let realized = quartile(rank + 1, n);
        let same = score_quartile.get(&i) == Some(&realized);
        if same {
            stable += 1;
        }
        let outcome = &mut records[i].outcomes[index];
        outcome.realized_quartile = Some(realized);
        outcome.quartile_stable = Some(same);
    }

    let scores: Vec<f64> = included.iter().map(|&i| records[i].historical_score).collect();
    let returns: Vec<f64> = included.iter().map(|&i| fr(&records[i])).collect();

    let mut hit_rate_by_quartile = [None; 4];
    for (q, slot) in hit_rate_by_quartile.iter_mut().enumerate() {
        let members: Vec<f64> = included
            .iter()
            .filter(|&&i| records[i].predicted_quartile as usize == q + 1)
            .map(|&i| fr(&records[i]))
            .collect();
        *slot = threshold.and_then(|t| {
            (!members.is_empty())
                .then(|| members.iter().filter(|&&r| r > t).count() as f64 / members.len() as f64)
        });
    }

    let accuracy = threshold.and_then(|t| {
        (n > 0).then(|| {
            let correct = included
                .iter()
                .filter(|&&i| (records[i].predicted_quartile <= 2) == (fr(&records[i]) > t))
                .count();
            correct as f64 / n as f64
        })
    });

    let quartile_mean = |q: u8| {
        let v: Vec<f64> = included
            .iter()
            .filter(|&&i| records[i].predicted_quartile == q)
            .map(|&i| fr(&records[i]))
            .collect();
        mean(&v)
    };
    let q1_mean_return = quartile_mean(1);
    let q4_mean_return = quartile_mean(4);

    HorizonSummary {
        horizon_months,
        sample_size: n,
        threshold,
        rank_correlation: spearman(&scores, &returns),
        hit_rate_by_quartile,
        accuracy,
        q1_mean_return,
        q4_mean_return,
        q1_beats_q4: q1_mean_return.zip(q4_mean_return).map(|(a, b)| a > b),
        quartile_stability: (n > 0).then(|| stable as f64 / n as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scoring::{score, ScoreInputs, ScoringConfig};
    use crate::domain::returns::ReturnPeriod;

    fn t0() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()
    }

    fn record(id: &str, score: f64, q: u8, fr: Option<f64>) -> ValidationRecord {
        ValidationRecord {
            instrument_id: id.to_string(),
            score_date: t0(),
            historical_score: score,
            predicted_quartile: q,
            outcomes: vec![HorizonOutcome {
                horizon_months: 3,
                forward_return: fr,
                realized_quartile: None,
                quartile_stable: None,
            }],
        }
    }

    #[test]
    fn perfect_prediction_summary() {
        let mut records = vec![
            record("A", 90.0, 1, Some(0.20)),
            record("B", 80.0, 2, Some(0.10)),
            record("C", 70.0, 3, Some(-0.05)),
            record("D", 60.0, 4, Some(-0.10)),
        ];
        let s = summarize_horizon(&mut records, 0, 3, Some(0.0));
        assert_eq!(s.sample_size, 4);
        assert!((s.rank_correlation.unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(s.accuracy, Some(1.0));
        assert_eq!(s.q1_beats_q4, Some(true));
        assert_eq!(s.quartile_stability, Some(1.0));
        assert_eq!(s.hit_rate_by_quartile, [Some(1.0), Some(1.0), Some(0.0), Some(0.0)]);
        assert!(records.iter().all(|r| r.outcomes[0].quartile_stable == Some(true)));
    }

    #[test]
    fn missing_outcomes_leave_numerator_and_denominator() {
        let mut records = vec![
            record("A", 90.0, 1, Some(0.20)),
            record("B", 80.0, 2, None),
            record("C", 70.0, 3, Some(0.05)),
            record("D", 60.0, 4, Some(-0.10)),
        ];
        let s = summarize_horizon(&mut records, 0, 3, Some(0.0));
        assert_eq!(s.sample_size, 3);
        assert_eq!(s.hit_rate_by_quartile[1], None);
        // C sits in Q3 but beat the threshold.
        assert!((s.accuracy.unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(records[1].outcomes[0].realized_quartile, None);
    }

    #[test]
    fn unknown_threshold_leaves_accuracy_undefined() {
        let mut records = vec![record("A", 90.0, 1, Some(0.2)), record("B", 10.0, 4, Some(0.1))];
        let s = summarize_horizon(&mut records, 0, 3, None);
        assert!(s.accuracy.is_none());
        assert!(s.hit_rate_by_quartile.iter().all(Option::is_none));
        assert!(s.rank_correlation.is_some());
    }

    #[test]
    fn config_rejects_empty_horizons() {
        let mut c = ValidationConfig::new(t0());
        c.horizons_months.clear();
        assert!(c.validate().is_err());
        c.horizons_months = vec![0];
        assert!(c.validate().is_err());
    }

    #[test]
    fn horizon_end_adds_calendar_months() {
        let c = ValidationConfig::new(NaiveDate::from_ymd_opt(2023, 11, 30).unwrap());
        assert_eq!(c.horizon_end(3).unwrap(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn supplied_scores_after_t0_are_rejected() {
        let mut inputs = ScoreInputs::default();
        inputs.returns.insert(ReturnPeriod::OneYear, Some(0.1));
        let late =
            score("A", t0() + Duration::days(1), &inputs, &ScoringConfig::default_v1()).unwrap();
        let config = ValidationConfig::new(t0());

        struct NoPrices;
        impl PricePort for NoPrices {
            fn get_series(
                &self,
                _: &str,
                _: NaiveDate,
                _: NaiveDate,
            ) -> Result<Vec<crate::domain::price::PricePoint>, FundrankError> {
                Ok(Vec::new())
            }
            fn get_instrument(
                &self,
                _: &str,
            ) -> Result<Option<crate::domain::instrument::Instrument>, FundrankError> {
                Ok(None)
            }
            fn list_instruments(
                &self,
            ) -> Result<Vec<crate::domain::instrument::Instrument>, FundrankError> {
                Ok(Vec::new())
            }
        }

        let err =
            snapshot_scores(&NoPrices, &config, ScoreSnapshot::Supplied(vec![late])).unwrap_err();
        assert!(matches!(err, FundrankError::TemporalViolation { .. }));
    }
}
