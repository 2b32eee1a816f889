//! Forward portfolio simulation with periodic rebalancing against a benchmark.

use super::error::FundrankError;
use super::performance::PerformanceMetrics;
use super::portfolio::{EquityPoint, Portfolio};
use super::price::PriceSeries;
use crate::ports::config_port::ConfigPort;
use crate::ports::price_port::PricePort;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

const WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebalanceCadence {
    Monthly,
    Quarterly,
    Annually,
    Never,
}

impl RebalanceCadence {
    pub fn parse(input: &str) -> Result<Self, FundrankError> {
        match input.trim().to_lowercase().as_str() {
            "monthly" => Ok(RebalanceCadence::Monthly),
            "quarterly" => Ok(RebalanceCadence::Quarterly),
            "annually" | "yearly" => Ok(RebalanceCadence::Annually),
            "never" | "none" => Ok(RebalanceCadence::Never),
            other => Err(FundrankError::config_invalid(
                "simulation",
                "cadence",
                format!("unknown cadence '{other}'"),
            )),
        }
    }

    /// Identifies the calendar period a date falls in; a change of key marks
    /// a rebalance date.
    pub fn period_key(self, date: NaiveDate) -> Option<(i32, u32)> {
        match self {
            RebalanceCadence::Monthly => Some((date.year(), date.month())),
            RebalanceCadence::Quarterly => Some((date.year(), (date.month() - 1) / 3)),
            RebalanceCadence::Annually => Some((date.year(), 0)),
            RebalanceCadence::Never => None,
        }
    }
}

impl fmt::Display for RebalanceCadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RebalanceCadence::Monthly => "monthly",
            RebalanceCadence::Quarterly => "quarterly",
            RebalanceCadence::Annually => "annually",
            RebalanceCadence::Never => "never",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub weights: BTreeMap<String, f64>,
    pub cadence: RebalanceCadence,
    pub benchmark_id: Option<String>,
    pub risk_free_rate: f64,
    pub staleness_days: i64,
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), FundrankError> {
        if self.end_date <= self.start_date {
            return Err(FundrankError::config_invalid(
                "simulation",
                "end_date",
                "must be after start_date",
            ));
        }
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(FundrankError::config_invalid(
                "simulation",
                "initial_capital",
                "must be positive",
            ));
        }
        if self.weights.is_empty() {
            return Err(FundrankError::config_invalid(
                "simulation",
                "weights",
                "at least one holding is required",
            ));
        }
        if let Some((id, w)) = self.weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(FundrankError::config_invalid(
                "simulation",
                "weights",
                format!("weight for {id} is {w}"),
            ));
        }
        let sum: f64 = self.weights.values().sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(FundrankError::config_invalid(
                "simulation",
                "weights",
                format!("weights sum to {sum}, expected 1"),
            ));
        }
        if self.staleness_days < 0 {
            return Err(FundrankError::config_invalid(
                "simulation",
                "staleness_days",
                "must not be negative",
            ));
        }
        Ok(())
    }

    /// Builds a config from the `[simulation]` section.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FundrankError> {
        let start_date = required_date(config, "simulation", "start_date")?;
        let end_date = required_date(config, "simulation", "end_date")?;
        let weights = parse_weights(
            &config
                .get_string("simulation", "weights")
                .ok_or_else(|| FundrankError::ConfigMissing {
                    section: "simulation".to_string(),
                    key: "weights".to_string(),
                })?,
        )?;
        let cadence = match config.get_string("simulation", "cadence") {
            Some(c) => RebalanceCadence::parse(&c)?,
            None => RebalanceCadence::Quarterly,
        };

        let sim = SimulationConfig {
            id: config
                .get_string("simulation", "id")
                .unwrap_or_else(|| format!("sim-{start_date}-{end_date}")),
            start_date,
            end_date,
            initial_capital: config.get_double("simulation", "initial_capital", 100_000.0),
            weights,
            cadence,
            benchmark_id: config
                .get_string("simulation", "benchmark")
                .filter(|b| !b.trim().is_empty()),
            risk_free_rate: config.get_double("simulation", "risk_free_rate", 0.065),
            staleness_days: config.get_int("simulation", "staleness_days", 5),
        };
        sim.validate()?;
        Ok(sim)
    }
}

pub(crate) fn required_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<NaiveDate, FundrankError> {
    let raw = config
        .get_string(section, key)
        .ok_or_else(|| FundrankError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        })?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| FundrankError::config_invalid(section, key, e.to_string()))
}

/// Parses `"id:weight, id:weight"`.
pub fn parse_weights(input: &str) -> Result<BTreeMap<String, f64>, FundrankError> {
    let mut weights = BTreeMap::new();
    for entry in input.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let bad = |why: &str| {
            FundrankError::config_invalid("simulation", "weights", format!("'{entry}' {why}"))
        };
        let (id, w) = entry.rsplit_once(':').ok_or_else(|| bad("is not id:weight"))?;
        let w: f64 = w.trim().parse().map_err(|_| bad("has a bad weight"))?;
        weights.insert(id.trim().to_string(), w);
    }
    Ok(weights)
}

/// A rebalance back to target weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rebalance {
    pub date: NaiveDate,
    pub value_before: f64,
    pub drifted_weights: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRun {
    pub id: String,
    pub config: SimulationConfig,
    pub portfolio_series: Vec<EquityPoint>,
    pub benchmark_series: Vec<EquityPoint>,
    pub rebalances: Vec<Rebalance>,
    pub portfolio_metrics: PerformanceMetrics,
    pub benchmark_metrics: Option<PerformanceMetrics>,
    /// Dates on which some holding had no price within the staleness window.
    pub excluded_dates: Vec<NaiveDate>,
}

fn load_series(
    port: &dyn PricePort,
    id: &str,
    config: &SimulationConfig,
) -> Result<PriceSeries, FundrankError> {
    let points = port.get_series(
        id,
        config.start_date - Duration::days(config.staleness_days),
        config.end_date,
    )?;
    Ok(PriceSeries::new(id, points))
}

fn prices_on(
    series: &BTreeMap<String, PriceSeries>,
    date: NaiveDate,
    staleness_days: i64,
) -> Option<BTreeMap<String, f64>> {
    series
        .iter()
        .map(|(id, s)| s.nearest(date, staleness_days).map(|p| (id.clone(), p.value)))
        .collect()
}

/// Simulates the configured weights over `[start_date, end_date]`.
///
/// Prices carry forward within the staleness window; a date on which any
/// holding lacks a price is skipped and reported in `excluded_dates`.
pub fn run_simulation(
    port: &dyn PricePort,
    config: &SimulationConfig,
) -> Result<BacktestRun, FundrankError> {
    config.validate()?;

    let mut holdings = BTreeMap::new();
    for id in config.weights.keys() {
        holdings.insert(id.clone(), load_series(port, id, config)?);
    }

    let timeline: BTreeSet<NaiveDate> = holdings
        .values()
        .flat_map(|s| s.points().iter().map(|p| p.date))
        .filter(|d| *d >= config.start_date && *d <= config.end_date)
        .collect();

    let mut portfolio = Portfolio::new();
    let mut rebalances = Vec::new();
    let mut excluded_dates = Vec::new();
    let mut current_period = None;

    for date in timeline {
        let Some(prices) = prices_on(&holdings, date, config.staleness_days) else {
            excluded_dates.push(date);
            continue;
        };

        let period = config.cadence.period_key(date);
        if !portfolio.is_allocated() {
            portfolio.allocate(config.initial_capital, &config.weights, &prices);
            tracing::debug!(%date, capital = config.initial_capital, "initial allocation");
        } else if period.is_some() && period != current_period {
            let value = portfolio.total_equity(&prices);
            rebalances.push(Rebalance {
                date,
                value_before: value,
                drifted_weights: portfolio.weights(&prices),
            });
            portfolio.allocate(value, &config.weights, &prices);
        }
        current_period = period;

        let equity = portfolio.total_equity(&prices);
        portfolio.record_equity(date, equity);
    }

    let Some(first_date) = portfolio.equity_curve.first().map(|p| p.date) else {
        return Err(FundrankError::InsufficientHistory {
            instrument: config.weights.keys().cloned().collect::<Vec<_>>().join(","),
            have: 0,
            need: 1,
        });
    };
    if !excluded_dates.is_empty() {
        tracing::warn!(
            run = %config.id,
            excluded = excluded_dates.len(),
            "dates excluded for missing prices"
        );
    }

    let benchmark_series = match &config.benchmark_id {
        Some(id) => benchmark_curve(port, id, config, first_date, &portfolio.equity_curve)?,
        None => Vec::new(),
    };

    let portfolio_metrics =
        PerformanceMetrics::compute(&portfolio.equity_curve, config.risk_free_rate);
    let benchmark_metrics = config
        .benchmark_id
        .as_ref()
        .map(|_| PerformanceMetrics::compute(&benchmark_series, config.risk_free_rate));

    tracing::info!(
        run = %config.id,
        points = portfolio.equity_curve.len(),
        rebalances = rebalances.len(),
        total_return = portfolio_metrics.total_return,
        "simulation complete"
    );

    Ok(BacktestRun {
        id: config.id.clone(),
        config: config.clone(),
        portfolio_series: portfolio.equity_curve,
        benchmark_series,
        rebalances,
        portfolio_metrics,
        benchmark_metrics,
        excluded_dates,
    })
}

/// Benchmark value on each portfolio date, seeded with the initial capital at
/// the first valued date.
fn benchmark_curve(
    port: &dyn PricePort,
    id: &str,
    config: &SimulationConfig,
    first_date: NaiveDate,
    dates: &[EquityPoint],
) -> Result<Vec<EquityPoint>, FundrankError> {
    let series = load_series(port, id, config)?;
    let seed = series
        .nearest(first_date, config.staleness_days)
        .ok_or_else(|| FundrankError::InsufficientHistory {
            instrument: id.to_string(),
            have: 0,
            need: 1,
        })?;
    let units = config.initial_capital / seed.value;

    Ok(dates
        .iter()
        .filter_map(|p| {
            series
                .nearest(p.date, config.staleness_days)
                .map(|price| EquityPoint {
                    date: p.date,
                    equity: units * price.value,
                })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadence_period_keys() {
        let jan = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let feb = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let apr = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        assert_ne!(
            RebalanceCadence::Monthly.period_key(jan),
            RebalanceCadence::Monthly.period_key(feb)
        );
        assert_eq!(
            RebalanceCadence::Quarterly.period_key(jan),
            RebalanceCadence::Quarterly.period_key(feb)
        );
        assert_ne!(
            RebalanceCadence::Quarterly.period_key(feb),
            RebalanceCadence::Quarterly.period_key(apr)
        );
        assert_eq!(RebalanceCadence::Never.period_key(jan), None);
    }

    #[test]
    fn cadence_parse() {
        assert_eq!(RebalanceCadence::parse("Monthly").unwrap(), RebalanceCadence::Monthly);
        assert_eq!(RebalanceCadence::parse("never").unwrap(), RebalanceCadence::Never);
        assert!(RebalanceCadence::parse("weekly").is_err());
    }

    #[test]
    fn parse_weights_list() {
        let w = parse_weights("119551:0.6, 120503:0.4").unwrap();
        assert_eq!(w.len(), 2);
        assert!((w["119551"] - 0.6).abs() < f64::EPSILON);
        assert!(parse_weights("119551=0.6").is_err());
        assert!(parse_weights("119551:abc").is_err());
    }

    fn sample_config() -> SimulationConfig {
        SimulationConfig {
            id: "t".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            initial_capital: 100_000.0,
            weights: parse_weights("A:0.6,B:0.4").unwrap(),
            cadence: RebalanceCadence::Quarterly,
            benchmark_id: None,
            risk_free_rate: 0.0,
            staleness_days: 5,
        }
    }

    #[test]
    fn config_validation() {
        assert!(sample_config().validate().is_ok());

        let mut c = sample_config();
        c.weights = parse_weights("A:0.6,B:0.3").unwrap();
        assert!(c.validate().is_err());

        let mut c = sample_config();
        c.weights = parse_weights("A:1.2,B:-0.2").unwrap();
        assert!(c.validate().is_err());

        let mut c = sample_config();
        c.end_date = c.start_date;
        assert!(c.validate().is_err());

        let mut c = sample_config();
        c.initial_capital = 0.0;
        assert!(c.validate().is_err());
    }
}
