//! Composite scoring: sub-metrics to points via bucket tables, grouped into
//! bounded components.
//!
//! Component ceilings: historical returns 40, risk grade 30, fundamentals 20,
//! other metrics 10. Every metric has its own ceiling and the ceilings of a
//! component's metrics add up to the component ceiling, so a total never
//! exceeds [`TOTAL_CEILING`].

use crate::domain::error::FundrankError;
use crate::domain::instrument::Instrument;
use crate::domain::price::PointInTimeSeries;
use crate::domain::returns::{compute_returns, history_years, rolling_consistency, ReturnPeriod};
use crate::domain::risk::{compute_risk, RiskSettings, RiskStats};
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const TOTAL_CEILING: f64 = 100.0;
pub const SCORE_TOLERANCE: f64 = 1e-6;
pub const DEFAULT_TABLE_VERSION: &str = "v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Component {
    HistoricalReturns,
    RiskGrade,
    Fundamentals,
    OtherMetrics,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::HistoricalReturns,
        Component::RiskGrade,
        Component::Fundamentals,
        Component::OtherMetrics,
    ];

    pub fn ceiling(self) -> f64 {
        match self {
            Component::HistoricalReturns => 40.0,
            Component::RiskGrade => 30.0,
            Component::Fundamentals => 20.0,
            Component::OtherMetrics => 10.0,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Component::HistoricalReturns => "historical_returns",
            Component::RiskGrade => "risk_grade",
            Component::Fundamentals => "fundamentals",
            Component::OtherMetrics => "other_metrics",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    Return3m,
    Return6m,
    Return1y,
    Return3y,
    Return5y,
    Volatility,
    MaxDrawdown,
    Sharpe,
    Sortino,
    ExpenseRatio,
    Aum,
    Consistency,
    HistoryYears,
}

impl Metric {
    pub const ALL: [Metric; 13] = [
        Metric::Return3m,
        Metric::Return6m,
        Metric::Return1y,
        Metric::Return3y,
        Metric::Return5y,
        Metric::Volatility,
        Metric::MaxDrawdown,
        Metric::Sharpe,
        Metric::Sortino,
        Metric::ExpenseRatio,
        Metric::Aum,
        Metric::Consistency,
        Metric::HistoryYears,
    ];

    pub fn component(self) -> Component {
        match self {
            Metric::Return3m
            | Metric::Return6m
            | Metric::Return1y
            | Metric::Return3y
            | Metric::Return5y => Component::HistoricalReturns,
            Metric::Volatility | Metric::MaxDrawdown | Metric::Sharpe | Metric::Sortino => {
                Component::RiskGrade
            }
            Metric::ExpenseRatio | Metric::Aum => Component::Fundamentals,
            Metric::Consistency | Metric::HistoryYears => Component::OtherMetrics,
        }
    }

    pub fn ceiling(self) -> f64 {
        match self {
            Metric::Return3m | Metric::Return6m => 5.0,
            Metric::Return1y | Metric::Return3y | Metric::Return5y => 10.0,
            Metric::Volatility | Metric::MaxDrawdown => 10.0,
            Metric::Sharpe | Metric::Sortino => 5.0,
            Metric::ExpenseRatio | Metric::Aum => 10.0,
            Metric::Consistency | Metric::HistoryYears => 5.0,
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            Metric::Volatility | Metric::MaxDrawdown | Metric::ExpenseRatio => {
                Direction::LowerIsBetter
            }
            _ => Direction::HigherIsBetter,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Metric::Return3m => "return_3m",
            Metric::Return6m => "return_6m",
            Metric::Return1y => "return_1y",
            Metric::Return3y => "return_3y",
            Metric::Return5y => "return_5y",
            Metric::Volatility => "volatility",
            Metric::MaxDrawdown => "max_drawdown",
            Metric::Sharpe => "sharpe",
            Metric::Sortino => "sortino",
            Metric::ExpenseRatio => "expense_ratio",
            Metric::Aum => "aum",
            Metric::Consistency => "consistency",
            Metric::HistoryYears => "history_years",
        }
    }

    fn return_period(self) -> Option<ReturnPeriod> {
        match self {
            Metric::Return3m => Some(ReturnPeriod::ThreeMonths),
            Metric::Return6m => Some(ReturnPeriod::SixMonths),
            Metric::Return1y => Some(ReturnPeriod::OneYear),
            Metric::Return3y => Some(ReturnPeriod::ThreeYears),
            Metric::Return5y => Some(ReturnPeriod::FiveYears),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub threshold: f64,
    pub points: f64,
}

/// Monotonic step function from a raw metric to points.
///
/// Tiers are checked best-first; the first tier the value reaches awards its
/// points, and a value reaching no tier scores zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketTable {
    direction: Direction,
    tiers: Vec<Tier>,
}

impl BucketTable {
    pub fn new(direction: Direction, tiers: &[(f64, f64)], ceiling: f64) -> Result<Self, String> {
        if tiers.is_empty() {
            return Err("table has no tiers".to_string());
        }
        for (i, &(threshold, points)) in tiers.iter().enumerate() {
            if !threshold.is_finite() || !points.is_finite() {
                return Err(format!("tier {} is not finite", i + 1));
            }
            if points < 0.0 {
                return Err(format!("tier {} awards negative points", i + 1));
            }
            if points > ceiling {
                return Err(format!(
                    "tier {} awards {} points, ceiling is {}",
                    i + 1,
                    points,
                    ceiling
                ));
            }
        }
        for (i, pair) in tiers.windows(2).enumerate() {
            let ordered = match direction {
                Direction::HigherIsBetter => pair[1].0 < pair[0].0,
                Direction::LowerIsBetter => pair[1].0 > pair[0].0,
            };
            if !ordered {
                return Err(format!("tier {} threshold is out of order", i + 2));
            }
            if pair[1].1 > pair[0].1 {
                return Err(format!("tier {} awards more than the tier above it", i + 2));
            }
        }

        Ok(BucketTable {
            direction,
            tiers: tiers
                .iter()
                .map(|&(threshold, points)| Tier { threshold, points })
                .collect(),
        })
    }

    /// Parses `threshold:points, threshold:points, ...`.
    pub fn parse(direction: Direction, input: &str, ceiling: f64) -> Result<Self, String> {
        let mut tiers = Vec::new();
        for token in input.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let (threshold, points) = token
                .split_once(':')
                .ok_or_else(|| format!("expected threshold:points, got '{}'", token))?;
            let threshold: f64 = threshold
                .trim()
                .parse()
                .map_err(|_| format!("invalid threshold '{}'", threshold.trim()))?;
            let points: f64 = points
                .trim()
                .parse()
                .map_err(|_| format!("invalid points '{}'", points.trim()))?;
            tiers.push((threshold, points));
        }
        Self::new(direction, &tiers, ceiling)
    }

    pub fn points(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return 0.0;
        }
        self.tiers
            .iter()
            .find(|tier| match self.direction {
                Direction::HigherIsBetter => value >= tier.threshold,
                Direction::LowerIsBetter => value <= tier.threshold,
            })
            .map(|tier| tier.points)
            .unwrap_or(0.0)
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }
}

/// Placeholder calibration. Returns are fractions, expense ratio is in
/// percent, AUM is in crores.
const DEFAULT_V1_TIERS: [(Metric, &[(f64, f64)]); 13] = [
    (Metric::Return3m, &[(0.08, 5.0), (0.05, 4.0), (0.02, 3.0), (0.0, 2.0), (-0.05, 1.0)]),
    (Metric::Return6m, &[(0.15, 5.0), (0.10, 4.0), (0.05, 3.0), (0.0, 2.0), (-0.05, 1.0)]),
    (Metric::Return1y, &[(0.25, 10.0), (0.18, 8.0), (0.12, 6.0), (0.06, 4.0), (0.0, 2.0)]),
    (Metric::Return3y, &[(0.20, 10.0), (0.15, 8.0), (0.10, 6.0), (0.06, 4.0), (0.0, 2.0)]),
    (Metric::Return5y, &[(0.18, 10.0), (0.14, 8.0), (0.10, 6.0), (0.06, 4.0), (0.0, 2.0)]),
    (Metric::Volatility, &[(0.05, 10.0), (0.10, 8.0), (0.15, 6.0), (0.20, 4.0), (0.30, 2.0)]),
    (Metric::MaxDrawdown, &[(0.05, 10.0), (0.10, 8.0), (0.20, 6.0), (0.30, 4.0), (0.40, 2.0)]),
    (Metric::Sharpe, &[(1.5, 5.0), (1.0, 4.0), (0.5, 3.0), (0.0, 2.0), (-0.5, 1.0)]),
    (Metric::Sortino, &[(2.0, 5.0), (1.5, 4.0), (1.0, 3.0), (0.0, 2.0), (-0.5, 1.0)]),
    (Metric::ExpenseRatio, &[(0.5, 10.0), (1.0, 8.0), (1.5, 6.0), (2.0, 4.0), (2.5, 2.0)]),
    (Metric::Aum, &[(10_000.0, 10.0), (5_000.0, 8.0), (1_000.0, 6.0), (500.0, 4.0), (100.0, 2.0)]),
    (Metric::Consistency, &[(0.8, 5.0), (0.7, 4.0), (0.6, 3.0), (0.5, 2.0), (0.4, 1.0)]),
    (Metric::HistoryYears, &[(10.0, 5.0), (7.0, 4.0), (5.0, 3.0), (3.0, 2.0), (1.0, 1.0)]),
];

/// Versioned set of bucket tables, one per metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub version: String,
    tables: BTreeMap<Metric, BucketTable>,
}

impl ScoringConfig {
    /// Built from the placeholder tiers; every metric gets a table.
    pub fn default_v1() -> Self {
        let mut tables = BTreeMap::new();
        for (metric, tiers) in DEFAULT_V1_TIERS {
            match BucketTable::new(metric.direction(), tiers, metric.ceiling()) {
                Ok(table) => {
                    tables.insert(metric, table);
                }
                Err(reason) => {
                    tracing::error!(metric = metric.key(), %reason, "default table rejected");
                }
            }
        }
        ScoringConfig {
            version: DEFAULT_TABLE_VERSION.to_string(),
            tables,
        }
    }

    /// Default tables with any `[scoring_tables]` overrides applied.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FundrankError> {
        let mut scoring = Self::default_v1();
        let mut overridden = false;

        for metric in Metric::ALL {
            if let Some(spec) = config.get_string("scoring_tables", metric.key()) {
                let table = BucketTable::parse(metric.direction(), &spec, metric.ceiling())
                    .map_err(|reason| {
                        FundrankError::config_invalid("scoring_tables", metric.key(), reason)
                    })?;
                scoring.tables.insert(metric, table);
                overridden = true;
            }
        }

        scoring.version = match config.get_string("scoring_tables", "version") {
            Some(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ if overridden => format!("{}-custom", DEFAULT_TABLE_VERSION),
            _ => DEFAULT_TABLE_VERSION.to_string(),
        };
        Ok(scoring)
    }

    pub fn table(&self, metric: Metric) -> Option<&BucketTable> {
        self.tables.get(&metric)
    }
}

/// Raw sub-metric values for one instrument on one date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreInputs {
    pub returns: BTreeMap<ReturnPeriod, Option<f64>>,
    pub risk: Option<RiskStats>,
    pub expense_ratio: Option<f64>,
    pub aum: Option<f64>,
    pub consistency: Option<f64>,
    pub history_years: Option<f64>,
}

impl ScoreInputs {
    /// Derives every input from data available at the series fence.
    pub fn from_series(
        series: &PointInTimeSeries,
        instrument: Option<&Instrument>,
        staleness_days: i64,
        risk_settings: &RiskSettings,
    ) -> Self {
        let returns = compute_returns(series, staleness_days)
            .into_iter()
            .map(|m| (m.period, m.value))
            .collect();

        let risk = match compute_risk(series, risk_settings) {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::debug!(
                    instrument = series.series().instrument_id(),
                    error = %e,
                    "risk statistics omitted"
                );
                None
            }
        };

        ScoreInputs {
            returns,
            risk,
            expense_ratio: instrument.and_then(|i| i.expense_ratio),
            aum: instrument.and_then(|i| i.aum),
            consistency: rolling_consistency(series, staleness_days),
            history_years: history_years(series),
        }
    }

    pub fn metric_value(&self, metric: Metric) -> Option<f64> {
        if let Some(period) = metric.return_period() {
            return self.returns.get(&period).copied().flatten();
        }
        match metric {
            Metric::Volatility => self.risk.as_ref().map(|r| r.volatility),
            Metric::MaxDrawdown => self.risk.as_ref().map(|r| r.max_drawdown),
            Metric::Sharpe => self.risk.as_ref().and_then(|r| r.sharpe),
            Metric::Sortino => self.risk.as_ref().and_then(|r| r.sortino),
            Metric::ExpenseRatio => self.expense_ratio,
            Metric::Aum => self.aum,
            Metric::Consistency => self.consistency,
            Metric::HistoryYears => self.history_years,
            _ => None,
        }
    }

    pub fn has_any_return(&self) -> bool {
        Metric::ALL
            .iter()
            .filter(|m| m.component() == Component::HistoricalReturns)
            .any(|&m| self.metric_value(m).is_some())
    }

    /// Longest-horizon return available, used to order equal totals.
    pub fn tie_break(&self) -> Option<f64> {
        [
            Metric::Return5y,
            Metric::Return3y,
            Metric::Return1y,
            Metric::Return6m,
            Metric::Return3m,
        ]
        .iter()
        .find_map(|&m| self.metric_value(m))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricScore {
    pub metric: Metric,
    /// `None` when the input was unavailable; such a metric awards no points.
    pub raw: Option<f64>,
    pub points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentScore {
    pub component: Component,
    pub value: f64,
    pub max_value: f64,
    pub metrics: Vec<MetricScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub instrument_id: String,
    pub score_date: NaiveDate,
    pub total_score: f64,
    pub components: Vec<ComponentScore>,
    pub tie_break: Option<f64>,
    pub table_version: String,
}

impl CompositeScore {
    pub fn component(&self, component: Component) -> Option<&ComponentScore> {
        self.components.iter().find(|c| c.component == component)
    }

    pub fn missing_metrics(&self) -> Vec<Metric> {
        self.components
            .iter()
            .flat_map(|c| c.metrics.iter())
            .filter(|m| m.raw.is_none())
            .map(|m| m.metric)
            .collect()
    }

    /// Checks the ceiling and sum invariants.
    pub fn validate(&self) -> Result<(), FundrankError> {
        let invalid = |reason: String| FundrankError::InvalidScore {
            instrument: self.instrument_id.clone(),
            reason,
        };

        let mut sum = 0.0;
        for c in &self.components {
            if c.value < 0.0 || c.value > c.max_value + SCORE_TOLERANCE {
                return Err(invalid(format!(
                    "{} = {} outside [0, {}]",
                    c.component, c.value, c.max_value
                )));
            }
            sum += c.value;
        }
        if (self.total_score - sum).abs() > SCORE_TOLERANCE {
            return Err(invalid(format!(
                "total {} differs from component sum {}",
                self.total_score, sum
            )));
        }
        if self.total_score > TOTAL_CEILING + SCORE_TOLERANCE {
            return Err(invalid(format!(
                "total {} exceeds ceiling {}",
                self.total_score, TOTAL_CEILING
            )));
        }
        Ok(())
    }
}

/// Scores one instrument from its inputs. Pure and deterministic.
pub fn score(
    instrument_id: &str,
    score_date: NaiveDate,
    inputs: &ScoreInputs,
    config: &ScoringConfig,
) -> Result<CompositeScore, FundrankError> {
    if !inputs.has_any_return() {
        return Err(FundrankError::InsufficientHistory {
            instrument: instrument_id.to_string(),
            have: 0,
            need: 1,
        });
    }

    let mut components = Vec::with_capacity(Component::ALL.len());
    for component in Component::ALL {
        let metrics: Vec<MetricScore> = Metric::ALL
            .iter()
            .filter(|m| m.component() == component)
            .map(|&metric| {
                let raw = inputs.metric_value(metric);
                let points = match (raw, config.table(metric)) {
                    (Some(v), Some(table)) => table.points(v),
                    _ => 0.0,
                };
                MetricScore { metric, raw, points }
            })
            .collect();

        let value = metrics.iter().map(|m| m.points).sum::<f64>();
        components.push(ComponentScore {
            component,
            value,
            max_value: component.ceiling(),
            metrics,
        });
    }

    let total_score = components.iter().map(|c| c.value).sum::<f64>();
    let composite = CompositeScore {
        instrument_id: instrument_id.to_string(),
        score_date,
        total_score,
        components,
        tie_break: inputs.tie_break(),
        table_version: config.version.clone(),
    };
    composite.validate()?;
    Ok(composite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn d() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 28).unwrap()
    }

    fn full_inputs() -> ScoreInputs {
        let mut returns = BTreeMap::new();
        returns.insert(ReturnPeriod::ThreeMonths, Some(0.06));
        returns.insert(ReturnPeriod::SixMonths, Some(0.12));
        returns.insert(ReturnPeriod::OneYear, Some(0.30));
        returns.insert(ReturnPeriod::ThreeYears, Some(0.16));
        returns.insert(ReturnPeriod::FiveYears, Some(0.12));
        ScoreInputs {
            returns,
            risk: Some(RiskStats {
                samples: 250,
                annualized_return: Some(0.3),
                volatility: 0.12,
                sharpe: Some(1.2),
                sortino: Some(2.5),
                max_drawdown: 0.08,
            }),
            expense_ratio: Some(0.8),
            aum: Some(7_500.0),
            consistency: Some(0.75),
            history_years: Some(12.0),
        }
    }

    #[test]
    fn metric_ceilings_sum_to_component_ceilings() {
        for component in Component::ALL {
            let sum: f64 = Metric::ALL
                .iter()
                .filter(|m| m.component() == component)
                .map(|m| m.ceiling())
                .sum();
            assert_relative_eq!(sum, component.ceiling());
        }
        let total: f64 = Component::ALL.iter().map(|c| c.ceiling()).sum();
        assert_relative_eq!(total, TOTAL_CEILING);
    }

    #[test]
    fn default_tables_cover_every_metric() {
        let config = ScoringConfig::default_v1();
        for metric in Metric::ALL {
            assert!(config.table(metric).is_some(), "missing table for {:?}", metric);
        }
    }

    #[test]
    fn default_tiers_pass_table_validation() {
        for (metric, tiers) in DEFAULT_V1_TIERS {
            if let Err(reason) = BucketTable::new(metric.direction(), tiers, metric.ceiling()) {
                panic!("default table for {metric:?} rejected: {reason}");
            }
        }
    }

    #[test]
    fn bucket_table_higher_is_better() {
        let table =
            BucketTable::new(Direction::HigherIsBetter, &[(0.2, 10.0), (0.1, 5.0)], 10.0).unwrap();
        assert_relative_eq!(table.points(0.25), 10.0);
        assert_relative_eq!(table.points(0.2), 10.0);
        assert_relative_eq!(table.points(0.15), 5.0);
        assert_relative_eq!(table.points(0.05), 0.0);
        assert_relative_eq!(table.points(f64::NAN), 0.0);
    }

    #[test]
    fn bucket_table_lower_is_better() {
        let table =
            BucketTable::new(Direction::LowerIsBetter, &[(0.5, 10.0), (1.0, 6.0)], 10.0).unwrap();
        assert_relative_eq!(table.points(0.3), 10.0);
        assert_relative_eq!(table.points(0.9), 6.0);
        assert_relative_eq!(table.points(1.1), 0.0);
    }

    #[test]
    fn bucket_table_rejects_unordered_thresholds() {
        let err = BucketTable::new(Direction::HigherIsBetter, &[(0.1, 10.0), (0.2, 5.0)], 10.0);
        assert!(err.is_err());
    }

    #[test]
    fn bucket_table_rejects_rising_points() {
        let err = BucketTable::new(Direction::HigherIsBetter, &[(0.2, 5.0), (0.1, 8.0)], 10.0);
        assert!(err.is_err());
    }

    #[test]
    fn bucket_table_rejects_points_above_ceiling() {
        let err = BucketTable::new(Direction::HigherIsBetter, &[(0.2, 12.0)], 10.0);
        assert!(err.is_err());
    }

    #[test]
    fn bucket_table_parse() {
        let table = BucketTable::parse(Direction::HigherIsBetter, "0.2:10, 0.1:5", 10.0).unwrap();
        assert_eq!(table.tiers().len(), 2);
        assert!(BucketTable::parse(Direction::HigherIsBetter, "0.2-10", 10.0).is_err());
        assert!(BucketTable::parse(Direction::HigherIsBetter, "abc:10", 10.0).is_err());
    }

    #[test]
    fn score_full_inputs() {
        let config = ScoringConfig::default_v1();
        let s = score("F1", d(), &full_inputs(), &config).unwrap();

        // returns: 4 + 4 + 10 + 8 + 6
        assert_relative_eq!(s.component(Component::HistoricalReturns).unwrap().value, 32.0);
        // risk: vol 6 + dd 8 + sharpe 4 + sortino 5
        assert_relative_eq!(s.component(Component::RiskGrade).unwrap().value, 23.0);
        // fundamentals: expense 8 + aum 8
        assert_relative_eq!(s.component(Component::Fundamentals).unwrap().value, 16.0);
        // other: consistency 4 + history 5
        assert_relative_eq!(s.component(Component::OtherMetrics).unwrap().value, 9.0);
        assert_relative_eq!(s.total_score, 80.0);
        assert_eq!(s.tie_break, Some(0.12));
        assert_eq!(s.table_version, "v1");
        assert!(s.missing_metrics().is_empty());
    }

    #[test]
    fn missing_metrics_award_nothing() {
        let mut inputs = full_inputs();
        inputs.risk = None;
        inputs.aum = None;
        let s = score("F1", d(), &inputs, &ScoringConfig::default_v1()).unwrap();
        assert_relative_eq!(s.component(Component::RiskGrade).unwrap().value, 0.0);
        let missing = s.missing_metrics();
        assert!(missing.contains(&Metric::Aum));
        assert!(missing.contains(&Metric::Sharpe));
        assert_eq!(missing.len(), 5);
    }

    #[test]
    fn no_returns_is_insufficient_history() {
        let inputs = ScoreInputs::default();
        let err = score("F1", d(), &inputs, &ScoringConfig::default_v1()).unwrap_err();
        assert!(matches!(err, FundrankError::InsufficientHistory { .. }));
    }

    #[test]
    fn tie_break_falls_back_to_shorter_horizon() {
        let mut inputs = full_inputs();
        inputs.returns.insert(ReturnPeriod::FiveYears, None);
        inputs.returns.insert(ReturnPeriod::ThreeYears, None);
        assert_eq!(inputs.tie_break(), Some(0.30));
    }

    #[test]
    fn scoring_is_bit_identical_across_calls() {
        let config = ScoringConfig::default_v1();
        let a = score("F1", d(), &full_inputs(), &config).unwrap();
        let b = score("F1", d(), &full_inputs(), &config).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.total_score.to_bits(), b.total_score.to_bits());
    }

    #[test]
    fn validate_catches_broken_sum() {
        let mut s = score("F1", d(), &full_inputs(), &ScoringConfig::default_v1()).unwrap();
        s.total_score += 1.0;
        assert!(matches!(s.validate(), Err(FundrankError::InvalidScore { .. })));
    }

    #[test]
    fn validate_catches_component_over_ceiling() {
        let mut s = score("F1", d(), &full_inputs(), &ScoringConfig::default_v1()).unwrap();
        s.components[3].value = 11.0;
        s.total_score = s.components.iter().map(|c| c.value).sum();
        assert!(s.validate().is_err());
    }

    #[test]
    fn config_overrides_mark_the_version() {
        use crate::adapters::file_config_adapter::FileConfigAdapter;

        let custom = FileConfigAdapter::from_string("[scoring_tables]\nreturn_1y = 0.5:10, 0.0:1\n")
            .unwrap();
        let scoring = ScoringConfig::from_config(&custom).unwrap();
        assert_eq!(scoring.version, "v1-custom");
        assert_eq!(scoring.table(Metric::Return1y).unwrap().points(0.2), 1.0);
        assert_eq!(
            scoring.table(Metric::Return3m),
            ScoringConfig::default_v1().table(Metric::Return3m)
        );

        let named = FileConfigAdapter::from_string("[scoring_tables]\nversion = 2024q3\n").unwrap();
        assert_eq!(ScoringConfig::from_config(&named).unwrap().version, "2024q3");
        assert_eq!(ScoringConfig::from_config(&FileConfigAdapter::empty()).unwrap().version, "v1");
    }
}
