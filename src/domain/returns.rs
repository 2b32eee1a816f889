//! Period returns over a price series.
//!
//! Missing history yields an error (and `None` in a [`ReturnMetric`]), never a
//! zero return.

use crate::domain::error::FundrankError;
use crate::domain::price::{PointInTimeSeries, PriceSeries};
use crate::domain::stats::{annualize, DAYS_PER_YEAR};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReturnPeriod {
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
    ThreeYears,
    FiveYears,
}

impl ReturnPeriod {
    pub const ALL: [ReturnPeriod; 6] = [
        ReturnPeriod::OneMonth,
        ReturnPeriod::ThreeMonths,
        ReturnPeriod::SixMonths,
        ReturnPeriod::OneYear,
        ReturnPeriod::ThreeYears,
        ReturnPeriod::FiveYears,
    ];

    pub fn lookback_days(self) -> i64 {
        match self {
            ReturnPeriod::OneMonth => 30,
            ReturnPeriod::ThreeMonths => 90,
            ReturnPeriod::SixMonths => 180,
            ReturnPeriod::OneYear => 365,
            ReturnPeriod::ThreeYears => 1095,
            ReturnPeriod::FiveYears => 1825,
        }
    }

    /// Multi-year returns are reported as CAGR.
    pub fn is_annualized(self) -> bool {
        self.lookback_days() > 365
    }
}

impl fmt::Display for ReturnPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReturnPeriod::OneMonth => "1m",
            ReturnPeriod::ThreeMonths => "3m",
            ReturnPeriod::SixMonths => "6m",
            ReturnPeriod::OneYear => "1y",
            ReturnPeriod::ThreeYears => "3y",
            ReturnPeriod::FiveYears => "5y",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnMetric {
    pub instrument_id: String,
    pub period: ReturnPeriod,
    pub as_of: NaiveDate,
    pub value: Option<f64>,
}

/// `(current - past) / past`, with both prices at or before their target date
/// and no older than `staleness_days`.
pub fn period_return(
    series: &PriceSeries,
    as_of: NaiveDate,
    lookback_days: i64,
    staleness_days: i64,
) -> Result<f64, FundrankError> {
    let current = match series.nearest(as_of, staleness_days) {
        Some(point) => point,
        None => {
            return Err(match series.at_or_before(as_of) {
                Some(last) => FundrankError::StaleData {
                    instrument: series.instrument_id().to_string(),
                    last: last.date,
                    as_of,
                    window_days: staleness_days,
                },
                None => FundrankError::InsufficientHistory {
                    instrument: series.instrument_id().to_string(),
                    have: 0,
                    need: 1,
                },
            });
        }
    };

    let target = as_of - Duration::days(lookback_days);
    let past = series.nearest(target, staleness_days).ok_or_else(|| {
        let have = series
            .first_date()
            .map(|first| (as_of - first).num_days().max(0) as usize)
            .unwrap_or(0);
        FundrankError::InsufficientHistory {
            instrument: series.instrument_id().to_string(),
            have,
            need: lookback_days as usize,
        }
    })?;

    Ok((current.value - past.value) / past.value)
}

/// Period return, annualised for multi-year periods.
pub fn return_for_period(
    series: &PriceSeries,
    as_of: NaiveDate,
    period: ReturnPeriod,
    staleness_days: i64,
) -> Result<f64, FundrankError> {
    let raw = period_return(series, as_of, period.lookback_days(), staleness_days)?;
    if !period.is_annualized() {
        return Ok(raw);
    }
    annualize(raw, period.lookback_days()).ok_or_else(|| FundrankError::InsufficientHistory {
        instrument: series.instrument_id().to_string(),
        have: 0,
        need: period.lookback_days() as usize,
    })
}

/// Every standard period for a point-in-time series; unavailable periods are `None`.
pub fn compute_returns(series: &PointInTimeSeries, staleness_days: i64) -> Vec<ReturnMetric> {
    let as_of = series.fence();
    ReturnPeriod::ALL
        .iter()
        .map(|&period| {
            let value = match return_for_period(series.series(), as_of, period, staleness_days) {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::debug!(period = %period, error = %e, "return omitted");
                    None
                }
            };
            ReturnMetric {
                instrument_id: series.series().instrument_id().to_string(),
                period,
                as_of,
                value,
            }
        })
        .collect()
}

/// Minimum monthly samples before consistency is reported.
const MIN_CONSISTENCY_SAMPLES: usize = 6;

/// Share of positive 30-day returns sampled every 30 days over the trailing year.
pub fn rolling_consistency(series: &PointInTimeSeries, staleness_days: i64) -> Option<f64> {
    let as_of = series.fence();
    let samples: Vec<f64> = (0..12)
        .filter_map(|k| {
            let date = as_of - Duration::days(30 * k);
            period_return(series.series(), date, 30, staleness_days).ok()
        })
        .collect();

    if samples.len() < MIN_CONSISTENCY_SAMPLES {
        return None;
    }
    let positive = samples.iter().filter(|&&r| r > 0.0).count();
    Some(positive as f64 / samples.len() as f64)
}

/// Length of the observed track record up to the fence, in years.
pub fn history_years(series: &PointInTimeSeries) -> Option<f64> {
    series
        .series()
        .first_date()
        .map(|first| (series.fence() - first).num_days() as f64 / DAYS_PER_YEAR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price::PricePoint;
    use approx::assert_relative_eq;

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + Duration::days(n)
    }

    fn series(points: &[(i64, f64)]) -> PriceSeries {
        PriceSeries::new(
            "F1",
            points
                .iter()
                .map(|&(n, v)| PricePoint::new("F1", day(n), v))
                .collect(),
        )
    }

    #[test]
    fn ninety_and_one_eighty_day_returns() {
        let s = series(&[(0, 100.0), (90, 110.0), (180, 121.0)]);
        let r90 = period_return(&s, day(180), 90, 5).unwrap();
        let r180 = period_return(&s, day(180), 180, 5).unwrap();
        assert_relative_eq!(r90, 0.10, epsilon = 1e-12);
        assert_relative_eq!(r180, 0.21, epsilon = 1e-12);
    }

    #[test]
    fn missing_past_point_is_insufficient_history() {
        let s = series(&[(100, 100.0), (180, 121.0)]);
        let err = period_return(&s, day(180), 180, 5).unwrap_err();
        assert!(matches!(err, FundrankError::InsufficientHistory { .. }));
    }

    #[test]
    fn past_point_outside_tolerance_is_rejected() {
        // Nearest past point is 10 days before the target date.
        let s = series(&[(0, 100.0), (100, 121.0)]);
        assert!(period_return(&s, day(100), 90, 5).is_err());
        assert!(period_return(&s, day(100), 90, 10).is_ok());
    }

    #[test]
    fn stale_current_price_is_stale_data() {
        let s = series(&[(0, 100.0), (90, 110.0)]);
        let err = period_return(&s, day(120), 90, 5).unwrap_err();
        assert!(matches!(err, FundrankError::StaleData { .. }));
    }

    #[test]
    fn multi_year_period_is_annualized() {
        let s = series(&[(0, 100.0), (1095, 133.1)]);
        let r = return_for_period(&s, day(1095), ReturnPeriod::ThreeYears, 5).unwrap();
        let expected = 1.331_f64.powf(DAYS_PER_YEAR / 1095.0) - 1.0;
        assert_relative_eq!(r, expected, epsilon = 1e-12);
    }

    #[test]
    fn compute_returns_marks_missing_periods_none() {
        let s = series(&[(0, 100.0), (90, 110.0), (180, 121.0)]);
        let metrics = compute_returns(&s.as_of(day(180)), 5);
        assert_eq!(metrics.len(), ReturnPeriod::ALL.len());
        let one_year = metrics
            .iter()
            .find(|m| m.period == ReturnPeriod::OneYear)
            .unwrap();
        assert!(one_year.value.is_none());
        let six_months = metrics
            .iter()
            .find(|m| m.period == ReturnPeriod::SixMonths)
            .unwrap();
        assert_relative_eq!(six_months.value.unwrap(), 0.21, epsilon = 1e-12);
    }

    #[test]
    fn consistency_of_steady_growth_is_one() {
        let points: Vec<(i64, f64)> = (0..=400).map(|n| (n, 100.0 + n as f64 * 0.1)).collect();
        let s = series(&points);
        let c = rolling_consistency(&s.as_of(day(400)), 5).unwrap();
        assert_relative_eq!(c, 1.0);
    }

    #[test]
    fn consistency_needs_enough_samples() {
        let points: Vec<(i64, f64)> = (0..=60).map(|n| (n, 100.0)).collect();
        let s = series(&points);
        assert!(rolling_consistency(&s.as_of(day(60)), 5).is_none());
    }

    #[test]
    fn history_years_from_first_point() {
        let s = series(&[(0, 100.0), (730, 120.0)]);
        let years = history_years(&s.as_of(day(730))).unwrap();
        assert_relative_eq!(years, 730.0 / DAYS_PER_YEAR, epsilon = 1e-12);
    }
}
