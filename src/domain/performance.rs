//! Performance metrics over an equity curve.
//!
//! The same computation serves the simulated portfolio and its benchmark.

use super::portfolio::EquityPoint;
use super::stats::{
    annualize, downside_deviation, ratio, sample_stddev, simple_returns,
    TRADING_DAYS_PER_YEAR,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub start_value: f64,
    pub end_value: f64,
    pub total_return: f64,
    /// Geometric, over the calendar days between the first and last point.
    pub annualized_return: Option<f64>,
    pub volatility: Option<f64>,
    pub sharpe: Option<f64>,
    pub sortino: Option<f64>,
    pub max_drawdown: f64,
    /// Longest stretch below a prior peak, in calendar days.
    pub max_drawdown_days: i64,
}

impl PerformanceMetrics {
    pub fn compute(curve: &[EquityPoint], risk_free_rate: f64) -> Self {
        let start_value = curve.first().map(|p| p.equity).unwrap_or(0.0);
        let end_value = curve.last().map(|p| p.equity).unwrap_or(start_value);

        let total_return = if start_value > 0.0 {
            (end_value - start_value) / start_value
        } else {
            0.0
        };

        let elapsed_days = match (curve.first(), curve.last()) {
            (Some(first), Some(last)) => (last.date - first.date).num_days(),
            _ => 0,
        };
        let annualized_return = annualize(total_return, elapsed_days);

        let values: Vec<f64> = curve.iter().map(|p| p.equity).collect();
        let returns = simple_returns(&values);
        let sqrt_year = TRADING_DAYS_PER_YEAR.sqrt();
        let volatility = sample_stddev(&returns).map(|sd| sd * sqrt_year);

        let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
        let downside = downside_deviation(&returns, daily_rf).map(|d| d * sqrt_year);

        let excess = annualized_return.map(|r| r - risk_free_rate);
        let sharpe = excess.zip(volatility).and_then(|(e, v)| ratio(e, v));
        let sortino = excess.zip(downside).and_then(|(e, d)| ratio(e, d));

        let (max_drawdown, max_drawdown_days) = compute_drawdown(curve);

        PerformanceMetrics {
            start_value,
            end_value,
            total_return,
            annualized_return,
            volatility,
            sharpe,
            sortino,
            max_drawdown,
            max_drawdown_days,
        }
    }
}

fn compute_drawdown(curve: &[EquityPoint]) -> (f64, i64) {
    let Some(first) = curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.equity;
    let mut peak_date = first.date;
    let mut max_dd = 0.0_f64;
    let mut max_days = 0i64;

    for point in curve {
        if point.equity >= peak {
            peak = point.equity;
            peak_date = point.date;
        } else if peak > 0.0 {
            let dd = (peak - point.equity) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
            max_days = max_days.max((point.date - peak_date).num_days());
        }
    }

    (max_dd, max_days)
}
