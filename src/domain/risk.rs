//! Risk statistics over a trailing window of daily prices.

use crate::domain::error::FundrankError;
use crate::domain::price::PointInTimeSeries;
use crate::domain::stats::{
    annualize, downside_deviation, max_drawdown, ratio, sample_stddev, simple_returns,
    TRADING_DAYS_PER_YEAR,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};

pub const MIN_RISK_SAMPLES: usize = 200;
pub const RISK_WINDOW_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskSettings {
    pub window_days: i64,
    pub min_samples: usize,
    pub risk_free_rate: f64,
}

impl Default for RiskSettings {
    fn default() -> Self {
        RiskSettings {
            window_days: RISK_WINDOW_DAYS,
            min_samples: MIN_RISK_SAMPLES,
            risk_free_rate: 0.065,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskStats {
    /// Number of daily returns the statistics were computed from.
    pub samples: usize,
    pub annualized_return: Option<f64>,
    pub volatility: f64,
    pub sharpe: Option<f64>,
    pub sortino: Option<f64>,
    pub max_drawdown: f64,
}

/// Computes risk statistics over `(fence - window_days, fence]`.
///
/// Fails with `InsufficientHistory` below `min_samples` daily returns; no
/// statistic is emitted from a short sample.
pub fn compute_risk(
    series: &PointInTimeSeries,
    settings: &RiskSettings,
) -> Result<RiskStats, FundrankError> {
    let fence = series.fence();
    let window = series
        .series()
        .window(fence - Duration::days(settings.window_days), fence);

    let values: Vec<f64> = window.iter().map(|p| p.value).collect();
    let returns = simple_returns(&values);

    if returns.len() < settings.min_samples {
        return Err(FundrankError::InsufficientHistory {
            instrument: series.series().instrument_id().to_string(),
            have: returns.len(),
            need: settings.min_samples,
        });
    }

    let sqrt_year = TRADING_DAYS_PER_YEAR.sqrt();
    let volatility = sample_stddev(&returns).unwrap_or(0.0) * sqrt_year;

    let annualized_return = match (window.first(), window.last()) {
        (Some(first), Some(last)) => {
            let total = (last.value - first.value) / first.value;
            annualize(total, (last.date - first.date).num_days())
        }
        _ => None,
    };

    let daily_rf = settings.risk_free_rate / TRADING_DAYS_PER_YEAR;
    let downside = downside_deviation(&returns, daily_rf).unwrap_or(0.0) * sqrt_year;

    let excess = annualized_return.map(|r| r - settings.risk_free_rate);
    let sharpe = excess.and_then(|e| ratio(e, volatility));
    let sortino = excess.and_then(|e| ratio(e, downside));

    let (max_dd, _) = max_drawdown(&values);

    Ok(RiskStats {
        samples: returns.len(),
        annualized_return,
        volatility,
        sharpe,
        sortino,
        max_drawdown: max_dd,
    })
}
