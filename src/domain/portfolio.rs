//! Unit holdings and equity tracking for forward simulation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

/// Fractional units held per instrument. No cash leg: the portfolio is always
/// fully invested.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Portfolio {
    pub units: BTreeMap<String, f64>,
    pub equity_curve: Vec<EquityPoint>,
}

impl Portfolio {
    pub fn new() -> Self {
        Portfolio::default()
    }

    pub fn is_allocated(&self) -> bool {
        !self.units.is_empty()
    }

    pub fn units_of(&self, instrument_id: &str) -> f64 {
        self.units.get(instrument_id).copied().unwrap_or(0.0)
    }

    /// Replaces holdings with `value × weight / price` units per instrument.
    /// Instruments without a positive price are skipped.
    pub fn allocate(
        &mut self,
        value: f64,
        weights: &BTreeMap<String, f64>,
        prices: &BTreeMap<String, f64>,
    ) {
        self.units = weights
            .iter()
            .filter_map(|(id, &w)| {
                prices
                    .get(id)
                    .filter(|&&p| p > 0.0)
                    .map(|&p| (id.clone(), value * w / p))
            })
            .collect();
    }

    pub fn total_equity(&self, prices: &BTreeMap<String, f64>) -> f64 {
        self.units
            .iter()
            .filter_map(|(id, &u)| prices.get(id).map(|&p| u * p))
            .sum()
    }

    /// Current weight of each holding at `prices`.
    pub fn weights(&self, prices: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
        let total = self.total_equity(prices);
        self.units
            .iter()
            .map(|(id, &u)| {
                let value = prices.get(id).map(|&p| u * p).unwrap_or(0.0);
                let w = if total > 0.0 { value / total } else { 0.0 };
                (id.clone(), w)
            })
            .collect()
    }

    pub fn record_equity(&mut self, date: NaiveDate, equity: f64) {
        self.equity_curve.push(EquityPoint { date, equity });
    }
}
