//! Recommendation labels from total scores via a configurable threshold table.

use crate::domain::error::FundrankError;
use crate::ports::config_port::ConfigPort;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Ordered best-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Recommendation {
    pub const ALL: [Recommendation; 5] = [
        Recommendation::StrongBuy,
        Recommendation::Buy,
        Recommendation::Hold,
        Recommendation::Sell,
        Recommendation::StrongSell,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Recommendation::StrongBuy => "STRONG_BUY",
            Recommendation::Buy => "BUY",
            Recommendation::Hold => "HOLD",
            Recommendation::Sell => "SELL",
            Recommendation::StrongSell => "STRONG_SELL",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Minimum total score for each label above `STRONG_SELL`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub strong_buy: f64,
    pub buy: f64,
    pub hold: f64,
    pub sell: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            strong_buy: 70.0,
            buy: 60.0,
            hold: 50.0,
            sell: 35.0,
        }
    }
}

impl Thresholds {
    pub fn new(strong_buy: f64, buy: f64, hold: f64, sell: f64) -> Result<Self, FundrankError> {
        let t = Thresholds {
            strong_buy,
            buy,
            hold,
            sell,
        };
        t.validate()?;
        Ok(t)
    }

    pub fn validate(&self) -> Result<(), FundrankError> {
        let cuts = [
            ("strong_buy", self.strong_buy),
            ("buy", self.buy),
            ("hold", self.hold),
            ("sell", self.sell),
        ];
        for (key, value) in cuts {
            if !value.is_finite() {
                return Err(FundrankError::config_invalid(
                    "recommendation",
                    key,
                    "threshold must be finite",
                ));
            }
        }
        for pair in cuts.windows(2) {
            if pair[1].1 >= pair[0].1 {
                return Err(FundrankError::config_invalid(
                    "recommendation",
                    pair[1].0,
                    format!("must be below {}", pair[0].0),
                ));
            }
        }
        Ok(())
    }

    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FundrankError> {
        let defaults = Thresholds::default();
        Thresholds::new(
            config.get_double("recommendation", "strong_buy", defaults.strong_buy),
            config.get_double("recommendation", "buy", defaults.buy),
            config.get_double("recommendation", "hold", defaults.hold),
            config.get_double("recommendation", "sell", defaults.sell),
        )
    }

    /// New cut-offs so that the labels over `scores` land as close as the
    /// data allows to `target_shares` (best label first, summing to 1).
    ///
    /// Each cut-off sits at the score of the last instrument inside the
    /// cumulative share, nudged to stay strictly descending.
    pub fn recalibrate(scores: &[f64], target_shares: [f64; 5]) -> Result<Self, FundrankError> {
        let share_sum: f64 = target_shares.iter().sum();
        if target_shares.iter().any(|s| *s < 0.0 || !s.is_finite())
            || (share_sum - 1.0).abs() > 1e-6
        {
            return Err(FundrankError::config_invalid(
                "recommendation",
                "target_shares",
                "shares must be non-negative and sum to 1",
            ));
        }

        let mut sorted: Vec<f64> = scores.iter().copied().filter(|s| s.is_finite()).collect();
        if sorted.is_empty() {
            return Err(FundrankError::InvalidUniverse {
                scope: "recalibration".to_string(),
                members: 0,
                minimum: 1,
            });
        }
        sorted.sort_by(|a, b| b.total_cmp(a));
        let n = sorted.len();

        let mut cuts = [0.0_f64; 4];
        let mut cumulative = 0.0;
        for (i, share) in target_shares.iter().take(4).enumerate() {
            cumulative += share;
            let count = (cumulative * n as f64).round() as usize;
            cuts[i] = if count == 0 {
                sorted[0] + 1.0
            } else {
                sorted[(count - 1).min(n - 1)]
            };
        }
        const STEP: f64 = 0.01;
        for i in 1..4 {
            if cuts[i] >= cuts[i - 1] {
                cuts[i] = cuts[i - 1] - STEP;
            }
        }

        Thresholds::new(cuts[0], cuts[1], cuts[2], cuts[3])
    }
}

pub fn classify(total_score: f64, thresholds: &Thresholds) -> Recommendation {
    if total_score >= thresholds.strong_buy {
        Recommendation::StrongBuy
    } else if total_score >= thresholds.buy {
        Recommendation::Buy
    } else if total_score >= thresholds.hold {
        Recommendation::Hold
    } else if total_score >= thresholds.sell {
        Recommendation::Sell
    } else {
        Recommendation::StrongSell
    }
}

/// Label counts over a universe, for drift monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelDistribution {
    pub counts: BTreeMap<Recommendation, usize>,
    pub total: usize,
}

impl LabelDistribution {
    pub fn from_scores(scores: &[f64], thresholds: &Thresholds) -> Self {
        let mut counts: BTreeMap<Recommendation, usize> =
            Recommendation::ALL.iter().map(|&r| (r, 0)).collect();
        for &s in scores {
            *counts.entry(classify(s, thresholds)).or_insert(0) += 1;
        }
        LabelDistribution {
            counts,
            total: scores.len(),
        }
    }

    pub fn count(&self, label: Recommendation) -> usize {
        self.counts.get(&label).copied().unwrap_or(0)
    }

    pub fn percentage(&self, label: Recommendation) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.count(label) as f64 / self.total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn classify_boundaries() {
        let t = Thresholds::default();
        assert_eq!(classify(70.0, &t), Recommendation::StrongBuy);
        assert_eq!(classify(69.99, &t), Recommendation::Buy);
        assert_eq!(classify(60.0, &t), Recommendation::Buy);
        assert_eq!(classify(55.0, &t), Recommendation::Hold);
        assert_eq!(classify(35.0, &t), Recommendation::Sell);
        assert_eq!(classify(10.0, &t), Recommendation::StrongSell);
    }

    #[test]
    fn thresholds_must_descend() {
        assert!(Thresholds::new(70.0, 70.0, 50.0, 35.0).is_err());
        assert!(Thresholds::new(70.0, 60.0, 65.0, 35.0).is_err());
        assert!(Thresholds::new(f64::NAN, 60.0, 50.0, 35.0).is_err());
        assert!(Thresholds::new(80.0, 60.0, 40.0, 20.0).is_ok());
    }

    #[test]
    fn distribution_counts_and_percentages() {
        let scores = [90.0, 75.0, 65.0, 55.0, 40.0, 20.0, 10.0, 5.0];
        let dist = LabelDistribution::from_scores(&scores, &Thresholds::default());
        assert_eq!(dist.total, 8);
        assert_eq!(dist.count(Recommendation::StrongBuy), 2);
        assert_eq!(dist.count(Recommendation::Buy), 1);
        assert_eq!(dist.count(Recommendation::Hold), 1);
        assert_eq!(dist.count(Recommendation::Sell), 1);
        assert_eq!(dist.count(Recommendation::StrongSell), 3);
        assert_relative_eq!(dist.percentage(Recommendation::StrongSell), 37.5);
        let sum: usize = dist.counts.values().sum();
        assert_eq!(sum, dist.total);
    }

    #[test]
    fn empty_distribution_has_zero_percentages() {
        let dist = LabelDistribution::from_scores(&[], &Thresholds::default());
        assert_relative_eq!(dist.percentage(Recommendation::Hold), 0.0);
        assert_eq!(dist.counts.len(), 5);
    }

    #[test]
    fn recalibrate_hits_target_shares() {
        let scores: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        let t = Thresholds::recalibrate(&scores, [0.10, 0.20, 0.40, 0.20, 0.10]).unwrap();
        let dist = LabelDistribution::from_scores(&scores, &t);
        assert_eq!(dist.count(Recommendation::StrongBuy), 10);
        assert_eq!(dist.count(Recommendation::Buy), 20);
        assert_eq!(dist.count(Recommendation::Hold), 40);
        assert_eq!(dist.count(Recommendation::Sell), 20);
        assert_eq!(dist.count(Recommendation::StrongSell), 10);
    }

    #[test]
    fn recalibrate_rejects_bad_shares() {
        let scores = [50.0, 60.0];
        assert!(Thresholds::recalibrate(&scores, [0.5, 0.5, 0.5, 0.0, 0.0]).is_err());
        assert!(Thresholds::recalibrate(&[], [0.2; 5]).is_err());
    }

    #[test]
    fn recalibrate_keeps_thresholds_descending_with_ties() {
        let scores = vec![50.0; 20];
        let t = Thresholds::recalibrate(&scores, [0.2; 5]).unwrap();
        assert!(t.validate().is_ok());
    }
}
