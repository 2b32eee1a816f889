#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use fundrank::domain::error::FundrankError;
use fundrank::domain::instrument::{Instrument, Scope};
use fundrank::domain::price::PricePoint;
use fundrank::domain::ranking::RankRecord;
use fundrank::domain::scoring::CompositeScore;
use fundrank::domain::validation::Checkpoint;
use fundrank::ports::price_port::PricePort;
use fundrank::ports::score_store_port::ScoreStorePort;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Daily points from `start` for `days` days, compounding `growth` per day
/// plus a small deterministic wobble so risk metrics are defined.
pub fn growth_series(id: &str, start: NaiveDate, days: i64, growth: f64) -> Vec<PricePoint> {
    let mut value = 100.0;
    (0..days)
        .map(|i| {
            if i > 0 {
                value *= 1.0 + growth + 0.002 * (i as f64).sin();
            }
            PricePoint::new(id, start + Duration::days(i), value)
        })
        .collect()
}

pub fn points(id: &str, rows: &[(NaiveDate, f64)]) -> Vec<PricePoint> {
    rows.iter().map(|&(d, v)| PricePoint::new(id, d, v)).collect()
}

#[derive(Default)]
pub struct MockPricePort {
    pub series: HashMap<String, Vec<PricePoint>>,
    pub instruments: Vec<Instrument>,
    /// Instruments whose reads fail with `SourceUnavailable`.
    pub unavailable: HashMap<String, String>,
    /// Failures to serve before a read succeeds, per instrument.
    pub transient: Mutex<HashMap<String, usize>>,
    /// Ignore the requested end date and return the whole series.
    pub leak_future: bool,
    pub calls: AtomicUsize,
}

impl MockPricePort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, id: &str, points: Vec<PricePoint>) -> Self {
        self.series.insert(id.to_string(), points);
        self
    }

    pub fn with_instrument(mut self, instrument: Instrument) -> Self {
        self.instruments.push(instrument);
        self
    }

    /// Series plus an instrument record in `subcategory`.
    pub fn with_fund(self, id: &str, subcategory: &str, points: Vec<PricePoint>) -> Self {
        let mut instrument = Instrument::new(id, "Equity", subcategory);
        instrument.expense_ratio = Some(1.0);
        instrument.aum = Some(2_000.0);
        self.with_series(id, points).with_instrument(instrument)
    }

    pub fn with_unavailable(mut self, id: &str, reason: &str) -> Self {
        self.unavailable.insert(id.to_string(), reason.to_string());
        self
    }

    pub fn with_transient_failures(self, id: &str, failures: usize) -> Self {
        self.transient
            .lock()
            .unwrap()
            .insert(id.to_string(), failures);
        self
    }

    pub fn leaking_future(mut self) -> Self {
        self.leak_future = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PricePort for MockPricePort {
    fn get_series(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, FundrankError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.unavailable.get(instrument_id) {
            return Err(FundrankError::SourceUnavailable {
                reason: reason.clone(),
                attempts: 1,
            });
        }
        {
            let mut transient = self.transient.lock().unwrap();
            if let Some(left) = transient.get_mut(instrument_id) {
                if *left > 0 {
                    *left -= 1;
                    return Err(FundrankError::SourceUnavailable {
                        reason: "connection reset".into(),
                        attempts: 1,
                    });
                }
            }
        }
        let Some(points) = self.series.get(instrument_id) else {
            return Err(FundrankError::NotFound {
                instrument: instrument_id.to_string(),
            });
        };
        Ok(points
            .iter()
            .filter(|p| p.date >= start && (self.leak_future || p.date <= end))
            .cloned()
            .collect())
    }

    fn get_instrument(&self, instrument_id: &str) -> Result<Option<Instrument>, FundrankError> {
        Ok(self
            .instruments
            .iter()
            .find(|i| i.id == instrument_id)
            .cloned())
    }

    fn list_instruments(&self) -> Result<Vec<Instrument>, FundrankError> {
        Ok(self.instruments.clone())
    }
}

/// Score store held in memory.
#[derive(Default)]
pub struct MemoryStore {
    pub scores: Mutex<BTreeMap<(NaiveDate, String), CompositeScore>>,
    pub ranks: Mutex<BTreeMap<(Scope, NaiveDate), Vec<RankRecord>>>,
    pub checkpoints: Mutex<HashMap<String, Checkpoint>>,
    pub batches_saved: AtomicUsize,
}

impl ScoreStorePort for MemoryStore {
    fn save_scores(&self, scores: &[CompositeScore]) -> Result<(), FundrankError> {
        self.batches_saved.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.scores.lock().unwrap();
        for s in scores {
            stored.insert((s.score_date, s.instrument_id.clone()), s.clone());
        }
        Ok(())
    }

    fn load_scores(&self, score_date: NaiveDate) -> Result<Vec<CompositeScore>, FundrankError> {
        Ok(self
            .scores
            .lock()
            .unwrap()
            .iter()
            .filter(|((d, _), _)| *d == score_date)
            .map(|(_, s)| s.clone())
            .collect())
    }

    fn latest_score_date(&self, as_of: NaiveDate) -> Result<Option<NaiveDate>, FundrankError> {
        Ok(self
            .scores
            .lock()
            .unwrap()
            .keys()
            .map(|(d, _)| *d)
            .filter(|d| *d <= as_of)
            .max())
    }

    fn clear_score_date(&self, score_date: NaiveDate) -> Result<(), FundrankError> {
        self.scores.lock().unwrap().retain(|(d, _), _| *d != score_date);
        self.ranks.lock().unwrap().retain(|(_, d), _| *d != score_date);
        Ok(())
    }

    fn replace_ranks(
        &self,
        scope: &Scope,
        score_date: NaiveDate,
        records: &[RankRecord],
    ) -> Result<(), FundrankError> {
        self.ranks
            .lock()
            .unwrap()
            .insert((scope.clone(), score_date), records.to_vec());
        Ok(())
    }

    fn load_ranks(
        &self,
        scope: &Scope,
        score_date: NaiveDate,
    ) -> Result<Vec<RankRecord>, FundrankError> {
        Ok(self
            .ranks
            .lock()
            .unwrap()
            .get(&(scope.clone(), score_date))
            .cloned()
            .unwrap_or_default())
    }

    fn save_checkpoint(&self, run_id: &str, checkpoint: &Checkpoint) -> Result<(), FundrankError> {
        self.checkpoints
            .lock()
            .unwrap()
            .insert(run_id.to_string(), checkpoint.clone());
        Ok(())
    }

    fn load_checkpoint(&self, run_id: &str) -> Result<Option<Checkpoint>, FundrankError> {
        Ok(self.checkpoints.lock().unwrap().get(run_id).cloned())
    }
}

/// Composite score with only a total, for ranking tests.
pub fn bare_score(id: &str, score_date: NaiveDate, total: f64) -> CompositeScore {
    CompositeScore {
        instrument_id: id.to_string(),
        score_date,
        total_score: total,
        components: Vec::new(),
        tie_break: None,
        table_version: "v1".to_string(),
    }
}

/// A universe of funds whose daily growth rises with their index.
pub const GROWTHS: [(&str, &str, f64); 8] = [
    ("F1", "Large Cap", 0.0002),
    ("F2", "Large Cap", 0.0003),
    ("F3", "Large Cap", 0.0004),
    ("F4", "Large Cap", 0.0005),
    ("F5", "Large Cap", 0.0006),
    ("F6", "Liquid", 0.0007),
    ("F7", "Liquid", 0.0008),
    ("F8", "Liquid", 0.0009),
];

pub fn universe_port(start: NaiveDate, days: i64) -> MockPricePort {
    GROWTHS
        .iter()
        .fold(MockPricePort::new(), |port, &(id, sub, g)| {
            port.with_fund(id, sub, growth_series(id, start, days, g))
        })
}
