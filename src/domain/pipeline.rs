//! Scoring cycle services: score one instrument, score a universe in
//! parallel batches, rank, and persist.

use super::error::FundrankError;
use super::instrument::{Instrument, Scope};
use super::price::{PointInTimeSeries, PriceSeries};
use super::ranking::{self, Page, RankOutcome, RankRecord, RankingRun, MIN_SCOPE_SIZE};
use super::risk::RiskSettings;
use super::scoring::{self, CompositeScore, ScoreInputs, ScoringConfig};
use crate::ports::config_port::ConfigPort;
use crate::ports::price_port::PricePort;
use crate::ports::score_store_port::ScoreStorePort;
use chrono::{Duration, NaiveDate};
use rayon::prelude::*;
use std::collections::BTreeMap;

pub const DEFAULT_BATCH_SIZE: usize = 64;
pub const DEFAULT_STALENESS_DAYS: i64 = 5;
/// How far back a scoring read reaches before the fence.
const MAX_HISTORY_DAYS: i64 = 365 * 30;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoringSettings {
    pub staleness_days: i64,
    pub batch_size: usize,
    pub min_scope_size: usize,
    pub risk: RiskSettings,
    pub tables: ScoringConfig,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        ScoringSettings {
            staleness_days: DEFAULT_STALENESS_DAYS,
            batch_size: DEFAULT_BATCH_SIZE,
            min_scope_size: MIN_SCOPE_SIZE,
            risk: RiskSettings::default(),
            tables: ScoringConfig::default_v1(),
        }
    }
}

impl ScoringSettings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FundrankError> {
        let defaults = RiskSettings::default();
        let non_negative = |section: &str, key: &str, value: i64| {
            if value < 0 {
                Err(FundrankError::config_invalid(section, key, "must not be negative"))
            } else {
                Ok(value)
            }
        };

        let staleness_days = non_negative(
            "scoring",
            "staleness_days",
            config.get_int("scoring", "staleness_days", DEFAULT_STALENESS_DAYS),
        )?;
        let batch_size = non_negative(
            "scoring",
            "batch_size",
            config.get_int("scoring", "batch_size", DEFAULT_BATCH_SIZE as i64),
        )? as usize;
        let min_scope_size = non_negative(
            "ranking",
            "min_scope_size",
            config.get_int("ranking", "min_scope_size", MIN_SCOPE_SIZE as i64),
        )? as usize;
        let window_days = non_negative(
            "scoring",
            "risk_window_days",
            config.get_int("scoring", "risk_window_days", defaults.window_days),
        )?;
        let min_samples = non_negative(
            "scoring",
            "min_risk_samples",
            config.get_int("scoring", "min_risk_samples", defaults.min_samples as i64),
        )? as usize;

        Ok(ScoringSettings {
            staleness_days,
            batch_size: batch_size.max(1),
            min_scope_size,
            risk: RiskSettings {
                window_days,
                min_samples,
                risk_free_rate: config.get_double(
                    "scoring",
                    "risk_free_rate",
                    defaults.risk_free_rate,
                ),
            },
            tables: ScoringConfig::from_config(config)?,
        })
    }
}

/// Reads history for `instrument` truncated at `as_of` and fails if the source
/// returned anything dated after it.
pub fn point_in_time_series(
    port: &dyn PricePort,
    instrument_id: &str,
    as_of: NaiveDate,
) -> Result<PointInTimeSeries, FundrankError> {
    let points = port.get_series(instrument_id, as_of - Duration::days(MAX_HISTORY_DAYS), as_of)?;
    PointInTimeSeries::strict(PriceSeries::new(instrument_id, points), as_of)
}

fn score_with(
    port: &dyn PricePort,
    instrument: &Instrument,
    as_of: NaiveDate,
    settings: &ScoringSettings,
) -> Result<Option<CompositeScore>, FundrankError> {
    let series = point_in_time_series(port, &instrument.id, as_of)?;
    let inputs = ScoreInputs::from_series(
        &series,
        Some(instrument),
        settings.staleness_days,
        &settings.risk,
    );
    match scoring::score(&instrument.id, as_of, &inputs, &settings.tables) {
        Ok(score) => Ok(Some(score)),
        Err(FundrankError::InsufficientHistory { .. }) => {
            tracing::debug!(instrument = %instrument.id, %as_of, "no return computable");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Scores one instrument as of `as_of`.
///
/// `Ok(None)` means the instrument has too little (or too stale) history to
/// be scored on that date.
pub fn score_instrument(
    port: &dyn PricePort,
    instrument_id: &str,
    as_of: NaiveDate,
    settings: &ScoringSettings,
) -> Result<Option<CompositeScore>, FundrankError> {
    let instrument = port
        .get_instrument(instrument_id)?
        .ok_or_else(|| FundrankError::NotFound {
            instrument: instrument_id.to_string(),
        })?;
    score_with(port, &instrument, as_of, settings)
}

/// Outcome counts for one scoring run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub batches: usize,
    pub scored: usize,
    /// Instruments with too little history on the score date.
    pub unscored: usize,
    /// Per-instrument failures, as (instrument id, message).
    pub failed: Vec<(String, String)>,
    pub source_unavailable: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniverseScores {
    pub score_date: NaiveDate,
    /// Ordered by instrument id.
    pub scores: Vec<CompositeScore>,
    /// Subcategory snapshot taken at the start of the run.
    pub membership: BTreeMap<String, String>,
    pub report: BatchReport,
}

/// Scores every instrument in bounded batches, each batch in parallel.
///
/// `on_batch` receives each finished batch (for persistence) before the next
/// one starts. Per-instrument failures are logged and counted; if every
/// instrument fails because the source is unavailable the run fails.
pub fn score_universe(
    port: &dyn PricePort,
    instruments: &[Instrument],
    as_of: NaiveDate,
    settings: &ScoringSettings,
    on_batch: &mut dyn FnMut(&[CompositeScore]) -> Result<(), FundrankError>,
) -> Result<UniverseScores, FundrankError> {
    let membership: BTreeMap<String, String> = instruments
        .iter()
        .filter(|i| !i.subcategory.is_empty())
        .map(|i| (i.id.clone(), i.subcategory.clone()))
        .collect();

    let mut report = BatchReport::default();
    let mut scores = Vec::with_capacity(instruments.len());
    let mut last_unavailable = None;

    for batch in instruments.chunks(settings.batch_size.max(1)) {
        let results: Vec<(&Instrument, Result<Option<CompositeScore>, FundrankError>)> = batch
            .par_iter()
            .map(|instrument| (instrument, score_with(port, instrument, as_of, settings)))
            .collect();

        let mut batch_scores = Vec::with_capacity(batch.len());
        for (instrument, result) in results {
            match result {
                Ok(Some(score)) => batch_scores.push(score),
                Ok(None) => report.unscored += 1,
                Err(e) if e.is_per_instrument() => {
                    tracing::warn!(instrument = %instrument.id, error = %e, "instrument skipped");
                    report.failed.push((instrument.id.clone(), e.to_string()));
                    if matches!(e, FundrankError::SourceUnavailable { .. }) {
                        report.source_unavailable += 1;
                        last_unavailable = Some(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        report.batches += 1;
        report.scored += batch_scores.len();
        on_batch(&batch_scores)?;
        scores.extend(batch_scores);
    }

    if report.source_unavailable == instruments.len() {
        if let Some(e) = last_unavailable {
            return Err(e);
        }
    }

    scores.sort_by(|a, b| a.instrument_id.cmp(&b.instrument_id));
    tracing::info!(
        %as_of,
        scored = report.scored,
        unscored = report.unscored,
        failed = report.failed.len(),
        "scoring run complete"
    );

    Ok(UniverseScores {
        score_date: as_of,
        scores,
        membership,
        report,
    })
}

/// Ranks a completed scoring run overall and per subcategory.
pub fn rank_scores(
    universe: &UniverseScores,
    settings: &ScoringSettings,
) -> Result<RankingRun, FundrankError> {
    ranking::rank_universe(&universe.scores, &universe.membership, settings.min_scope_size)
}

/// Result of a full scoring cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSummary {
    pub score_date: NaiveDate,
    pub report: BatchReport,
    pub ranked_scopes: usize,
    pub unranked_scopes: usize,
}

/// Scores the whole universe, persists scores per batch, then ranks and
/// replaces every scope for the date.
///
/// Anything stored earlier for `as_of` is cleared first, so scopes or
/// instruments that dropped out of the universe leave no stale rows.
pub fn run_scoring_cycle(
    port: &dyn PricePort,
    store: &dyn ScoreStorePort,
    as_of: NaiveDate,
    settings: &ScoringSettings,
) -> Result<CycleSummary, FundrankError> {
    let instruments = port.list_instruments()?;
    store.clear_score_date(as_of)?;
    let universe = score_universe(
        port,
        &instruments,
        as_of,
        settings,
        &mut |batch: &[CompositeScore]| store.save_scores(batch),
    )?;

    let run = rank_scores(&universe, settings)?;
    let mut ranked_scopes = 0;
    let mut unranked_scopes = 0;

    let outcomes = std::iter::once((Scope::Overall, &run.overall)).chain(
        run.subcategories
            .iter()
            .map(|(name, outcome)| (Scope::Subcategory(name.clone()), outcome)),
    );
    for (scope, outcome) in outcomes {
        match outcome {
            RankOutcome::Ranked(records) => {
                store.replace_ranks(&scope, as_of, records)?;
                ranked_scopes += 1;
            }
            RankOutcome::Unranked { .. } => {
                store.replace_ranks(&scope, as_of, &[])?;
                unranked_scopes += 1;
            }
        }
    }

    Ok(CycleSummary {
        score_date: as_of,
        report: universe.report,
        ranked_scopes,
        unranked_scopes,
    })
}

/// One page of stored rank records for `scope`, from the latest score date
/// on or before `as_of`.
pub fn query_ranks(
    store: &dyn ScoreStorePort,
    scope: &Scope,
    as_of: NaiveDate,
    page: Page,
) -> Result<Vec<RankRecord>, FundrankError> {
    let Some(date) = store.latest_score_date(as_of)? else {
        return Ok(Vec::new());
    };
    let records = store.load_ranks(scope, date)?;
    Ok(ranking::paginate(&records, page).to_vec())
}
