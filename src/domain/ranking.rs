//! Rank, percentile and quartile assignment over a scored universe.

use crate::domain::error::FundrankError;
use crate::domain::instrument::Scope;
use crate::domain::scoring::CompositeScore;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub const MIN_SCOPE_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankRecord {
    pub instrument_id: String,
    pub scope: Scope,
    pub score_date: NaiveDate,
    pub total_score: f64,
    pub rank: usize,
    pub percentile: u8,
    pub quartile: u8,
    pub universe_size: usize,
}

/// Result of ranking one scope. Too few members is a status, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum RankOutcome {
    Ranked(Vec<RankRecord>),
    Unranked {
        scope: Scope,
        members: usize,
        minimum: usize,
    },
}

impl RankOutcome {
    pub fn records(&self) -> &[RankRecord] {
        match self {
            RankOutcome::Ranked(records) => records,
            RankOutcome::Unranked { .. } => &[],
        }
    }

    pub fn is_ranked(&self) -> bool {
        matches!(self, RankOutcome::Ranked(_))
    }

    /// The unranked status as an error, for callers that require a ranking.
    pub fn into_records(self) -> Result<Vec<RankRecord>, FundrankError> {
        match self {
            RankOutcome::Ranked(records) => Ok(records),
            RankOutcome::Unranked {
                scope,
                members,
                minimum,
            } => Err(FundrankError::InvalidUniverse {
                scope: scope.to_string(),
                members,
                minimum,
            }),
        }
    }
}

/// Descending total, then descending tie-break (missing last), then id.
pub fn compare_scores(a: &CompositeScore, b: &CompositeScore) -> Ordering {
    b.total_score
        .total_cmp(&a.total_score)
        .then_with(|| match (a.tie_break, b.tie_break) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.instrument_id.cmp(&b.instrument_id))
}

pub fn percentile(rank: usize, universe_size: usize) -> u8 {
    if universe_size <= 1 {
        return 100;
    }
    let pct = (universe_size - rank) as f64 / (universe_size - 1) as f64 * 100.0;
    pct.round() as u8
}

/// `rank / n <= 0.25 -> 1`, `<= 0.5 -> 2`, `<= 0.75 -> 3`, else 4, in integers.
pub fn quartile(rank: usize, universe_size: usize) -> u8 {
    let scaled = 4 * rank;
    if scaled <= universe_size {
        1
    } else if scaled <= 2 * universe_size {
        2
    } else if scaled <= 3 * universe_size {
        3
    } else {
        4
    }
}

fn ensure_single_date(scores: &[&CompositeScore]) -> Result<Option<NaiveDate>, FundrankError> {
    let Some(first) = scores.first() else {
        return Ok(None);
    };
    match scores.iter().find(|s| s.score_date != first.score_date) {
        Some(other) => Err(FundrankError::MixedScoreDates {
            first: first.score_date,
            other: other.score_date,
        }),
        None => Ok(Some(first.score_date)),
    }
}

/// Ranks `scores` as one scope.
pub fn rank_scope(
    scope: Scope,
    scores: &[&CompositeScore],
    min_members: usize,
) -> Result<RankOutcome, FundrankError> {
    let score_date = ensure_single_date(scores)?;
    let minimum = min_members.max(1);

    let score_date = match score_date {
        Some(date) if scores.len() >= minimum => date,
        _ => {
            return Ok(RankOutcome::Unranked {
                scope,
                members: scores.len(),
                minimum,
            });
        }
    };

    let mut ordered: Vec<&CompositeScore> = scores.to_vec();
    ordered.sort_by(|a, b| compare_scores(a, b));

    let n = ordered.len();
    let records = ordered
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let rank = i + 1;
            RankRecord {
                instrument_id: s.instrument_id.clone(),
                scope: scope.clone(),
                score_date,
                total_score: s.total_score,
                rank,
                percentile: percentile(rank, n),
                quartile: quartile(rank, n),
                universe_size: n,
            }
        })
        .collect();

    Ok(RankOutcome::Ranked(records))
}

/// Rankings for the overall scope and every subcategory in one date.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingRun {
    pub score_date: Option<NaiveDate>,
    pub overall: RankOutcome,
    pub subcategories: BTreeMap<String, RankOutcome>,
}

impl RankingRun {
    pub fn outcome(&self, scope: &Scope) -> Option<&RankOutcome> {
        match scope {
            Scope::Overall => Some(&self.overall),
            Scope::Subcategory(name) => self.subcategories.get(name),
        }
    }

    pub fn unranked_scopes(&self) -> Vec<&RankOutcome> {
        std::iter::once(&self.overall)
            .chain(self.subcategories.values())
            .filter(|o| !o.is_ranked())
            .collect()
    }
}

/// Ranks the overall universe and each subcategory independently.
///
/// `membership` maps instrument id to its subcategory snapshot; instruments
/// with no entry only take part in the overall scope.
pub fn rank_universe(
    scores: &[CompositeScore],
    membership: &BTreeMap<String, String>,
    min_subcategory_size: usize,
) -> Result<RankingRun, FundrankError> {
    let all: Vec<&CompositeScore> = scores.iter().collect();
    let score_date = ensure_single_date(&all)?;
    let overall = rank_scope(Scope::Overall, &all, 1)?;

    let mut groups: BTreeMap<String, Vec<&CompositeScore>> = BTreeMap::new();
    for s in scores {
        if let Some(subcategory) = membership.get(&s.instrument_id) {
            groups.entry(subcategory.clone()).or_default().push(s);
        }
    }

    let mut subcategories = BTreeMap::new();
    for (name, members) in groups {
        let outcome = rank_scope(Scope::Subcategory(name.clone()), &members, min_subcategory_size)?;
        if let RankOutcome::Unranked { members, minimum, .. } = &outcome {
            tracing::info!(subcategory = %name, members, minimum, "subcategory left unranked");
        }
        subcategories.insert(name, outcome);
    }

    Ok(RankingRun {
        score_date,
        overall,
        subcategories,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Page {
            offset: 0,
            limit: 50,
        }
    }
}

pub fn paginate(records: &[RankRecord], page: Page) -> &[RankRecord] {
    let start = page.offset.min(records.len());
    let end = start.saturating_add(page.limit).min(records.len());
    &records[start..end]
}

/// Count of records in each quartile, Q1 first.
pub fn quartile_counts(records: &[RankRecord]) -> [usize; 4] {
    let mut counts = [0usize; 4];
    for r in records {
        if (1..=4).contains(&r.quartile) {
            counts[(r.quartile - 1) as usize] += 1;
        }
    }
    counts
}
