//! Persistence port for scores, rank records and validation checkpoints.

use crate::domain::error::FundrankError;
use crate::domain::instrument::Scope;
use crate::domain::ranking::RankRecord;
use crate::domain::scoring::CompositeScore;
use crate::domain::validation::Checkpoint;
use chrono::NaiveDate;

pub trait ScoreStorePort {
    /// Upserts a batch of scores keyed by (instrument, score date) in one transaction.
    fn save_scores(&self, scores: &[CompositeScore]) -> Result<(), FundrankError>;

    fn load_scores(&self, score_date: NaiveDate) -> Result<Vec<CompositeScore>, FundrankError>;

    /// Most recent score date on or before `as_of`, if any.
    fn latest_score_date(&self, as_of: NaiveDate) -> Result<Option<NaiveDate>, FundrankError>;

    /// Deletes every stored score and rank record dated `score_date`, atomically.
    fn clear_score_date(&self, score_date: NaiveDate) -> Result<(), FundrankError>;

    /// Deletes every record for (scope, score date) and inserts `records`, atomically.
    fn replace_ranks(
        &self,
        scope: &Scope,
        score_date: NaiveDate,
        records: &[RankRecord],
    ) -> Result<(), FundrankError>;

    /// Records for (scope, score date) in rank order.
    fn load_ranks(
        &self,
        scope: &Scope,
        score_date: NaiveDate,
    ) -> Result<Vec<RankRecord>, FundrankError>;

    fn save_checkpoint(&self, run_id: &str, checkpoint: &Checkpoint) -> Result<(), FundrankError>;

    fn load_checkpoint(&self, run_id: &str) -> Result<Option<Checkpoint>, FundrankError>;
}
