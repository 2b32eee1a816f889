//! Read-only price and instrument lookup port.

use crate::domain::error::FundrankError;
use crate::domain::instrument::Instrument;
use crate::domain::price::PricePoint;
use chrono::{Duration, NaiveDate};

/// Source of NAV series and instrument metadata.
///
/// Implementations are shared across scoring threads, hence `Send + Sync`.
/// Benchmarks are ordinary series keyed by their benchmark id.
pub trait PricePort: Send + Sync {
    /// Points for `instrument_id` dated within `[start, end]`, ascending.
    fn get_series(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, FundrankError>;

    /// Latest point at or before `as_of`, no older than `staleness_days`.
    fn get_nearest(
        &self,
        instrument_id: &str,
        as_of: NaiveDate,
        staleness_days: i64,
    ) -> Result<Option<PricePoint>, FundrankError> {
        let points = self.get_series(instrument_id, as_of - Duration::days(staleness_days), as_of)?;
        Ok(points.into_iter().filter(|p| p.date <= as_of).last())
    }

    fn get_instrument(&self, instrument_id: &str) -> Result<Option<Instrument>, FundrankError>;

    fn get_subcategory(&self, instrument_id: &str) -> Result<Option<String>, FundrankError> {
        Ok(self
            .get_instrument(instrument_id)?
            .map(|i| i.subcategory)
            .filter(|s| !s.is_empty()))
    }

    fn list_instruments(&self) -> Result<Vec<Instrument>, FundrankError>;
}
