//! Price points, ordered price series and the point-in-time fence.

use crate::domain::error::FundrankError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub instrument_id: String,
    pub date: NaiveDate,
    pub value: f64,
}

impl PricePoint {
    pub fn new(instrument_id: &str, date: NaiveDate, value: f64) -> Self {
        PricePoint {
            instrument_id: instrument_id.to_string(),
            date,
            value,
        }
    }
}

/// Price observations for one instrument, ascending by date, one point per date.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    instrument_id: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Sorts by date and keeps the last value seen for a repeated date.
    /// Non-positive or non-finite values are not prices and are dropped.
    pub fn new(instrument_id: &str, mut points: Vec<PricePoint>) -> Self {
        points.retain(|p| p.value.is_finite() && p.value > 0.0);
        points.sort_by_key(|p| p.date);

        let mut deduped: Vec<PricePoint> = Vec::with_capacity(points.len());
        for point in points {
            match deduped.last_mut() {
                Some(last) if last.date == point.date => *last = point,
                _ => deduped.push(point),
            }
        }

        Self {
            instrument_id: instrument_id.to_string(),
            points: deduped,
        }
    }

    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// Latest point dated on or before `date`, regardless of age.
    pub fn at_or_before(&self, date: NaiveDate) -> Option<&PricePoint> {
        let idx = self.points.partition_point(|p| p.date <= date);
        if idx == 0 {
            None
        } else {
            Some(&self.points[idx - 1])
        }
    }

    /// Latest point on or before `date` that is at most `staleness_days` old.
    pub fn nearest(&self, date: NaiveDate, staleness_days: i64) -> Option<&PricePoint> {
        self.at_or_before(date)
            .filter(|p| (date - p.date).num_days() <= staleness_days)
    }

    /// Points with `start <= date <= end`.
    pub fn window(&self, start: NaiveDate, end: NaiveDate) -> &[PricePoint] {
        let lo = self.points.partition_point(|p| p.date < start);
        let hi = self.points.partition_point(|p| p.date <= end);
        if lo >= hi { &[] } else { &self.points[lo..hi] }
    }

    /// Truncating view: everything dated after `fence` is dropped.
    pub fn as_of(&self, fence: NaiveDate) -> PointInTimeSeries {
        let hi = self.points.partition_point(|p| p.date <= fence);
        PointInTimeSeries {
            fence,
            series: PriceSeries {
                instrument_id: self.instrument_id.clone(),
                points: self.points[..hi].to_vec(),
            },
        }
    }
}

/// A series that provably holds no observation dated after its fence.
///
/// Scoring only accepts this type, so a score computed for a date can never
/// see prices recorded later.
#[derive(Debug, Clone, PartialEq)]
pub struct PointInTimeSeries {
    fence: NaiveDate,
    series: PriceSeries,
}

impl PointInTimeSeries {
    /// Rejects (rather than trims) a series that crosses the fence.
    pub fn strict(series: PriceSeries, fence: NaiveDate) -> Result<Self, FundrankError> {
        match series.last_date() {
            Some(last) if last > fence => Err(FundrankError::TemporalViolation {
                reason: format!(
                    "series for {} contains a price dated {} after the {} fence",
                    series.instrument_id, last, fence
                ),
            }),
            _ => Ok(Self { fence, series }),
        }
    }

    pub fn fence(&self) -> NaiveDate {
        self.fence
    }

    pub fn series(&self) -> &PriceSeries {
        &self.series
    }
}
