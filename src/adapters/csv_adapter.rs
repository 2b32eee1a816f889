//! CSV directory price adapter.
//!
//! Layout: one `<instrument_id>.csv` per series with `date,value` rows, plus
//! an `instruments.csv` listing metadata.

use crate::domain::error::FundrankError;
use crate::domain::instrument::Instrument;
use crate::domain::price::PricePoint;
use crate::ports::price_port::PricePort;
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

pub const INSTRUMENTS_FILE: &str = "instruments.csv";

pub struct CsvAdapter {
    base_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct InstrumentRow {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    subcategory: String,
    expense_ratio: Option<f64>,
    aum: Option<f64>,
    inception: Option<String>,
}

/// Accepts ISO dates and the day-first form NAV feeds publish.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let s = input.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d-%m-%Y"))
        .ok()
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, instrument_id: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", instrument_id))
    }

    fn read(&self, path: &PathBuf, instrument_id: &str) -> Result<String, FundrankError> {
        fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FundrankError::NotFound {
                instrument: instrument_id.to_string(),
            },
            _ => FundrankError::SourceUnavailable {
                reason: format!("failed to read {}: {}", path.display(), e),
                attempts: 1,
            },
        })
    }

    /// Every point in the series file, unfiltered.
    pub fn read_points(&self, instrument_id: &str) -> Result<Vec<PricePoint>, FundrankError> {
        let path = self.csv_path(instrument_id);
        let content = self.read(&path, instrument_id)?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut points = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| FundrankError::Database {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?;

            let date_str = record.get(0).ok_or_else(|| FundrankError::Database {
                reason: "missing date column".into(),
            })?;
            let date = parse_date(date_str).ok_or_else(|| FundrankError::Database {
                reason: format!("invalid date '{}' in {}", date_str, path.display()),
            })?;

            let value: f64 = record
                .get(1)
                .ok_or_else(|| FundrankError::Database {
                    reason: "missing value column".into(),
                })?
                .trim()
                .parse()
                .map_err(|e| FundrankError::Database {
                    reason: format!("invalid value on {}: {}", date, e),
                })?;

            points.push(PricePoint::new(instrument_id, date, value));
        }

        points.sort_by_key(|p| p.date);
        Ok(points)
    }

    /// Series ids present in the directory, sorted.
    pub fn list_series(&self) -> Result<Vec<String>, FundrankError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| FundrankError::SourceUnavailable {
            reason: format!("failed to read directory {}: {}", self.base_path.display(), e),
            attempts: 1,
        })?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FundrankError::Database {
                reason: format!("directory entry error: {}", e),
            })?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == INSTRUMENTS_FILE {
                continue;
            }
            if let Some(id) = name.strip_suffix(".csv") {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn read_instruments(&self) -> Result<Vec<Instrument>, FundrankError> {
        let path = self.base_path.join(INSTRUMENTS_FILE);
        if !path.exists() {
            // Without metadata, every series is an instrument with no subcategory.
            return Ok(self
                .list_series()?
                .iter()
                .map(|id| Instrument::new(id, "", ""))
                .collect());
        }
        let content = self.read(&path, INSTRUMENTS_FILE)?;
        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut instruments = Vec::new();
        for row in rdr.deserialize::<InstrumentRow>() {
            let row = row.map_err(|e| FundrankError::Database {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?;
            instruments.push(Instrument {
                id: row.id,
                name: row.name,
                category: row.category,
                subcategory: row.subcategory,
                expense_ratio: row.expense_ratio,
                aum: row.aum,
                inception: row.inception.as_deref().and_then(parse_date),
            });
        }
        instruments.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(instruments)
    }
}

impl PricePort for CsvAdapter {
    fn get_series(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, FundrankError> {
        Ok(self
            .read_points(instrument_id)?
            .into_iter()
            .filter(|p| p.date >= start && p.date <= end)
            .collect())
    }

    fn get_instrument(&self, instrument_id: &str) -> Result<Option<Instrument>, FundrankError> {
        Ok(self
            .read_instruments()?
            .into_iter()
            .find(|i| i.id == instrument_id))
    }

    fn list_instruments(&self) -> Result<Vec<Instrument>, FundrankError> {
        self.read_instruments()
    }
}
