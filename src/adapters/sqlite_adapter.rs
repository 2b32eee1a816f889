//! SQLite price store and score store.

use crate::domain::error::FundrankError;
use crate::domain::instrument::{Instrument, Scope};
use crate::domain::price::PricePoint;
use crate::domain::ranking::RankRecord;
use crate::domain::scoring::CompositeScore;
use crate::domain::validation::Checkpoint;
use crate::ports::config_port::ConfigPort;
use crate::ports::price_port::PricePort;
use crate::ports::score_store_port::ScoreStorePort;
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn query_err(e: rusqlite::Error) -> FundrankError {
    FundrankError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn fmt_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date_column(idx: usize, text: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FundrankError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| FundrankError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool =
            Pool::builder()
                .max_size(pool_size)
                .build(manager)
                .map_err(|e: r2d2::Error| FundrankError::Database {
                    reason: e.to_string(),
                })?;

        let adapter = Self { pool };
        adapter.initialize_schema()?;
        tracing::debug!(path = %db_path, pool_size, "opened sqlite store");
        Ok(adapter)
    }

    pub fn in_memory() -> Result<Self, FundrankError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| FundrankError::Database {
                reason: e.to_string(),
            })?;

        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    /// A pooled connection. Exhausting the pool counts as the source being
    /// unavailable, so callers may retry.
    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, FundrankError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| FundrankError::SourceUnavailable {
                reason: e.to_string(),
                attempts: 1,
            })
    }

    pub fn initialize_schema(&self) -> Result<(), FundrankError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS prices (
                instrument_id TEXT NOT NULL,
                date TEXT NOT NULL,
                value REAL NOT NULL,
                PRIMARY KEY (instrument_id, date)
            );
            CREATE TABLE IF NOT EXISTS instruments (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                subcategory TEXT NOT NULL,
                expense_ratio REAL,
                aum REAL,
                inception TEXT
            );
            CREATE TABLE IF NOT EXISTS composite_scores (
                instrument_id TEXT NOT NULL,
                score_date TEXT NOT NULL,
                total_score REAL NOT NULL,
                table_version TEXT NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (instrument_id, score_date)
            );
            CREATE TABLE IF NOT EXISTS rank_records (
                scope TEXT NOT NULL,
                score_date TEXT NOT NULL,
                instrument_id TEXT NOT NULL,
                total_score REAL NOT NULL,
                rank INTEGER NOT NULL,
                percentile INTEGER NOT NULL,
                quartile INTEGER NOT NULL,
                universe_size INTEGER NOT NULL,
                PRIMARY KEY (scope, score_date, instrument_id)
            );
            CREATE TABLE IF NOT EXISTS validation_checkpoints (
                run_id TEXT PRIMARY KEY,
                payload TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_prices_date ON prices(date);
            CREATE INDEX IF NOT EXISTS idx_scores_date ON composite_scores(score_date);",
        )
        .map_err(query_err)?;

        Ok(())
    }

    pub fn insert_points(&self, points: &[PricePoint]) -> Result<(), FundrankError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for p in points {
            tx.execute(
                "INSERT OR REPLACE INTO prices (instrument_id, date, value) VALUES (?1, ?2, ?3)",
                params![p.instrument_id, fmt_date(p.date), p.value],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(())
    }

    pub fn upsert_instruments(&self, instruments: &[Instrument]) -> Result<(), FundrankError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for i in instruments {
            tx.execute(
                "INSERT OR REPLACE INTO instruments
                 (id, name, category, subcategory, expense_ratio, aum, inception)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    i.id,
                    i.name,
                    i.category,
                    i.subcategory,
                    i.expense_ratio,
                    i.aum,
                    i.inception.map(fmt_date)
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(())
    }

    /// (first date, last date, count) of the stored series.
    pub fn get_data_range(
        &self,
        instrument_id: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, FundrankError> {
        let conn = self.conn()?;
        let result: (Option<String>, Option<String>, i64) = conn
            .query_row(
                "SELECT MIN(date), MAX(date), COUNT(*) FROM prices WHERE instrument_id = ?1",
                params![instrument_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_err)?;

        match result {
            (Some(min), Some(max), count) if count > 0 => {
                let min = parse_date_column(0, min).map_err(query_err)?;
                let max = parse_date_column(1, max).map_err(query_err)?;
                Ok(Some((min, max, count as usize)))
            }
            _ => Ok(None),
        }
    }

    fn query_instruments(
        &self,
        filter: Option<&str>,
    ) -> Result<Vec<Instrument>, FundrankError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, category, subcategory, expense_ratio, aum, inception
                 FROM instruments WHERE ?1 IS NULL OR id = ?1 ORDER BY id",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![filter], |row| {
                let inception: Option<String> = row.get(6)?;
                Ok(Instrument {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    category: row.get(2)?,
                    subcategory: row.get(3)?,
                    expense_ratio: row.get(4)?,
                    aum: row.get(5)?,
                    inception: inception.map(|s| parse_date_column(6, s)).transpose()?,
                })
            })
            .map_err(query_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }
}

impl PricePort for SqliteAdapter {
    fn get_series(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, FundrankError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT date, value FROM prices
                 WHERE instrument_id = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![instrument_id, fmt_date(start), fmt_date(end)], |row| {
                let date = parse_date_column(0, row.get(0)?)?;
                Ok(PricePoint::new(instrument_id, date, row.get(1)?))
            })
            .map_err(query_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn get_instrument(&self, instrument_id: &str) -> Result<Option<Instrument>, FundrankError> {
        Ok(self.query_instruments(Some(instrument_id))?.into_iter().next())
    }

    fn list_instruments(&self) -> Result<Vec<Instrument>, FundrankError> {
        self.query_instruments(None)
    }
}

impl ScoreStorePort for SqliteAdapter {
    fn save_scores(&self, scores: &[CompositeScore]) -> Result<(), FundrankError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for s in scores {
            let payload = serde_json::to_string(s)?;
            tx.execute(
                "INSERT OR REPLACE INTO composite_scores
                 (instrument_id, score_date, total_score, table_version, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    s.instrument_id,
                    fmt_date(s.score_date),
                    s.total_score,
                    s.table_version,
                    payload
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(())
    }

    fn load_scores(&self, score_date: NaiveDate) -> Result<Vec<CompositeScore>, FundrankError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT payload FROM composite_scores WHERE score_date = ?1 ORDER BY instrument_id",
            )
            .map_err(query_err)?;
        let payloads = stmt
            .query_map(params![fmt_date(score_date)], |row| row.get::<_, String>(0))
            .map_err(query_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_err)?;

        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(FundrankError::from))
            .collect()
    }

    fn latest_score_date(&self, as_of: NaiveDate) -> Result<Option<NaiveDate>, FundrankError> {
        let conn = self.conn()?;
        let latest: Option<String> = conn
            .query_row(
                "SELECT MAX(score_date) FROM composite_scores WHERE score_date <= ?1",
                params![fmt_date(as_of)],
                |row| row.get(0),
            )
            .map_err(query_err)?;
        latest
            .map(|s| parse_date_column(0, s).map_err(query_err))
            .transpose()
    }

    fn clear_score_date(&self, score_date: NaiveDate) -> Result<(), FundrankError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        let date = fmt_date(score_date);

        let ranks = tx
            .execute("DELETE FROM rank_records WHERE score_date = ?1", params![date])
            .map_err(query_err)?;
        let scores = tx
            .execute("DELETE FROM composite_scores WHERE score_date = ?1", params![date])
            .map_err(query_err)?;

        tx.commit().map_err(query_err)?;
        tracing::debug!(%score_date, scores, ranks, "score date cleared");
        Ok(())
    }

    fn replace_ranks(
        &self,
        scope: &Scope,
        score_date: NaiveDate,
        records: &[RankRecord],
    ) -> Result<(), FundrankError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        let scope_key = scope.to_string();
        let date = fmt_date(score_date);

        tx.execute(
            "DELETE FROM rank_records WHERE scope = ?1 AND score_date = ?2",
            params![scope_key, date],
        )
        .map_err(query_err)?;

        for r in records {
            tx.execute(
                "INSERT INTO rank_records
                 (scope, score_date, instrument_id, total_score,
                  rank, percentile, quartile, universe_size)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    scope_key,
                    date,
                    r.instrument_id,
                    r.total_score,
                    r.rank as i64,
                    r.percentile,
                    r.quartile,
                    r.universe_size as i64
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        tracing::debug!(
            scope = %scope,
            %score_date,
            records = records.len(),
            "rank scope replaced"
        );
        Ok(())
    }

    fn load_ranks(
        &self,
        scope: &Scope,
        score_date: NaiveDate,
    ) -> Result<Vec<RankRecord>, FundrankError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT instrument_id, total_score, rank, percentile, quartile, universe_size
                 FROM rank_records WHERE scope = ?1 AND score_date = ?2 ORDER BY rank",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![scope.to_string(), fmt_date(score_date)], |row| {
                Ok(RankRecord {
                    instrument_id: row.get(0)?,
                    scope: scope.clone(),
                    score_date,
                    total_score: row.get(1)?,
                    rank: row.get::<_, i64>(2)? as usize,
                    percentile: row.get(3)?,
                    quartile: row.get(4)?,
                    universe_size: row.get::<_, i64>(5)? as usize,
                })
            })
            .map_err(query_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn save_checkpoint(&self, run_id: &str, checkpoint: &Checkpoint) -> Result<(), FundrankError> {
        let payload = serde_json::to_string(checkpoint)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO validation_checkpoints (run_id, payload) VALUES (?1, ?2)",
            params![run_id, payload],
        )
        .map_err(query_err)?;
        Ok(())
    }

    fn load_checkpoint(&self, run_id: &str) -> Result<Option<Checkpoint>, FundrankError> {
        let conn = self.conn()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM validation_checkpoints WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_err)?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(FundrankError::from))
            .transpose()
    }
}
