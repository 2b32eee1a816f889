//! CSV report adapter implementing ReportPort.
//!
//! Backtests write the joined equity curves to the given path and a
//! `<stem>_monthly.csv` of compounded monthly portfolio returns beside it.

use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::error::FundrankError;
use crate::domain::portfolio::EquityPoint;
use crate::domain::ranking::RankRecord;
use crate::domain::recommendation::{classify, Thresholds};
use crate::domain::simulation::BacktestRun;
use crate::domain::validation::ValidationReport;
use crate::ports::report_port::ReportPort;
use chrono::{Datelike, NaiveDate};

pub struct CsvReportAdapter;

fn csv_err(e: csv::Error) -> FundrankError {
    FundrankError::Io(std::io::Error::other(e.to_string()))
}

fn opt(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.6}")).unwrap_or_default()
}

/// Compounded return per (year, month), from consecutive curve points.
pub fn monthly_returns(curve: &[EquityPoint]) -> BTreeMap<(i32, u32), f64> {
    let mut growth: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for pair in curve.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);
        if prev.equity <= 0.0 {
            continue;
        }
        let factor = curr.equity / prev.equity;
        *growth.entry((curr.date.year(), curr.date.month())).or_insert(1.0) *= factor;
    }
    growth.into_iter().map(|(k, g)| (k, g - 1.0)).collect()
}

fn monthly_path(output_path: &str) -> String {
    let path = Path::new(output_path);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "backtest".to_string());
    path.with_file_name(format!("{stem}_monthly.csv"))
        .to_string_lossy()
        .into_owned()
}

impl ReportPort for CsvReportAdapter {
    fn write_ranks(
        &self,
        records: &[RankRecord],
        thresholds: &Thresholds,
        output_path: &str,
    ) -> Result<(), FundrankError> {
        let mut wtr = csv::Writer::from_path(output_path).map_err(csv_err)?;
        wtr.write_record([
            "scope",
            "score_date",
            "rank",
            "instrument_id",
            "total_score",
            "percentile",
            "quartile",
            "universe_size",
            "recommendation",
        ])
        .map_err(csv_err)?;

        for r in records {
            wtr.write_record([
                r.scope.to_string(),
                r.score_date.to_string(),
                r.rank.to_string(),
                r.instrument_id.clone(),
                format!("{:.2}", r.total_score),
                r.percentile.to_string(),
                format!("Q{}", r.quartile),
                r.universe_size.to_string(),
                classify(r.total_score, thresholds).to_string(),
            ])
            .map_err(csv_err)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_backtest(&self, run: &BacktestRun, output_path: &str) -> Result<(), FundrankError> {
        let benchmark: BTreeMap<NaiveDate, f64> = run
            .benchmark_series
            .iter()
            .map(|p| (p.date, p.equity))
            .collect();

        let mut wtr = csv::Writer::from_path(output_path).map_err(csv_err)?;
        wtr.write_record(["date", "portfolio", "benchmark", "rebalanced"])
            .map_err(csv_err)?;
        for point in &run.portfolio_series {
            let rebalanced = run.rebalances.iter().any(|r| r.date == point.date);
            wtr.write_record([
                point.date.to_string(),
                format!("{:.4}", point.equity),
                benchmark
                    .get(&point.date)
                    .map(|v| format!("{v:.4}"))
                    .unwrap_or_default(),
                rebalanced.to_string(),
            ])
            .map_err(csv_err)?;
        }
        wtr.flush()?;

        let mut monthly = csv::Writer::from_path(monthly_path(output_path)).map_err(csv_err)?;
        monthly
            .write_record(["year", "month", "return"])
            .map_err(csv_err)?;
        for ((year, month), ret) in monthly_returns(&run.portfolio_series) {
            monthly
                .write_record([year.to_string(), month.to_string(), format!("{ret:.6}")])
                .map_err(csv_err)?;
        }
        monthly.flush()?;
        Ok(())
    }

    fn write_validation(
        &self,
        report: &ValidationReport,
        output_path: &str,
    ) -> Result<(), FundrankError> {
        let mut wtr = csv::Writer::from_path(output_path).map_err(csv_err)?;
        wtr.write_record([
            "instrument_id",
            "score_date",
            "historical_score",
            "predicted_quartile",
            "horizon_months",
            "forward_return",
            "realized_quartile",
            "quartile_stable",
        ])
        .map_err(csv_err)?;

        for record in &report.records {
            for outcome in &record.outcomes {
                wtr.write_record([
                    record.instrument_id.clone(),
                    record.score_date.to_string(),
                    format!("{:.2}", record.historical_score),
                    record.predicted_quartile.to_string(),
                    outcome.horizon_months.to_string(),
                    opt(outcome.forward_return),
                    outcome
                        .realized_quartile
                        .map(|q| q.to_string())
                        .unwrap_or_default(),
                    outcome
                        .quartile_stable
                        .map(|s| s.to_string())
                        .unwrap_or_default(),
                ])
                .map_err(csv_err)?;
            }
        }
        wtr.flush()?;
        Ok(())
    }
}
