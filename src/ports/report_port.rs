//! Report output port.

use crate::domain::error::FundrankError;
use crate::domain::ranking::RankRecord;
use crate::domain::recommendation::Thresholds;
use crate::domain::simulation::BacktestRun;
use crate::domain::validation::ValidationReport;

/// Port for writing run results to a file.
pub trait ReportPort {
    /// Rank records with the recommendation label each score maps to.
    fn write_ranks(
        &self,
        records: &[RankRecord],
        thresholds: &Thresholds,
        output_path: &str,
    ) -> Result<(), FundrankError>;

    fn write_backtest(&self, run: &BacktestRun, output_path: &str) -> Result<(), FundrankError>;

    fn write_validation(
        &self,
        report: &ValidationReport,
        output_path: &str,
    ) -> Result<(), FundrankError>;
}
