//! CLI integration tests for the command orchestration.
//!
//! Tests cover:
//! - Config loading and validation failures
//! - Scoring cycle, ranking and reports against a CSV price directory
//! - Simulation and validation commands writing CSV output
//! - Import into sqlite and reading prices back through it

mod common;

use chrono::{Duration, NaiveDate};
use common::*;
use fundrank::cli;
use fundrank::domain::error::FundrankError;
use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const FUNDS: [(&str, &str, f64); 4] = [
    ("119551", "Large Cap", 0.0003),
    ("119552", "Large Cap", 0.0005),
    ("119553", "Large Cap", 0.0007),
    ("120503", "Liquid", 0.0002),
];

fn series_start() -> NaiveDate {
    date(2018, 1, 1)
}

fn as_of() -> NaiveDate {
    date(2024, 6, 28)
}

fn write_series(dir: &Path, id: &str, growth: f64) {
    let mut body = String::from("date,value\n");
    for p in growth_series(id, series_start(), 2400, growth) {
        writeln!(body, "{},{:.6}", p.date, p.value).unwrap();
    }
    fs::write(dir.join(format!("{id}.csv")), body).unwrap();
}

/// A CSV price directory, a sqlite path and an INI tying them together.
struct Fixture {
    dir: TempDir,
    config: PathBuf,
}

impl Fixture {
    fn new(extra: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let prices = dir.path().join("prices");
        fs::create_dir(&prices).unwrap();

        let mut meta = String::from("id,name,category,subcategory,expense_ratio,aum,inception\n");
        for (id, sub, growth) in FUNDS {
            write_series(&prices, id, growth);
            writeln!(meta, "{id},Fund {id},Equity,{sub},1.0,2500,2018-01-01").unwrap();
        }
        fs::write(prices.join("instruments.csv"), meta).unwrap();
        // Benchmarks have a series but no instrument row.
        write_series(&prices, "NIFTY50", 0.0004);

        let ini = format!(
            "[prices]\nsource = csv\npath = {}\nretry_base_delay_ms = 0\n\n\
             [sqlite]\npath = {}\n\n\
             [logging]\nlevel = warn\n\n{}",
            prices.display(),
            dir.path().join("fundrank.db").display(),
            extra
        );
        let config = dir.path().join("fundrank.ini");
        let mut file = fs::File::create(&config).unwrap();
        file.write_all(ini.as_bytes()).unwrap();

        Fixture { dir, config }
    }

    fn out(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

const SIMULATION: &str = "[simulation]\n\
start_date = 2023-01-01\n\
end_date = 2023-12-31\n\
weights = 119551:0.6, 120503:0.4\n\
cadence = quarterly\n\
benchmark = NIFTY50\n";

const VALIDATION: &str = "[validation]\n\
t0 = 2022-06-30\n\
horizons = 3, 6, 12\n\
checkpoint_every = 2\n\n\
[ranking]\n\
min_scope_size = 1\n";

mod config_loading {
    use super::*;

    #[test]
    fn missing_config_file_is_a_parse_error() {
        let result = cli::load_config(Path::new("/nonexistent/fundrank.ini"));
        assert!(matches!(result, Err(FundrankError::ConfigParse { .. })));
    }

    #[test]
    fn simulation_without_section_reports_missing_key() {
        let fx = Fixture::new("");
        let err = cli::run_simulate(&fx.config, None, false).unwrap_err();
        assert!(matches!(err, FundrankError::ConfigMissing { key, .. } if key == "start_date"));
    }

    #[test]
    fn classify_works_without_config() {
        assert!(cli::run_classify(None, 72.0).is_ok());
        assert!(matches!(
            cli::run_classify(None, 150.0),
            Err(FundrankError::InvalidScore { .. })
        ));
    }

    #[test]
    fn cli_exit_code_reflects_failure() {
        let parsed = <cli::Cli as clap::Parser>::try_parse_from([
            "fundrank",
            "simulate",
            "--config",
            "/nonexistent/fundrank.ini",
        ])
        .unwrap();
        let code = cli::run(parsed);
        assert_eq!(format!("{code:?}"), format!("{:?}", std::process::ExitCode::from(2)));
    }
}

#[cfg(feature = "sqlite")]
mod scoring_commands {
    use super::*;
    use fundrank::adapters::file_config_adapter::FileConfigAdapter;
    use fundrank::adapters::sqlite_adapter::SqliteAdapter;
    use fundrank::domain::instrument::Scope;
    use fundrank::ports::score_store_port::ScoreStorePort;

    fn store(fx: &Fixture) -> SqliteAdapter {
        let config = FileConfigAdapter::from_file(&fx.config).unwrap();
        SqliteAdapter::from_config(&config).unwrap()
    }

    #[test]
    fn score_cycle_persists_scores_and_ranks() {
        let fx = Fixture::new("");
        cli::run_score(&fx.config, as_of(), None, false).unwrap();

        let store = store(&fx);
        assert_eq!(store.load_scores(as_of()).unwrap().len(), 4);
        let overall = store.load_ranks(&Scope::Overall, as_of()).unwrap();
        let ids: Vec<&str> = overall.iter().map(|r| r.instrument_id.as_str()).collect();
        assert_eq!(ids[0], "119553");
        assert_eq!(overall.len(), 4);

        let large_cap = store
            .load_ranks(&Scope::Subcategory("Large Cap".into()), as_of())
            .unwrap();
        assert_eq!(large_cap.len(), 3);
        assert!(store
            .load_ranks(&Scope::Subcategory("Liquid".into()), as_of())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn rank_command_writes_report() {
        let fx = Fixture::new("");
        cli::run_score(&fx.config, as_of(), None, false).unwrap();

        let out = fx.out("ranks.csv");
        cli::run_rank(
            &fx.config,
            as_of() + Duration::days(3),
            "overall",
            fundrank::domain::ranking::Page::default(),
            Some(&out),
            false,
        )
        .unwrap();

        let written = fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with("overall,2024-06-28,1,119553,"));
    }

    #[test]
    fn single_instrument_score_needs_no_store() {
        let fx = Fixture::new("");
        cli::run_score(&fx.config, as_of(), Some("119551"), true).unwrap();
        assert!(!fx.out("fundrank.db").exists());
    }

    #[test]
    fn distribution_and_recalibration_read_stored_scores() {
        let fx = Fixture::new("");
        cli::run_score(&fx.config, as_of(), None, false).unwrap();

        cli::run_distribution(&fx.config, as_of(), true).unwrap();
        cli::run_recalibrate(&fx.config, as_of(), "0.25,0.25,0.25,0.15,0.10").unwrap();
        assert!(matches!(
            cli::run_recalibrate(&fx.config, as_of(), "0.5,0.5"),
            Err(FundrankError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn validation_with_stored_scores_and_resume() {
        let fx = Fixture::new(VALIDATION);
        cli::run_score(&fx.config, date(2022, 6, 30), None, false).unwrap();

        let out = fx.out("validation.csv");
        cli::run_validate(&fx.config, true, false, Some(&out), false).unwrap();
        let rows = fs::read_to_string(&out).unwrap().lines().count();
        assert_eq!(rows, 1 + 4 * 3);

        let checkpoint = store(&fx)
            .load_checkpoint("validation-2022-06-30")
            .unwrap()
            .unwrap();
        assert_eq!(checkpoint.processed.len(), 4);

        // Everything is already processed; resuming only re-summarises.
        cli::run_validate(&fx.config, true, true, None, true).unwrap();
    }

    #[test]
    fn import_then_read_prices_from_sqlite() {
        let fx = Fixture::new("");
        cli::run_import(&fx.config, &fx.dir.path().join("prices")).unwrap();

        let store = store(&fx);
        let (first, _, count) = store.get_data_range("119551").unwrap().unwrap();
        assert_eq!(first, series_start());
        assert_eq!(count, 2400);

        let sqlite_ini = fx.out("sqlite.ini");
        fs::write(
            &sqlite_ini,
            format!(
                "[prices]\nsource = sqlite\n\n[sqlite]\npath = {}\n",
                fx.out("fundrank.db").display()
            ),
        )
        .unwrap();
        cli::run_info(&sqlite_ini, None).unwrap();
        cli::run_info(&sqlite_ini, Some("120503")).unwrap();
        assert!(matches!(
            cli::run_info(&sqlite_ini, Some("000000")),
            Err(FundrankError::NotFound { .. })
        ));
    }
}

mod simulation_commands {
    use super::*;

    #[test]
    fn simulate_writes_equity_and_monthly_files() {
        let fx = Fixture::new(SIMULATION);
        let out = fx.out("backtest.csv");
        cli::run_simulate(&fx.config, Some(&out), false).unwrap();

        let equity = fs::read_to_string(&out).unwrap();
        let mut lines = equity.lines();
        assert_eq!(lines.next().unwrap(), "date,portfolio,benchmark,rebalanced");
        assert!(lines.next().unwrap().starts_with("2023-01-01,100000.0000,100000.0000,"));

        let monthly = fs::read_to_string(fx.out("backtest_monthly.csv")).unwrap();
        assert_eq!(monthly.lines().count(), 1 + 12);
    }

    #[test]
    fn simulate_rejects_bad_weights() {
        let fx = Fixture::new(
            "[simulation]\nstart_date = 2023-01-01\nend_date = 2023-12-31\nweights = 119551:0.7\n",
        );
        let err = cli::run_simulate(&fx.config, None, true).unwrap_err();
        assert!(matches!(err, FundrankError::ConfigInvalid { key, .. } if key == "weights"));
    }
}
