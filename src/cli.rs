//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::retry_adapter::{RetryPolicy, RetryingPricePort};
use crate::domain::config_validation::{
    validate_prices_config, validate_scoring_config, validate_simulation_config,
    validate_sqlite_path, validate_validation_config,
};
use crate::domain::error::FundrankError;
use crate::domain::instrument::Scope;
use crate::domain::pipeline::{query_ranks, run_scoring_cycle, score_instrument, ScoringSettings};
use crate::domain::ranking::Page;
use crate::domain::recommendation::{classify, LabelDistribution, Recommendation, Thresholds};
use crate::domain::scoring::CompositeScore;
use crate::domain::simulation::{run_simulation, BacktestRun, SimulationConfig};
use crate::domain::validation::{
    run_validation, Checkpoint, ScoreSnapshot, ValidationConfig, ValidationReport,
};
use crate::logging;
use crate::ports::config_port::ConfigPort;
use crate::ports::price_port::PricePort;
use crate::ports::report_port::ReportPort;
use crate::ports::score_store_port::ScoreStorePort;

#[derive(Parser, Debug)]
#[command(name = "fundrank", about = "Fund scoring, ranking and backtesting")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Score one instrument, or run a full scoring and ranking cycle
    Score {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        as_of: NaiveDate,
        #[arg(long)]
        instrument: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show stored ranks for a scope
    Rank {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        as_of: NaiveDate,
        /// `overall` or `subcategory:<name>`
        #[arg(long, default_value = "overall")]
        scope: String,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Map a total score to a recommendation label
    Classify {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        score: f64,
    },
    /// Label distribution over the latest stored scores
    Distribution {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        as_of: NaiveDate,
        #[arg(long)]
        json: bool,
    },
    /// Suggest thresholds that hit target label shares
    Recalibrate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        as_of: NaiveDate,
        /// Five shares, best label first, e.g. `0.1,0.2,0.4,0.2,0.1`
        #[arg(long)]
        shares: String,
    },
    /// Simulate a weighted portfolio against a benchmark
    Simulate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Validate historical scores against realised forward returns
    Validate {
        #[arg(short, long)]
        config: PathBuf,
        /// Use stored scores for T0 instead of recomputing them
        #[arg(long)]
        stored_scores: bool,
        /// Continue from the stored checkpoint of this run
        #[arg(long)]
        resume: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Load a CSV price directory into the sqlite store
    Import {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        dir: PathBuf,
    },
    /// Show data ranges per instrument
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        instrument: Option<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Score {
            config,
            as_of,
            instrument,
            json,
        } => run_score(&config, as_of, instrument.as_deref(), json),
        Command::Rank {
            config,
            as_of,
            scope,
            offset,
            limit,
            output,
            json,
        } => run_rank(&config, as_of, &scope, Page { offset, limit }, output.as_deref(), json),
        Command::Classify { config, score } => run_classify(config.as_deref(), score),
        Command::Distribution {
            config,
            as_of,
            json,
        } => run_distribution(&config, as_of, json),
        Command::Recalibrate {
            config,
            as_of,
            shares,
        } => run_recalibrate(&config, as_of, &shares),
        Command::Simulate {
            config,
            output,
            json,
        } => run_simulate(&config, output.as_deref(), json),
        Command::Validate {
            config,
            stored_scores,
            resume,
            output,
            json,
        } => run_validate(&config, stored_scores, resume, output.as_deref(), json),
        Command::Import { config, dir } => run_import(&config, &dir),
        Command::Info { config, instrument } => run_info(&config, instrument.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Loads the INI file and installs logging from its `[logging]` section.
pub fn load_config(path: &Path) -> Result<FileConfigAdapter, FundrankError> {
    let config = FileConfigAdapter::from_file(path)?;
    logging::init(Some(&config as &dyn ConfigPort));
    Ok(config)
}

/// The configured price source wrapped in retries.
pub fn open_price_port(config: &dyn ConfigPort) -> Result<Box<dyn PricePort>, FundrankError> {
    validate_prices_config(config)?;
    let policy = RetryPolicy::from_config(config)?;
    let source = config
        .get_string("prices", "source")
        .unwrap_or_else(|| "csv".to_string());

    if source.trim() == "sqlite" {
        return open_sqlite_prices(config, policy);
    }
    let path = config
        .get_string("prices", "path")
        .ok_or_else(|| FundrankError::ConfigMissing {
            section: "prices".into(),
            key: "path".into(),
        })?;
    Ok(Box::new(RetryingPricePort::new(
        CsvAdapter::new(PathBuf::from(path)),
        policy,
    )))
}

#[cfg(feature = "sqlite")]
fn open_sqlite_prices(
    config: &dyn ConfigPort,
    policy: RetryPolicy,
) -> Result<Box<dyn PricePort>, FundrankError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;
    Ok(Box::new(RetryingPricePort::new(
        SqliteAdapter::from_config(config)?,
        policy,
    )))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite_prices(
    _config: &dyn ConfigPort,
    _policy: RetryPolicy,
) -> Result<Box<dyn PricePort>, FundrankError> {
    Err(sqlite_disabled())
}

#[cfg(feature = "sqlite")]
pub fn open_store(config: &dyn ConfigPort) -> Result<Box<dyn ScoreStorePort>, FundrankError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;
    validate_sqlite_path(config)?;
    Ok(Box::new(SqliteAdapter::from_config(config)?))
}

#[cfg(not(feature = "sqlite"))]
pub fn open_store(config: &dyn ConfigPort) -> Result<Box<dyn ScoreStorePort>, FundrankError> {
    validate_sqlite_path(config)?;
    Err(sqlite_disabled())
}

#[cfg(not(feature = "sqlite"))]
fn sqlite_disabled() -> FundrankError {
    FundrankError::config_invalid("sqlite", "path", "built without the sqlite feature")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), FundrankError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_score(score: &CompositeScore, thresholds: &Thresholds) {
    println!(
        "{}  {}  total {:.2}  {}",
        score.instrument_id,
        score.score_date,
        score.total_score,
        classify(score.total_score, thresholds)
    );
    for component in &score.components {
        println!(
            "  {:<12} {:>6.2} / {:.0}",
            component.component.key(),
            component.value,
            component.max_value
        );
    }
    let missing = score.missing_metrics();
    if !missing.is_empty() {
        let keys: Vec<&str> = missing.iter().map(|m| m.key()).collect();
        println!("  missing: {}", keys.join(", "));
    }
}

pub fn run_score(
    config_path: &Path,
    as_of: NaiveDate,
    instrument: Option<&str>,
    json: bool,
) -> Result<(), FundrankError> {
    let config = load_config(config_path)?;
    validate_scoring_config(&config)?;
    let settings = ScoringSettings::from_config(&config)?;
    let thresholds = Thresholds::from_config(&config)?;
    let port = open_price_port(&config)?;

    if let Some(id) = instrument {
        return match score_instrument(port.as_ref(), id, as_of, &settings)? {
            Some(score) if json => print_json(&score),
            Some(score) => {
                print_score(&score, &thresholds);
                Ok(())
            }
            None => Err(FundrankError::InsufficientHistory {
                instrument: id.to_string(),
                have: 0,
                need: 1,
            }),
        };
    }

    let store = open_store(&config)?;
    tracing::info!(%as_of, batch_size = settings.batch_size, "starting scoring cycle");
    let summary = run_scoring_cycle(port.as_ref(), store.as_ref(), as_of, &settings)?;

    println!("Score date:       {}", summary.score_date);
    println!("Batches:          {}", summary.report.batches);
    println!("Scored:           {}", summary.report.scored);
    println!("Not scorable:     {}", summary.report.unscored);
    println!("Failed:           {}", summary.report.failed.len());
    println!("Ranked scopes:    {}", summary.ranked_scopes);
    println!("Unranked scopes:  {}", summary.unranked_scopes);
    for (id, reason) in &summary.report.failed {
        eprintln!("  {id}: {reason}");
    }
    Ok(())
}

pub fn run_rank(
    config_path: &Path,
    as_of: NaiveDate,
    scope: &str,
    page: Page,
    output: Option<&Path>,
    json: bool,
) -> Result<(), FundrankError> {
    let config = load_config(config_path)?;
    let thresholds = Thresholds::from_config(&config)?;
    let store = open_store(&config)?;
    let scope = Scope::parse(scope);

    let records = query_ranks(store.as_ref(), &scope, as_of, page)?;
    if let Some(path) = output {
        CsvReportAdapter.write_ranks(&records, &thresholds, &path.to_string_lossy())?;
        eprintln!("Ranks written to: {}", path.display());
    }
    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        eprintln!("No ranks stored for {scope} on or before {as_of}");
        return Ok(());
    }
    println!(
        "{:>5}  {:<16} {:>8} {:>5} {:>3}  label",
        "rank", "instrument", "score", "pct", "q"
    );
    for r in &records {
        println!(
            "{:>5}  {:<16} {:>8.2} {:>5} Q{:<2}  {}",
            r.rank,
            r.instrument_id,
            r.total_score,
            r.percentile,
            r.quartile,
            classify(r.total_score, &thresholds)
        );
    }
    Ok(())
}

pub fn run_classify(config_path: Option<&Path>, score: f64) -> Result<(), FundrankError> {
    let thresholds = match config_path {
        Some(path) => Thresholds::from_config(&load_config(path)?)?,
        None => {
            logging::init(None);
            Thresholds::default()
        }
    };
    if !(0.0..=100.0).contains(&score) {
        return Err(FundrankError::InvalidScore {
            instrument: "<input>".into(),
            reason: format!("total score {score} outside 0..=100"),
        });
    }
    println!("{}", classify(score, &thresholds));
    Ok(())
}

fn latest_scores(
    store: &dyn ScoreStorePort,
    as_of: NaiveDate,
) -> Result<Vec<CompositeScore>, FundrankError> {
    match store.latest_score_date(as_of)? {
        Some(date) => store.load_scores(date),
        None => Ok(Vec::new()),
    }
}

pub fn run_distribution(
    config_path: &Path,
    as_of: NaiveDate,
    json: bool,
) -> Result<(), FundrankError> {
    let config = load_config(config_path)?;
    let thresholds = Thresholds::from_config(&config)?;
    let store = open_store(&config)?;
    let totals: Vec<f64> = latest_scores(store.as_ref(), as_of)?
        .iter()
        .map(|s| s.total_score)
        .collect();

    let distribution = LabelDistribution::from_scores(&totals, &thresholds);
    if json {
        return print_json(&distribution);
    }
    for label in Recommendation::ALL {
        println!(
            "{:<12} {:>6} {:>6.1}%",
            label.label(),
            distribution.count(label),
            distribution.percentage(label)
        );
    }
    println!("{:<12} {:>6}", "TOTAL", distribution.total);
    Ok(())
}

fn parse_shares(input: &str) -> Result<[f64; 5], FundrankError> {
    let values: Vec<f64> = input
        .split(',')
        .map(|s| s.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| {
            FundrankError::config_invalid("recommendation", "target_shares", e.to_string())
        })?;
    values.try_into().map_err(|v: Vec<f64>| {
        FundrankError::config_invalid(
            "recommendation",
            "target_shares",
            format!("expected 5 shares, got {}", v.len()),
        )
    })
}

pub fn run_recalibrate(
    config_path: &Path,
    as_of: NaiveDate,
    shares: &str,
) -> Result<(), FundrankError> {
    let config = load_config(config_path)?;
    let shares = parse_shares(shares)?;
    let store = open_store(&config)?;
    let totals: Vec<f64> = latest_scores(store.as_ref(), as_of)?
        .iter()
        .map(|s| s.total_score)
        .collect();

    let current = Thresholds::from_config(&config)?;
    let proposed = Thresholds::recalibrate(&totals, shares)?;
    let before = LabelDistribution::from_scores(&totals, &current);
    let after = LabelDistribution::from_scores(&totals, &proposed);

    println!("[recommendation]");
    println!("strong_buy = {:.2}", proposed.strong_buy);
    println!("buy = {:.2}", proposed.buy);
    println!("hold = {:.2}", proposed.hold);
    println!("sell = {:.2}", proposed.sell);
    eprintln!();
    for label in Recommendation::ALL {
        eprintln!(
            "{:<12} {:>6.1}% -> {:>6.1}%",
            label.label(),
            before.percentage(label),
            after.percentage(label)
        );
    }
    Ok(())
}

fn print_backtest(run: &BacktestRun) {
    let m = &run.portfolio_metrics;
    let pct = |v: Option<f64>| {
        v.map(|x| format!("{:.2}%", x * 100.0))
            .unwrap_or_else(|| "n/a".into())
    };
    let num = |v: Option<f64>| v.map(|x| format!("{x:.2}")).unwrap_or_else(|| "n/a".into());

    println!("=== {} ===", run.id);
    println!("Start Value:      {:.2}", m.start_value);
    println!("End Value:        {:.2}", m.end_value);
    println!("Total Return:     {:.2}%", m.total_return * 100.0);
    println!("Annualized:       {}", pct(m.annualized_return));
    println!("Volatility:       {}", pct(m.volatility));
    println!("Sharpe Ratio:     {}", num(m.sharpe));
    println!("Sortino Ratio:    {}", num(m.sortino));
    println!(
        "Max Drawdown:     -{:.1}% ({} days)",
        m.max_drawdown * 100.0,
        m.max_drawdown_days
    );
    println!("Rebalances:       {}", run.rebalances.len());
    if let Some(b) = &run.benchmark_metrics {
        println!("Benchmark Return: {:.2}%", b.total_return * 100.0);
        println!(
            "Excess Return:    {:.2}%",
            (m.total_return - b.total_return) * 100.0
        );
    }
    if !run.excluded_dates.is_empty() {
        eprintln!("warning: {} dates excluded for stale prices", run.excluded_dates.len());
    }
}

pub fn run_simulate(
    config_path: &Path,
    output: Option<&Path>,
    json: bool,
) -> Result<(), FundrankError> {
    let config = load_config(config_path)?;
    validate_simulation_config(&config)?;
    let sim = SimulationConfig::from_config(&config)?;
    let port = open_price_port(&config)?;

    tracing::info!(
        id = %sim.id,
        start = %sim.start_date,
        end = %sim.end_date,
        "running simulation"
    );
    let run = run_simulation(port.as_ref(), &sim)?;

    if let Some(path) = output {
        CsvReportAdapter.write_backtest(&run, &path.to_string_lossy())?;
        eprintln!("Equity curves written to: {}", path.display());
    }
    if json {
        print_json(&run)
    } else {
        print_backtest(&run);
        Ok(())
    }
}

fn print_validation(report: &ValidationReport) {
    let fmt = |v: Option<f64>| v.map(|x| format!("{x:.3}")).unwrap_or_else(|| "n/a".into());
    println!(
        "Validation {} (T0 {}), {} instruments",
        report.run_id,
        report.t0,
        report.records.len()
    );
    for s in &report.summary {
        println!("\n--- {} months (n = {}) ---", s.horizon_months, s.sample_size);
        println!("Rank correlation:  {}", fmt(s.rank_correlation));
        println!("Accuracy:          {}", fmt(s.accuracy));
        for (q, rate) in s.hit_rate_by_quartile.iter().enumerate() {
            println!("Hit rate Q{}:       {}", q + 1, fmt(*rate));
        }
        println!("Q1 mean return:    {}", fmt(s.q1_mean_return));
        println!("Q4 mean return:    {}", fmt(s.q4_mean_return));
        match s.q1_beats_q4 {
            Some(b) => println!("Q1 beats Q4:       {b}"),
            None => println!("Q1 beats Q4:       n/a"),
        }
        println!("Quartile stability: {}", fmt(s.quartile_stability));
    }
}

pub fn run_validate(
    config_path: &Path,
    stored_scores: bool,
    resume: bool,
    output: Option<&Path>,
    json: bool,
) -> Result<(), FundrankError> {
    let config = load_config(config_path)?;
    validate_validation_config(&config)?;
    let v = ValidationConfig::from_config(&config)?;
    let port = open_price_port(&config)?;
    let store = if stored_scores || resume || config.get_string("sqlite", "path").is_some() {
        Some(open_store(&config)?)
    } else {
        None
    };

    let snapshot = if stored_scores {
        let store = store.as_deref().ok_or_else(|| FundrankError::ConfigMissing {
            section: "sqlite".into(),
            key: "path".into(),
        })?;
        let date = store
            .latest_score_date(v.t0)?
            .ok_or_else(|| FundrankError::InvalidUniverse {
                scope: format!("stored scores on or before {}", v.t0),
                members: 0,
                minimum: 1,
            })?;
        ScoreSnapshot::Supplied(store.load_scores(date)?)
    } else {
        validate_scoring_config(&config)?;
        ScoreSnapshot::Recompute(ScoringSettings::from_config(&config)?)
    };

    let checkpoint = match (&store, resume) {
        (Some(s), true) => s.load_checkpoint(&v.run_id)?,
        _ => None,
    };

    let report = run_validation(port.as_ref(), &v, snapshot, checkpoint, &mut |cp: &Checkpoint| {
        tracing::debug!(run = %cp.run_id, processed = cp.processed.len(), "checkpoint");
        match &store {
            Some(s) => s.save_checkpoint(&cp.run_id, cp),
            None => Ok(()),
        }
    })?;

    if let Some(path) = output {
        CsvReportAdapter.write_validation(&report, &path.to_string_lossy())?;
        eprintln!("Validation records written to: {}", path.display());
    }
    if json {
        print_json(&report)
    } else {
        print_validation(&report);
        Ok(())
    }
}

#[cfg(feature = "sqlite")]
pub fn run_import(config_path: &Path, dir: &Path) -> Result<(), FundrankError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;

    let config = load_config(config_path)?;
    validate_sqlite_path(&config)?;
    let store = SqliteAdapter::from_config(&config)?;
    let source = CsvAdapter::new(dir.to_path_buf());

    let instruments = source.list_instruments()?;
    store.upsert_instruments(&instruments)?;

    let mut total = 0usize;
    for id in source.list_series()? {
        let points = source.read_points(&id)?;
        total += points.len();
        store.insert_points(&points)?;
        tracing::debug!(instrument = %id, points = points.len(), "imported series");
    }
    println!("Imported {} instruments, {} price points", instruments.len(), total);
    Ok(())
}

#[cfg(not(feature = "sqlite"))]
pub fn run_import(config_path: &Path, _dir: &Path) -> Result<(), FundrankError> {
    let _ = load_config(config_path)?;
    Err(sqlite_disabled())
}

/// Upper bound for whole-series reads; keeps stored date strings comparable.
fn far_future() -> NaiveDate {
    NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX)
}

pub fn run_info(config_path: &Path, instrument: Option<&str>) -> Result<(), FundrankError> {
    let config = load_config(config_path)?;
    let port = open_price_port(&config)?;

    let instruments = match instrument {
        Some(id) => vec![port.get_instrument(id)?.ok_or_else(|| FundrankError::NotFound {
            instrument: id.to_string(),
        })?],
        None => port.list_instruments()?,
    };

    let (start, end) = (NaiveDate::default(), far_future());
    for i in &instruments {
        let points = port.get_series(&i.id, start, end)?;
        match (points.first(), points.last()) {
            (Some(first), Some(last)) => println!(
                "{:<16} {:<20} {} .. {} ({} points)",
                i.id,
                i.subcategory,
                first.date,
                last.date,
                points.len()
            ),
            _ => println!("{:<16} {:<20} no data", i.id, i.subcategory),
        }
    }
    Ok(())
}
