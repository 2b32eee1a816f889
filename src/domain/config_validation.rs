//! Configuration validation.
//!
//! Checks every field a command depends on before any data is read.

use crate::domain::error::FundrankError;
use crate::domain::recommendation::Thresholds;
use crate::domain::scoring::{Metric, ScoringConfig};
use crate::domain::simulation::SimulationConfig;
use crate::domain::validation::ValidationConfig;
use crate::ports::config_port::ConfigPort;

pub fn validate_prices_config(config: &dyn ConfigPort) -> Result<(), FundrankError> {
    let source = config
        .get_string("prices", "source")
        .unwrap_or_else(|| "csv".to_string());
    match source.trim() {
        "csv" => match config.get_string("prices", "path") {
            Some(p) if !p.trim().is_empty() => Ok(()),
            _ => Err(FundrankError::ConfigMissing {
                section: "prices".to_string(),
                key: "path".to_string(),
            }),
        },
        "sqlite" => validate_sqlite_path(config),
        other => Err(FundrankError::ConfigInvalid {
            section: "prices".to_string(),
            key: "source".to_string(),
            reason: format!("unknown source '{other}', expected csv or sqlite"),
        }),
    }
}

pub fn validate_sqlite_path(config: &dyn ConfigPort) -> Result<(), FundrankError> {
    match config.get_string("sqlite", "path") {
        Some(p) if !p.trim().is_empty() => Ok(()),
        _ => Err(FundrankError::ConfigMissing {
            section: "sqlite".to_string(),
            key: "path".to_string(),
        }),
    }
}

pub fn validate_scoring_config(config: &dyn ConfigPort) -> Result<(), FundrankError> {
    validate_staleness(config, "scoring")?;
    validate_batch_size(config)?;
    validate_risk_free_rate(config, "scoring")?;
    validate_min_risk_samples(config)?;
    validate_min_scope_size(config)?;
    validate_table_keys(config)?;
    ScoringConfig::from_config(config)?;
    Thresholds::from_config(config)?;
    Ok(())
}

pub fn validate_simulation_config(config: &dyn ConfigPort) -> Result<(), FundrankError> {
    validate_staleness(config, "simulation")?;
    validate_risk_free_rate(config, "simulation")?;
    let value = config.get_double("simulation", "initial_capital", 100_000.0);
    if value <= 0.0 {
        return Err(FundrankError::config_invalid(
            "simulation",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    SimulationConfig::from_config(config)?;
    Ok(())
}

pub fn validate_validation_config(config: &dyn ConfigPort) -> Result<(), FundrankError> {
    validate_staleness(config, "validation")?;
    validate_min_scope_size(config)?;
    if config.get_int("validation", "checkpoint_every", 0) < 0 {
        return Err(FundrankError::config_invalid(
            "validation",
            "checkpoint_every",
            "checkpoint_every must be non-negative",
        ));
    }
    ValidationConfig::from_config(config)?;
    Ok(())
}

fn validate_staleness(config: &dyn ConfigPort, section: &str) -> Result<(), FundrankError> {
    let value = config.get_int(section, "staleness_days", 5);
    if !(0..=366).contains(&value) {
        return Err(FundrankError::config_invalid(
            section,
            "staleness_days",
            "staleness_days must be between 0 and 366",
        ));
    }
    Ok(())
}

fn validate_batch_size(config: &dyn ConfigPort) -> Result<(), FundrankError> {
    let value = config.get_int("scoring", "batch_size", 64);
    if value < 1 {
        return Err(FundrankError::config_invalid(
            "scoring",
            "batch_size",
            "batch_size must be at least 1",
        ));
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort, section: &str) -> Result<(), FundrankError> {
    let value = config.get_double(section, "risk_free_rate", 0.0);
    if !(0.0..1.0).contains(&value) {
        return Err(FundrankError::config_invalid(
            section,
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_min_risk_samples(config: &dyn ConfigPort) -> Result<(), FundrankError> {
    let value = config.get_int("scoring", "min_risk_samples", 200);
    if value < 2 {
        return Err(FundrankError::config_invalid(
            "scoring",
            "min_risk_samples",
            "min_risk_samples must be at least 2",
        ));
    }
    Ok(())
}

fn validate_min_scope_size(config: &dyn ConfigPort) -> Result<(), FundrankError> {
    let value = config.get_int("ranking", "min_scope_size", 3);
    if value < 1 {
        return Err(FundrankError::config_invalid(
            "ranking",
            "min_scope_size",
            "min_scope_size must be at least 1",
        ));
    }
    Ok(())
}

fn validate_table_keys(config: &dyn ConfigPort) -> Result<(), FundrankError> {
    for key in config.keys("scoring_tables") {
        let known = key == "version" || Metric::ALL.iter().any(|m| m.key() == key);
        if !known {
            return Err(FundrankError::config_invalid(
                "scoring_tables",
                &key,
                "unknown metric",
            ));
        }
    }
    Ok(())
}
