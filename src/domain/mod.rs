//! Core domain types and logic.

pub mod error;
pub mod instrument;
pub mod price;
pub mod stats;
pub mod returns;
pub mod risk;
pub mod scoring;
pub mod ranking;
pub mod recommendation;
pub mod portfolio;
pub mod performance;
pub mod simulation;
pub mod pipeline;
pub mod validation;
pub mod config_validation;
