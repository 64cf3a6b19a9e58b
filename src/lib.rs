//! LineEdge Backend Library
//!
//! Statistical decision pipeline for count-event lines: sample statistics,
//! lambda construction, count-model pricing, edge/threshold/Kelly decisions
//! and the drawdown-driven risk gate, plus the ledgers and data sources the
//! binaries wire around them.

pub mod backtest;
pub mod config;
pub mod data;
pub mod decision;
pub mod distribution;
pub mod error;
pub mod lambda;
pub mod ledger;
pub mod models;
pub mod pipeline;
pub mod risk;
pub mod stats;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use pipeline::{Pipeline, PipelineOutcome, PickQuery};
