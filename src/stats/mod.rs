//! Descriptive statistics over per-match observation series

pub mod sample;

pub use sample::{DiagnosticFlag, SampleStatistics, StatisticalState};
