//! Edge, dynamic threshold and fractional Kelly staking

pub mod engine;
pub mod kelly;
pub mod threshold;

pub use engine::{DecisionAuditRecord, DecisionEngine, DecisionResult, PickRequest};
pub use kelly::{fractional_kelly, KellyParams, KellyStake};
pub use threshold::{acceptance_threshold, standard_error, Threshold, ThresholdBasis};
