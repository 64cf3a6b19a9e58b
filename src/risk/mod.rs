//! Risk Management Module
//! Pilot in Command: Risk Gate
//! Mission: Derive system health from the outcome ledger and veto staking when it degrades

pub mod gate;
pub mod state;

pub use gate::{GatePhase, GateReason, GateVerdict, PreDecisionGate, RejectionRecord};
pub use state::{dynamic_z, RiskOverlay, RiskState, RiskStatus};
