//! Expected-count construction for a fixture

pub mod builder;
pub mod context;

pub use builder::{LambdaAdjustments, LambdaBuilder, LambdaResult, ScheduleStrength, TeamSamples};
pub use context::{finishing_factor, referee_factor, ContextFactors};
