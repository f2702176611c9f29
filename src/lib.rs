//! Heritor Reserve - actuarial reserve engine for survivor pensions
//!
//! This library provides:
//! - Credibility smoothing of sparse group statistics against a large reference population
//! - Parameter lookup with interpolation and explicit provenance
//! - Monte Carlo simulation of a member's surviving spouse and children
//! - Charges (cost of benefits given death at an age) and reserves (expected cost today)
//! - Batch runs over age ranges and interest-rate grids

pub mod assumptions;
pub mod config;
pub mod demographics;
pub mod error;
pub mod output;
pub mod reserves;
pub mod scenario;
pub mod simulation;

#[cfg(test)]
mod test_fixtures;

// Re-export commonly used types
pub use assumptions::{Assumptions, MortalityTable, MortalityTableRef};
pub use config::{HeritorConfig, RunConfig};
pub use demographics::{LookupPolicy, Parameter, ParameterTable, Sex};
pub use error::{HeritorError, Result};
pub use reserves::{ChargeAggregator, ChargeSummary, ChargeTable, ReserveAggregator, ReserveResult};
pub use scenario::{RunOutput, ScenarioRunner};
pub use simulation::{BeneficiarySampler, SamplerConfig};
