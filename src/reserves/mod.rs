//! Survivor benefit charges and reserves
//!
//! Two levels of expectation:
//! 1. **Charge**: cost of the survivor pension if the member dies at a given age,
//!    averaged over simulated beneficiary sets ([`ChargeAggregator`])
//! 2. **Reserve**: the charge averaged over the member's own future time of death,
//!    discounted and mortality-weighted ([`ReserveAggregator`])
//!
//! The full charge table for every future age is built before any reserve is
//! computed from it.
//!
//! # Example
//!
//! ```rust,ignore
//! use heritor_reserve::reserves::{BenefitRule, ChargeAggregator, ReserveAggregator};
//! use heritor_reserve::simulation::SamplerConfig;
//! use heritor_reserve::Sex;
//!
//! let charges = ChargeAggregator::new(&assumptions, SamplerConfig::default(), BenefitRule::default(), 0.06)?;
//! let table = charges.charge_table(Sex::Male, 60, 10_000, Some(42))?;
//! let reserve = ReserveAggregator::new(&assumptions).reserve(60, Sex::Male, &table)?;
//! println!("Reserve: {:.4}", reserve.reserve_total);
//! ```

mod annuity;
mod benefits;
mod cache;
mod charge;
mod reserve;
mod types;

pub use annuity::{life_expectancy, AnnuityCalculator};
pub use benefits::BenefitRule;
pub use cache::{ChargeCache, ChargeKey};
pub use charge::ChargeAggregator;
pub use reserve::ReserveAggregator;
pub use types::{ChargeSummary, ChargeTable, DistributionSummary, ReserveResult};
