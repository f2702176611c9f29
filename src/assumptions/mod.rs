//! Run-wide assumptions: mortality and smoothed demographic parameters
//!
//! Both tables are built once per run and shared read-only by every component.
//! `Assumptions` is cheap to clone and safe to hand to worker threads.

mod mortality;
pub mod loader;

pub use mortality::{MortalityTable, MortalityTableRef};
pub use loader::PairedEstimateSet;

use std::path::Path;
use std::sync::Arc;

use crate::demographics::{CredibilityConfig, DemographicParameters, LookupPolicy, ParameterTable, Sex};
use crate::demographics::MEMBER_MAX_AGE;
use crate::error::Result;

/// Immutable context passed into every computation
#[derive(Debug, Clone)]
pub struct Assumptions {
    pub mortality: Arc<MortalityTable>,
    pub parameters: Arc<ParameterTable>,
    pub lookup_policy: LookupPolicy,
}

impl Assumptions {
    pub fn new(mortality: MortalityTable, parameters: ParameterTable) -> Self {
        Self {
            mortality: Arc::new(mortality),
            parameters: Arc::new(parameters),
            lookup_policy: LookupPolicy::Strict,
        }
    }

    pub fn with_lookup_policy(mut self, policy: LookupPolicy) -> Self {
        self.lookup_policy = policy;
        self
    }

    /// Smooth raw paired estimates and pair them with a mortality table
    pub fn from_estimates(
        mortality: MortalityTable,
        estimates: &PairedEstimateSet,
        config: &CredibilityConfig,
    ) -> Result<Self> {
        Ok(Self::new(mortality, ParameterTable::smooth(estimates, config)?))
    }

    /// Load a mortality table reference and a persisted smoothed-parameter CSV
    pub fn from_files(mortality: &MortalityTableRef, parameters: &Path, sd_floor: f64) -> Result<Self> {
        Ok(Self::new(
            mortality.load()?,
            loader::load_parameter_table(parameters, sd_floor)?,
        ))
    }

    pub fn omega(&self) -> u32 {
        self.mortality.omega()
    }

    /// Sampler parameters at a member age in [15, 90]
    pub fn demographic_parameters(&self, age: u32, sex: Sex) -> Result<DemographicParameters> {
        self.parameters.parameters(age, sex, self.lookup_policy)
    }

    /// Sampler parameters at a death age, frozen at the member domain boundary
    ///
    /// Death ages above 90 are valid when integrating over a member's remaining
    /// lifetime; parameters there are read at age 90.
    pub fn death_age_parameters(&self, death_age: u32, sex: Sex) -> Result<DemographicParameters> {
        self.demographic_parameters(death_age.min(MEMBER_MAX_AGE), sex)
    }
}
