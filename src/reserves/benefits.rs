//! Survivor benefit rule
//!
//! The pension paid to survivors is a percentage of the member's benefit:
//! a base percentage plus a step per dependent, capped. The spouse counts as
//! one dependent; children are paid until the cutoff age.

use serde::{Deserialize, Serialize};

use crate::error::{HeritorError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenefitRule {
    pub base_pct: f64,
    pub per_dependent_pct: f64,
    pub cap_pct: f64,
    /// Children receive payments until this age
    pub child_cutoff_age: u32,
}

impl Default for BenefitRule {
    fn default() -> Self {
        Self {
            base_pct: 0.5,
            per_dependent_pct: 0.1,
            cap_pct: 1.0,
            child_cutoff_age: 24,
        }
    }
}

impl BenefitRule {
    pub fn validate(&self) -> Result<()> {
        if !(self.base_pct >= 0.0 && self.per_dependent_pct >= 0.0 && self.cap_pct > 0.0) {
            return Err(HeritorError::InvalidConfig(format!(
                "benefit percentages must be non-negative with a positive cap: {:?}",
                self
            )));
        }
        Ok(())
    }

    /// Pension percentage for a number of dependents; zero when nobody qualifies
    pub fn pension_pct(&self, dependents: u32) -> f64 {
        if dependents == 0 {
            0.0
        } else {
            (self.base_pct + self.per_dependent_pct * dependents as f64).min(self.cap_pct)
        }
    }

    /// Remaining payment years for a child of the given age
    pub fn child_payment_years(&self, child_age: f64) -> u32 {
        let remaining = self.child_cutoff_age as f64 - child_age;
        if remaining > 0.0 {
            self.child_cutoff_age - child_age.max(0.0).floor() as u32
        } else {
            0
        }
    }
}
