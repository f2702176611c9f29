//! Reserve aggregator: expected survivor-benefit cost for a member alive today
//!
//! reserve(x) = Σ_{t=0}^{ω−x} vᵗ · ₜpₓ · q_{x+t} · E[charge | death at x+t]
//!
//! The inner expectation comes from a pre-built [`ChargeTable`]; the outer one
//! runs over the member's own mortality.

use log::debug;

use super::annuity::{life_expectancy, AnnuityCalculator};
use super::types::{ChargeTable, ReserveResult};
use crate::assumptions::Assumptions;
use crate::demographics::{Sex, MEMBER_MAX_AGE, MEMBER_MIN_AGE};
use crate::error::{validate_age, HeritorError, Result};

pub struct ReserveAggregator<'a> {
    assumptions: &'a Assumptions,
}

impl<'a> ReserveAggregator<'a> {
    pub fn new(assumptions: &'a Assumptions) -> Self {
        Self { assumptions }
    }

    /// Reserve for a member aged 15-90
    ///
    /// `charges` must hold an entry for every death age in [age, ω]; any gap is an error.
    pub fn reserve(&self, age: u32, sex: Sex, charges: &ChargeTable) -> Result<ReserveResult> {
        validate_age(age, MEMBER_MIN_AGE, MEMBER_MAX_AGE)?;
        if charges.sex != sex {
            return Err(HeritorError::InvalidConfig(format!(
                "charge table is for {}, reserve requested for {}",
                charges.sex, sex
            )));
        }

        let mortality = &self.assumptions.mortality;
        let annuities = AnnuityCalculator::new(mortality, charges.interest_rate)?;
        let omega = mortality.omega();

        let mut reserve_total = 0.0;
        let mut weighted_married = 0.0;
        let mut total_weight = 0.0;
        let mut tpx = 1.0;
        let mut vt = 1.0;

        for death_age in age..=omega {
            let q = mortality.q(death_age, sex);
            let weight = tpx * q;

            let charge = charges.get(death_age)?.mean();
            reserve_total += vt * weight * charge;

            let p_married = self.assumptions.death_age_parameters(death_age, sex)?.p_married;
            weighted_married += weight * p_married;
            total_weight += weight;

            tpx *= 1.0 - q;
            vt *= annuities.v();
        }

        let prob_leave_dependent = if total_weight > 0.0 {
            weighted_married / total_weight
        } else {
            0.0
        };
        let life_expectancy = life_expectancy(mortality, age, sex)?;
        let reserve_per_life_year = if life_expectancy > 0.0 {
            reserve_total / life_expectancy
        } else {
            reserve_total
        };

        debug!(
            "Reserve {} age {} @ {:.2}%: {:.4} ({:.4}/yr, e = {:.2})",
            sex,
            age,
            charges.interest_rate * 100.0,
            reserve_total,
            reserve_per_life_year,
            life_expectancy
        );

        Ok(ReserveResult {
            age,
            sex,
            interest_rate: charges.interest_rate,
            reserve_total,
            reserve_per_life_year,
            life_expectancy,
            prob_leave_dependent,
        })
    }

    /// Reserves for a contiguous age range sharing one charge table
    pub fn reserves(&self, ages: impl IntoIterator<Item = u32>, sex: Sex, charges: &ChargeTable) -> Result<Vec<ReserveResult>> {
        ages.into_iter().map(|age| self.reserve(age, sex, charges)).collect()
    }
}
