//! Life-contingent annuity values over an annual mortality table
//!
//! All values are annual annuities-due: a unit payment at the start of each
//! year while the payee survives, discounted at v = 1 / (1 + i).

use crate::assumptions::MortalityTable;
use crate::demographics::Sex;
use crate::error::{validate_interest_rate, Result};

/// Annuity calculator bound to one table and one interest rate
#[derive(Debug, Clone, Copy)]
pub struct AnnuityCalculator<'a> {
    mortality: &'a MortalityTable,
    interest_rate: f64,
    v: f64,
}

impl<'a> AnnuityCalculator<'a> {
    /// Fails unless 0 < interest_rate < 1
    pub fn new(mortality: &'a MortalityTable, interest_rate: f64) -> Result<Self> {
        validate_interest_rate(interest_rate)?;
        Ok(Self {
            mortality,
            interest_rate,
            v: 1.0 / (1.0 + interest_rate),
        })
    }

    pub fn interest_rate(&self) -> f64 {
        self.interest_rate
    }

    /// Annual discount factor v
    pub fn v(&self) -> f64 {
        self.v
    }

    /// Discount factor to year t
    pub fn discount_factor(&self, t: u32) -> f64 {
        self.v.powi(t as i32)
    }

    /// Sum of vᵗ · ₜpₓ for t = 0 .. terms-1, with ₜpₓ built recursively
    fn annuity_terms(&self, x: u32, terms: u32, sex: Sex) -> f64 {
        let mut value = 0.0;
        let mut tpx = 1.0;
        let mut vt = 1.0;

        for t in 0..terms {
            value += vt * tpx;
            tpx *= 1.0 - self.mortality.q(x + t, sex);
            vt *= self.v;
        }

        value
    }

    /// Whole-life annuity-due äₓ = Σ_{t=0}^{ω−x} vᵗ · ₜpₓ
    pub fn whole_life_annuity_due(&self, x: u32, sex: Sex) -> Result<f64> {
        self.mortality.validate_age(x)?;
        Ok(self.annuity_terms(x, self.mortality.omega() - x + 1, sex))
    }

    /// Temporary annuity-due äₓ:n̄ summed for t = 0 .. min(n, ω−x+1) − 1
    pub fn temporary_annuity_due(&self, x: u32, n: u32, sex: Sex) -> Result<f64> {
        self.mortality.validate_age(x)?;
        let terms = n.min(self.mortality.omega() - x + 1);
        Ok(self.annuity_terms(x, terms, sex))
    }

    /// Life expectancy eₓ = Σ_{t=1}^{ω−x} ₜpₓ (no discounting)
    pub fn life_expectancy(&self, x: u32, sex: Sex) -> Result<f64> {
        life_expectancy(self.mortality, x, sex)
    }

    /// äₓ for every age 0..=ω
    pub fn whole_life_by_age(&self, sex: Sex) -> Vec<f64> {
        let omega = self.mortality.omega();
        // Backward recursion: äₓ = 1 + v · pₓ · äₓ₊₁, with ä_ω = 1
        let mut values = vec![1.0; omega as usize + 1];
        for x in (0..omega).rev() {
            let px = 1.0 - self.mortality.q(x, sex);
            values[x as usize] = 1.0 + self.v * px * values[x as usize + 1];
        }
        values
    }
}

/// Life expectancy eₓ = Σ_{t=1}^{ω−x} ₜpₓ
pub fn life_expectancy(mortality: &MortalityTable, x: u32, sex: Sex) -> Result<f64> {
    mortality.validate_age(x)?;

    let mut total = 0.0;
    let mut tpx = 1.0;
    for t in 1..=(mortality.omega() - x) {
        tpx *= 1.0 - mortality.q(x + t - 1, sex);
        total += tpx;
    }
    Ok(total)
}
