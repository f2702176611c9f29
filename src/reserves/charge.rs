//! Charge aggregator: cost of survivor benefits conditional on death at a given age
//!
//! Each simulated beneficiary set is valued as
//! - spouse: pension % × whole-life annuity-due at the spouse's age (opposite sex)
//! - children: pension % × number of children × temporary annuity-due to the cutoff
//!   age at the youngest child's age, averaged over both sexes
//!
//! and the charges are summarised across draws.

use std::sync::atomic::AtomicBool;

use log::{debug, info};
use rayon::prelude::*;

use super::annuity::AnnuityCalculator;
use super::benefits::BenefitRule;
use super::types::{ChargeSummary, ChargeTable, DistributionSummary};
use crate::assumptions::Assumptions;
use crate::demographics::{Sex, MEMBER_MAX_AGE, MEMBER_MIN_AGE};
use crate::error::{validate_age, HeritorError, Result};
use crate::simulation::{derive_seed, BeneficiarySample, BeneficiarySampler, SampleBatch, SamplerConfig};

/// RNG stream for one (death age, sex) cell of a charge table
fn table_stream(age: u32, sex: Sex) -> u64 {
    let sex_bit = match sex {
        Sex::Male => 0,
        Sex::Female => 1,
    };
    ((age as u64) << 1) | sex_bit
}

pub struct ChargeAggregator<'a> {
    assumptions: &'a Assumptions,
    sampler: BeneficiarySampler<'a>,
    rule: BenefitRule,
    interest_rate: f64,
    /// äₓ for a male spouse, index = age
    male_whole_life: Vec<f64>,
    /// äₓ for a female spouse, index = age
    female_whole_life: Vec<f64>,
    /// Sex-averaged temporary annuity to the cutoff age, index = child age
    child_annuity: Vec<f64>,
}

impl<'a> ChargeAggregator<'a> {
    pub fn new(
        assumptions: &'a Assumptions,
        sampler_config: SamplerConfig,
        rule: BenefitRule,
        interest_rate: f64,
    ) -> Result<Self> {
        rule.validate()?;
        sampler_config.validate()?;

        let annuities = AnnuityCalculator::new(&assumptions.mortality, interest_rate)?;
        let child_ages = rule.child_cutoff_age.min(assumptions.omega() + 1);
        let child_annuity = (0..child_ages)
            .map(|age| {
                let n = rule.child_cutoff_age - age;
                let male = annuities.temporary_annuity_due(age, n, Sex::Male)?;
                let female = annuities.temporary_annuity_due(age, n, Sex::Female)?;
                Ok(0.5 * (male + female))
            })
            .collect::<Result<Vec<f64>>>()?;

        Ok(Self {
            assumptions,
            sampler: BeneficiarySampler::new(assumptions, sampler_config),
            male_whole_life: annuities.whole_life_by_age(Sex::Male),
            female_whole_life: annuities.whole_life_by_age(Sex::Female),
            child_annuity,
            rule,
            interest_rate,
        })
    }

    pub fn interest_rate(&self) -> f64 {
        self.interest_rate
    }

    pub fn rule(&self) -> &BenefitRule {
        &self.rule
    }

    /// Value one simulated beneficiary set; returns (charge, pension %)
    pub fn sample_charge(&self, sample: &BeneficiarySample, member_sex: Sex) -> (f64, f64) {
        let pct = self.rule.pension_pct(sample.dependents());
        if pct == 0.0 {
            return (0.0, 0.0);
        }

        let spouse = match sample.spouse_age {
            Some(age) => {
                let table = match member_sex.opposite() {
                    Sex::Male => &self.male_whole_life,
                    Sex::Female => &self.female_whole_life,
                };
                let idx = (age.max(0.0).floor() as usize).min(table.len() - 1);
                pct * table[idx]
            }
            None => 0.0,
        };

        let children = match sample.youngest_child_age {
            Some(age) if self.rule.child_payment_years(age) > 0 => {
                let idx = age.max(0.0).floor() as usize;
                let annuity = self.child_annuity.get(idx).copied().unwrap_or(0.0);
                pct * sample.num_children as f64 * annuity
            }
            _ => 0.0,
        };

        (spouse + children, pct)
    }

    /// Charge summary for a member aged 15-90
    pub fn charge(&self, age: u32, sex: Sex, n_samples: usize, seed: Option<u64>) -> Result<ChargeSummary> {
        self.charge_interruptible(age, sex, n_samples, seed, &AtomicBool::new(false))
    }

    pub fn charge_interruptible(
        &self,
        age: u32,
        sex: Sex,
        n_samples: usize,
        seed: Option<u64>,
        stop: &AtomicBool,
    ) -> Result<ChargeSummary> {
        validate_age(age, MEMBER_MIN_AGE, MEMBER_MAX_AGE)?;
        let batch = self.sampler.sample_interruptible(age, sex, n_samples, seed, stop)?;
        self.summarize(age, sex, batch)
    }

    /// Charge summary at any death age in [15, ω]
    pub fn charge_at_death_age(
        &self,
        age: u32,
        sex: Sex,
        n_samples: usize,
        seed: Option<u64>,
        stop: &AtomicBool,
    ) -> Result<ChargeSummary> {
        let batch = self.sampler.sample_at_death_age(age, sex, n_samples, seed, stop)?;
        self.summarize(age, sex, batch)
    }

    fn summarize(&self, age: u32, sex: Sex, batch: SampleBatch) -> Result<ChargeSummary> {
        let (charges, pcts): (Vec<f64>, Vec<f64>) = batch
            .samples
            .iter()
            .map(|s| self.sample_charge(s, sex))
            .unzip();

        let charge = DistributionSummary::from_values(&charges).ok_or(HeritorError::InvalidSampleCount)?;
        let mean_pension_pct = pcts.iter().sum::<f64>() / pcts.len() as f64;

        debug!(
            "Charge {} age {} @ {:.2}%: mean {:.4}, pct {:.4}, clamps {}",
            sex,
            age,
            self.interest_rate * 100.0,
            charge.mean,
            mean_pension_pct,
            batch.clamps.total()
        );

        Ok(ChargeSummary {
            age,
            sex,
            interest_rate: self.interest_rate,
            n_samples: charges.len(),
            charge,
            mean_pension_pct,
            clamps: batch.clamps,
            seed: batch.seed,
        })
    }

    /// Charges for every death age from `from_age` to ω
    ///
    /// Each age draws from its own stream of the base seed, so any single entry
    /// can be reproduced independently.
    pub fn charge_table(&self, sex: Sex, from_age: u32, n_samples: usize, seed: Option<u64>) -> Result<ChargeTable> {
        self.charge_table_interruptible(sex, from_age, n_samples, seed, &AtomicBool::new(false))
    }

    pub fn charge_table_interruptible(
        &self,
        sex: Sex,
        from_age: u32,
        n_samples: usize,
        seed: Option<u64>,
        stop: &AtomicBool,
    ) -> Result<ChargeTable> {
        validate_age(from_age, MEMBER_MIN_AGE, MEMBER_MAX_AGE)?;
        if n_samples == 0 {
            return Err(HeritorError::InvalidSampleCount);
        }

        let base_seed = seed.unwrap_or_else(rand::random);
        let omega = self.assumptions.omega();

        let summaries = (from_age..=omega)
            .into_par_iter()
            .map(|age| {
                let age_seed = derive_seed(base_seed, table_stream(age, sex));
                self.charge_at_death_age(age, sex, n_samples, Some(age_seed), stop)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut table = ChargeTable::new(sex, self.interest_rate, n_samples, base_seed);
        for summary in summaries {
            table.insert(summary);
        }

        info!(
            "Charge table {} @ {:.2}%: ages {}-{}, {} draws each, {} clamps",
            sex,
            self.interest_rate * 100.0,
            from_age,
            omega,
            n_samples,
            table.clamps().total()
        );

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures;
    use approx::assert_relative_eq;

    fn aggregator(assumptions: &Assumptions) -> ChargeAggregator<'_> {
        ChargeAggregator::new(assumptions, SamplerConfig::default(), BenefitRule::default(), 0.06).unwrap()
    }

    #[test]
    fn test_no_dependents_costs_nothing() {
        let assumptions = test_fixtures::assumptions();
        let agg = aggregator(&assumptions);
        let sample = BeneficiarySample {
            married: false,
            spouse_age: None,
            has_child: false,
            num_children: 0,
            youngest_child_age: None,
        };
        assert_eq!(agg.sample_charge(&sample, Sex::Male), (0.0, 0.0));
    }

    #[test]
    fn test_spouse_only_charge() {
        let assumptions = test_fixtures::assumptions();
        let agg = aggregator(&assumptions);
        let sample = BeneficiarySample {
            married: true,
            spouse_age: Some(57.6),
            has_child: false,
            num_children: 0,
            youngest_child_age: None,
        };

        let annuities = AnnuityCalculator::new(&assumptions.mortality, 0.06).unwrap();
        let expected = 0.6 * annuities.whole_life_annuity_due(57, Sex::Female).unwrap();
        let (charge, pct) = agg.sample_charge(&sample, Sex::Male);

        assert_relative_eq!(pct, 0.6, epsilon = 1e-12);
        assert_relative_eq!(charge, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_children_charge_uses_both_sexes() {
        let assumptions = test_fixtures::assumptions();
        let agg = aggregator(&assumptions);
        let sample = BeneficiarySample {
            married: false,
            spouse_age: None,
            has_child: true,
            num_children: 2,
            youngest_child_age: Some(10.2),
        };

        let annuities = AnnuityCalculator::new(&assumptions.mortality, 0.06).unwrap();
        let avg = 0.5
            * (annuities.temporary_annuity_due(10, 14, Sex::Male).unwrap()
                + annuities.temporary_annuity_due(10, 14, Sex::Female).unwrap());
        let (charge, pct) = agg.sample_charge(&sample, Sex::Female);

        assert_relative_eq!(pct, 0.7, epsilon = 1e-12);
        assert_relative_eq!(charge, 0.7 * 2.0 * avg, epsilon = 1e-9);
    }

    #[test]
    fn test_child_at_cutoff_gets_nothing() {
        let assumptions = test_fixtures::assumptions();
        let agg = aggregator(&assumptions);
        let sample = BeneficiarySample {
            married: false,
            spouse_age: None,
            has_child: true,
            num_children: 1,
            youngest_child_age: Some(24.0),
        };
        let (charge, pct) = agg.sample_charge(&sample, Sex::Male);
        assert_eq!(charge, 0.0);
        assert_relative_eq!(pct, 0.6, epsilon = 1e-12);
    }

    #[test]
    fn test_charge_summary_is_reproducible() {
        let assumptions = test_fixtures::assumptions();
        let agg = aggregator(&assumptions);

        let a = agg.charge(60, Sex::Male, 4_000, Some(42)).unwrap();
        let b = agg.charge(60, Sex::Male, 4_000, Some(42)).unwrap();

        assert_eq!(a.charge, b.charge);
        assert_eq!(a.n_samples, 4_000);
        assert!(a.charge.min <= a.charge.p10);
        assert!(a.charge.p10 <= a.charge.median);
        assert!(a.charge.median <= a.charge.p90);
        assert!(a.charge.p90 <= a.charge.max);
        assert!(a.mean_pension_pct > 0.0 && a.mean_pension_pct <= 1.0);
    }

    #[test]
    fn test_charge_validation() {
        let assumptions = test_fixtures::assumptions();
        let agg = aggregator(&assumptions);

        assert!(agg.charge(95, Sex::Male, 100, Some(1)).unwrap_err().is_validation());
        assert!(matches!(agg.charge(60, Sex::Male, 0, Some(1)), Err(HeritorError::InvalidSampleCount)));
        assert!(ChargeAggregator::new(&assumptions, SamplerConfig::default(), BenefitRule::default(), 1.2).is_err());
    }

    #[test]
    fn test_charge_table_covers_remaining_lifetime() {
        let assumptions = test_fixtures::assumptions();
        let agg = aggregator(&assumptions);

        let table = agg.charge_table(Sex::Female, 80, 200, Some(9)).unwrap();
        assert_eq!(table.len(), (80..=assumptions.omega()).count());
        assert!(table.contains(assumptions.omega()));

        // Each entry is reproducible on its own
        let again = agg.charge_table(Sex::Female, 80, 200, Some(9)).unwrap();
        assert_eq!(table.get(85).unwrap().charge, again.get(85).unwrap().charge);
    }
}
