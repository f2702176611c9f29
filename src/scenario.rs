//! Scenario runner for batch charge and reserve tables
//!
//! Holds the run's assumptions once and produces charge and reserve tables for
//! both sexes over an age range, repeated across an interest-rate grid.
//! Charge tables are memoised, so re-running a rate or adding reserve ages does
//! not redraw the Monte Carlo samples.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use log::info;

use crate::assumptions::Assumptions;
use crate::config::HeritorConfig;
use crate::demographics::Sex;
use crate::error::Result;
use crate::output::{charge_rows, ChargeRow};
use crate::reserves::{ChargeAggregator, ChargeCache, ChargeTable, ReserveAggregator, ReserveResult};

/// Tables produced by one run
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    pub charge_tables: Vec<Arc<ChargeTable>>,
    pub reserves: Vec<ReserveResult>,
    /// Member ages the run was asked for
    pub age_min: u32,
    pub age_max: u32,
}

impl RunOutput {
    /// Charge rows restricted to the run's member ages
    pub fn charge_rows(&self) -> Vec<ChargeRow> {
        charge_rows(self.charge_tables.iter().map(|t| t.as_ref()), self.age_min..=self.age_max)
    }
}

/// Pre-loaded runner for charge/reserve batches
///
/// # Example
/// ```ignore
/// let mut runner = ScenarioRunner::new(assumptions, HeritorConfig::default())?;
/// let output = runner.run()?;
/// for r in &output.reserves {
///     println!("{} {}: {:.4}", r.sex, r.age, r.reserve_total);
/// }
/// ```
#[derive(Debug)]
pub struct ScenarioRunner {
    assumptions: Assumptions,
    config: HeritorConfig,
    cache: ChargeCache,
}

impl ScenarioRunner {
    pub fn new(assumptions: Assumptions, config: HeritorConfig) -> Result<Self> {
        config.validate()?;
        let assumptions = assumptions.with_lookup_policy(config.run.lookup_policy);
        Ok(Self {
            assumptions,
            config,
            cache: ChargeCache::new(),
        })
    }

    pub fn assumptions(&self) -> &Assumptions {
        &self.assumptions
    }

    pub fn config(&self) -> &HeritorConfig {
        &self.config
    }

    pub fn cache(&self) -> &ChargeCache {
        &self.cache
    }

    /// Charge table for one sex and rate covering [age_min, ω]
    pub fn charge_table(&mut self, sex: Sex, interest_rate: f64) -> Result<Arc<ChargeTable>> {
        self.charge_table_interruptible(sex, interest_rate, &AtomicBool::new(false))
    }

    pub fn charge_table_interruptible(
        &mut self,
        sex: Sex,
        interest_rate: f64,
        stop: &AtomicBool,
    ) -> Result<Arc<ChargeTable>> {
        let run = &self.config.run;
        let (from_age, n_samples, seed) = (run.age_min, run.n_samples, run.seed);
        let assumptions = &self.assumptions;
        let sampler = &self.config.sampler;
        let rule = &self.config.benefit;

        self.cache.get_or_build(sex, interest_rate, from_age, n_samples, seed, || {
            ChargeAggregator::new(assumptions, sampler.clone(), rule.clone(), interest_rate)?
                .charge_table_interruptible(sex, from_age, n_samples, seed, stop)
        })
    }

    /// Reserves for every configured member age at one sex and rate
    pub fn reserves(&mut self, sex: Sex, interest_rate: f64) -> Result<Vec<ReserveResult>> {
        let table = self.charge_table(sex, interest_rate)?;
        ReserveAggregator::new(&self.assumptions).reserves(self.config.run.ages(), sex, &table)
    }

    /// Charge and reserve tables for both sexes and every configured rate
    pub fn run(&mut self) -> Result<RunOutput> {
        self.run_interruptible(&AtomicBool::new(false))
    }

    pub fn run_interruptible(&mut self, stop: &AtomicBool) -> Result<RunOutput> {
        let rates = self.config.run.interest_rates.clone();
        let mut output = RunOutput {
            age_min: self.config.run.age_min,
            age_max: self.config.run.age_max,
            ..Default::default()
        };

        for &rate in &rates {
            for sex in Sex::ALL {
                let table = self.charge_table_interruptible(sex, rate, stop)?;
                let reserves = ReserveAggregator::new(&self.assumptions).reserves(self.config.run.ages(), sex, &table)?;
                output.reserves.extend(reserves);
                output.charge_tables.push(table);
            }
        }

        info!(
            "Run complete: {} charge tables, {} reserves (cache hits {}, misses {})",
            output.charge_tables.len(),
            output.reserves.len(),
            self.cache.cache_hits,
            self.cache.cache_misses
        );

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::test_fixtures;

    fn small_config() -> HeritorConfig {
        HeritorConfig {
            run: RunConfig {
                age_min: 60,
                age_max: 65,
                interest_rates: vec![0.04, 0.06],
                n_samples: 300,
                seed: Some(7),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_run_covers_grid() {
        let mut runner = ScenarioRunner::new(test_fixtures::assumptions(), small_config()).unwrap();
        let output = runner.run().unwrap();

        // 2 rates x 2 sexes
        assert_eq!(output.charge_tables.len(), 4);
        assert_eq!(output.reserves.len(), 4 * 6);
        assert_eq!(output.charge_rows().len(), 4 * 6);

        // Lower rate, larger reserve
        let at = |rate: f64| {
            output
                .reserves
                .iter()
                .find(|r| r.age == 60 && r.sex == Sex::Male && r.interest_rate == rate)
                .unwrap()
                .reserve_total
        };
        assert!(at(0.04) > at(0.06));
    }

    #[test]
    fn test_charge_tables_are_memoised() {
        let mut runner = ScenarioRunner::new(test_fixtures::assumptions(), small_config()).unwrap();

        let first = runner.charge_table(Sex::Female, 0.06).unwrap();
        let reserves = runner.reserves(Sex::Female, 0.06).unwrap();
        let second = runner.charge_table(Sex::Female, 0.06).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(runner.cache().cache_misses, 1);
        assert_eq!(runner.cache().cache_hits, 2);
        assert_eq!(reserves.len(), 6);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = small_config();
        config.run.interest_rates = vec![0.0];
        assert!(ScenarioRunner::new(test_fixtures::assumptions(), config).is_err());
    }
}
