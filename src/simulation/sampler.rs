//! Beneficiary sampler
//!
//! For each draw:
//! - married ~ Bernoulli(p_married); spouse age = member age − (gap mean + gap sd · t₅)
//! - has child ~ Bernoulli(p_has_child); count ~ max(1, Poisson(mean count / p_has_child));
//!   youngest child age ~ Normal(child age mean, child age sd)
//!
//! Spouse and child ages outside plausible bounds are clamped rather than rejected:
//! heavy-tailed draws are expected to land there occasionally. Every clamp is
//! counted in [`ClampCounts`].

use std::ops::AddAssign;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::debug;
use rand::distributions::{Bernoulli, Distribution};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Normal, Poisson, StudentT};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::derive_seed;
use crate::assumptions::Assumptions;
use crate::demographics::{DemographicParameters, Sex, MEMBER_MAX_AGE, MEMBER_MIN_AGE};
use crate::error::{validate_age, HeritorError, Result};

/// Distribution and clamp settings for the sampler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Degrees of freedom of the Student's t age-gap shock
    pub t_degrees_of_freedom: f64,

    pub spouse_age_min: f64,
    pub spouse_age_max: f64,

    /// Dependent-child cutoff age
    pub child_age_max: f64,

    /// Lower bound for the conditional Poisson mean and its denominator
    pub min_lambda: f64,

    /// Draws per independent RNG stream
    pub batch_size: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            t_degrees_of_freedom: 5.0,
            spouse_age_min: 15.0,
            spouse_age_max: 100.0,
            child_age_max: 24.0,
            min_lambda: 1e-6,
            batch_size: 1024,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.t_degrees_of_freedom > 0.0) {
            return Err(HeritorError::InvalidConfig("t_degrees_of_freedom must be positive".into()));
        }
        if !(self.spouse_age_min >= 0.0 && self.spouse_age_min <= self.spouse_age_max) {
            return Err(HeritorError::InvalidConfig("spouse age bounds are inverted".into()));
        }
        if !(self.child_age_max > 0.0) {
            return Err(HeritorError::InvalidConfig("child_age_max must be positive".into()));
        }
        if !(self.min_lambda > 0.0) {
            return Err(HeritorError::InvalidConfig("min_lambda must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(HeritorError::InvalidConfig("batch_size must be positive".into()));
        }
        Ok(())
    }
}

/// One simulated set of dependents
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeneficiarySample {
    pub married: bool,
    /// Present iff `married`
    pub spouse_age: Option<f64>,
    pub has_child: bool,
    /// At least 1 iff `has_child`
    pub num_children: u32,
    /// Present iff `has_child`
    pub youngest_child_age: Option<f64>,
}

impl BeneficiarySample {
    /// Spouse counts as one dependent
    pub fn dependents(&self) -> u32 {
        u32::from(self.married) + self.num_children
    }
}

/// Physical-plausibility clamps applied during sampling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClampCounts {
    pub spouse_age_clamped: u64,
    pub child_age_clamped: u64,
    pub child_count_floored: u64,
}

impl ClampCounts {
    pub fn total(&self) -> u64 {
        self.spouse_age_clamped + self.child_age_clamped + self.child_count_floored
    }
}

impl AddAssign for ClampCounts {
    fn add_assign(&mut self, other: Self) {
        self.spouse_age_clamped += other.spouse_age_clamped;
        self.child_age_clamped += other.child_age_clamped;
        self.child_count_floored += other.child_count_floored;
    }
}

/// Output of one sampling call
#[derive(Debug, Clone)]
pub struct SampleBatch {
    pub samples: Vec<BeneficiarySample>,
    pub clamps: ClampCounts,
    /// Base seed actually used (drawn from entropy when none was given)
    pub seed: u64,
}

/// Frozen distributions for one (age, sex)
struct DrawPlan {
    member_age: f64,
    married: Bernoulli,
    gap_mean: f64,
    gap_sd: f64,
    gap_shock: StudentT<f64>,
    has_child: Bernoulli,
    child_count: Poisson<f64>,
    child_age: Normal<f64>,
}

/// Draws beneficiary samples from the run's demographic parameters
pub struct BeneficiarySampler<'a> {
    assumptions: &'a Assumptions,
    config: SamplerConfig,
}

impl<'a> BeneficiarySampler<'a> {
    pub fn new(assumptions: &'a Assumptions, config: SamplerConfig) -> Self {
        Self { assumptions, config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Draw `n_samples` beneficiary sets for a member aged 15-90
    pub fn sample(&self, age: u32, sex: Sex, n_samples: usize, seed: Option<u64>) -> Result<SampleBatch> {
        self.sample_interruptible(age, sex, n_samples, seed, &AtomicBool::new(false))
    }

    /// As [`sample`](Self::sample), stopping at the next draw once `stop` is set
    pub fn sample_interruptible(
        &self,
        age: u32,
        sex: Sex,
        n_samples: usize,
        seed: Option<u64>,
        stop: &AtomicBool,
    ) -> Result<SampleBatch> {
        validate_age(age, MEMBER_MIN_AGE, MEMBER_MAX_AGE)?;
        let params = self.assumptions.demographic_parameters(age, sex)?;
        self.draw(age, &params, n_samples, seed, stop)
    }

    /// Draw for a death age anywhere in [15, ω]
    ///
    /// Parameters above age 90 are held at their age-90 values.
    pub fn sample_at_death_age(
        &self,
        death_age: u32,
        sex: Sex,
        n_samples: usize,
        seed: Option<u64>,
        stop: &AtomicBool,
    ) -> Result<SampleBatch> {
        validate_age(death_age, MEMBER_MIN_AGE, self.assumptions.omega())?;
        let params = self.assumptions.death_age_parameters(death_age, sex)?;
        self.draw(death_age, &params, n_samples, seed, stop)
    }

    fn plan(&self, member_age: u32, params: &DemographicParameters) -> Result<DrawPlan> {
        let invalid = |what: &str, e: &dyn std::fmt::Debug| {
            HeritorError::InvalidConfig(format!("{} distribution at age {}: {:?}", what, member_age, e))
        };
        let eps = self.config.min_lambda;
        let lambda = (params.mean_child_count / params.p_has_child.max(eps)).max(eps);

        Ok(DrawPlan {
            member_age: member_age as f64,
            married: Bernoulli::new(params.p_married).map_err(|e| invalid("marriage", &e))?,
            gap_mean: params.age_gap_mean,
            gap_sd: params.age_gap_sd,
            gap_shock: StudentT::new(self.config.t_degrees_of_freedom).map_err(|e| invalid("age gap", &e))?,
            has_child: Bernoulli::new(params.p_has_child).map_err(|e| invalid("child", &e))?,
            child_count: Poisson::new(lambda).map_err(|e| invalid("child count", &e))?,
            child_age: Normal::new(params.child_age_mean, params.child_age_sd)
                .map_err(|e| invalid("child age", &e))?,
        })
    }

    fn draw(
        &self,
        member_age: u32,
        params: &DemographicParameters,
        n_samples: usize,
        seed: Option<u64>,
        stop: &AtomicBool,
    ) -> Result<SampleBatch> {
        if n_samples == 0 {
            return Err(HeritorError::InvalidSampleCount);
        }
        self.config.validate()?;

        let plan = self.plan(member_age, params)?;
        let base_seed = seed.unwrap_or_else(rand::random);
        let batch_size = self.config.batch_size;
        let n_batches = n_samples.div_ceil(batch_size);
        let completed = AtomicUsize::new(0);

        debug!(
            "Sampling {} draws in {} batches at age {} (seed {})",
            n_samples, n_batches, member_age, base_seed
        );

        let batches: Vec<(Vec<BeneficiarySample>, ClampCounts)> = (0..n_batches)
            .into_par_iter()
            .map(|b| {
                let len = batch_size.min(n_samples - b * batch_size);
                let mut rng = StdRng::seed_from_u64(derive_seed(base_seed, b as u64));
                let mut clamps = ClampCounts::default();
                let mut samples = Vec::with_capacity(len);

                for _ in 0..len {
                    if stop.load(Ordering::Relaxed) {
                        return Err(HeritorError::Cancelled {
                            completed: completed.load(Ordering::Relaxed),
                        });
                    }
                    samples.push(self.draw_one(&plan, &mut rng, &mut clamps));
                    completed.fetch_add(1, Ordering::Relaxed);
                }
                Ok((samples, clamps))
            })
            .collect::<Result<_>>()?;

        let mut samples = Vec::with_capacity(n_samples);
        let mut clamps = ClampCounts::default();
        for (batch, batch_clamps) in batches {
            samples.extend(batch);
            clamps += batch_clamps;
        }

        Ok(SampleBatch {
            samples,
            clamps,
            seed: base_seed,
        })
    }

    fn draw_one(&self, plan: &DrawPlan, rng: &mut StdRng, clamps: &mut ClampCounts) -> BeneficiarySample {
        let cfg = &self.config;

        let married = plan.married.sample(rng);
        let spouse_age = if married {
            let gap = plan.gap_mean + plan.gap_sd * plan.gap_shock.sample(rng);
            let raw = plan.member_age - gap;
            let clamped = raw.clamp(cfg.spouse_age_min, cfg.spouse_age_max);
            if clamped != raw {
                clamps.spouse_age_clamped += 1;
            }
            Some(clamped)
        } else {
            None
        };

        let has_child = plan.has_child.sample(rng);
        let (num_children, youngest_child_age) = if has_child {
            let k: f64 = plan.child_count.sample(rng);
            if k < 1.0 {
                clamps.child_count_floored += 1;
            }
            let raw = plan.child_age.sample(rng);
            let clamped = raw.clamp(0.0, cfg.child_age_max);
            if clamped != raw {
                clamps.child_age_clamped += 1;
            }
            ((k as u32).max(1), Some(clamped))
        } else {
            (0, None)
        };

        BeneficiarySample {
            married,
            spouse_age,
            has_child,
            num_children,
            youngest_child_age,
        }
    }
}
