//! Run configuration
//!
//! Every section defaults independently, so a JSON file only needs the fields
//! it overrides:
//!
//! ```json
//! { "mortality": { "type": "iam2012_basic" },
//!   "run": { "interest_rates": [0.04, 0.06], "n_samples": 20000 },
//!   "credibility": { "n_min": 50 } }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::assumptions::MortalityTableRef;
use crate::demographics::{CredibilityConfig, LookupPolicy, MEMBER_MAX_AGE, MEMBER_MIN_AGE};
use crate::error::{validate_age, validate_interest_rate, HeritorError, Result};
use crate::reserves::BenefitRule;
use crate::simulation::SamplerConfig;

/// Which ages, rates and draws a batch run covers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub age_min: u32,
    pub age_max: u32,
    /// One charge/reserve table pair is produced per rate
    pub interest_rates: Vec<f64>,
    pub n_samples: usize,
    /// `None` draws a fresh seed from entropy
    pub seed: Option<u64>,
    pub lookup_policy: LookupPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            age_min: 30,
            age_max: 80,
            interest_rates: vec![0.06],
            n_samples: 10_000,
            seed: Some(42),
            lookup_policy: LookupPolicy::Strict,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        validate_age(self.age_min, MEMBER_MIN_AGE, MEMBER_MAX_AGE)?;
        validate_age(self.age_max, self.age_min, MEMBER_MAX_AGE)?;
        if self.interest_rates.is_empty() {
            return Err(HeritorError::InvalidConfig("at least one interest rate is required".into()));
        }
        for &rate in &self.interest_rates {
            validate_interest_rate(rate)?;
        }
        if self.n_samples == 0 {
            return Err(HeritorError::InvalidSampleCount);
        }
        Ok(())
    }

    pub fn ages(&self) -> std::ops::RangeInclusive<u32> {
        self.age_min..=self.age_max
    }
}

/// Full configuration for one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeritorConfig {
    pub mortality: MortalityTableRef,
    pub credibility: CredibilityConfig,
    pub sampler: SamplerConfig,
    pub benefit: BenefitRule,
    pub run: RunConfig,
}

impl HeritorConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_path(path: &Path) -> Result<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.credibility.validate()?;
        self.sampler.validate()?;
        self.benefit.validate()?;
        self.run.validate()
    }

    /// Validation for configs received over the network
    ///
    /// Remote callers may only name built-in or parametric mortality tables.
    pub fn validate_remote(&self) -> Result<()> {
        self.validate()?;
        if self.mortality.reads_file() {
            return Err(HeritorError::InvalidConfig(
                "mortality tables cannot be read from files in remote requests".into(),
            ));
        }
        Ok(())
    }
}
