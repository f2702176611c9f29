//! Demographic model of a member's potential beneficiaries
//!
//! Seven parameter families describe, per age and sex, whether a member leaves a
//! spouse and/or dependent children and how old they are. Raw survey estimates are
//! stabilised by credibility smoothing, then read back through [`ParameterTable`].

mod credibility;
mod smoothing;
mod lookup;

pub use credibility::{
    credibility_weight, smooth_series, CredibilityConfig, CurveDiagnostics, PairedEstimate,
    ShiftBasis, SmoothedCurve, SmoothedPoint,
};
pub use smoothing::{triangular_weights, weighted_moving_average};
pub use lookup::{LookupPolicy, LookupSource, LookupValue, ParameterTable};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::HeritorError;

/// Youngest member age accepted by the public entry points
pub const MEMBER_MIN_AGE: u32 = 15;

/// Oldest member age accepted by the public entry points
pub const MEMBER_MAX_AGE: u32 = 90;

/// Sex of a member or beneficiary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sex {
    #[serde(alias = "M", alias = "male")]
    Male,
    #[serde(alias = "F", alias = "female")]
    Female,
}

impl Sex {
    pub const ALL: [Sex; 2] = [Sex::Male, Sex::Female];

    /// Sex of the spouse in the mortality lookup for survivor benefits
    pub fn opposite(self) -> Sex {
        match self {
            Sex::Male => Sex::Female,
            Sex::Female => Sex::Male,
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sex::Male => write!(f, "Male"),
            Sex::Female => write!(f, "Female"),
        }
    }
}

impl FromStr for Sex {
    type Err = HeritorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Male" | "male" | "M" | "m" => Ok(Sex::Male),
            "Female" | "female" | "F" | "f" => Ok(Sex::Female),
            other => Err(HeritorError::UnknownSex(other.to_string())),
        }
    }
}

/// Join key shared by every per-age table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgeSexKey {
    pub age: u32,
    pub sex: Sex,
}

impl AgeSexKey {
    pub fn new(age: u32, sex: Sex) -> Self {
        Self { age, sex }
    }
}

/// How a smoothed parameter is post-processed before it is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// Clamped to [0, 1]
    Probability,
    /// Unbounded mean (age gaps may be negative)
    Mean,
    /// Non-negative mean (counts, ages)
    NonNegativeMean,
    /// Standard deviation, floored to a small positive constant
    Dispersion,
}

/// Demographic parameter families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    /// Probability the member is married or in a stable union
    MarriedProb,
    /// Mean of member age minus spouse age
    AgeGapMean,
    /// Standard deviation of the age gap
    AgeGapSd,
    /// Probability the member has at least one dependent child
    HasChildProb,
    /// Unconditional mean number of dependent children
    MeanChildCount,
    /// Mean age of the youngest dependent child
    ChildAgeMean,
    /// Standard deviation of the youngest child's age
    ChildAgeSd,
}

impl Parameter {
    pub const ALL: [Parameter; 7] = [
        Parameter::MarriedProb,
        Parameter::AgeGapMean,
        Parameter::AgeGapSd,
        Parameter::HasChildProb,
        Parameter::MeanChildCount,
        Parameter::ChildAgeMean,
        Parameter::ChildAgeSd,
    ];

    pub fn kind(self) -> ParameterKind {
        match self {
            Parameter::MarriedProb | Parameter::HasChildProb => ParameterKind::Probability,
            Parameter::AgeGapMean => ParameterKind::Mean,
            Parameter::MeanChildCount | Parameter::ChildAgeMean => ParameterKind::NonNegativeMean,
            Parameter::AgeGapSd | Parameter::ChildAgeSd => ParameterKind::Dispersion,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Parameter::MarriedProb => "married_prob",
            Parameter::AgeGapMean => "age_gap_mean",
            Parameter::AgeGapSd => "age_gap_sd",
            Parameter::HasChildProb => "has_child_prob",
            Parameter::MeanChildCount => "mean_child_count",
            Parameter::ChildAgeMean => "child_age_mean",
            Parameter::ChildAgeSd => "child_age_sd",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Parameter {
    type Err = HeritorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Parameter::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| HeritorError::UnknownParameter(s.to_string()))
    }
}

/// Parameters consumed by the beneficiary sampler for one (age, sex)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemographicParameters {
    pub p_married: f64,
    pub age_gap_mean: f64,
    pub age_gap_sd: f64,
    pub p_has_child: f64,
    pub mean_child_count: f64,
    pub child_age_mean: f64,
    pub child_age_sd: f64,
}

impl DemographicParameters {
    /// Enforce the probability and dispersion invariants
    pub fn sanitized(mut self, sd_floor: f64) -> Self {
        self.p_married = self.p_married.clamp(0.0, 1.0);
        self.p_has_child = self.p_has_child.clamp(0.0, 1.0);
        self.mean_child_count = self.mean_child_count.max(0.0);
        self.child_age_mean = self.child_age_mean.max(0.0);
        self.age_gap_sd = self.age_gap_sd.max(sd_floor);
        self.child_age_sd = self.child_age_sd.max(sd_floor);
        self
    }
}
