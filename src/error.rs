//! Error types for the heritor reserve engine
//!
//! Errors fall into three groups:
//! - **Validation**: out-of-domain ages, rates, sample counts or config values
//! - **Data availability**: no parameter data for a sex, missing charge-table entries
//! - **I/O**: table loading and writing at the persistence boundary
//!
//! Degenerate inputs and physical-plausibility clamps are never errors; they are
//! reported through diagnostics on the returned values.

use thiserror::Error;

use crate::demographics::{Parameter, Sex};

/// Library-wide result alias
pub type Result<T> = std::result::Result<T, HeritorError>;

#[derive(Debug, Error)]
pub enum HeritorError {
    #[error("Age {age} outside valid domain [{min}, {max}]")]
    InvalidAge { age: u32, min: u32, max: u32 },

    #[error("Interest rate {0} must lie strictly between 0 and 1")]
    InvalidInterestRate(f64),

    #[error("Sample count must be positive")]
    InvalidSampleCount,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown sex: {0}")]
    UnknownSex(String),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("No {parameter} data for sex {sex}")]
    NoDataForSex { parameter: Parameter, sex: Sex },

    #[error("Charge table for {sex} is missing death age {age}")]
    MissingCharge { age: u32, sex: Sex },

    #[error("Mortality table has no rates for {0}")]
    EmptyMortalityTable(Sex),

    #[error("Sampling cancelled after {completed} draws")]
    Cancelled { completed: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl HeritorError {
    /// True for errors caused by caller-supplied arguments
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            HeritorError::InvalidAge { .. }
                | HeritorError::InvalidInterestRate(_)
                | HeritorError::InvalidSampleCount
                | HeritorError::InvalidConfig(_)
                | HeritorError::UnknownSex(_)
                | HeritorError::UnknownParameter(_)
        )
    }
}

/// Check that an annual interest rate lies in (0, 1)
pub fn validate_interest_rate(rate: f64) -> Result<f64> {
    if rate > 0.0 && rate < 1.0 {
        Ok(rate)
    } else {
        Err(HeritorError::InvalidInterestRate(rate))
    }
}

/// Check that an age lies in the closed interval [min, max]
pub fn validate_age(age: u32, min: u32, max: u32) -> Result<u32> {
    if (min..=max).contains(&age) {
        Ok(age)
    } else {
        Err(HeritorError::InvalidAge { age, min, max })
    }
}
