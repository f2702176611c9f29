//! Annual mortality tables by sex
//!
//! A table stores q[age] for ages 0..=ω per sex, where ω is the terminal age.
//! q[ω] is forced to 1 so survival beyond the table is exactly zero.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::demographics::Sex;
use crate::error::{validate_age, HeritorError, Result};

/// Identifies a mortality table in configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MortalityTableRef {
    /// IAM 2012 Basic, unadjusted
    #[default]
    Iam2012Basic,
    /// Synthetic Gompertz–Makeham table
    GompertzMakeham { a: f64, b: f64, c: f64, omega: u32 },
    /// `age,female,male` CSV file
    Csv { path: PathBuf },
}

impl MortalityTableRef {
    /// True if loading the table reads from the filesystem
    pub fn reads_file(&self) -> bool {
        matches!(self, MortalityTableRef::Csv { .. })
    }

    pub fn load(&self) -> Result<MortalityTable> {
        match self {
            MortalityTableRef::Iam2012Basic => Ok(MortalityTable::iam_2012_basic()),
            MortalityTableRef::GompertzMakeham { a, b, c, omega } => {
                MortalityTable::gompertz_makeham(*a, *b, *c, *omega)
            }
            MortalityTableRef::Csv { path } => super::loader::load_mortality_table(path),
        }
    }
}

/// Immutable annual mortality rates for both sexes
#[derive(Debug, Clone, PartialEq)]
pub struct MortalityTable {
    /// Female rates, index = age
    female: Vec<f64>,
    /// Male rates, index = age
    male: Vec<f64>,
}

impl MortalityTable {
    /// Build from per-sex rate vectors indexed by age
    ///
    /// Both vectors must cover the same ages; the last age becomes ω and its
    /// rate is set to 1.
    pub fn from_rates(mut female: Vec<f64>, mut male: Vec<f64>) -> Result<Self> {
        if female.is_empty() {
            return Err(HeritorError::EmptyMortalityTable(Sex::Female));
        }
        if male.is_empty() {
            return Err(HeritorError::EmptyMortalityTable(Sex::Male));
        }
        if female.len() != male.len() {
            return Err(HeritorError::Parse(format!(
                "mortality table has {} female rates but {} male rates",
                female.len(),
                male.len()
            )));
        }

        let len = female.len();

        for rates in [&mut female, &mut male] {
            for q in rates.iter_mut() {
                if !q.is_finite() || *q < 0.0 || *q > 1.0 {
                    return Err(HeritorError::Parse(format!("mortality rate {} outside [0, 1]", q)));
                }
            }
            rates[len - 1] = 1.0;
        }

        Ok(Self { female, male })
    }

    /// Terminal age ω
    pub fn omega(&self) -> u32 {
        (self.female.len() - 1) as u32
    }

    /// Annual rates for one sex, index = age
    pub fn rates(&self, sex: Sex) -> &[f64] {
        match sex {
            Sex::Female => &self.female,
            Sex::Male => &self.male,
        }
    }

    /// q at `age`; ages past ω return 1
    pub fn q(&self, age: u32, sex: Sex) -> f64 {
        self.rates(sex).get(age as usize).copied().unwrap_or(1.0)
    }

    /// Check that `age` lies in [0, ω]
    pub fn validate_age(&self, age: u32) -> Result<u32> {
        validate_age(age, 0, self.omega())
    }

    /// t-year survival probability from `age`
    pub fn tpx(&self, age: u32, t: u32, sex: Sex) -> f64 {
        (0..t).fold(1.0, |p, k| p * (1.0 - self.q(age + k, sex)))
    }

    /// Scaled copy; rates are capped at 1
    pub fn with_multiplier(&self, multiplier: f64) -> Result<Self> {
        if !(multiplier > 0.0) {
            return Err(HeritorError::InvalidConfig(format!(
                "mortality multiplier must be positive, got {}",
                multiplier
            )));
        }
        let scale = |rates: &[f64]| rates.iter().map(|q| (q * multiplier).min(1.0)).collect();
        Self::from_rates(scale(&self.female), scale(&self.male))
    }

    /// Gompertz–Makeham table: μ(x) = a + b·cˣ, q = 1 − exp(−μ)
    ///
    /// Rates are non-decreasing in age whenever b > 0 and c > 1.
    pub fn gompertz_makeham(a: f64, b: f64, c: f64, omega: u32) -> Result<Self> {
        if !(a >= 0.0 && b > 0.0 && c > 1.0) || omega == 0 {
            return Err(HeritorError::InvalidConfig(format!(
                "Gompertz-Makeham parameters a={} b={} c={} omega={} are invalid",
                a, b, c, omega
            )));
        }
        let rates: Vec<f64> = (0..=omega)
            .map(|x| 1.0 - (-(a + b * c.powi(x as i32))).exp())
            .collect();
        Self::from_rates(rates.clone(), rates)
    }

    /// IAM 2012 Basic annual rates, ages 0-120
    pub fn iam_2012_basic() -> Self {
        let (female, male): (Vec<f64>, Vec<f64>) = IAM_2012_BASIC.iter().copied().unzip();
        Self::from_rates(female, male).unwrap_or_else(|_| unreachable!("built-in table is valid"))
    }
}

/// (female, male) rates by age
const IAM_2012_BASIC: [(f64, f64); 121] = [
    // Age 0-9
    (0.001801, 0.001783), (0.00045, 0.000446), (0.000287, 0.000306),
    (0.000199, 0.000254), (0.000152, 0.000193), (0.000139, 0.000186),
    (0.00013, 0.000184), (0.000122, 0.000177), (0.000105, 0.000159),
    (0.000098, 0.000143),
    // Age 10-19
    (0.000094, 0.000126), (0.000096, 0.000123), (0.000105, 0.000147),
    (0.00012, 0.000188), (0.000146, 0.000236), (0.000174, 0.000282),
    (0.000199, 0.000325), (0.00022, 0.000364), (0.000234, 0.000399),
    (0.000245, 0.00043),
    // Age 20-29
    (0.000253, 0.000459), (0.00026, 0.000492), (0.000266, 0.000526),
    (0.000272, 0.000569), (0.000275, 0.000616), (0.000277, 0.000669),
    (0.000284, 0.000728), (0.00029, 0.000764), (0.0003, 0.000789),
    (0.000313, 0.000808),
    // Age 30-39
    (0.000333, 0.000824), (0.000357, 0.000834), (0.000375, 0.000838),
    (0.00039, 0.000828), (0.000405, 0.000808), (0.000424, 0.000789),
    (0.000447, 0.000783), (0.000476, 0.0008), (0.000514, 0.000837),
    (0.00056, 0.000889),
    // Age 40-49
    (0.000613, 0.000955), (0.000667, 0.001029), (0.000723, 0.00111),
    (0.000774, 0.001188), (0.000823, 0.001268), (0.000866, 0.001355),
    (0.000917, 0.001464), (0.000983, 0.001615), (0.001072, 0.001808),
    (0.001168, 0.002032),
    // Age 50-59
    (0.00129, 0.002285), (0.001453, 0.002557), (0.001622, 0.002828),
    (0.001792, 0.003088), (0.001972, 0.003345), (0.002166, 0.003616),
    (0.002393, 0.003922), (0.002666, 0.004272), (0.003, 0.004681),
    (0.003393, 0.005146),
    // Age 60-69
    (0.003844, 0.005662), (0.004352, 0.006237), (0.004899, 0.006854),
    (0.005482, 0.00751), (0.006118, 0.00822), (0.006829, 0.009007),
    (0.007279, 0.009497), (0.007821, 0.010085), (0.008475, 0.010787),
    (0.009234, 0.011625),
    // Age 70-79
    (0.010083, 0.012619), (0.011011, 0.013798), (0.01203, 0.015195),
    (0.013154, 0.016834), (0.014415, 0.018733), (0.015869, 0.020905),
    (0.017555, 0.023367), (0.0195, 0.026155), (0.021758, 0.029306),
    (0.024412, 0.032858),
    // Age 80-89
    (0.027579, 0.036927), (0.031501, 0.041703), (0.036122, 0.046957),
    (0.041477, 0.052713), (0.047589, 0.059148), (0.054441, 0.066505),
    (0.061972, 0.075015), (0.070155, 0.084823), (0.078963, 0.095987),
    (0.088336, 0.108482),
    // Age 90-99
    (0.098197, 0.122214), (0.108323, 0.136799), (0.119188, 0.152409),
    (0.131334, 0.169078), (0.145521, 0.186882), (0.162722, 0.205844),
    (0.18212, 0.219247), (0.199661, 0.238612), (0.217946, 0.258341),
    (0.236834, 0.278219),
    // Age 100-109
    (0.256357, 0.298452), (0.283802, 0.32361), (0.304716, 0.344191),
    (0.325819, 0.364633), (0.346936, 0.384783), (0.367898, 0.4),
    (0.387607, 0.4), (0.4, 0.4), (0.4, 0.4), (0.4, 0.4),
    // Age 110-120
    (0.4, 0.4), (0.4, 0.4), (0.4, 0.4), (0.4, 0.4), (0.4, 0.4),
    (0.4, 0.4), (0.4, 0.4), (0.4, 0.4), (0.4, 0.4), (0.4, 0.4),
    (0.4, 0.4),
];
