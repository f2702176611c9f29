//! Result types for charge and reserve calculations

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::demographics::Sex;
use crate::error::{HeritorError, Result};
use crate::simulation::ClampCounts;

/// Order statistics of a simulated distribution
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionSummary {
    pub mean: f64,
    pub median: f64,
    pub p10: f64,
    pub p90: f64,
    pub min: f64,
    pub max: f64,
}

impl DistributionSummary {
    /// Summarise a non-empty sample; percentiles interpolate linearly between order statistics
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
        Some(Self {
            mean,
            median: percentile(&sorted, 0.5),
            p10: percentile(&sorted, 0.1),
            p90: percentile(&sorted, 0.9),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
        })
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = p * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (rank - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Conditional cost of survivor benefits if the member dies at `age`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeSummary {
    pub age: u32,
    pub sex: Sex,
    pub interest_rate: f64,
    pub n_samples: usize,
    pub charge: DistributionSummary,
    pub mean_pension_pct: f64,
    pub clamps: ClampCounts,
    pub seed: u64,
}

impl ChargeSummary {
    pub fn mean(&self) -> f64 {
        self.charge.mean
    }
}

/// Expected survivor-benefit cost for a member alive at `age`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReserveResult {
    pub age: u32,
    pub sex: Sex,
    pub interest_rate: f64,
    pub reserve_total: f64,
    pub reserve_per_life_year: f64,
    pub life_expectancy: f64,
    pub prob_leave_dependent: f64,
}

/// Charge summaries by death age for one sex and interest rate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeTable {
    pub sex: Sex,
    pub interest_rate: f64,
    pub n_samples: usize,
    pub seed: u64,
    entries: BTreeMap<u32, ChargeSummary>,
}

impl ChargeTable {
    pub fn new(sex: Sex, interest_rate: f64, n_samples: usize, seed: u64) -> Self {
        Self {
            sex,
            interest_rate,
            n_samples,
            seed,
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, summary: ChargeSummary) {
        self.entries.insert(summary.age, summary);
    }

    /// Summary at a death age; missing entries are fatal for reserve calculations
    pub fn get(&self, age: u32) -> Result<&ChargeSummary> {
        self.entries
            .get(&age)
            .ok_or_else(|| HeritorError::MissingCharge { age, sex: self.sex })
    }

    pub fn contains(&self, age: u32) -> bool {
        self.entries.contains_key(&age)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summaries(&self) -> impl Iterator<Item = &ChargeSummary> {
        self.entries.values()
    }

    /// Total clamps across every death age
    pub fn clamps(&self) -> ClampCounts {
        let mut total = ClampCounts::default();
        for s in self.entries.values() {
            total += s.clamps;
        }
        total
    }
}
