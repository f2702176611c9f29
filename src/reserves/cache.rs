//! Memoised charge tables
//!
//! A charge table is the expensive part of a run and every reserve for the same
//! sex and interest rate reuses it. Tables are only cached for seeded runs, since
//! an unseeded table is not reproducible anyway.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use super::types::ChargeTable;
use crate::demographics::Sex;
use crate::error::Result;

/// Everything a charge table depends on besides the run's assumptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChargeKey {
    pub sex: Sex,
    /// Interest rate as raw bits so the key is hashable
    rate_bits: u64,
    pub from_age: u32,
    pub n_samples: usize,
    pub seed: u64,
}

impl ChargeKey {
    pub fn new(sex: Sex, interest_rate: f64, from_age: u32, n_samples: usize, seed: u64) -> Self {
        Self {
            sex,
            rate_bits: interest_rate.to_bits(),
            from_age,
            n_samples,
            seed,
        }
    }

    pub fn interest_rate(&self) -> f64 {
        f64::from_bits(self.rate_bits)
    }
}

#[derive(Debug, Default)]
pub struct ChargeCache {
    entries: HashMap<ChargeKey, Arc<ChargeTable>>,

    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl ChargeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ChargeKey) -> Option<Arc<ChargeTable>> {
        self.entries.get(key).cloned()
    }

    pub fn insert(&mut self, key: ChargeKey, table: ChargeTable) -> Arc<ChargeTable> {
        let table = Arc::new(table);
        self.entries.insert(key, Arc::clone(&table));
        table
    }

    /// Return the cached table or build it; `seed = None` always rebuilds
    pub fn get_or_build<F>(
        &mut self,
        sex: Sex,
        interest_rate: f64,
        from_age: u32,
        n_samples: usize,
        seed: Option<u64>,
        build: F,
    ) -> Result<Arc<ChargeTable>>
    where
        F: FnOnce() -> Result<ChargeTable>,
    {
        let Some(seed) = seed else {
            return Ok(Arc::new(build()?));
        };

        let key = ChargeKey::new(sex, interest_rate, from_age, n_samples, seed);
        if let Some(table) = self.get(&key) {
            self.cache_hits += 1;
            return Ok(table);
        }

        self.cache_misses += 1;
        debug!("Charge cache miss: {:?}", key);
        let table = build()?;
        Ok(self.insert(key, table))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cache_hits = 0;
        self.cache_misses = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}
