//! CSV output for smoothed parameters, charge tables and reserve tables
//!
//! Every writer takes any `io::Write`; the `*_path` forms create the file.

use std::fs::File;
use std::io::Write;
use std::ops::RangeInclusive;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::demographics::{Parameter, ParameterTable, Sex};
use crate::error::Result;
use crate::reserves::{ChargeSummary, ChargeTable, ReserveResult};

/// One row of a persisted smoothed parameter table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmoothedRow {
    pub age: u32,
    pub sex: Sex,
    pub parameter: Parameter,
    pub value: f64,
    pub raw_group: Option<f64>,
    pub raw_reference: f64,
    pub delta: f64,
    pub z: f64,
    pub n: f64,
}

/// One row of a charge table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRow {
    pub age: u32,
    pub sex: Sex,
    pub interest_rate: f64,
    pub mean: f64,
    pub median: f64,
    pub p10: f64,
    pub p90: f64,
    pub min: f64,
    pub max: f64,
    pub mean_pension_pct: f64,
    pub n_samples: usize,
    pub spouse_age_clamped: u64,
    pub child_age_clamped: u64,
    pub child_count_floored: u64,
}

impl From<&ChargeSummary> for ChargeRow {
    fn from(s: &ChargeSummary) -> Self {
        Self {
            age: s.age,
            sex: s.sex,
            interest_rate: s.interest_rate,
            mean: s.charge.mean,
            median: s.charge.median,
            p10: s.charge.p10,
            p90: s.charge.p90,
            min: s.charge.min,
            max: s.charge.max,
            mean_pension_pct: s.mean_pension_pct,
            n_samples: s.n_samples,
            spouse_age_clamped: s.clamps.spouse_age_clamped,
            child_age_clamped: s.clamps.child_age_clamped,
            child_count_floored: s.clamps.child_count_floored,
        }
    }
}

pub fn smoothed_rows(table: &ParameterTable) -> Vec<SmoothedRow> {
    table
        .curves()
        .flat_map(|(parameter, sex, curve)| {
            curve.points().iter().map(move |p| SmoothedRow {
                age: p.age,
                sex,
                parameter,
                value: p.value,
                raw_group: p.raw_group,
                raw_reference: p.raw_reference,
                delta: p.delta,
                z: p.z,
                n: p.n,
            })
        })
        .collect()
}

/// Charge rows for the given member ages, one block per table
pub fn charge_rows<'a>(
    tables: impl IntoIterator<Item = &'a ChargeTable>,
    ages: RangeInclusive<u32>,
) -> Vec<ChargeRow> {
    tables
        .into_iter()
        .flat_map(|t| t.summaries().filter(|s| ages.contains(&s.age)).map(ChargeRow::from))
        .collect()
}

fn write_rows<W: Write, T: Serialize>(writer: W, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_parameter_table<W: Write>(writer: W, table: &ParameterTable) -> Result<()> {
    write_rows(writer, &smoothed_rows(table))
}

pub fn write_parameter_table_path(path: &Path, table: &ParameterTable) -> Result<()> {
    write_parameter_table(File::create(path)?, table)
}

pub fn write_charge_rows<W: Write>(writer: W, rows: &[ChargeRow]) -> Result<()> {
    write_rows(writer, rows)
}

pub fn write_charge_rows_path(path: &Path, rows: &[ChargeRow]) -> Result<()> {
    write_charge_rows(File::create(path)?, rows)
}

pub fn write_reserves<W: Write>(writer: W, reserves: &[ReserveResult]) -> Result<()> {
    write_rows(writer, reserves)
}

pub fn write_reserves_path(path: &Path, reserves: &[ReserveResult]) -> Result<()> {
    write_reserves(File::create(path)?, reserves)
}
