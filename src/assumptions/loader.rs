//! CSV-based table loaders
//!
//! Every loader has a `_from_reader` form so tables can be fed from memory,
//! network payloads or files alike.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use super::mortality::MortalityTable;
use crate::demographics::{PairedEstimate, Parameter, ParameterTable, Sex, SmoothedPoint};
use crate::error::{HeritorError, Result};

/// Paired estimates grouped by parameter family and sex
pub type PairedEstimateSet = BTreeMap<(Parameter, Sex), Vec<PairedEstimate>>;

/// Load a mortality table from an `age,female,male` CSV file
pub fn load_mortality_table(path: &Path) -> Result<MortalityTable> {
    load_mortality_table_from_reader(File::open(path)?)
}

/// Load a mortality table from any reader
///
/// Ages must be contiguous from 0; the highest age becomes ω.
pub fn load_mortality_table_from_reader<R: Read>(reader: R) -> Result<MortalityTable> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut rows: BTreeMap<usize, (f64, f64)> = BTreeMap::new();

    for (index, result) in reader.records().enumerate() {
        let record = result?;
        let row = index + 1;
        let field = |i: usize| record.get(i).map(str::trim).unwrap_or("");
        let age: usize = field(0)
            .parse()
            .map_err(|_| HeritorError::Parse(format!("mortality row {}: age is not a whole number", row)))?;
        let rate = |i: usize, column: &str| -> Result<f64> {
            field(i)
                .parse()
                .map_err(|_| HeritorError::Parse(format!("mortality row {}: {} rate is not a number", row, column)))
        };
        if rows.insert(age, (rate(1, "female")?, rate(2, "male")?)).is_some() {
            return Err(HeritorError::Parse(format!("mortality row {}: duplicate age {}", row, age)));
        }
    }

    for (expected, &age) in rows.keys().enumerate() {
        if age != expected {
            return Err(HeritorError::Parse(format!("mortality table is missing age {}", expected)));
        }
    }

    let (female, male) = rows.into_values().unzip();
    MortalityTable::from_rates(female, male)
}

#[derive(Debug, Deserialize)]
struct PairedEstimateRow {
    age: u32,
    sex: String,
    parameter: String,
    group_value: Option<f64>,
    #[serde(default)]
    group_n: Option<f64>,
    reference_value: f64,
    #[serde(default)]
    reference_n: Option<f64>,
}

/// Load paired group/reference estimates from a CSV file
pub fn load_paired_estimates(path: &Path) -> Result<PairedEstimateSet> {
    load_paired_estimates_from_reader(File::open(path)?)
}

/// Columns: `age,sex,parameter,group_value,group_n,reference_value,reference_n`.
/// An empty `group_value` marks a missing observation.
pub fn load_paired_estimates_from_reader<R: Read>(reader: R) -> Result<PairedEstimateSet> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut set = PairedEstimateSet::new();

    for result in reader.deserialize() {
        let row: PairedEstimateRow = result?;
        let sex: Sex = row.sex.parse()?;
        let parameter: Parameter = row.parameter.parse()?;
        set.entry((parameter, sex)).or_default().push(PairedEstimate {
            age: row.age,
            group_value: row.group_value,
            group_n: row.group_n.unwrap_or(0.0),
            reference_value: row.reference_value,
            reference_n: row.reference_n.unwrap_or(0.0),
        });
    }

    Ok(set)
}

#[derive(Debug, Deserialize)]
struct SmoothedRow {
    age: u32,
    sex: String,
    parameter: String,
    value: f64,
    #[serde(default)]
    raw_group: Option<f64>,
    #[serde(default)]
    raw_reference: Option<f64>,
    #[serde(default)]
    delta: Option<f64>,
    #[serde(default)]
    z: Option<f64>,
    #[serde(default)]
    n: Option<f64>,
}

/// Load a persisted smoothed parameter table from a CSV file
pub fn load_parameter_table(path: &Path, sd_floor: f64) -> Result<ParameterTable> {
    load_parameter_table_from_reader(File::open(path)?, sd_floor)
}

/// Columns: `age,sex,parameter,value,raw_group,raw_reference,delta,z,n`.
/// Values are taken verbatim; only `value` is required.
pub fn load_parameter_table_from_reader<R: Read>(reader: R, sd_floor: f64) -> Result<ParameterTable> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut points = Vec::new();

    for result in reader.deserialize() {
        let row: SmoothedRow = result?;
        let sex: Sex = row.sex.parse()?;
        let parameter: Parameter = row.parameter.parse()?;
        points.push((
            parameter,
            sex,
            SmoothedPoint {
                age: row.age,
                value: row.value,
                raw_group: row.raw_group,
                raw_reference: row.raw_reference.unwrap_or(row.value),
                delta: row.delta.unwrap_or(0.0),
                z: row.z.unwrap_or(0.0),
                n: row.n.unwrap_or(0.0),
            },
        ));
    }

    ParameterTable::from_points(points, sd_floor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demographics::LookupPolicy;

    #[test]
    fn test_load_mortality_from_reader() {
        let data = "age,female,male\n0,0.01,0.02\n1,0.02,0.03\n2,0.5,0.6\n";
        let table = load_mortality_table_from_reader(data.as_bytes()).unwrap();

        assert_eq!(table.omega(), 2);
        assert_eq!(table.q(1, Sex::Male), 0.03);
        assert_eq!(table.q(2, Sex::Female), 1.0);
    }

    #[test]
    fn test_mortality_gap_rejected() {
        let data = "age,female,male\n0,0.01,0.02\n2,0.5,0.6\n";
        assert!(load_mortality_table_from_reader(data.as_bytes()).is_err());

        let repeated = "age,female,male\n0,0.01,0.02\n1,0.5,0.6\n1,0.4,0.6\n";
        let err = load_mortality_table_from_reader(repeated.as_bytes()).unwrap_err();
        assert!(matches!(err, HeritorError::Parse(_)));
    }

    #[test]
    fn test_mortality_parse_error_names_row_not_content() {
        let data = "age,female,male\n0,0.01,0.02\n1,root:x:0:0,0.03\n";
        let err = load_mortality_table_from_reader(data.as_bytes()).unwrap_err();
        let message = err.to_string();

        assert!(matches!(err, HeritorError::Parse(_)));
        assert!(message.contains("row 2"), "{}", message);
        assert!(message.contains("female"), "{}", message);
        assert!(!message.contains("root"), "{}", message);
    }

    #[test]
    fn test_load_paired_estimates_with_missing_group() {
        let data = "\
age,sex,parameter,group_value,group_n,reference_value,reference_n
40,Male,married_prob,0.8,120,0.75,40000
41,Male,married_prob,,0,0.76,41000
40,Female,age_gap_mean,-2.5,80,-2.0,39000
";
        let set = load_paired_estimates_from_reader(data.as_bytes()).unwrap();

        let married = &set[&(Parameter::MarriedProb, Sex::Male)];
        assert_eq!(married.len(), 2);
        assert_eq!(married[0].group_value, Some(0.8));
        assert_eq!(married[1].group_value, None);
        assert_eq!(married[1].group_n, 0.0);
        assert!(set.contains_key(&(Parameter::AgeGapMean, Sex::Female)));
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let data = "age,sex,parameter,group_value,group_n,reference_value,reference_n\n40,Male,salary,1,1,1,1\n";
        let err = load_paired_estimates_from_reader(data.as_bytes()).unwrap_err();
        assert!(matches!(err, HeritorError::UnknownParameter(_)));
    }

    #[test]
    fn test_load_parameter_table() {
        let data = "\
age,sex,parameter,value,raw_group,raw_reference,delta,z,n
40,Male,married_prob,0.70,0.9,0.68,0.02,0.4,3
50,Male,married_prob,0.80,,0.78,0.02,0.0,0
";
        let table = load_parameter_table_from_reader(data.as_bytes(), 0.1).unwrap();
        let v = table.lookup(Parameter::MarriedProb, 40, Sex::Male, LookupPolicy::Strict).unwrap();
        assert_eq!(v.value, 0.70);

        let curve = table.curve(Parameter::MarriedProb, Sex::Male).unwrap();
        assert_eq!(curve.get(50).unwrap().raw_group, None);
        assert_eq!(curve.get(40).unwrap().z, 0.4);
    }

    #[test]
    fn test_duplicate_parameter_row_rejected() {
        let data = "\
age,sex,parameter,value
40,Male,married_prob,0.70
40,Female,married_prob,0.60
40,Male,married_prob,0.75
";
        let err = load_parameter_table_from_reader(data.as_bytes(), 0.1).unwrap_err();
        assert!(matches!(err, HeritorError::Parse(_)));
        assert!(err.to_string().contains("age 40"));
    }
}
