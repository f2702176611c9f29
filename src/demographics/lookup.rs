//! Parameter lookup with interpolation over smoothed curves

use std::collections::BTreeMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::credibility::{finalize, smooth_series, CredibilityConfig, PairedEstimate, SmoothedCurve, SmoothedPoint};
use super::{DemographicParameters, Parameter, Sex, MEMBER_MAX_AGE, MEMBER_MIN_AGE};
use crate::error::{validate_age, HeritorError, Result};

/// What to do when a curve has no data for the requested sex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LookupPolicy {
    /// Fail with `NoDataForSex`
    #[default]
    Strict,
    /// Use the opposite sex's curve and report it in the provenance
    Lenient,
}

/// How a looked-up value was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookupSource {
    Exact,
    Interpolated,
    Clamped,
    OtherSex,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LookupValue {
    pub value: f64,
    pub source: LookupSource,
}

/// Smoothed curves for every parameter family and sex
#[derive(Debug, Clone, Default)]
pub struct ParameterTable {
    curves: BTreeMap<(Parameter, Sex), SmoothedCurve>,
    sd_floor: f64,
}

impl ParameterTable {
    pub fn new(sd_floor: f64) -> Self {
        Self {
            curves: BTreeMap::new(),
            sd_floor,
        }
    }

    /// Smooth every paired-estimate series into a parameter table
    pub fn smooth(
        estimates: &BTreeMap<(Parameter, Sex), Vec<PairedEstimate>>,
        config: &CredibilityConfig,
    ) -> Result<Self> {
        let mut table = Self::new(config.sd_floor);
        for (&(parameter, sex), series) in estimates {
            let curve = smooth_series(series, parameter.kind(), config)?;
            if curve.diagnostics().used_fallback() {
                info!(
                    "{} / {}: smoothing used fallback ({:?}, k fallback = {})",
                    parameter,
                    sex,
                    curve.diagnostics().shift_basis,
                    curve.diagnostics().k_fallback
                );
            }
            table.insert(parameter, sex, curve);
        }
        Ok(table)
    }

    /// Rebuild a table from persisted points in any order
    ///
    /// Points are grouped into one curve per parameter and sex; a repeated age
    /// within a curve is a parse error.
    pub fn from_points(
        points: impl IntoIterator<Item = (Parameter, Sex, SmoothedPoint)>,
        sd_floor: f64,
    ) -> Result<Self> {
        let mut grouped: BTreeMap<(Parameter, Sex), Vec<SmoothedPoint>> = BTreeMap::new();
        for (parameter, sex, point) in points {
            grouped.entry((parameter, sex)).or_default().push(point);
        }

        let mut table = Self::new(sd_floor);
        for ((parameter, sex), points) in grouped {
            let curve = SmoothedCurve::from_points(points).map_err(|e| match e {
                HeritorError::Parse(msg) => HeritorError::Parse(format!("{} / {}: {}", parameter, sex, msg)),
                other => other,
            })?;
            table.insert(parameter, sex, curve);
        }
        Ok(table)
    }

    pub fn insert(&mut self, parameter: Parameter, sex: Sex, curve: SmoothedCurve) {
        self.curves.insert((parameter, sex), curve);
    }

    pub fn curve(&self, parameter: Parameter, sex: Sex) -> Option<&SmoothedCurve> {
        self.curves.get(&(parameter, sex)).filter(|c| !c.is_empty())
    }

    pub fn curves(&self) -> impl Iterator<Item = (Parameter, Sex, &SmoothedCurve)> {
        self.curves.iter().map(|(&(p, s), c)| (p, s, c))
    }

    pub fn sd_floor(&self) -> f64 {
        self.sd_floor
    }

    /// Look up one parameter at a member age in [15, 90]
    pub fn lookup(&self, parameter: Parameter, age: u32, sex: Sex, policy: LookupPolicy) -> Result<LookupValue> {
        validate_age(age, MEMBER_MIN_AGE, MEMBER_MAX_AGE)?;

        if let Some(curve) = self.curve(parameter, sex) {
            return Ok(interpolate(curve, age));
        }

        match policy {
            LookupPolicy::Strict => Err(HeritorError::NoDataForSex { parameter, sex }),
            LookupPolicy::Lenient => match self.curve(parameter, sex.opposite()) {
                Some(curve) => {
                    warn!("No {} data for {}; using {} curve", parameter, sex, sex.opposite());
                    Ok(LookupValue {
                        value: interpolate(curve, age).value,
                        source: LookupSource::OtherSex,
                    })
                }
                None => Err(HeritorError::NoDataForSex { parameter, sex }),
            },
        }
    }

    /// Look up without failing; `None` when the sex has no data
    pub fn try_lookup(&self, parameter: Parameter, age: u32, sex: Sex) -> Option<f64> {
        self.lookup(parameter, age, sex, LookupPolicy::Strict).ok().map(|v| v.value)
    }

    /// All sampler parameters at one member age
    pub fn parameters(&self, age: u32, sex: Sex, policy: LookupPolicy) -> Result<DemographicParameters> {
        let get = |p: Parameter| -> Result<f64> {
            let raw = self.lookup(p, age, sex, policy)?.value;
            Ok(finalize(raw, p.kind(), self.sd_floor))
        };

        Ok(DemographicParameters {
            p_married: get(Parameter::MarriedProb)?,
            age_gap_mean: get(Parameter::AgeGapMean)?,
            age_gap_sd: get(Parameter::AgeGapSd)?,
            p_has_child: get(Parameter::HasChildProb)?,
            mean_child_count: get(Parameter::MeanChildCount)?,
            child_age_mean: get(Parameter::ChildAgeMean)?,
            child_age_sd: get(Parameter::ChildAgeSd)?,
        }
        .sanitized(self.sd_floor))
    }
}

/// Exact value, linear interpolation between neighbours, or boundary clamp
fn interpolate(curve: &SmoothedCurve, age: u32) -> LookupValue {
    let points = curve.points();
    match points.binary_search_by_key(&age, |p| p.age) {
        Ok(i) => LookupValue {
            value: points[i].value,
            source: LookupSource::Exact,
        },
        Err(0) => LookupValue {
            value: points[0].value,
            source: LookupSource::Clamped,
        },
        Err(i) if i >= points.len() => LookupValue {
            value: points[points.len() - 1].value,
            source: LookupSource::Clamped,
        },
        Err(i) => {
            let lo = &points[i - 1];
            let hi = &points[i];
            let w = (age - lo.age) as f64 / (hi.age - lo.age) as f64;
            LookupValue {
                value: lo.value + w * (hi.value - lo.value),
                source: LookupSource::Interpolated,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sparse_curve() -> SmoothedCurve {
        SmoothedCurve::from_points(
            [(30, 0.40), (40, 0.60), (50, 0.70)]
                .iter()
                .map(|&(age, value)| SmoothedPoint {
                    age,
                    value,
                    raw_group: None,
                    raw_reference: value,
                    delta: 0.0,
                    z: 0.0,
                    n: 0.0,
                })
                .collect(),
        )
        .unwrap()
    }

    fn table() -> ParameterTable {
        let mut table = ParameterTable::new(0.1);
        table.insert(Parameter::MarriedProb, Sex::Male, sparse_curve());
        table
    }

    #[test]
    fn test_exact_lookup_returns_stored_value() {
        let v = table().lookup(Parameter::MarriedProb, 40, Sex::Male, LookupPolicy::Strict).unwrap();
        assert_eq!(v.value, 0.60);
        assert_eq!(v.source, LookupSource::Exact);
    }

    #[test]
    fn test_interpolated_lookup() {
        let v = table().lookup(Parameter::MarriedProb, 45, Sex::Male, LookupPolicy::Strict).unwrap();
        assert_relative_eq!(v.value, 0.65, epsilon = 1e-12);
        assert_eq!(v.source, LookupSource::Interpolated);
    }

    #[test]
    fn test_clamped_lookup() {
        let t = table();
        let low = t.lookup(Parameter::MarriedProb, 15, Sex::Male, LookupPolicy::Strict).unwrap();
        let high = t.lookup(Parameter::MarriedProb, 90, Sex::Male, LookupPolicy::Strict).unwrap();
        assert_eq!(low.value, 0.40);
        assert_eq!(high.value, 0.70);
        assert_eq!(high.source, LookupSource::Clamped);
    }

    #[test]
    fn test_missing_sex_policies() {
        let t = table();
        let strict = t.lookup(Parameter::MarriedProb, 40, Sex::Female, LookupPolicy::Strict);
        assert!(matches!(strict, Err(HeritorError::NoDataForSex { sex: Sex::Female, .. })));

        let lenient = t.lookup(Parameter::MarriedProb, 40, Sex::Female, LookupPolicy::Lenient).unwrap();
        assert_eq!(lenient.value, 0.60);
        assert_eq!(lenient.source, LookupSource::OtherSex);

        assert!(t.try_lookup(Parameter::MarriedProb, 40, Sex::Female).is_none());
    }

    #[test]
    fn test_age_outside_domain_is_rejected() {
        let err = table().lookup(Parameter::MarriedProb, 91, Sex::Male, LookupPolicy::Strict).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_from_points_groups_and_sorts() {
        let point = |age: u32, value: f64| SmoothedPoint {
            age,
            value,
            raw_group: None,
            raw_reference: value,
            delta: 0.0,
            z: 0.0,
            n: 0.0,
        };
        let table = ParameterTable::from_points(
            vec![
                (Parameter::MarriedProb, Sex::Male, point(50, 0.70)),
                (Parameter::AgeGapSd, Sex::Female, point(40, 4.0)),
                (Parameter::MarriedProb, Sex::Male, point(30, 0.40)),
            ],
            0.1,
        )
        .unwrap();

        let married = table.curve(Parameter::MarriedProb, Sex::Male).unwrap();
        assert_eq!(married.points().iter().map(|p| p.age).collect::<Vec<_>>(), vec![30, 50]);
        assert_relative_eq!(
            table.lookup(Parameter::MarriedProb, 40, Sex::Male, LookupPolicy::Strict).unwrap().value,
            0.55,
            epsilon = 1e-12
        );
        assert_eq!(table.try_lookup(Parameter::AgeGapSd, 60, Sex::Female), Some(4.0));
        assert_eq!(table.sd_floor(), 0.1);

        let duplicate = ParameterTable::from_points(
            vec![
                (Parameter::MarriedProb, Sex::Male, point(30, 0.40)),
                (Parameter::MarriedProb, Sex::Male, point(30, 0.45)),
            ],
            0.1,
        );
        assert!(matches!(duplicate, Err(HeritorError::Parse(_))));
    }

    /// Reference curves that leave the valid range at one end or the other
    fn out_of_range_reference(parameter: Parameter, sex: Sex, age: u32) -> f64 {
        let x = (age - MEMBER_MIN_AGE) as f64;
        let tilt: f64 = if sex == Sex::Male { 1.0 } else { -1.0 };
        match parameter {
            Parameter::MarriedProb => 1.3 - 0.02 * x,
            Parameter::HasChildProb => -0.3 + 0.02 * x * tilt.max(0.0) + 0.005 * x,
            Parameter::AgeGapMean => 3.0 * tilt - 0.1 * x,
            Parameter::AgeGapSd | Parameter::ChildAgeSd => 1.0 - 0.05 * x,
            Parameter::MeanChildCount | Parameter::ChildAgeMean => 2.0 - 0.06 * x,
        }
    }

    #[test]
    fn test_parameters_stay_in_range_when_reference_overshoots() {
        let mut estimates: BTreeMap<(Parameter, Sex), Vec<PairedEstimate>> = BTreeMap::new();
        for parameter in Parameter::ALL {
            for sex in [Sex::Male, Sex::Female] {
                let series = (MEMBER_MIN_AGE..=MEMBER_MAX_AGE)
                    .map(|age| {
                        let reference = out_of_range_reference(parameter, sex, age);
                        let noise = if age % 2 == 0 { 0.4 } else { -0.4 };
                        PairedEstimate {
                            age,
                            group_value: (age % 3 == 0).then_some(reference + 0.2 + noise),
                            group_n: if age % 3 == 0 { 5.0 } else { 0.0 },
                            reference_value: reference,
                            reference_n: 30_000.0,
                        }
                    })
                    .collect();
                estimates.insert((parameter, sex), series);
            }
        }

        let table = ParameterTable::smooth(&estimates, &CredibilityConfig::default()).unwrap();

        for sex in [Sex::Male, Sex::Female] {
            for age in MEMBER_MIN_AGE..=MEMBER_MAX_AGE {
                let p = table.parameters(age, sex, LookupPolicy::Strict).unwrap();
                assert!((0.0..=1.0).contains(&p.p_married), "married {} at {} {}", p.p_married, sex, age);
                assert!((0.0..=1.0).contains(&p.p_has_child), "has child {} at {} {}", p.p_has_child, sex, age);
                assert!(p.age_gap_sd > 0.0, "age gap sd at {} {}", sex, age);
                assert!(p.child_age_sd > 0.0, "child age sd at {} {}", sex, age);
                assert!(p.mean_child_count >= 0.0);
                assert!(p.child_age_mean >= 0.0);
            }
        }
    }
}
