//! Synthetic tables shared by unit tests

use crate::assumptions::{Assumptions, MortalityTable};
use crate::demographics::{Parameter, ParameterTable, Sex, SmoothedCurve, SmoothedPoint};
use crate::demographics::{MEMBER_MAX_AGE, MEMBER_MIN_AGE};

/// Monotone increasing Gompertz–Makeham table with ω = 110
pub fn gompertz_mortality() -> MortalityTable {
    MortalityTable::gompertz_makeham(0.0005, 0.00003, 1.1, 110).expect("valid fixture parameters")
}

pub fn curve_from_fn(f: impl Fn(u32) -> f64) -> SmoothedCurve {
    SmoothedCurve::from_points(
        (MEMBER_MIN_AGE..=MEMBER_MAX_AGE)
            .map(|age| {
                let value = f(age);
                SmoothedPoint {
                    age,
                    value,
                    raw_group: Some(value),
                    raw_reference: value,
                    delta: 0.0,
                    z: 1.0,
                    n: 100.0,
                }
            })
            .collect(),
    )
    .expect("one point per age")
}

/// Marriage probability rising to 0.75 by 45 and easing off after 70
pub fn married_prob(age: u32) -> f64 {
    let a = age as f64;
    if a < 45.0 {
        0.15 + 0.6 * (a - 15.0) / 30.0
    } else if a <= 70.0 {
        0.75
    } else {
        0.75 - 0.01 * (a - 70.0)
    }
}

/// Probability of a dependent child peaking around 40
pub fn has_child_prob(age: u32) -> f64 {
    let a = age as f64;
    (0.7 - ((a - 40.0) / 25.0).powi(2)).clamp(0.02, 0.7)
}

/// Demographic table with plausible age shapes for both sexes
pub fn demographic_table() -> ParameterTable {
    let mut table = ParameterTable::new(0.1);
    for sex in Sex::ALL {
        let gap = match sex {
            Sex::Male => 3.0,
            Sex::Female => -3.0,
        };
        table.insert(Parameter::MarriedProb, sex, curve_from_fn(married_prob));
        table.insert(Parameter::AgeGapMean, sex, curve_from_fn(move |_| gap));
        table.insert(Parameter::AgeGapSd, sex, curve_from_fn(|_| 4.0));
        table.insert(Parameter::HasChildProb, sex, curve_from_fn(has_child_prob));
        table.insert(Parameter::MeanChildCount, sex, curve_from_fn(|age| 1.6 * has_child_prob(age)));
        table.insert(
            Parameter::ChildAgeMean,
            sex,
            curve_from_fn(|age| (age as f64 - 28.0).clamp(1.0, 20.0)),
        );
        table.insert(Parameter::ChildAgeSd, sex, curve_from_fn(|_| 4.0));
    }
    table
}

pub fn assumptions() -> Assumptions {
    Assumptions::new(gompertz_mortality(), demographic_table())
}
