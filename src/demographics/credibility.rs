//! Bühlmann–Straub credibility smoothing of paired per-age estimates
//!
//! Each demographic parameter is observed twice per age: once in the small
//! member group (noisy, sometimes empty) and once in a large reference population
//! (stable, but systematically shifted). The procedure:
//!
//! 1. Estimate the systematic shift Δ between group and reference at reliable ages
//! 2. Shift the reference curve by Δ
//! 3. Blend group and shifted reference with weight Z = n / (n + k), k = √mean(n)
//! 4. Run a few passes of a triangular moving average, each anchored back to the
//!    shifted reference so the curve cannot drift away from the large-sample trend

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::smoothing::weighted_moving_average;
use super::ParameterKind;
use crate::error::{HeritorError, Result};

/// Tuning constants for credibility smoothing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredibilityConfig {
    /// Minimum group sample size for an age to inform the shift estimate
    pub n_min: f64,

    /// Credibility constant used when no age has any group data
    pub fallback_k: f64,

    /// Half-width of the moving-average window (2 = five ages)
    pub window_half_width: usize,

    /// Number of smoothing passes
    pub iterations: usize,

    /// Weight of the shifted reference in every pass
    pub anchor_weight: f64,

    /// Floor applied to dispersion parameters
    pub sd_floor: f64,
}

impl Default for CredibilityConfig {
    fn default() -> Self {
        Self {
            n_min: 30.0,
            fallback_k: 10.0,
            window_half_width: 2,
            iterations: 3,
            anchor_weight: 0.3,
            sd_floor: 0.1,
        }
    }
}

impl CredibilityConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.n_min >= 0.0) {
            return Err(HeritorError::InvalidConfig(format!("n_min must be >= 0, got {}", self.n_min)));
        }
        if !(self.fallback_k > 0.0) {
            return Err(HeritorError::InvalidConfig(format!(
                "fallback_k must be positive, got {}",
                self.fallback_k
            )));
        }
        if !(0.0..=1.0).contains(&self.anchor_weight) {
            return Err(HeritorError::InvalidConfig(format!(
                "anchor_weight must lie in [0, 1], got {}",
                self.anchor_weight
            )));
        }
        if !(self.sd_floor > 0.0) {
            return Err(HeritorError::InvalidConfig(format!(
                "sd_floor must be positive, got {}",
                self.sd_floor
            )));
        }
        Ok(())
    }
}

/// Group and reference estimates of one parameter at one age
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairedEstimate {
    pub age: u32,
    /// Group estimate; `None` when the value is missing at this age
    pub group_value: Option<f64>,
    /// Effective group sample size (0 = no group data)
    pub group_n: f64,
    pub reference_value: f64,
    pub reference_n: f64,
}

impl PairedEstimate {
    /// Sample size that actually backs the group value
    fn effective_n(&self) -> f64 {
        match self.group_value {
            Some(v) if v.is_finite() && self.group_n > 0.0 => self.group_n,
            _ => 0.0,
        }
    }
}

/// Which ages informed the shift Δ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShiftBasis {
    /// Ages with group n >= n_min
    Reliable,
    /// No age was reliable; all ages with any group data were used
    AllObserved,
    /// No group data at all; Δ = 0
    NoGroupData,
}

/// Provenance of the fallbacks taken while smoothing one curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveDiagnostics {
    pub shift_basis: ShiftBasis,
    pub delta: f64,
    pub k: f64,
    pub k_fallback: bool,
}

impl CurveDiagnostics {
    /// True if any degenerate-input fallback was used
    pub fn used_fallback(&self) -> bool {
        self.k_fallback || self.shift_basis != ShiftBasis::Reliable
    }
}

impl Default for CurveDiagnostics {
    fn default() -> Self {
        Self {
            shift_basis: ShiftBasis::Reliable,
            delta: 0.0,
            k: 0.0,
            k_fallback: false,
        }
    }
}

/// One age of a smoothed curve together with its audit trail
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothedPoint {
    pub age: u32,
    pub value: f64,
    pub raw_group: Option<f64>,
    pub raw_reference: f64,
    pub delta: f64,
    pub z: f64,
    pub n: f64,
}

/// Stabilised per-age curve for one parameter and sex
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmoothedCurve {
    points: Vec<SmoothedPoint>,
    diagnostics: CurveDiagnostics,
}

impl SmoothedCurve {
    /// Build from already-smoothed points (e.g. a persisted table)
    ///
    /// Two points for the same age are a parse error.
    pub fn from_points(mut points: Vec<SmoothedPoint>) -> Result<Self> {
        points.sort_by_key(|p| p.age);
        check_unique_ages(points.iter().map(|p| p.age))?;
        let diagnostics = CurveDiagnostics {
            delta: points.first().map(|p| p.delta).unwrap_or(0.0),
            ..Default::default()
        };
        Ok(Self { points, diagnostics })
    }

    pub fn points(&self) -> &[SmoothedPoint] {
        &self.points
    }

    pub fn diagnostics(&self) -> &CurveDiagnostics {
        &self.diagnostics
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Stored point at exactly `age`
    pub fn get(&self, age: u32) -> Option<&SmoothedPoint> {
        self.points
            .binary_search_by_key(&age, |p| p.age)
            .ok()
            .map(|i| &self.points[i])
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Paired estimates that reproduce this curve as group data against `reference`
    ///
    /// Used to re-run the smoother on its own output.
    pub fn as_group_estimates(&self, reference: &[PairedEstimate]) -> Vec<PairedEstimate> {
        reference
            .iter()
            .map(|r| PairedEstimate {
                group_value: self.get(r.age).map(|p| p.value),
                ..*r
            })
            .collect()
    }
}

/// Credibility weight Z = n / (n + k); zero when there is no data
pub fn credibility_weight(n: f64, k: f64) -> f64 {
    if n <= 0.0 {
        0.0
    } else {
        n / (n + k)
    }
}

/// Ages must arrive sorted
fn check_unique_ages(ages: impl Iterator<Item = u32>) -> Result<()> {
    let mut previous = None;
    for age in ages {
        if previous == Some(age) {
            return Err(HeritorError::Parse(format!("duplicate entry for age {}", age)));
        }
        previous = Some(age);
    }
    Ok(())
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Smooth one paired-estimate series (single parameter, single sex)
pub fn smooth_series(
    estimates: &[PairedEstimate],
    kind: ParameterKind,
    config: &CredibilityConfig,
) -> Result<SmoothedCurve> {
    config.validate()?;

    let mut series = estimates.to_vec();
    series.sort_by_key(|e| e.age);
    check_unique_ages(series.iter().map(|e| e.age))?;

    if series.is_empty() {
        return Ok(SmoothedCurve::default());
    }

    // Shift estimation
    let diff = |e: &PairedEstimate| e.group_value.unwrap_or(0.0) - e.reference_value;
    let reliable = mean(
        series
            .iter()
            .filter(|e| e.effective_n() > 0.0 && e.effective_n() >= config.n_min)
            .map(diff),
    );
    let (delta, shift_basis) = match reliable {
        Some(d) => (d, ShiftBasis::Reliable),
        None => match mean(series.iter().filter(|e| e.effective_n() > 0.0).map(diff)) {
            Some(d) => {
                warn!("No age reaches n_min = {}; shift estimated from all observed ages", config.n_min);
                (d, ShiftBasis::AllObserved)
            }
            None => {
                warn!("No group data in series; shift set to 0");
                (0.0, ShiftBasis::NoGroupData)
            }
        },
    };

    // Credibility constant
    let (k, k_fallback) = match mean(series.iter().map(|e| e.effective_n()).filter(|&n| n > 0.0)) {
        Some(mean_n) => (mean_n.sqrt(), false),
        None => {
            warn!("No positive group sample sizes; using fallback k = {}", config.fallback_k);
            (config.fallback_k, true)
        }
    };

    debug!("Credibility shift = {:.6}, k = {:.4} ({:?})", delta, k, shift_basis);

    let reference_adj: Vec<f64> = series.iter().map(|e| e.reference_value + delta).collect();
    let weights: Vec<f64> = series.iter().map(|e| credibility_weight(e.effective_n(), k)).collect();

    let credible: Vec<f64> = series
        .iter()
        .zip(&reference_adj)
        .zip(&weights)
        .map(|((e, &r_adj), &z)| match e.group_value {
            Some(g) if e.effective_n() > 0.0 => z * g + (1.0 - z) * r_adj,
            _ => r_adj,
        })
        .collect();

    // Anchored smoothing passes
    let mut current = credible;
    for _ in 0..config.iterations {
        let indexed: Vec<(u32, f64)> = series.iter().map(|e| e.age).zip(current.iter().copied()).collect();
        let averaged = weighted_moving_average(&indexed, config.window_half_width);
        current = averaged
            .iter()
            .zip(&reference_adj)
            .map(|(&avg, &r_adj)| (1.0 - config.anchor_weight) * avg + config.anchor_weight * r_adj)
            .collect();
    }

    let points = series
        .iter()
        .zip(current)
        .zip(&weights)
        .map(|((e, value), &z)| SmoothedPoint {
            age: e.age,
            value: finalize(value, kind, config.sd_floor),
            raw_group: e.group_value,
            raw_reference: e.reference_value,
            delta,
            z,
            n: e.group_n.max(0.0),
        })
        .collect();

    Ok(SmoothedCurve {
        points,
        diagnostics: CurveDiagnostics {
            shift_basis,
            delta,
            k,
            k_fallback,
        },
    })
}

/// Apply the per-kind value constraints
pub(crate) fn finalize(value: f64, kind: ParameterKind, sd_floor: f64) -> f64 {
    match kind {
        ParameterKind::Probability => value.clamp(0.0, 1.0),
        ParameterKind::Mean => value,
        ParameterKind::NonNegativeMean => value.max(0.0),
        ParameterKind::Dispersion => value.max(sd_floor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn first_difference_sd(values: &[f64]) -> f64 {
        let diffs: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
        let m = diffs.iter().sum::<f64>() / diffs.len() as f64;
        (diffs.iter().map(|d| (d - m).powi(2)).sum::<f64>() / diffs.len() as f64).sqrt()
    }

    fn linear_reference(age: u32) -> f64 {
        0.2 + 0.006 * (age as f64 - 15.0)
    }

    #[test]
    fn test_credibility_weight_monotone() {
        let k = 5.0;
        assert_eq!(credibility_weight(0.0, k), 0.0);

        let mut previous = 0.0;
        for n in [1.0, 2.0, 10.0, 100.0, 1_000.0, 1e6] {
            let z = credibility_weight(n, k);
            assert!(z > previous);
            assert!(z < 1.0);
            previous = z;
        }
        assert!(credibility_weight(1e12, k) > 0.999_999);
    }

    #[test]
    fn test_shift_uses_reliable_ages() {
        let estimates: Vec<PairedEstimate> = (20..=60)
            .map(|age| PairedEstimate {
                age,
                group_value: Some(linear_reference(age) + if age < 40 { 0.05 } else { 0.5 }),
                group_n: if age < 40 { 200.0 } else { 5.0 },
                reference_value: linear_reference(age),
                reference_n: 50_000.0,
            })
            .collect();

        let curve = smooth_series(&estimates, ParameterKind::Probability, &CredibilityConfig::default()).unwrap();
        let diag = curve.diagnostics();

        assert_eq!(diag.shift_basis, ShiftBasis::Reliable);
        assert_abs_diff_eq!(diag.delta, 0.05, epsilon = 1e-12);
        assert!(!diag.used_fallback());
    }

    #[test]
    fn test_shift_falls_back_to_observed_ages() {
        let estimates: Vec<PairedEstimate> = (20..=30)
            .map(|age| PairedEstimate {
                age,
                group_value: Some(0.4),
                group_n: 3.0,
                reference_value: 0.3,
                reference_n: 10_000.0,
            })
            .collect();

        let curve = smooth_series(&estimates, ParameterKind::Probability, &CredibilityConfig::default()).unwrap();
        assert_eq!(curve.diagnostics().shift_basis, ShiftBasis::AllObserved);
        assert_abs_diff_eq!(curve.diagnostics().delta, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(curve.diagnostics().k, 3.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_no_group_data_reduces_to_reference() {
        let estimates: Vec<PairedEstimate> = (20..=50)
            .map(|age| PairedEstimate {
                age,
                group_value: None,
                group_n: 0.0,
                reference_value: linear_reference(age),
                reference_n: 10_000.0,
            })
            .collect();

        let curve = smooth_series(&estimates, ParameterKind::Probability, &CredibilityConfig::default()).unwrap();
        let diag = curve.diagnostics();
        assert_eq!(diag.shift_basis, ShiftBasis::NoGroupData);
        assert!(diag.k_fallback);
        assert_eq!(diag.delta, 0.0);

        for p in curve.points() {
            assert_eq!(p.z, 0.0);
            assert_abs_diff_eq!(p.value, linear_reference(p.age), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_smoothing_reduces_alternating_noise() {
        let config = CredibilityConfig::default();
        let estimates: Vec<PairedEstimate> = (15..=90)
            .map(|age| PairedEstimate {
                age,
                group_value: Some(if age % 2 == 0 { 0.0 } else { 1.0 }),
                group_n: 1.0,
                reference_value: linear_reference(age),
                reference_n: 20_000.0,
            })
            .collect();

        // Raw credible input, reconstructed from the reported shift and weights
        let curve = smooth_series(&estimates, ParameterKind::Probability, &config).unwrap();
        let raw_credible: Vec<f64> = curve
            .points()
            .iter()
            .map(|p| p.z * p.raw_group.unwrap() + (1.0 - p.z) * (p.raw_reference + p.delta))
            .collect();

        let raw_sd = first_difference_sd(&raw_credible);
        let smooth_sd = first_difference_sd(&curve.values());
        assert!(smooth_sd < raw_sd, "smoothed {} vs raw {}", smooth_sd, raw_sd);
        assert!(smooth_sd < 0.25 * raw_sd);
    }

    #[test]
    fn test_edge_ages_are_averaged() {
        let config = CredibilityConfig::default();
        let estimates: Vec<PairedEstimate> = (15..=90)
            .map(|age| PairedEstimate {
                age,
                group_value: Some(if age % 2 == 0 { 0.0 } else { 1.0 }),
                group_n: 1.0,
                reference_value: linear_reference(age),
                reference_n: 20_000.0,
            })
            .collect();

        let curve = smooth_series(&estimates, ParameterKind::Probability, &config).unwrap();
        let points = curve.points();
        let deviation = |i: usize| (points[i].value - (points[i].raw_reference + points[i].delta)).abs();
        let last = points.len() - 1;

        // Edge ages track their inner neighbours instead of keeping the raw noise
        assert!(deviation(0) <= 1.25 * deviation(1), "{} vs {}", deviation(0), deviation(1));
        assert!(deviation(last) <= 1.25 * deviation(last - 1), "{} vs {}", deviation(last), deviation(last - 1));

        // Well below what the anchor alone would leave after every pass
        let raw = |i: usize| {
            let p = &points[i];
            let r_adj = p.raw_reference + p.delta;
            (p.z * p.raw_group.unwrap() + (1.0 - p.z) * r_adj - r_adj).abs()
        };
        let anchor_only = (1.0 - config.anchor_weight).powi(config.iterations as i32);
        assert!(deviation(0) < 0.5 * anchor_only * raw(0));
        assert!(deviation(last) < 0.5 * anchor_only * raw(last));
    }

    #[test]
    fn test_resmoothing_is_near_fixed_point() {
        let config = CredibilityConfig::default();
        let estimates: Vec<PairedEstimate> = (15..=90)
            .map(|age| {
                let x = age as f64 - 15.0;
                let reference = 0.1 + 0.01 * x - 0.0001 * x * x;
                PairedEstimate {
                    age,
                    group_value: Some(reference + 0.03),
                    group_n: 400.0,
                    reference_value: reference,
                    reference_n: 50_000.0,
                }
            })
            .collect();

        let first = smooth_series(&estimates, ParameterKind::Probability, &config).unwrap();
        let again = smooth_series(&first.as_group_estimates(&estimates), ParameterKind::Probability, &config).unwrap();

        for (a, b) in first.points().iter().zip(again.points()) {
            assert_abs_diff_eq!(a.value, b.value, epsilon = 2e-3);
        }
    }

    #[test]
    fn test_dispersion_is_floored() {
        let config = CredibilityConfig::default();
        let estimates: Vec<PairedEstimate> = (30..=40)
            .map(|age| PairedEstimate {
                age,
                group_value: Some(0.0),
                group_n: 100.0,
                reference_value: 0.0,
                reference_n: 1_000.0,
            })
            .collect();

        let curve = smooth_series(&estimates, ParameterKind::Dispersion, &config).unwrap();
        assert!(curve.points().iter().all(|p| p.value >= config.sd_floor));
    }

    #[test]
    fn test_duplicate_ages_rejected() {
        let estimate = PairedEstimate {
            age: 40,
            group_value: Some(0.5),
            group_n: 100.0,
            reference_value: 0.4,
            reference_n: 1_000.0,
        };
        let estimates = [
            estimate,
            PairedEstimate { age: 41, ..estimate },
            PairedEstimate { group_value: Some(0.9), ..estimate },
        ];
        let err = smooth_series(&estimates, ParameterKind::Probability, &CredibilityConfig::default()).unwrap_err();
        assert!(matches!(err, HeritorError::Parse(_)));

        let point = SmoothedPoint {
            age: 40,
            value: 0.5,
            raw_group: None,
            raw_reference: 0.5,
            delta: 0.0,
            z: 0.0,
            n: 0.0,
        };
        assert!(SmoothedCurve::from_points(vec![point, SmoothedPoint { age: 41, ..point }]).is_ok());
        assert!(matches!(
            SmoothedCurve::from_points(vec![point, SmoothedPoint { value: 0.7, ..point }]),
            Err(HeritorError::Parse(_))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = CredibilityConfig {
            anchor_weight: 1.5,
            ..Default::default()
        };
        assert!(smooth_series(&[], ParameterKind::Mean, &config).is_err());
    }
}
