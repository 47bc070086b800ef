//! # Interval and p-value inference
//!
//! Turns the original-sample effect and its bootstrap distribution into a
//! point estimate, a percentile or BCa confidence interval, and a two-sided
//! p-value on the log scale.
//!
//! Quantiles interpolate linearly between order statistics. BCa follows
//! Efron (1987): the bias correction `z0` uses mid-rank ties and the
//! acceleration comes from leave-one-out refits on the original sample.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use num_traits::ToPrimitive;
use statrs::distribution::{ContinuousCDF, Normal};
use thiserror::Error;

use crate::bootstrap::{BootstrapDistribution, Jackknife};
use crate::models::specification::ConfigurationError;
use crate::utils::{mean, sample_std, usize_to_f64};

const PROB_EPS: f64 = 1e-12;
const MIN_JACKKNIFE: usize = 3;

/// Confidence-interval construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntervalMethod {
    /// Empirical `(alpha/2, 1 - alpha/2)` quantiles of the bootstrap distribution.
    #[default]
    Percentile,
    /// Bias-corrected and accelerated percentile interval.
    Bca,
}

impl IntervalMethod {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Percentile => "percentile",
            Self::Bca => "bca",
        }
    }
}

impl fmt::Display for IntervalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IntervalMethod {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "percentile" | "perc" => Ok(Self::Percentile),
            "bca" => Ok(Self::Bca),
            _ => Err(ConfigurationError::UnsupportedIntervalMethod(
                value.to_owned(),
            )),
        }
    }
}

/// Inference configuration.
#[derive(Debug, Clone, Copy)]
pub struct InferenceOptions {
    /// Two-sided confidence level, strictly between 0 and 1.
    pub confidence_level: f64,
    pub method: IntervalMethod,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            confidence_level: 0.95,
            method: IntervalMethod::Percentile,
        }
    }
}

impl InferenceOptions {
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidConfidenceLevel` outside `(0, 1)`.
    pub fn validate(self) -> Result<(), ConfigurationError> {
        let level = self.confidence_level;
        if !(level.is_finite() && level > 0.0 && level < 1.0) {
            return Err(ConfigurationError::InvalidConfidenceLevel(level));
        }
        Ok(())
    }
}

/// Errors raised while summarising a bootstrap distribution.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InferenceError {
    #[error(
        "only {successful} bootstrap replicates succeeded, at least {required} are needed for the requested interval"
    )]
    DegenerateDistribution { successful: usize, required: usize },
    #[error("BCa needs at least {required} successful jackknife estimates, got {available}")]
    InsufficientJackknife { available: usize, required: usize },
    #[error("effect estimate must be positive for log-scale inference, got {0}")]
    NonPositiveEstimate(f64),
    #[error("{0} is not finite")]
    NonFiniteValue(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    #[must_use]
    pub fn contains(self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// BCa diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BcaDiagnostics {
    /// Bias-correction constant.
    pub z0: f64,
    /// Acceleration constant.
    pub acceleration: f64,
    /// BCa-adjusted lower quantile level.
    pub alpha_lower: f64,
    /// BCa-adjusted upper quantile level.
    pub alpha_upper: f64,
    /// Successful jackknife estimates used for the acceleration.
    pub jackknife_estimates: usize,
    pub jackknife_failures: usize,
}

/// Final result of the analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResult {
    /// Effect ratio on the original sample.
    pub estimate: f64,
    /// Average predicted outcome with every record in the control arm.
    pub gamma_control: f64,
    /// Average predicted outcome with every record in the treated arm.
    pub gamma_treated: f64,
    pub interval: ConfidenceInterval,
    /// Approximate two-sided p-value for no effect, see [`log_scale_p_value`].
    pub p_value: f64,
    pub method: IntervalMethod,
    pub confidence_level: f64,
    pub replicates_requested: usize,
    pub failed_replicates: usize,
    /// Failed replicates by failure kind.
    pub failure_tally: BTreeMap<&'static str, usize>,
    /// Mean bootstrap estimate minus the original estimate.
    pub bias: f64,
    /// Standard deviation of the bootstrap estimates.
    pub std_error: f64,
    pub bca: Option<BcaDiagnostics>,
}

impl InferenceResult {
    #[must_use]
    pub const fn successful_replicates(&self) -> usize {
        self.replicates_requested - self.failed_replicates
    }

    /// Share of requested replicates that failed.
    #[must_use]
    pub fn failure_share(&self) -> f64 {
        if self.replicates_requested == 0 {
            return 0.0;
        }
        usize_to_f64(self.failed_replicates) / usize_to_f64(self.replicates_requested)
    }
}

/// Fewest successful replicates for which both interval tails are populated.
#[must_use]
pub fn minimum_replicates(confidence_level: f64) -> usize {
    let alpha = 1.0 - confidence_level;
    // absorb rounding in `1 - level` so that 0.9 gives 20, not 21
    let tails = (2.0 / alpha - 1e-9).ceil().to_usize().unwrap_or(usize::MAX);
    tails.max(2)
}

/// Quantile of sorted data by linear interpolation; `NaN` when empty.
#[must_use]
pub fn quantile_linear_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let position = q.clamp(0.0, 1.0) * usize_to_f64(sorted.len() - 1);
    let lower = position.floor().to_usize().unwrap_or(0);
    let upper = position.ceil().to_usize().unwrap_or(0).min(sorted.len() - 1);
    let weight = position - usize_to_f64(lower);
    (1.0 - weight).mul_add(sorted[lower], weight * sorted[upper])
}

/// Percentile interval at `confidence_level`.
#[must_use]
pub fn percentile_interval(estimates: &[f64], confidence_level: f64) -> ConfidenceInterval {
    let tail = (1.0 - confidence_level) / 2.0;
    let mut sorted = estimates.to_vec();
    sorted.sort_by(f64::total_cmp);
    ConfidenceInterval {
        lower: quantile_linear_sorted(&sorted, tail),
        upper: quantile_linear_sorted(&sorted, 1.0 - tail),
    }
}

fn normal_cdf(z: f64) -> f64 {
    Normal::new(0.0, 1.0).map_or(f64::NAN, |normal| normal.cdf(z))
}

fn normal_quantile(p: f64) -> f64 {
    Normal::new(0.0, 1.0).map_or(f64::NAN, |normal| {
        normal.inverse_cdf(p.clamp(PROB_EPS, 1.0 - PROB_EPS))
    })
}

/// BCa bias correction `z0 = Phi^-1(share of estimates below the original)`,
/// counting ties as half.
#[must_use]
pub fn bias_correction(original: f64, estimates: &[f64]) -> f64 {
    let below = estimates.iter().filter(|&&value| value < original).count();
    let ties = estimates.iter().filter(|&&value| value == original).count();
    let share = 0.5f64.mul_add(usize_to_f64(ties), usize_to_f64(below))
        / usize_to_f64(estimates.len());
    normal_quantile(share)
}

/// Jackknife acceleration `sum(d^3) / (6 * sum(d^2)^1.5)` with `d = mean - value`.
///
/// Returns 0 when the leave-one-out estimates do not vary.
#[must_use]
pub fn acceleration(jackknife: &[f64]) -> f64 {
    let center = mean(jackknife);
    let (sum_sq, sum_cube) = jackknife.iter().fold((0.0, 0.0), |(sq, cube), value| {
        let d = center - value;
        (d.mul_add(d, sq), (d * d).mul_add(d, cube))
    });
    if !(sum_sq.is_finite() && sum_sq > 0.0) {
        return 0.0;
    }
    sum_cube / (6.0 * sum_sq.powf(1.5))
}

/// Quantile level that BCa uses in place of `alpha`.
///
/// The map is increasing in `alpha` up to the pole at
/// `acceleration * (z0 + z_alpha) = 1`; at or past the pole the level is
/// clipped to the extreme on the side of `z0 + z_alpha`, so adjusted levels
/// keep the order of their nominal levels.
#[must_use]
pub fn bca_adjusted_alpha(alpha: f64, z0: f64, acceleration: f64) -> f64 {
    let shifted = z0 + normal_quantile(alpha);
    let denom = acceleration.mul_add(-shifted, 1.0);
    if denom.is_nan() || denom < PROB_EPS {
        return if shifted >= 0.0 {
            1.0 - PROB_EPS
        } else {
            PROB_EPS
        };
    }
    normal_cdf(z0 + shifted / denom).clamp(PROB_EPS, 1.0 - PROB_EPS)
}

/// BCa interval from the bootstrap estimates and leave-one-out estimates.
///
/// # Errors
///
/// Returns `InferenceError::InsufficientJackknife` with fewer than three
/// jackknife estimates.
pub fn bca_interval(
    original: f64,
    estimates: &[f64],
    jackknife: &Jackknife,
    confidence_level: f64,
) -> Result<(ConfidenceInterval, BcaDiagnostics), InferenceError> {
    if jackknife.estimates.len() < MIN_JACKKNIFE {
        return Err(InferenceError::InsufficientJackknife {
            available: jackknife.estimates.len(),
            required: MIN_JACKKNIFE,
        });
    }
    let z0 = bias_correction(original, estimates);
    if !z0.is_finite() {
        return Err(InferenceError::NonFiniteValue("bias correction"));
    }
    let acceleration = acceleration(&jackknife.estimates);
    if !acceleration.is_finite() {
        return Err(InferenceError::NonFiniteValue("acceleration"));
    }

    let tail = (1.0 - confidence_level) / 2.0;
    let alpha_lower = bca_adjusted_alpha(tail, z0, acceleration);
    let alpha_upper = bca_adjusted_alpha(1.0 - tail, z0, acceleration);

    let mut sorted = estimates.to_vec();
    sorted.sort_by(f64::total_cmp);
    Ok((
        ConfidenceInterval {
            lower: quantile_linear_sorted(&sorted, alpha_lower),
            upper: quantile_linear_sorted(&sorted, alpha_upper),
        },
        BcaDiagnostics {
            z0,
            acceleration,
            alpha_lower,
            alpha_upper,
            jackknife_estimates: jackknife.estimates.len(),
            jackknife_failures: jackknife.failures,
        },
    ))
}

/// Two-sided p-value for "no effect" on the log scale.
///
/// The log bootstrap estimates are centred on their own mean to mimic the
/// null distribution, and the p-value is the share of centred values whose
/// magnitude exceeds `|ln(original)|`. This is an approximate,
/// permutation-style p-value rather than an exact test.
///
/// # Errors
///
/// Returns `InferenceError::NonPositiveEstimate` if any estimate is not positive.
pub fn log_scale_p_value(original: f64, estimates: &[f64]) -> Result<f64, InferenceError> {
    let non_positive = |value: f64| value.is_nan() || value <= 0.0;
    if non_positive(original) {
        return Err(InferenceError::NonPositiveEstimate(original));
    }
    if let Some(&bad) = estimates.iter().find(|&&value| non_positive(value)) {
        return Err(InferenceError::NonPositiveEstimate(bad));
    }
    if estimates.is_empty() {
        return Err(InferenceError::DegenerateDistribution {
            successful: 0,
            required: 1,
        });
    }

    let logs = estimates.iter().map(|value| value.ln()).collect::<Vec<_>>();
    let center = mean(&logs);
    let observed = original.ln().abs();
    let exceed = logs
        .iter()
        .filter(|&&value| (value - center).abs() > observed)
        .count();
    Ok(usize_to_f64(exceed) / usize_to_f64(logs.len()))
}

/// Summarise a bootstrap distribution into the final inference result.
///
/// `jackknife` is required for [`IntervalMethod::Bca`] and ignored otherwise.
///
/// # Errors
///
/// Returns `InferenceError` if too few replicates succeeded, the estimates
/// are not positive, or BCa lacks jackknife estimates.
pub fn summarize(
    distribution: &BootstrapDistribution,
    jackknife: Option<&Jackknife>,
    options: InferenceOptions,
) -> Result<InferenceResult, InferenceError> {
    let estimates = distribution.estimates();
    let required = minimum_replicates(options.confidence_level);
    if estimates.len() < required {
        return Err(InferenceError::DegenerateDistribution {
            successful: estimates.len(),
            required,
        });
    }

    let original = distribution.original.ratio;
    let p_value = log_scale_p_value(original, &estimates)?;
    let (interval, bca) = match options.method {
        IntervalMethod::Percentile => (
            percentile_interval(&estimates, options.confidence_level),
            None,
        ),
        IntervalMethod::Bca => {
            let empty = Jackknife {
                estimates: Vec::new(),
                failures: 0,
            };
            let (interval, diagnostics) = bca_interval(
                original,
                &estimates,
                jackknife.unwrap_or(&empty),
                options.confidence_level,
            )?;
            (interval, Some(diagnostics))
        }
    };

    Ok(InferenceResult {
        estimate: original,
        gamma_control: distribution.original.gamma_control,
        gamma_treated: distribution.original.gamma_treated,
        interval,
        p_value,
        method: options.method,
        confidence_level: options.confidence_level,
        replicates_requested: distribution.requested(),
        failed_replicates: distribution.failures(),
        failure_tally: distribution.failure_tally(),
        bias: mean(&estimates) - original,
        std_error: sample_std(&estimates),
        bca,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::ReplicateOutcome;
    use crate::effect::{EffectError, EffectEstimate};
    use crate::models::hurdle::FitError;
    use approx::assert_relative_eq;

    fn distribution(original: f64, values: &[f64], failures: usize) -> BootstrapDistribution {
        let mut outcomes = values
            .iter()
            .map(|&value| ReplicateOutcome::Success(value))
            .collect::<Vec<_>>();
        outcomes.extend(
            (0..failures).map(|_| ReplicateOutcome::Failed(EffectError::Fit(FitError::SolveFailed))),
        );
        BootstrapDistribution {
            original: EffectEstimate {
                gamma_control: 2.0,
                gamma_treated: 2.0 * original,
                ratio: original,
            },
            outcomes,
        }
    }

    fn spread(n: usize, center: f64, width: f64) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let u = (usize_to_f64(i) + 0.5) / usize_to_f64(n);
                width.mul_add(u - 0.5, center)
            })
            .collect()
    }

    #[test]
    fn method_names_parse() {
        assert_eq!("BCa".parse::<IntervalMethod>(), Ok(IntervalMethod::Bca));
        assert_eq!("perc".parse::<IntervalMethod>(), Ok(IntervalMethod::Percentile));
        assert!(matches!(
            "studentized".parse::<IntervalMethod>(),
            Err(ConfigurationError::UnsupportedIntervalMethod(_))
        ));
    }

    #[test]
    fn options_reject_invalid_levels() {
        assert!(InferenceOptions::default().validate().is_ok());
        for level in [0.0, 1.0, -0.5, f64::NAN] {
            let options = InferenceOptions {
                confidence_level: level,
                ..InferenceOptions::default()
            };
            assert!(options.validate().is_err());
        }
    }

    #[test]
    fn quantiles_interpolate_between_order_statistics() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(quantile_linear_sorted(&sorted, 0.0), 1.0);
        assert_relative_eq!(quantile_linear_sorted(&sorted, 1.0), 5.0);
        assert_relative_eq!(quantile_linear_sorted(&sorted, 0.5), 3.0);
        assert_relative_eq!(quantile_linear_sorted(&sorted, 0.1), 1.4);
        assert_relative_eq!(quantile_linear_sorted(&[1.0, 3.0, 5.0], 0.25), 2.0);
        assert!(quantile_linear_sorted(&[], 0.5).is_nan());
    }

    #[test]
    fn minimum_replicates_covers_both_tails() {
        assert_eq!(minimum_replicates(0.95), 40);
        assert_eq!(minimum_replicates(0.9), 20);
        assert_eq!(minimum_replicates(0.01), 3);
    }

    #[test]
    fn percentile_interval_of_uniform_grid() {
        let values = (0..=100).map(f64::from).collect::<Vec<_>>();
        let interval = percentile_interval(&values, 0.9);
        assert_relative_eq!(interval.lower, 5.0, epsilon = 1e-12);
        assert_relative_eq!(interval.upper, 95.0, epsilon = 1e-12);
        assert!(interval.contains(50.0));
        assert!(!interval.contains(99.0));
    }

    #[test]
    fn bias_correction_is_zero_at_the_median() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(bias_correction(3.0, &values), 0.0, epsilon = 1e-12);
        assert!(bias_correction(4.5, &values) > 0.0);
    }

    #[test]
    fn acceleration_vanishes_for_symmetric_or_constant_jackknife() {
        assert_relative_eq!(acceleration(&[1.0, 2.0, 3.0]), 0.0, epsilon = 1e-15);
        assert_relative_eq!(acceleration(&[2.0, 2.0, 2.0]), 0.0);
        assert!(acceleration(&[1.0, 1.0, 1.0, 4.0]) < 0.0);
    }

    #[test]
    fn bca_reduces_to_percentile_without_bias_or_skew() {
        let values = spread(401, 1.5, 1.0);
        let jackknife = Jackknife {
            estimates: vec![1.4, 1.5, 1.6],
            failures: 0,
        };
        let (bca, diagnostics) = bca_interval(1.5, &values, &jackknife, 0.95).expect("bca");
        let percentile = percentile_interval(&values, 0.95);
        assert_relative_eq!(diagnostics.z0, 0.0, epsilon = 1e-12);
        assert_relative_eq!(diagnostics.alpha_lower, 0.025, epsilon = 1e-9);
        assert_relative_eq!(bca.lower, percentile.lower, epsilon = 1e-9);
        assert_relative_eq!(bca.upper, percentile.upper, epsilon = 1e-9);
    }

    #[test]
    fn bca_shifts_towards_bias() {
        let values = spread(400, 1.5, 1.0);
        let jackknife = Jackknife {
            estimates: vec![1.4, 1.5, 1.6],
            failures: 0,
        };
        let (bca, _) = bca_interval(1.7, &values, &jackknife, 0.9).expect("bca");
        let percentile = percentile_interval(&values, 0.9);
        assert!(bca.lower > percentile.lower);
        assert!(bca.upper > percentile.upper);
    }

    #[test]
    fn adjusted_alpha_past_the_pole_stays_on_its_side() {
        // a * (z0 + z_alpha) = 0.8 * 1.96 > 1
        assert_relative_eq!(bca_adjusted_alpha(0.975, 0.0, 0.8), 1.0 - PROB_EPS);
        let lower = bca_adjusted_alpha(0.025, 0.0, 0.8);
        assert!(lower > 0.025 && lower < 0.5, "lower = {lower}");
        assert_relative_eq!(bca_adjusted_alpha(0.025, 0.0, -0.8), PROB_EPS);
        let levels = [0.01, 0.1, 0.5, 0.9, 0.99].map(|alpha| bca_adjusted_alpha(alpha, 0.5, 0.3));
        assert!(levels.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn bca_keeps_bounds_ordered_under_extreme_bias_and_skew() {
        let values = (1..=200).map(|i| f64::from(i) / 100.0).collect::<Vec<_>>();
        let mut leave_one_out = vec![1.0; 20];
        leave_one_out.push(0.0);
        let jackknife = Jackknife {
            estimates: leave_one_out,
            failures: 0,
        };
        let (interval, diagnostics) =
            bca_interval(10.0, &values, &jackknife, 0.95).expect("bca");
        assert!(diagnostics.acceleration > 0.1);
        assert!(diagnostics.alpha_lower <= diagnostics.alpha_upper);
        assert_relative_eq!(diagnostics.alpha_upper, 1.0 - PROB_EPS);
        assert!(interval.lower <= interval.upper);
        assert_relative_eq!(interval.upper, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn bca_requires_jackknife_estimates() {
        let values = spread(100, 1.0, 0.5);
        let jackknife = Jackknife {
            estimates: vec![1.0],
            failures: 4,
        };
        assert_eq!(
            bca_interval(1.0, &values, &jackknife, 0.95).expect_err("too few"),
            InferenceError::InsufficientJackknife {
                available: 1,
                required: 3
            }
        );
    }

    #[test]
    fn p_value_is_small_far_from_one_and_large_near_one() {
        let values = spread(200, 2.0, 0.4);
        let strong = log_scale_p_value(2.0, &values).expect("p");
        assert_relative_eq!(strong, 0.0);

        let near = spread(200, 1.01, 0.4);
        let weak = log_scale_p_value(1.01, &near).expect("p");
        assert!(weak > 0.8, "p = {weak}");
        assert!((0.0..=1.0).contains(&weak));
    }

    #[test]
    fn p_value_rejects_non_positive_estimates() {
        assert_eq!(
            log_scale_p_value(0.0, &[1.0]),
            Err(InferenceError::NonPositiveEstimate(0.0))
        );
        assert_eq!(
            log_scale_p_value(1.0, &[1.0, -2.0]),
            Err(InferenceError::NonPositiveEstimate(-2.0))
        );
    }

    #[test]
    fn summarize_reports_failures_and_uses_original_estimate() {
        let values = spread(100, 1.6, 0.6);
        let result = summarize(
            &distribution(1.5, &values, 7),
            None,
            InferenceOptions::default(),
        )
        .expect("summary");
        assert_relative_eq!(result.estimate, 1.5);
        assert_relative_eq!(result.gamma_treated / result.gamma_control, 1.5);
        assert_eq!(result.replicates_requested, 107);
        assert_eq!(result.failed_replicates, 7);
        assert_eq!(result.successful_replicates(), 100);
        assert_eq!(result.failure_tally.get("solve_failed"), Some(&7));
        assert_relative_eq!(result.bias, 0.1, epsilon = 1e-12);
        assert!(result.std_error > 0.0);
        assert!(result.interval.lower < result.interval.upper);
        assert!(result.bca.is_none());
    }

    #[test]
    fn summarize_fails_on_degenerate_distribution() {
        let values = spread(10, 1.6, 0.6);
        let err = summarize(
            &distribution(1.5, &values, 90),
            None,
            InferenceOptions::default(),
        )
        .expect_err("too few replicates");
        assert_eq!(
            err,
            InferenceError::DegenerateDistribution {
                successful: 10,
                required: 40
            }
        );
    }

    #[test]
    fn summarize_bca_requires_jackknife() {
        let values = spread(100, 1.6, 0.6);
        let options = InferenceOptions {
            method: IntervalMethod::Bca,
            ..InferenceOptions::default()
        };
        assert!(matches!(
            summarize(&distribution(1.5, &values, 0), None, options),
            Err(InferenceError::InsufficientJackknife { .. })
        ));

        let jackknife = Jackknife {
            estimates: vec![1.45, 1.5, 1.52, 1.55],
            failures: 1,
        };
        let result =
            summarize(&distribution(1.5, &values, 0), Some(&jackknife), options).expect("bca");
        let diagnostics = result.bca.expect("diagnostics");
        assert_eq!(diagnostics.jackknife_estimates, 4);
        assert_eq!(diagnostics.jackknife_failures, 1);
    }
}
