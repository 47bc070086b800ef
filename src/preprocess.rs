//! Pre-fit checks on the outcome and the design columns.

use faer::Mat;

use crate::input::Arm;
use crate::models::specification::ConfigurationError;
use crate::utils::{count_to_f64, usize_to_f64};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutcomeDiagnostics {
    pub n_rows: usize,
    pub n_zero: usize,
    pub n_positive: usize,
    pub zero_share: f64,
    pub positive_share: f64,
    /// Mean of the positive outcomes, `NaN` if there are none.
    pub mean_positive: f64,
    pub max_outcome: u64,
    /// Records per arm, indexed by [`Arm::index`].
    pub arm_rows: [usize; 2],
    /// Zero outcomes per arm, indexed by [`Arm::index`].
    pub arm_zeros: [usize; 2],
}

impl OutcomeDiagnostics {
    /// Fail fast when the data set cannot support a hurdle fit.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::DegenerateOutcome` without zeros or
    /// without positive outcomes, and `ConfigurationError::EmptyArm` if an
    /// intervention arm has no records.
    pub const fn check_hurdle_ready(&self) -> Result<(), ConfigurationError> {
        if self.n_zero == 0 || self.n_positive == 0 {
            return Err(ConfigurationError::DegenerateOutcome {
                zeros: self.n_zero,
                positives: self.n_positive,
            });
        }
        if self.arm_rows[0] == 0 || self.arm_rows[1] == 0 {
            return Err(ConfigurationError::EmptyArm {
                control: self.arm_rows[0],
                treated: self.arm_rows[1],
            });
        }
        Ok(())
    }
}

/// Zero/positive composition of the outcome, overall and per arm.
///
/// `arms` must have the same length as `outcome`; extra entries are ignored.
#[must_use]
pub fn outcome_diagnostics(outcome: &[u64], arms: &[Arm]) -> OutcomeDiagnostics {
    let n_rows = outcome.len();
    let mut n_zero = 0usize;
    let mut positive_total = 0.0;
    let mut max_outcome = 0u64;
    let mut arm_rows = [0usize; 2];
    let mut arm_zeros = [0usize; 2];

    for (&value, arm) in outcome.iter().zip(arms) {
        arm_rows[arm.index()] += 1;
        if value == 0 {
            n_zero += 1;
            arm_zeros[arm.index()] += 1;
        } else {
            positive_total += count_to_f64(value);
        }
        max_outcome = max_outcome.max(value);
    }

    let n_positive = n_rows - n_zero;
    let share = |count: usize| {
        if n_rows > 0 {
            usize_to_f64(count) / usize_to_f64(n_rows)
        } else {
            0.0
        }
    };
    let mean_positive = if n_positive > 0 {
        positive_total / usize_to_f64(n_positive)
    } else {
        f64::NAN
    };

    OutcomeDiagnostics {
        n_rows,
        n_zero,
        n_positive,
        zero_share: share(n_zero),
        positive_share: share(n_positive),
        mean_positive,
        max_outcome,
        arm_rows,
        arm_zeros,
    }
}

#[must_use]
pub fn column_has_variation(x: &Mat<f64>, column: usize, tolerance: f64) -> bool {
    if column >= x.ncols() || x.nrows() < 2 {
        return false;
    }
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for row in 0..x.nrows() {
        let value = x[(row, column)];
        min = min.min(value);
        max = max.max(value);
    }
    (max - min).abs() > tolerance.abs()
}

/// Indices of constant columns of `x`, skipping the intercept in column 0.
#[must_use]
pub fn constant_columns(x: &Mat<f64>, tolerance: f64) -> Vec<usize> {
    (1..x.ncols())
        .filter(|&col| !column_has_variation(x, col, tolerance))
        .collect()
}
