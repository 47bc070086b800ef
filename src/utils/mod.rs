/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Shared linear algebra and numeric helpers for hurdle model fitting.
//
// Created on: 19 Oct 2026
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Utilities
//!
//! Shared helpers for solving weighted least-squares systems, summarising
//! samples, and working with faer matrices.

use faer::Mat;
use faer::prelude::Solve;
use num_traits::ToPrimitive;

use crate::models::hurdle::FitError;

/// Lossy `usize` to `f64` conversion that saturates at `u32::MAX`.
#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    f64::from(u32::try_from(value).unwrap_or(u32::MAX))
}

/// `u64` count as `f64`, exact up to 2^53 and rounded to nearest above.
#[must_use]
pub fn count_to_f64(value: u64) -> f64 {
    value.to_f64().unwrap_or(f64::INFINITY)
}

#[must_use]
pub fn max_abs_diff(a: &Mat<f64>, b: &Mat<f64>) -> f64 {
    let mut max = 0.0;
    for i in 0..a.nrows() {
        let diff = (a[(i, 0)] - b[(i, 0)]).abs();
        if diff > max {
            max = diff;
        }
    }
    max
}

/// # Errors
///
/// Returns `FitError::SolveFailed` if the solve produces non-finite values.
pub fn solve_linear_system(a: &Mat<f64>, b: &Mat<f64>) -> Result<Mat<f64>, FitError> {
    let rhs = b.clone();
    let lu = a.full_piv_lu();
    let solution = lu.solve(rhs);
    if !matrix_is_finite(&solution) {
        return Err(FitError::SolveFailed);
    }
    Ok(solution)
}

/// Solve the weighted normal equations `X'WX b = X'Wz`.
///
/// # Errors
///
/// Returns `FitError::SolveFailed` if the system is singular.
pub fn weighted_least_squares(
    x: &Mat<f64>,
    weights: &Mat<f64>,
    z: &Mat<f64>,
) -> Result<Mat<f64>, FitError> {
    let xtwx = weighted_xtx(x, weights);
    let xtwz = weighted_xtz(x, weights, z);
    solve_linear_system(&xtwx, &xtwz)
}

#[must_use]
pub fn weighted_xtx(x: &Mat<f64>, weights: &Mat<f64>) -> Mat<f64> {
    let n = x.nrows();
    let p = x.ncols();
    let mut xtx = Mat::<f64>::zeros(p, p);
    for i in 0..n {
        let w = weights[(i, 0)];
        for col_i in 0..p {
            let wxi = w * x[(i, col_i)];
            for col_j in 0..p {
                xtx[(col_i, col_j)] += wxi * x[(i, col_j)];
            }
        }
    }
    xtx
}

#[must_use]
pub fn weighted_xtz(x: &Mat<f64>, weights: &Mat<f64>, z: &Mat<f64>) -> Mat<f64> {
    let n = x.nrows();
    let p = x.ncols();
    let mut xtz = Mat::<f64>::zeros(p, 1);
    for i in 0..n {
        let wz = weights[(i, 0)] * z[(i, 0)];
        for col in 0..p {
            xtz[(col, 0)] += x[(i, col)] * wz;
        }
    }
    xtz
}

#[must_use]
pub fn mean_column(vector: &Mat<f64>) -> f64 {
    let mut sum = 0.0;
    for i in 0..vector.nrows() {
        sum += vector[(i, 0)];
    }
    sum / usize_to_f64(vector.nrows())
}

/// Arithmetic mean of a slice, `NaN` when empty.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / usize_to_f64(values.len())
}

/// Sample standard deviation (n - 1 denominator), `0` for fewer than two values.
#[must_use]
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let center = mean(values);
    let sum_sq = values
        .iter()
        .map(|value| (value - center) * (value - center))
        .sum::<f64>();
    (sum_sq / (usize_to_f64(values.len()) - 1.0)).max(0.0).sqrt()
}

#[must_use]
pub fn matrix_is_finite(matrix: &Mat<f64>) -> bool {
    for i in 0..matrix.nrows() {
        for j in 0..matrix.ncols() {
            if !matrix[(i, j)].is_finite() {
                return false;
            }
        }
    }
    true
}
