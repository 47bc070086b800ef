/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Hurdle model for count outcomes with excess zeros.
//
// Created on: 19 Oct 2026
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Hurdle model
//!
//! Implements a two-part model for count outcomes with many zeros:
//! - Part 1: logistic regression for any positive outcome (> 0).
//! - Part 2: zero-truncated Poisson, negative binomial, or geometric
//!   regression with log link for positive outcomes.
//!
//! The parameters of the two parts are disjoint, so maximising the combined
//! log-likelihood is the same as maximising each part on its own. Both parts
//! are fitted by Newton-type IRLS under a shared iteration cap; the negative
//! binomial dispersion is updated between coefficient steps.

use faer::Mat;
use std::fmt;
use thiserror::Error;

use crate::input::HurdleDesigns;
use crate::models::count::{
    eta_derivatives, mean_from_eta, truncated_log_pmf, truncated_mean,
};
use crate::models::matrix_ops::{map_mat, select_rows, zip_mat};
use crate::models::specification::{ConfigurationError, CountFamily};
use crate::utils::{
    count_to_f64, matrix_is_finite, max_abs_diff, mean_column, weighted_least_squares,
};

const LOG_THETA_BOUND: f64 = 12.0;
const LOG_THETA_STEP: f64 = 1.0e-4;
const PROBABILITY_FLOOR: f64 = 1.0e-12;
const SEPARATION_TOLERANCE: f64 = 1.0e-6;

/// Tuning parameters for hurdle model fitting.
#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    /// Maximum number of IRLS iterations per part.
    pub max_iter: usize,
    /// Convergence tolerance on coefficient changes.
    pub tolerance: f64,
    /// Lower bound on IRLS weights.
    pub min_weight: f64,
    /// Maximum number of step halvings when an update lowers the likelihood.
    pub max_step_halvings: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iter: 1_000,
            tolerance: 1e-8,
            min_weight: 1e-10,
            max_step_halvings: 30,
        }
    }
}

impl FitOptions {
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the iteration cap or tolerance is invalid.
    pub fn validate(self) -> Result<(), ConfigurationError> {
        if self.max_iter == 0 {
            return Err(ConfigurationError::InvalidIterationCap);
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ConfigurationError::InvalidTolerance(self.tolerance));
        }
        Ok(())
    }
}

/// Sub-model of the hurdle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModelPart {
    Zero,
    Count,
}

impl fmt::Display for ModelPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zero => f.write_str("zero"),
            Self::Count => f.write_str("count"),
        }
    }
}

/// Errors returned by hurdle model fitting.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitError {
    #[error("design matrix rows ({rows}) must match outcome length ({len})")]
    DimensionMismatch { rows: usize, len: usize },
    #[error(
        "sample must contain both zero and positive outcomes (zeros: {zeros}, positives: {positives})"
    )]
    MissingOutcomeClass { zeros: usize, positives: usize },
    #[error("{part} part failed to converge within {iterations} iterations")]
    NonConvergence { part: ModelPart, iterations: usize },
    #[error("zero part is separated: fitted probabilities reproduce every zero/positive label")]
    Separation,
    #[error("linear solve failed")]
    SolveFailed,
    #[error("{part} part produced non-finite estimates")]
    NonFiniteEstimate { part: ModelPart },
}

impl FitError {
    /// Short label used when tallying failures.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::MissingOutcomeClass { .. } => "missing_outcome_class",
            Self::NonConvergence { .. } => "non_convergence",
            Self::Separation => "separation",
            Self::SolveFailed => "solve_failed",
            Self::NonFiniteEstimate { .. } => "non_finite_estimate",
        }
    }
}

/// Hurdle model coefficients for both parts.
#[derive(Debug, Clone)]
pub struct HurdleModel {
    pub family: CountFamily,
    /// Logistic regression coefficients for Pr(y > 0).
    pub beta_zero: Mat<f64>,
    /// Log-link coefficients for the untruncated count mean.
    pub beta_count: Mat<f64>,
    /// NB2 size parameter; `None` for Poisson, `1` for geometric.
    pub theta: Option<f64>,
}

/// Per-record hurdle predictions.
#[derive(Debug, Clone)]
pub struct HurdlePrediction {
    /// Predicted probability of any positive outcome.
    pub prob_positive: Mat<f64>,
    /// Predicted mean of positive outcomes, `E[y | y > 0]`.
    pub mean_positive: Mat<f64>,
    /// Predicted expected outcome (probability * `mean_positive`).
    pub expected_outcome: Mat<f64>,
}

/// Fit diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct HurdleReport {
    /// Iterations used by the logistic part.
    pub iterations_zero: usize,
    /// Iterations used by the count part.
    pub iterations_count: usize,
    /// Combined log-likelihood at the estimates.
    pub log_likelihood: f64,
}

/// Fit a hurdle model on prepared designs.
///
/// # Errors
///
/// Returns `FitError` if the sample is degenerate or either part fails to converge.
pub fn fit_hurdle_designs(
    designs: &HurdleDesigns,
    family: CountFamily,
    options: FitOptions,
) -> Result<(HurdleModel, HurdleReport), FitError> {
    fit_hurdle(
        &designs.zero.observed,
        &designs.count.observed,
        &designs.outcome,
        family,
        options,
    )
}

/// Fit a hurdle model: logit on `x_zero` for `y > 0`, zero-truncated `family`
/// regression on `x_count` for the positive records.
///
/// # Errors
///
/// Returns `FitError` if the sample is degenerate or either part fails to converge.
///
/// # Examples
///
/// ```
/// use faer::Mat;
/// use hurdle_effect::{CountFamily, FitOptions, fit_hurdle};
///
/// fn idx_to_f64(idx: usize) -> f64 {
///     f64::from(u32::try_from(idx).unwrap_or(u32::MAX))
/// }
///
/// let n = 30;
/// let x = Mat::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { idx_to_f64(i % 5) / 5.0 });
/// let y: Vec<u64> = (0..n as u64).map(|i| if i % 3 == 0 { 0 } else { 1 + i % 4 }).collect();
///
/// let (model, report) = fit_hurdle(&x, &x, &y, CountFamily::Poisson, FitOptions::default()).expect("fit");
/// assert!(report.iterations_zero > 0);
/// assert_eq!(model.beta_count.nrows(), 2);
/// ```
pub fn fit_hurdle(
    x_zero: &Mat<f64>,
    x_count: &Mat<f64>,
    y: &[u64],
    family: CountFamily,
    options: FitOptions,
) -> Result<(HurdleModel, HurdleReport), FitError> {
    for x in [x_zero, x_count] {
        if x.nrows() != y.len() {
            return Err(FitError::DimensionMismatch {
                rows: x.nrows(),
                len: y.len(),
            });
        }
    }

    let positive_indices: Vec<usize> = (0..y.len()).filter(|&idx| y[idx] > 0).collect();
    let positives = positive_indices.len();
    let zeros = y.len() - positives;
    if zeros == 0 || positives == 0 {
        return Err(FitError::MissingOutcomeClass { zeros, positives });
    }

    let is_positive = Mat::from_fn(y.len(), 1, |i, _| if y[i] > 0 { 1.0 } else { 0.0 });
    let (beta_zero, iterations_zero) = fit_logit(x_zero, &is_positive, options)?;

    let x_pos = select_rows(x_count, &positive_indices);
    let y_pos = positive_indices.iter().map(|&idx| y[idx]).collect::<Vec<_>>();
    let count_fit = fit_truncated_count(&x_pos, &y_pos, family, options)?;

    let model = HurdleModel {
        family,
        beta_zero,
        beta_count: count_fit.beta,
        theta: count_fit.theta,
    };
    let log_likelihood = log_likelihood(&model, x_zero, x_count, y);
    if !log_likelihood.is_finite() {
        return Err(FitError::NonFiniteEstimate {
            part: ModelPart::Count,
        });
    }

    Ok((
        model,
        HurdleReport {
            iterations_zero,
            iterations_count: count_fit.iterations,
            log_likelihood,
        },
    ))
}

impl HurdleModel {
    /// Predict probability, positive mean, and expected outcome.
    #[must_use]
    pub fn predict(&self, x_zero: &Mat<f64>, x_count: &Mat<f64>) -> HurdlePrediction {
        let eta_zero = x_zero * &self.beta_zero;
        let prob_positive = map_mat(&eta_zero, logistic);
        let eta_count = x_count * &self.beta_count;
        let theta = self.theta;
        let mean_positive = map_mat(&eta_count, |eta| {
            truncated_mean(mean_from_eta(eta), theta)
        });
        let expected_outcome = zip_mat(&prob_positive, &mean_positive, |p, m| p * m);

        HurdlePrediction {
            prob_positive,
            mean_positive,
            expected_outcome,
        }
    }
}

/// Combined hurdle log-likelihood of `y` under `model`.
///
/// Returns `NaN` on shape mismatch.
#[must_use]
pub fn log_likelihood(model: &HurdleModel, x_zero: &Mat<f64>, x_count: &Mat<f64>, y: &[u64]) -> f64 {
    if x_zero.nrows() != y.len() || x_count.nrows() != y.len() {
        return f64::NAN;
    }
    if x_zero.ncols() != model.beta_zero.nrows() || x_count.ncols() != model.beta_count.nrows() {
        return f64::NAN;
    }

    let eta_zero = x_zero * &model.beta_zero;
    let eta_count = x_count * &model.beta_count;
    let mut loglik = 0.0;
    for (i, &yi) in y.iter().enumerate() {
        let p = logistic(eta_zero[(i, 0)]).clamp(PROBABILITY_FLOOR, 1.0 - PROBABILITY_FLOOR);
        if yi > 0 {
            loglik += p.ln() + truncated_log_pmf(yi, mean_from_eta(eta_count[(i, 0)]), model.theta);
        } else {
            loglik += (-p).ln_1p();
        }
    }
    loglik
}

fn fit_logit(
    x: &Mat<f64>,
    y: &Mat<f64>,
    options: FitOptions,
) -> Result<(Mat<f64>, usize), FitError> {
    let mut beta = Mat::<f64>::zeros(x.ncols(), 1);

    for iteration in 0..options.max_iter {
        let eta = x * &beta;
        let p = map_mat(&eta, logistic);
        if perfectly_classified(&p, y) {
            return Err(FitError::Separation);
        }
        let weights = Mat::from_fn(p.nrows(), 1, |i, _| {
            (p[(i, 0)] * (1.0 - p[(i, 0)])).max(options.min_weight)
        });

        let z = Mat::from_fn(eta.nrows(), 1, |i, _| {
            eta[(i, 0)] + (y[(i, 0)] - p[(i, 0)]) / weights[(i, 0)]
        });

        let beta_next = weighted_least_squares(x, &weights, &z)?;
        if !matrix_is_finite(&beta_next) {
            return Err(FitError::NonFiniteEstimate {
                part: ModelPart::Zero,
            });
        }

        if max_abs_diff(&beta_next, &beta) < options.tolerance {
            let p = map_mat(&(x * &beta_next), logistic);
            if perfectly_classified(&p, y) {
                return Err(FitError::Separation);
            }
            return Ok((beta_next, iteration + 1));
        }
        beta = beta_next;
    }

    Err(FitError::NonConvergence {
        part: ModelPart::Zero,
        iterations: options.max_iter,
    })
}

/// Fitted probabilities reproduce every 0/1 label, i.e. the zero-part
/// log-likelihood has reached 0 and the coefficients are running off to
/// infinity.
fn perfectly_classified(p: &Mat<f64>, y: &Mat<f64>) -> bool {
    (0..p.nrows()).all(|i| (y[(i, 0)] - p[(i, 0)]).abs() < SEPARATION_TOLERANCE)
}

struct CountFit {
    beta: Mat<f64>,
    theta: Option<f64>,
    iterations: usize,
}

fn fit_truncated_count(
    x: &Mat<f64>,
    y: &[u64],
    family: CountFamily,
    options: FitOptions,
) -> Result<CountFit, FitError> {
    let mut beta = Mat::<f64>::zeros(x.ncols(), 1);
    if x.ncols() > 0 {
        let y_mat = Mat::from_fn(y.len(), 1, |i, _| count_to_f64(y[i]));
        let mean = mean_column(&y_mat);
        if mean > 0.0 {
            beta[(0, 0)] = mean.ln();
        }
    }
    let estimate_theta = family == CountFamily::NegativeBinomial;
    let mut log_theta = 0.0;
    let theta_of = |log_theta: f64| family.theta(log_theta.exp());

    let mut current = count_log_likelihood(x, y, &beta, theta_of(log_theta));
    for iteration in 0..options.max_iter {
        let theta = theta_of(log_theta);
        let eta = x * &beta;
        let mut weights = Mat::<f64>::zeros(y.len(), 1);
        let mut z = Mat::<f64>::zeros(y.len(), 1);
        for i in 0..y.len() {
            let (score, curvature) = eta_derivatives(y[i], mean_from_eta(eta[(i, 0)]), theta);
            let weight = (-curvature).max(options.min_weight);
            weights[(i, 0)] = weight;
            z[(i, 0)] = eta[(i, 0)] + score / weight;
        }

        let proposal = weighted_least_squares(x, &weights, &z)?;
        let (beta_next, loglik_next) =
            halve_until_improved(x, y, &beta, proposal, theta, current, options);
        if !matrix_is_finite(&beta_next) {
            return Err(FitError::NonFiniteEstimate {
                part: ModelPart::Count,
            });
        }

        let mut change = max_abs_diff(&beta_next, &beta);
        beta = beta_next;
        current = loglik_next;

        if estimate_theta {
            let next_log_theta = update_log_theta(x, y, &beta, log_theta, options);
            change = change.max((next_log_theta - log_theta).abs());
            log_theta = next_log_theta;
            current = count_log_likelihood(x, y, &beta, theta_of(log_theta));
        }

        if change < options.tolerance {
            return Ok(CountFit {
                beta,
                theta: theta_of(log_theta),
                iterations: iteration + 1,
            });
        }
    }

    Err(FitError::NonConvergence {
        part: ModelPart::Count,
        iterations: options.max_iter,
    })
}

fn halve_until_improved(
    x: &Mat<f64>,
    y: &[u64],
    beta: &Mat<f64>,
    proposal: Mat<f64>,
    theta: Option<f64>,
    current: f64,
    options: FitOptions,
) -> (Mat<f64>, f64) {
    let mut candidate = proposal;
    let mut loglik = count_log_likelihood(x, y, &candidate, theta);
    for _ in 0..options.max_step_halvings {
        if loglik.is_finite() && loglik >= current - options.tolerance.abs() * current.abs() {
            break;
        }
        candidate = zip_mat(beta, &candidate, |old, new| 0.5 * (old + new));
        loglik = count_log_likelihood(x, y, &candidate, theta);
    }
    (candidate, loglik)
}

/// One safeguarded Newton step on `log(theta)` using central differences of
/// the profile log-likelihood.
fn update_log_theta(
    x: &Mat<f64>,
    y: &[u64],
    beta: &Mat<f64>,
    log_theta: f64,
    options: FitOptions,
) -> f64 {
    let profile = |value: f64| count_log_likelihood(x, y, beta, Some(value.exp()));
    let h = LOG_THETA_STEP;
    let center = profile(log_theta);
    let up = profile(log_theta + h);
    let down = profile(log_theta - h);
    let gradient = (up - down) / (2.0 * h);
    let curvature = (2.0f64.mul_add(-center, up) + down) / (h * h);

    // ascend along the gradient when the profile is not locally concave
    let mut step = if curvature < 0.0 {
        -gradient / curvature
    } else {
        gradient.signum()
    };
    step = step.clamp(-1.0, 1.0);

    for _ in 0..options.max_step_halvings {
        let candidate = (log_theta + step).clamp(-LOG_THETA_BOUND, LOG_THETA_BOUND);
        let value = profile(candidate);
        if value.is_finite() && value >= center {
            return candidate;
        }
        step *= 0.5;
    }
    log_theta
}

fn count_log_likelihood(x: &Mat<f64>, y: &[u64], beta: &Mat<f64>, theta: Option<f64>) -> f64 {
    let eta = x * beta;
    y.iter()
        .enumerate()
        .map(|(i, &yi)| truncated_log_pmf(yi, mean_from_eta(eta[(i, 0)]), theta))
        .sum()
}

fn logistic(value: f64) -> f64 {
    if value >= 0.0 {
        1.0 / (1.0 + (-value).exp())
    } else {
        let z = value.exp();
        z / (1.0 + z)
    }
}
