//! Zero-truncated count distributions for the positive hurdle part.
//!
//! All functions take the untruncated mean `mu` and an optional NB2 size
//! parameter `theta` (`Var = mu + mu^2 / theta`). `theta = None` is the
//! Poisson limit; the geometric family is `theta = Some(1.0)`.

use statrs::function::gamma::ln_gamma;

use crate::utils::count_to_f64;

const MIN_MEAN: f64 = 1.0e-10;
const MAX_LINEAR_PREDICTOR: f64 = 700.0;

/// Mean from the log-link linear predictor, bounded away from 0 and overflow.
#[must_use]
pub fn mean_from_eta(eta: f64) -> f64 {
    eta.clamp(-MAX_LINEAR_PREDICTOR, MAX_LINEAR_PREDICTOR)
        .exp()
        .max(MIN_MEAN)
}

/// `log P(Y = 0)` of the untruncated distribution.
#[must_use]
pub fn log_zero_probability(mu: f64, theta: Option<f64>) -> f64 {
    match theta {
        None => -mu,
        Some(theta) => -theta * (mu / theta).ln_1p(),
    }
}

/// `P(Y = 0) / P(Y > 0)` of the untruncated distribution.
fn zero_odds(mu: f64, theta: Option<f64>) -> f64 {
    1.0 / (-log_zero_probability(mu, theta)).exp_m1()
}

/// `log P(Y > 0)`.
fn log_positive_probability(mu: f64, theta: Option<f64>) -> f64 {
    (-log_zero_probability(mu, theta).exp_m1()).ln()
}

/// `E[Y | Y > 0] = mu / P(Y > 0)`.
#[must_use]
pub fn truncated_mean(mu: f64, theta: Option<f64>) -> f64 {
    mu / -log_zero_probability(mu, theta).exp_m1()
}

/// Log-probability of a positive count under the zero-truncated distribution.
///
/// Returns `-inf` for `y == 0`.
#[must_use]
pub fn truncated_log_pmf(y: u64, mu: f64, theta: Option<f64>) -> f64 {
    if y == 0 {
        return f64::NEG_INFINITY;
    }
    let yf = count_to_f64(y);
    let untruncated = match theta {
        None => yf.mul_add(mu.ln(), -mu) - ln_gamma(yf + 1.0),
        Some(theta) => {
            let denom = theta + mu;
            ln_gamma(yf + theta) - ln_gamma(theta) - ln_gamma(yf + 1.0)
                + theta * (theta / denom).ln()
                + yf * (mu / denom).ln()
        }
    };
    untruncated - log_positive_probability(mu, theta)
}

/// Score and curvature of the truncated log-likelihood with respect to
/// `eta = ln(mu)`, i.e. `(d ll / d eta, d^2 ll / d eta^2)` for one record.
#[must_use]
pub fn eta_derivatives(y: u64, mu: f64, theta: Option<f64>) -> (f64, f64) {
    let yf = count_to_f64(y);
    let odds = zero_odds(mu, theta);
    // untruncated score, its derivative, and -d log P(0) / d eta with its derivative
    let (score, score_slope, q, q_slope) = match theta {
        None => (yf - mu, -mu, mu, mu),
        Some(theta) => {
            let denom = theta + mu;
            let denom_sq = denom * denom;
            (
                theta * (yf - mu) / denom,
                -theta * mu * (theta + yf) / denom_sq,
                theta * mu / denom,
                theta * theta * mu / denom_sq,
            )
        }
    };
    let gradient = odds.mul_add(-q, score);
    let curvature = (odds * (1.0 + odds) * q).mul_add(q, odds.mul_add(-q_slope, score_slope));
    (gradient, curvature)
}
