//! # Synthetic hurdle data
//!
//! Draws data sets from a known hurdle model for validation studies: `Age`
//! uniform on `[20, 80)`, `Sex` equal to `"F"` or `"M"` with equal
//! probability, and a randomised intervention. Linear predictors use age
//! centred at 50:
//!
//! ```text
//! logit P(y > 0) = zero.intercept  + zero.intervention  * T + zero.age  * (Age - 50) + zero.sex_male  * M
//! log mu         = count.intercept + count.intervention * T + count.age * (Age - 50) + count.sex_male * M
//! ```
//!
//! Positive outcomes follow the zero-truncated family with untruncated mean `mu`.
//!
//! # Examples
//!
//! ```
//! use hurdle_effect::{SimulationOptions, simulate_hurdle};
//!
//! let options = SimulationOptions { n: 50, ..SimulationOptions::default() };
//! let dataset = simulate_hurdle(&options).expect("simulate");
//! assert_eq!(dataset.len(), 50);
//! ```

use num_traits::ToPrimitive;
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

use crate::input::{Arm, Dataset, InputError};
use crate::models::count::truncated_mean;
use crate::models::specification::CountFamily;
use crate::utils::count_to_f64;

const AGE_CENTER: f64 = 50.0;
const AGE_MIN: f64 = 20.0;
const AGE_MAX: f64 = 80.0;
const MAX_DRAWS: usize = 10_000;
const POISSON_INVERSION_LIMIT: f64 = 500.0;

/// Coefficients of one linear predictor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub intercept: f64,
    pub intervention: f64,
    /// Per year of age above 50.
    pub age: f64,
    pub sex_male: f64,
}

impl Coefficients {
    #[must_use]
    pub fn linear_predictor(&self, arm: Arm, age: f64, male: bool) -> f64 {
        let sex = if male { self.sex_male } else { 0.0 };
        self.age.mul_add(
            age - AGE_CENTER,
            self.intervention.mul_add(arm.indicator(), self.intercept),
        ) + sex
    }
}

/// Data-generating hurdle model and sample settings.
#[derive(Debug, Clone, Copy)]
pub struct SimulationOptions {
    pub n: usize,
    pub seed: u64,
    /// Probability that a record is assigned to the treated arm.
    pub treated_share: f64,
    pub family: CountFamily,
    /// NB2 size parameter, used by `CountFamily::NegativeBinomial` only.
    pub theta: f64,
    /// Logit of `P(y > 0)`.
    pub zero: Coefficients,
    /// Log of the untruncated count mean.
    pub count: Coefficients,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            n: 200,
            seed: 2026,
            treated_share: 0.5,
            family: CountFamily::Poisson,
            theta: 2.0,
            zero: Coefficients {
                intercept: 2.2,
                intervention: 0.0,
                age: 0.02,
                sex_male: 0.0,
            },
            count: Coefficients {
                intercept: 8.0_f64.ln(),
                intervention: 0.5,
                age: 0.01,
                sex_male: 0.2,
            },
        }
    }
}

impl SimulationOptions {
    /// Expected outcome `P(y > 0) * E[y | y > 0]` of one record.
    #[must_use]
    pub fn expected_outcome(&self, arm: Arm, age: f64, male: bool) -> f64 {
        let p = logistic(self.zero.linear_predictor(arm, age, male));
        let mu = self.count.linear_predictor(arm, age, male).exp();
        p * truncated_mean(mu, self.family.theta(self.theta))
    }
}

/// Draw one data set with columns `Age` (numeric) and `Sex` (categorical).
///
/// # Errors
///
/// Returns `InputError` if the generated data set is invalid, e.g. for `n == 0`.
pub fn simulate_hurdle(options: &SimulationOptions) -> Result<Dataset, InputError> {
    let mut rng = StdRng::seed_from_u64(options.seed);
    let theta = options.family.theta(options.theta);
    let mut outcome = Vec::with_capacity(options.n);
    let mut arms = Vec::with_capacity(options.n);
    let mut ages = Vec::with_capacity(options.n);
    let mut sexes = Vec::with_capacity(options.n);

    for _ in 0..options.n {
        let (age, male) = draw_covariates(&mut rng);
        let arm = if rng.random::<f64>() < options.treated_share {
            Arm::Treated
        } else {
            Arm::Control
        };
        let p = logistic(options.zero.linear_predictor(arm, age, male));
        let y = if rng.random::<f64>() < p {
            let mu = options.count.linear_predictor(arm, age, male).exp();
            sample_truncated_count(&mut rng, mu, theta)
        } else {
            0
        };
        outcome.push(y);
        arms.push(arm);
        ages.push(age);
        sexes.push(if male { "M" } else { "F" });
    }

    let dataset = Dataset::new(outcome, arms)
        .with_numeric("Age", ages)?
        .with_categorical("Sex", &sexes)?;
    dataset.validate()?;
    Ok(dataset)
}

/// Population effect `E[y | treated] / E[y | control]` over the covariate
/// distribution, by Monte Carlo over `draws` covariate vectors.
#[must_use]
pub fn population_effect(options: &SimulationOptions, draws: usize, seed: u64) -> f64 {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut control = 0.0;
    let mut treated = 0.0;
    for _ in 0..draws {
        let (age, male) = draw_covariates(&mut rng);
        control += options.expected_outcome(Arm::Control, age, male);
        treated += options.expected_outcome(Arm::Treated, age, male);
    }
    treated / control
}

fn draw_covariates(rng: &mut StdRng) -> (f64, bool) {
    let age = rng.random_range(AGE_MIN..AGE_MAX);
    let male = rng.random::<f64>() < 0.5;
    (age, male)
}

fn logistic(value: f64) -> f64 {
    1.0 / (1.0 + (-value).exp())
}

/// Positive draw from the zero-truncated family with untruncated mean `mu`.
fn sample_truncated_count(rng: &mut StdRng, mu: f64, theta: Option<f64>) -> u64 {
    match theta {
        None if mu < POISSON_INVERSION_LIMIT => {
            // inversion restricted to the positive part of the CDF
            let p0 = (-mu).exp();
            let u = rng.random::<f64>().mul_add(1.0 - p0, p0);
            let mut k = 0_u64;
            let mut pmf = p0;
            let mut cdf = p0;
            while cdf < u && k < 100_000 {
                k += 1;
                pmf *= mu / count_to_f64(k);
                cdf += pmf;
            }
            k.max(1)
        }
        None => sample_poisson(rng, mu).max(1),
        Some(theta) => {
            for _ in 0..MAX_DRAWS {
                let rate = sample_gamma(rng, theta, mu / theta);
                let y = sample_poisson(rng, rate);
                if y > 0 {
                    return y;
                }
            }
            1
        }
    }
}

fn sample_poisson(rng: &mut StdRng, rate: f64) -> u64 {
    if rate.is_nan() || rate <= 0.0 {
        return 0;
    }
    if rate >= POISSON_INVERSION_LIMIT {
        let draw = rate.sqrt().mul_add(sample_standard_normal(rng), rate).round();
        return draw.to_u64().unwrap_or(0);
    }
    let u = rng.random::<f64>();
    let mut k = 0_u64;
    let mut pmf = (-rate).exp();
    let mut cdf = pmf;
    while cdf < u && k < 100_000 {
        k += 1;
        pmf *= rate / count_to_f64(k);
        cdf += pmf;
    }
    k
}

fn sample_gamma(rng: &mut StdRng, shape: f64, scale: f64) -> f64 {
    if shape < 1.0 {
        let u = (1.0_f64 - rng.random::<f64>()).max(f64::MIN_POSITIVE);
        return sample_gamma(rng, shape + 1.0, scale) * u.powf(1.0 / shape);
    }

    // Marsaglia and Tsang
    let d = shape - (1.0 / 3.0);
    let c = (1.0 / (9.0 * d)).sqrt();
    loop {
        let z = sample_standard_normal(rng);
        let v = c.mul_add(z, 1.0);
        if v <= 0.0 {
            continue;
        }
        let v3 = v * v * v;
        let u = rng.random::<f64>();
        if u < (0.0331 * z * z * z).mul_add(-z, 1.0)
            || u.ln() < (0.5 * z).mul_add(z, d * (1.0 - v3 + v3.ln()))
        {
            return scale * d * v3;
        }
    }
}

fn sample_standard_normal(rng: &mut StdRng) -> f64 {
    let u1 = (1.0_f64 - rng.random::<f64>()).max(f64::MIN_POSITIVE);
    let u2 = rng.random::<f64>();
    (-2.0_f64 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Covariate;
    use crate::utils::{mean, usize_to_f64};
    use approx::assert_relative_eq;

    fn treated_share(dataset: &Dataset) -> f64 {
        usize_to_f64(dataset.arm_counts()[Arm::Treated.index()]) / usize_to_f64(dataset.len())
    }

    #[test]
    fn simulation_is_reproducible() {
        let options = SimulationOptions::default();
        let a = simulate_hurdle(&options).expect("simulate");
        let b = simulate_hurdle(&options).expect("simulate");
        assert_eq!(a.outcome(), b.outcome());
        assert_eq!(a.intervention(), b.intervention());
        assert_eq!(a.len(), 200);
        assert!(matches!(a.covariate("Sex"), Some(Covariate::Categorical { .. })));
    }

    #[test]
    fn simulated_data_has_zeros_and_both_arms() {
        let dataset = simulate_hurdle(&SimulationOptions {
            n: 2_000,
            ..SimulationOptions::default()
        })
        .expect("simulate");
        let zeros = dataset.outcome().iter().filter(|&&y| y == 0).count();
        let share = usize_to_f64(zeros) / 2_000.0;
        // logit 2.2 at the mean age gives roughly 10% zeros
        assert!(share > 0.06 && share < 0.16, "zero share {share}");
        assert!((treated_share(&dataset) - 0.5).abs() < 0.05);
    }

    #[test]
    fn truncated_poisson_draws_match_truncated_mean() {
        let mut rng = StdRng::seed_from_u64(1);
        for mu in [0.4, 3.0] {
            let draws = (0..20_000)
                .map(|_| count_to_f64(sample_truncated_count(&mut rng, mu, None)))
                .collect::<Vec<_>>();
            assert!(draws.iter().all(|&y| y >= 1.0));
            assert_relative_eq!(mean(&draws), truncated_mean(mu, None), max_relative = 0.03);
        }
    }

    #[test]
    fn truncated_negative_binomial_draws_match_truncated_mean() {
        let mut rng = StdRng::seed_from_u64(2);
        for theta in [0.5, 1.0, 4.0] {
            let draws = (0..20_000)
                .map(|_| count_to_f64(sample_truncated_count(&mut rng, 3.0, Some(theta))))
                .collect::<Vec<_>>();
            assert!(draws.iter().all(|&y| y >= 1.0));
            assert_relative_eq!(
                mean(&draws),
                truncated_mean(3.0, Some(theta)),
                max_relative = 0.05
            );
        }
    }

    #[test]
    fn population_effect_without_intervention_terms_is_one() {
        let options = SimulationOptions {
            count: Coefficients {
                intervention: 0.0,
                ..SimulationOptions::default().count
            },
            ..SimulationOptions::default()
        };
        assert_relative_eq!(population_effect(&options, 1_000, 3), 1.0, epsilon = 1e-12);
        let effect = population_effect(&SimulationOptions::default(), 20_000, 3);
        assert!((effect - 0.5_f64.exp()).abs() < 0.02, "effect {effect}");
    }
}
