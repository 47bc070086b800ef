/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Stratified bootstrap and jackknife of the average intervention effect.
//
// Created on: 19 Oct 2026
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Resampling
//!
//! Each replicate draws, within every intervention arm, as many rows as the
//! arm holds (with replacement), refits the hurdle model on the concatenated
//! resample, and records the effect ratio or the reason it failed. Replicate
//! `r` seeds its own generator from `(seed, r)`, so the distribution is the
//! same whether replicates run sequentially or on the rayon pool.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use rayon::prelude::*;
use thiserror::Error;
use tracing::debug;

use crate::effect::{EffectError, EffectEstimate, estimate_effect, estimate_effect_on_rows};
use crate::input::{Arm, HurdleDesigns};
use crate::models::hurdle::FitOptions;
use crate::models::specification::{ConfigurationError, CountFamily};

/// Resampling configuration.
#[derive(Debug, Clone, Copy)]
pub struct BootstrapOptions {
    /// Number of bootstrap replicates.
    pub replicates: usize,
    /// RNG seed for reproducibility.
    pub seed: u64,
    /// Run replicates on the rayon thread pool.
    pub parallel: bool,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            replicates: 5_000,
            seed: 42,
            parallel: true,
        }
    }
}

impl BootstrapOptions {
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidReplicateCount` if no replicates are requested.
    pub const fn validate(self) -> Result<(), ConfigurationError> {
        if self.replicates == 0 {
            return Err(ConfigurationError::InvalidReplicateCount);
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapError {
    #[error("cannot resample an empty intervention arm (control: {control}, treated: {treated})")]
    EmptyStratum { control: usize, treated: usize },
}

/// Row indices of the sample grouped by intervention arm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strata {
    rows: [Vec<usize>; 2],
}

impl Strata {
    /// # Errors
    ///
    /// Returns `BootstrapError::EmptyStratum` if either arm has no rows.
    pub fn from_arms(arms: &[Arm]) -> Result<Self, BootstrapError> {
        let mut rows = [Vec::new(), Vec::new()];
        for (idx, arm) in arms.iter().enumerate() {
            rows[arm.index()].push(idx);
        }
        if rows.iter().any(Vec::is_empty) {
            return Err(BootstrapError::EmptyStratum {
                control: rows[0].len(),
                treated: rows[1].len(),
            });
        }
        Ok(Self { rows })
    }

    #[must_use]
    pub fn rows(&self, arm: Arm) -> &[usize] {
        &self.rows[arm.index()]
    }

    /// Total number of rows across both arms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One stratified resample: control rows first, then treated rows, each
    /// drawn with replacement from its own arm at the arm's observed size.
    #[must_use]
    pub fn stratified_indices(&self, rng: &mut StdRng) -> Vec<usize> {
        let mut indices = Vec::with_capacity(self.len());
        for rows in &self.rows {
            indices.extend((0..rows.len()).map(|_| rows[rng.random_range(0..rows.len())]));
        }
        indices
    }
}

/// Seed of replicate `index`, independent of scheduling order.
#[must_use]
pub const fn replicate_seed(seed: u64, index: usize) -> u64 {
    // SplitMix64 finaliser over the combined seed
    let mut z = seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Outcome of one bootstrap replicate.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicateOutcome {
    Success(f64),
    Failed(EffectError),
}

impl ReplicateOutcome {
    #[must_use]
    pub const fn estimate(&self) -> Option<f64> {
        match self {
            Self::Success(value) => Some(*value),
            Self::Failed(_) => None,
        }
    }
}

/// Original-sample effect plus every replicate outcome, in replicate order.
#[derive(Debug, Clone)]
pub struct BootstrapDistribution {
    pub original: EffectEstimate,
    pub outcomes: Vec<ReplicateOutcome>,
}

impl BootstrapDistribution {
    /// Effect ratios of the successful replicates, in replicate order.
    #[must_use]
    pub fn estimates(&self) -> Vec<f64> {
        self.outcomes
            .iter()
            .filter_map(ReplicateOutcome::estimate)
            .collect()
    }

    #[must_use]
    pub fn requested(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, ReplicateOutcome::Failed(_)))
            .count()
    }

    /// Failed replicates counted by failure kind.
    #[must_use]
    pub fn failure_tally(&self) -> BTreeMap<&'static str, usize> {
        let mut tally = BTreeMap::new();
        for outcome in &self.outcomes {
            if let ReplicateOutcome::Failed(err) = outcome {
                *tally.entry(err.kind()).or_insert(0) += 1;
            }
        }
        tally
    }
}

/// Stratified bootstrap of the hurdle average effect.
///
/// The effect on the full sample is computed first; failure there is returned
/// as an error. Failures of individual replicates are recorded in the
/// distribution and never abort the run.
///
/// # Errors
///
/// Returns `EffectError` if the original-sample effect cannot be computed.
pub fn run_bootstrap(
    designs: &HurdleDesigns,
    strata: &Strata,
    family: CountFamily,
    fit: FitOptions,
    options: BootstrapOptions,
) -> Result<BootstrapDistribution, EffectError> {
    let original = estimate_effect(designs, family, fit)?;
    let outcomes = resample(strata, options, |indices| {
        estimate_effect_on_rows(designs, indices, family, fit).map(|effect| effect.ratio)
    });
    Ok(BootstrapDistribution { original, outcomes })
}

/// Evaluate `statistic` on `options.replicates` stratified resamples.
#[must_use]
pub fn resample<F>(strata: &Strata, options: BootstrapOptions, statistic: F) -> Vec<ReplicateOutcome>
where
    F: Fn(&[usize]) -> Result<f64, EffectError> + Sync,
{
    let replicate = |index: usize| {
        let mut rng = StdRng::seed_from_u64(replicate_seed(options.seed, index));
        let indices = strata.stratified_indices(&mut rng);
        match statistic(&indices) {
            Ok(value) => ReplicateOutcome::Success(value),
            Err(err) => {
                debug!(replicate = index, reason = err.kind(), "bootstrap replicate failed: {err}");
                ReplicateOutcome::Failed(err)
            }
        }
    };

    if options.parallel {
        (0..options.replicates).into_par_iter().map(replicate).collect()
    } else {
        (0..options.replicates).map(replicate).collect()
    }
}

/// Leave-one-out effect estimates on the original sample.
#[derive(Debug, Clone)]
pub struct Jackknife {
    /// Successful leave-one-out estimates, in row order.
    pub estimates: Vec<f64>,
    pub failures: usize,
}

/// Refit the effect once per row with that row left out.
#[must_use]
pub fn jackknife(
    designs: &HurdleDesigns,
    family: CountFamily,
    fit: FitOptions,
    parallel: bool,
) -> Jackknife {
    let n = designs.nrows();
    let leave_out = |skip: usize| {
        let indices = (0..n).filter(|&idx| idx != skip).collect::<Vec<_>>();
        estimate_effect_on_rows(designs, &indices, family, fit)
            .map(|effect| effect.ratio)
            .map_err(|err| {
                debug!(row = skip, reason = err.kind(), "jackknife fit failed: {err}");
                err
            })
    };

    let results: Vec<Result<f64, EffectError>> = if parallel {
        (0..n).into_par_iter().map(leave_out).collect()
    } else {
        (0..n).map(leave_out).collect()
    };

    let estimates = results
        .iter()
        .filter_map(|result| result.as_ref().ok().copied())
        .collect::<Vec<_>>();
    Jackknife {
        failures: n - estimates.len(),
        estimates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Dataset;
    use crate::models::hurdle::FitError;
    use crate::models::specification::ModelSpecification;
    use crate::utils::usize_to_f64;

    fn arms() -> Vec<Arm> {
        (0..30)
            .map(|i| if i % 3 == 0 { Arm::Treated } else { Arm::Control })
            .collect()
    }

    #[test]
    fn stratified_resample_preserves_arm_counts() {
        let arms = arms();
        let strata = Strata::from_arms(&arms).expect("strata");
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..50 {
            let indices = strata.stratified_indices(&mut rng);
            assert_eq!(indices.len(), arms.len());
            let treated = indices.iter().filter(|&&i| arms[i] == Arm::Treated).count();
            assert_eq!(treated, 10);
            assert!(indices[..20].iter().all(|&i| arms[i] == Arm::Control));
        }
    }

    #[test]
    fn empty_arm_is_rejected() {
        let err = Strata::from_arms(&[Arm::Control, Arm::Control]).expect_err("no treated rows");
        assert_eq!(err, BootstrapError::EmptyStratum { control: 2, treated: 0 });
    }

    #[test]
    fn replicate_seeds_differ_by_index() {
        assert_ne!(replicate_seed(42, 0), replicate_seed(42, 1));
        assert_ne!(replicate_seed(42, 0), replicate_seed(43, 0));
        assert_eq!(replicate_seed(7, 3), replicate_seed(7, 3));
    }

    #[test]
    fn parallel_and_sequential_resampling_agree() {
        let strata = Strata::from_arms(&arms()).expect("strata");
        let statistic = |indices: &[usize]| {
            Ok::<f64, EffectError>(indices.iter().map(|&i| usize_to_f64(i)).sum())
        };
        let sequential = BootstrapOptions {
            replicates: 64,
            seed: 5,
            parallel: false,
        };
        let parallel = BootstrapOptions {
            parallel: true,
            ..sequential
        };
        assert_eq!(
            resample(&strata, sequential, statistic),
            resample(&strata, parallel, statistic)
        );
    }

    #[test]
    fn failures_are_recorded_not_propagated() {
        let strata = Strata::from_arms(&arms()).expect("strata");
        let options = BootstrapOptions {
            replicates: 10,
            seed: 1,
            parallel: false,
        };
        let outcomes = resample(&strata, options, |indices| {
            if indices[0] % 2 == 0 {
                Err(EffectError::Fit(FitError::SolveFailed))
            } else {
                Ok(1.0)
            }
        });
        let distribution = BootstrapDistribution {
            original: EffectEstimate {
                gamma_control: 1.0,
                gamma_treated: 1.0,
                ratio: 1.0,
            },
            outcomes,
        };
        assert_eq!(distribution.requested(), 10);
        assert_eq!(
            distribution.failures() + distribution.estimates().len(),
            10
        );
        let tally = distribution.failure_tally();
        assert_eq!(
            tally.get("solve_failed").copied().unwrap_or(0),
            distribution.failures()
        );
    }

    fn designs() -> HurdleDesigns {
        let n = 60;
        let arms = (0..n)
            .map(|i| if i % 2 == 0 { Arm::Control } else { Arm::Treated })
            .collect::<Vec<_>>();
        let outcome = (0..n as u64)
            .map(|i| if i % 5 == 0 { 0 } else { 1 + (i * 7) % 5 + (i % 2) * 2 })
            .collect();
        let dataset = Dataset::new(outcome, arms)
            .with_numeric("Age", (0..n).map(|i| 20.0 + usize_to_f64((i * 13) % 50)).collect())
            .expect("column");
        let spec =
            ModelSpecification::new(&["Age"], &["Age"], CountFamily::Poisson).expect("spec");
        HurdleDesigns::build(&dataset, &spec).expect("designs")
    }

    #[test]
    fn bootstrap_is_deterministic() {
        let designs = designs();
        let strata = Strata::from_arms(&designs.arms).expect("strata");
        let options = BootstrapOptions {
            replicates: 40,
            seed: 11,
            parallel: true,
        };
        let first = run_bootstrap(
            &designs,
            &strata,
            CountFamily::Poisson,
            FitOptions::default(),
            options,
        )
        .expect("bootstrap");
        let second = run_bootstrap(
            &designs,
            &strata,
            CountFamily::Poisson,
            FitOptions::default(),
            options,
        )
        .expect("bootstrap");
        assert_eq!(first.outcomes, second.outcomes);
        assert_eq!(first.original, second.original);
        assert!(first.estimates().len() >= 30);
    }

    #[test]
    fn jackknife_leaves_out_each_row() {
        let designs = designs();
        let result = jackknife(&designs, CountFamily::Poisson, FitOptions::default(), false);
        assert_eq!(result.estimates.len() + result.failures, designs.nrows());
        assert!(result.estimates.iter().all(|value| value.is_finite() && *value > 0.0));
    }
}
