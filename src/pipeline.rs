/////////////////////////////////////////////////////////////////////////////////////////////\
//
// End-to-end effect analysis: validate, fit, resample, summarise.
//
// Created on: 19 Oct 2026
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Analysis pipeline
//!
//! [`analyze`] runs the full computation from an immutable [`AnalysisConfig`]:
//!
//! 1. validate the configuration, the data set, and the model specification;
//! 2. build the observed and counterfactual designs once;
//! 3. estimate the effect on the original sample and on every stratified
//!    bootstrap replicate;
//! 4. for BCa, refit once per record with that record left out;
//! 5. summarise into an [`InferenceResult`].
//!
//! Configuration problems fail before any model is fitted. Replicate
//! failures are counted, never fatal.
//!
//! # Examples
//!
//! ```no_run
//! use hurdle_effect::{AnalysisConfig, ModelSpecification, SimulationOptions, analyze, simulate_hurdle};
//!
//! let dataset = simulate_hurdle(&SimulationOptions::default()).expect("simulate");
//! let spec = ModelSpecification::from_names(&["Age", "Sex"], &["Age"], "poisson").expect("spec");
//! let result = analyze(&dataset, &spec, &AnalysisConfig::default()).expect("analysis");
//! println!("{:.3} [{:.3}, {:.3}] p = {:.4}", result.estimate, result.interval.lower, result.interval.upper, result.p_value);
//! ```

use thiserror::Error;
use tracing::{info, warn};

use crate::bootstrap::{BootstrapError, BootstrapOptions, Strata, jackknife, run_bootstrap};
use crate::effect::EffectError;
use crate::inference::{InferenceError, InferenceOptions, InferenceResult, IntervalMethod, summarize};
use crate::input::{Dataset, HurdleDesigns};
use crate::models::hurdle::FitOptions;
use crate::models::specification::{ConfigurationError, ModelSpecification};
use crate::preprocess::{constant_columns, outcome_diagnostics};
use crate::utils::usize_to_f64;

const FAILURE_WARN_SHARE: f64 = 0.1;
const CONSTANT_TOLERANCE: f64 = 1e-12;

/// All tuning for one analysis. Built once and passed by reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisConfig {
    pub fit: FitOptions,
    pub bootstrap: BootstrapOptions,
    pub inference: InferenceOptions,
}

impl AnalysisConfig {
    /// # Errors
    ///
    /// Returns the first invalid option as a `ConfigurationError`.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.fit.validate()?;
        self.bootstrap.validate()?;
        self.inference.validate()
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("effect on the original sample could not be estimated: {0}")]
    PointEstimate(#[from] EffectError),
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Estimate the average intervention effect with bootstrap uncertainty.
///
/// # Errors
///
/// Returns `AnalysisError::Configuration` for invalid options, data, or
/// predictors, `AnalysisError::PointEstimate` if the full-sample fit fails,
/// and `AnalysisError::Inference` if too few replicates succeed.
pub fn analyze(
    dataset: &Dataset,
    specification: &ModelSpecification,
    config: &AnalysisConfig,
) -> Result<InferenceResult, AnalysisError> {
    config.validate()?;
    dataset.validate().map_err(ConfigurationError::from)?;
    specification.validate_against(dataset)?;

    let diagnostics = outcome_diagnostics(dataset.outcome(), dataset.intervention());
    diagnostics.check_hurdle_ready()?;

    let family = specification.family();
    let method = config.inference.method;
    info!(
        records = dataset.len(),
        zeros = diagnostics.n_zero,
        control = diagnostics.arm_rows[0],
        treated = diagnostics.arm_rows[1],
        replicates = config.bootstrap.replicates,
        family = %family,
        method = %method,
        "starting hurdle effect analysis"
    );

    let designs = HurdleDesigns::build(dataset, specification)?;
    for part in [&designs.zero, &designs.count] {
        for col in constant_columns(&part.observed, CONSTANT_TOLERANCE) {
            warn!(column = %part.column_names[col], "design column is constant; fits will be rank-deficient");
        }
    }

    let strata = Strata::from_arms(&designs.arms)?;
    let distribution = run_bootstrap(&designs, &strata, family, config.fit, config.bootstrap)?;

    let failures = distribution.failures();
    let requested = distribution.requested();
    let share = usize_to_f64(failures) / usize_to_f64(requested);
    if share > FAILURE_WARN_SHARE {
        warn!(
            failures,
            requested,
            share,
            tally = ?distribution.failure_tally(),
            "many bootstrap replicates failed"
        );
    }

    let leave_one_out = match method {
        IntervalMethod::Bca => Some(jackknife(
            &designs,
            family,
            config.fit,
            config.bootstrap.parallel,
        )),
        IntervalMethod::Percentile => None,
    };
    if let Some(result) = &leave_one_out
        && result.failures > 0
    {
        warn!(failures = result.failures, "jackknife fits failed and were skipped");
    }

    let result = summarize(&distribution, leave_one_out.as_ref(), config.inference)?;
    info!(
        estimate = result.estimate,
        lower = result.interval.lower,
        upper = result.interval.upper,
        p_value = result.p_value,
        failed = result.failed_replicates,
        "hurdle effect analysis finished"
    );
    Ok(result)
}
