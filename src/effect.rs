//! # Average intervention effect
//!
//! Counterfactual prediction from a fitted hurdle model: every record is
//! predicted once with the intervention forced to control and once forced to
//! treated, each column is averaged over the sample, and the effect is the
//! ratio `gamma_treated / gamma_control`.

use faer::Mat;
use thiserror::Error;

use crate::input::{Arm, HurdleDesigns};
use crate::models::hurdle::{FitError, FitOptions, HurdleModel, fit_hurdle_designs};
use crate::models::specification::CountFamily;
use crate::utils::{matrix_is_finite, mean_column};

/// Errors from estimating the effect on one sample.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EffectError {
    #[error("model fit failed: {0}")]
    Fit(#[from] FitError),
    #[error(
        "effect ratio is undefined (control mean {gamma_control}, treated mean {gamma_treated})"
    )]
    UndefinedEffect {
        gamma_control: f64,
        gamma_treated: f64,
    },
}

impl EffectError {
    /// Short label used when tallying failures.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Fit(err) => err.kind(),
            Self::UndefinedEffect { .. } => "undefined_effect",
        }
    }
}

/// Predicted expected outcome of every record under each forced arm.
#[derive(Debug, Clone)]
pub struct PredictionTable {
    pub control: Mat<f64>,
    pub treated: Mat<f64>,
}

impl PredictionTable {
    #[must_use]
    pub const fn column(&self, arm: Arm) -> &Mat<f64> {
        match arm {
            Arm::Control => &self.control,
            Arm::Treated => &self.treated,
        }
    }
}

/// Population-averaged outcomes under each arm and their ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectEstimate {
    pub gamma_control: f64,
    pub gamma_treated: f64,
    /// `gamma_treated / gamma_control`.
    pub ratio: f64,
}

/// Counterfactual predictions of `model` over the records of `designs`.
#[must_use]
pub fn prediction_table(model: &HurdleModel, designs: &HurdleDesigns) -> PredictionTable {
    let predict = |arm: Arm| {
        model
            .predict(designs.zero.forced(arm), designs.count.forced(arm))
            .expected_outcome
    };
    PredictionTable {
        control: predict(Arm::Control),
        treated: predict(Arm::Treated),
    }
}

/// Average effect of the intervention implied by `model` on the sample in `designs`.
///
/// # Errors
///
/// Returns `EffectError::UndefinedEffect` if the control mean is zero or the
/// ratio is not finite.
pub fn average_effect(
    model: &HurdleModel,
    designs: &HurdleDesigns,
) -> Result<EffectEstimate, EffectError> {
    let table = prediction_table(model, designs);
    let gamma_control = mean_column(&table.control);
    let gamma_treated = mean_column(&table.treated);
    let undefined = EffectError::UndefinedEffect {
        gamma_control,
        gamma_treated,
    };
    if gamma_control == 0.0 || !matrix_is_finite(&table.control) {
        return Err(undefined);
    }
    let ratio = gamma_treated / gamma_control;
    if !ratio.is_finite() {
        return Err(undefined);
    }
    Ok(EffectEstimate {
        gamma_control,
        gamma_treated,
        ratio,
    })
}

/// Fit the hurdle model on `designs` and compute the average effect on the
/// same sample.
///
/// # Errors
///
/// Returns `EffectError` if fitting fails or the effect is undefined.
pub fn estimate_effect(
    designs: &HurdleDesigns,
    family: CountFamily,
    options: FitOptions,
) -> Result<EffectEstimate, EffectError> {
    let (model, _) = fit_hurdle_designs(designs, family, options)?;
    average_effect(&model, designs)
}

/// [`estimate_effect`] on the sample made of rows `indices` (repeats allowed).
///
/// # Errors
///
/// Returns `EffectError` if fitting fails or the effect is undefined.
pub fn estimate_effect_on_rows(
    designs: &HurdleDesigns,
    indices: &[usize],
    family: CountFamily,
    options: FitOptions,
) -> Result<EffectEstimate, EffectError> {
    estimate_effect(&designs.select(indices), family, options)
}
