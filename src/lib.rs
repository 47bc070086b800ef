#![forbid(unsafe_code)]

//! # `hurdle_effect`
//!
//! Average intervention effects on count outcomes with excess zeros.
//!
//! A hurdle model (logistic zero part plus a zero-truncated Poisson,
//! negative binomial, or geometric count part) is fitted to the data, the
//! intervention is switched off and on for every record, and the ratio of the
//! two averaged predictions is the effect. Its uncertainty comes from a
//! bootstrap stratified by intervention arm, summarised as a percentile or
//! BCa interval and a log-scale p-value.
//!
//! The crate was written for length-of-stay style outcomes, but nothing in
//! the API is tied to a particular domain.

pub mod bootstrap;
pub mod effect;
pub mod inference;
pub mod input;
pub mod models;
pub mod pipeline;
pub mod preprocess;
pub mod report;
pub mod simulate;
pub mod utils;

pub mod matrix_ops {
    pub use crate::models::matrix_ops::*;
}

pub use bootstrap::{
    BootstrapDistribution, BootstrapError, BootstrapOptions, Jackknife, ReplicateOutcome, Strata,
    jackknife, replicate_seed, resample, run_bootstrap,
};
pub use effect::{
    EffectError, EffectEstimate, PredictionTable, average_effect, estimate_effect,
    estimate_effect_on_rows, prediction_table,
};
pub use inference::{
    BcaDiagnostics, ConfidenceInterval, InferenceError, InferenceOptions, InferenceResult,
    IntervalMethod, bca_interval, log_scale_p_value, minimum_replicates, percentile_interval,
    summarize,
};
pub use input::{
    Arm, Covariate, Dataset, HurdleDesigns, INTERVENTION, InputError, OUTCOME, PartDesign, Term,
};
pub use models::hurdle::{
    FitError, FitOptions, HurdleModel, HurdlePrediction, HurdleReport, ModelPart, fit_hurdle,
    fit_hurdle_designs, log_likelihood as hurdle_log_likelihood,
};
pub use models::specification::{ConfigurationError, CountFamily, ModelSpecification};
pub use pipeline::{AnalysisConfig, AnalysisError, analyze};
pub use preprocess::{
    OutcomeDiagnostics, column_has_variation, constant_columns, outcome_diagnostics,
};
pub use report::{InferenceTables, render_inference_tables};
pub use simulate::{Coefficients, SimulationOptions, population_effect, simulate_hurdle};
