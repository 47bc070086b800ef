//! Design matrices for both hurdle parts, built from validated term lists.
//!
//! Every design has an intercept followed by the treated-arm indicator and
//! the user terms. Numeric covariates enter as-is, categorical covariates as
//! treatment-coded dummies against their first (sorted) level, and `A:B`
//! interaction terms as products of the component columns.
//!
//! Alongside the observed design, each part carries two counterfactual
//! designs in which every record's intervention is forced to one arm.

use std::fmt;

use faer::Mat;

use super::{Arm, Covariate, Dataset, INTERVENTION};
use crate::models::matrix_ops::select_rows;
use crate::models::specification::{ConfigurationError, ModelSpecification};

pub const INTERCEPT: &str = "(Intercept)";

/// A model term: a single predictor or an interaction of several.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Term {
    factors: Vec<String>,
}

impl Term {
    /// Parse `"Age"` or `"Age:Sex"`. Factor order is normalised, so
    /// `"Sex:Age"` and `"Age:Sex"` are the same term.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::MalformedTerm` for empty or repeated factors.
    pub fn parse(text: &str) -> Result<Self, ConfigurationError> {
        let mut factors = text
            .split(':')
            .map(|factor| factor.trim().to_owned())
            .collect::<Vec<_>>();
        if factors.iter().any(String::is_empty) {
            return Err(ConfigurationError::MalformedTerm(text.to_owned()));
        }
        factors.sort();
        let before = factors.len();
        factors.dedup();
        if factors.len() != before {
            return Err(ConfigurationError::MalformedTerm(text.to_owned()));
        }
        Ok(Self { factors })
    }

    /// The intervention main effect.
    #[must_use]
    pub fn intervention() -> Self {
        Self {
            factors: vec![INTERVENTION.to_owned()],
        }
    }

    #[must_use]
    pub fn factors(&self) -> &[String] {
        &self.factors
    }

    #[must_use]
    pub fn is_intervention(&self) -> bool {
        self.factors.len() == 1 && self.factors[0] == INTERVENTION
    }

    /// Check every factor is a column of `dataset`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::UnknownPredictor` for the first missing column.
    pub fn check_columns(&self, dataset: &Dataset) -> Result<(), ConfigurationError> {
        for factor in &self.factors {
            if factor != INTERVENTION && dataset.covariate(factor).is_none() {
                return Err(ConfigurationError::UnknownPredictor {
                    name: factor.clone(),
                    term: self.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.factors.join(":"))
    }
}

/// Observed and counterfactual designs for one hurdle part.
#[derive(Debug, Clone)]
pub struct PartDesign {
    pub observed: Mat<f64>,
    /// Design with every record forced to the control arm.
    pub control: Mat<f64>,
    /// Design with every record forced to the treated arm.
    pub treated: Mat<f64>,
    pub column_names: Vec<String>,
}

impl PartDesign {
    /// # Errors
    ///
    /// Returns `ConfigurationError` if a term references an unknown column.
    pub fn build(dataset: &Dataset, terms: &[Term]) -> Result<Self, ConfigurationError> {
        let (observed, column_names) = design_matrix(dataset, terms, None)?;
        let (control, _) = design_matrix(dataset, terms, Some(Arm::Control))?;
        let (treated, _) = design_matrix(dataset, terms, Some(Arm::Treated))?;
        Ok(Self {
            observed,
            control,
            treated,
            column_names,
        })
    }

    /// Counterfactual design for `arm`.
    #[must_use]
    pub const fn forced(&self, arm: Arm) -> &Mat<f64> {
        match arm {
            Arm::Control => &self.control,
            Arm::Treated => &self.treated,
        }
    }

    #[must_use]
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            observed: select_rows(&self.observed, indices),
            control: select_rows(&self.control, indices),
            treated: select_rows(&self.treated, indices),
            column_names: self.column_names.clone(),
        }
    }
}

/// Everything the fitter and predictor need for one data sample.
#[derive(Debug, Clone)]
pub struct HurdleDesigns {
    /// Zero/non-zero (logit) part.
    pub zero: PartDesign,
    /// Positive-count part.
    pub count: PartDesign,
    pub outcome: Vec<u64>,
    pub arms: Vec<Arm>,
}

impl HurdleDesigns {
    /// Build designs for both parts from a validated specification.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if a term references an unknown column.
    pub fn build(
        dataset: &Dataset,
        specification: &ModelSpecification,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            zero: PartDesign::build(dataset, &specification.zero_design_terms())?,
            count: PartDesign::build(dataset, &specification.count_design_terms())?,
            outcome: dataset.outcome().to_vec(),
            arms: dataset.intervention().to_vec(),
        })
    }

    #[must_use]
    pub fn nrows(&self) -> usize {
        self.outcome.len()
    }

    /// Designs for the sample made of `indices` (repeats allowed).
    #[must_use]
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            zero: self.zero.select(indices),
            count: self.count.select(indices),
            outcome: indices.iter().map(|&i| self.outcome[i]).collect(),
            arms: indices.iter().map(|&i| self.arms[i]).collect(),
        }
    }
}

/// Build the design matrix for `terms`, optionally forcing every record to `arm`.
///
/// # Errors
///
/// Returns `ConfigurationError::UnknownPredictor` if a factor is not a column.
pub fn design_matrix(
    dataset: &Dataset,
    terms: &[Term],
    arm: Option<Arm>,
) -> Result<(Mat<f64>, Vec<String>), ConfigurationError> {
    let rows = dataset.len();
    let mut columns = vec![(INTERCEPT.to_owned(), vec![1.0; rows])];
    for term in terms {
        columns.extend(term_columns(dataset, term, arm)?);
    }

    let matrix = Mat::from_fn(rows, columns.len(), |i, j| columns[j].1[i]);
    let names = columns.into_iter().map(|(name, _)| name).collect();
    Ok((matrix, names))
}

type Column = (String, Vec<f64>);

fn term_columns(
    dataset: &Dataset,
    term: &Term,
    arm: Option<Arm>,
) -> Result<Vec<Column>, ConfigurationError> {
    term.check_columns(dataset)?;
    let mut product: Vec<Column> = vec![(String::new(), vec![1.0; dataset.len()])];
    for factor in term.factors() {
        let columns = factor_columns(dataset, factor, arm);
        let mut next = Vec::with_capacity(product.len() * columns.len());
        for (left_name, left) in &product {
            for (right_name, right) in &columns {
                let name = if left_name.is_empty() {
                    right_name.clone()
                } else {
                    format!("{left_name}:{right_name}")
                };
                let values = left.iter().zip(right).map(|(a, b)| a * b).collect();
                next.push((name, values));
            }
        }
        product = next;
    }
    Ok(product)
}

fn factor_columns(dataset: &Dataset, factor: &str, arm: Option<Arm>) -> Vec<Column> {
    if factor == INTERVENTION {
        let treated_label = &dataset.intervention_levels()[Arm::Treated.index()];
        let values = dataset
            .intervention()
            .iter()
            .map(|observed| arm.unwrap_or(*observed).indicator())
            .collect();
        return vec![(format!("{INTERVENTION}[{treated_label}]"), values)];
    }

    match dataset.covariate(factor) {
        Some(Covariate::Numeric(values)) => vec![(factor.to_owned(), values.clone())],
        Some(Covariate::Categorical { levels, codes }) => levels
            .iter()
            .enumerate()
            .skip(1)
            .map(|(level_idx, level)| {
                let values = codes
                    .iter()
                    .map(|&code| if code == level_idx { 1.0 } else { 0.0 })
                    .collect();
                (format!("{factor}[{level}]"), values)
            })
            .collect(),
        None => Vec::new(),
    }
}
