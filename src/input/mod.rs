//! # Model inputs
//!
//! Defines the in-memory rectangular data set: a non-negative count outcome,
//! a two-level intervention, and named numeric or categorical covariates.
//!
//! # Examples
//!
//! ```
//! use hurdle_effect::{Arm, Dataset};
//!
//! let dataset = Dataset::new(vec![0, 3, 1, 0], vec![Arm::Control, Arm::Control, Arm::Treated, Arm::Treated])
//!     .with_numeric("Age", vec![54.0, 61.0, 47.0, 70.0])
//!     .and_then(|data| data.with_categorical("Sex", &["F", "M", "M", "F"]))
//!     .expect("valid columns");
//!
//! assert!(dataset.validate().is_ok());
//! assert_eq!(dataset.arm_counts(), [2, 2]);
//! ```
//!
//! ```
//! use hurdle_effect::{Arm, Dataset};
//!
//! let dataset = Dataset::new(vec![0, 3, 1], vec![Arm::Control, Arm::Treated]);
//! assert!(dataset.validate().is_err());
//! ```

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

pub mod design;

pub use design::{HurdleDesigns, PartDesign, Term};

/// Column name of the count outcome.
pub const OUTCOME: &str = "Outcome";
/// Column name of the two-level intervention.
pub const INTERVENTION: &str = "Intervention";

/// Errors returned when constructing or validating a data set.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("data set must contain at least one record")]
    Empty,
    #[error("intervention length ({intervention}) must match outcome length ({outcome})")]
    InterventionLength { intervention: usize, outcome: usize },
    #[error("column `{name}` has {len} values but the data set has {rows} records")]
    ColumnLength {
        name: String,
        len: usize,
        rows: usize,
    },
    #[error("column `{0}` is defined more than once")]
    DuplicateColumn(String),
    #[error("column name `{0}` is reserved")]
    ReservedColumn(String),
    #[error("column names must be non-empty and must not contain `:`, got `{0}`")]
    InvalidColumnName(String),
    #[error("numeric column `{0}` contains non-finite values")]
    NonFiniteCovariate(String),
    #[error("intervention label `{label}` matches neither `{control}` nor `{treated}`")]
    UnknownInterventionLabel {
        label: String,
        control: String,
        treated: String,
    },
    #[error("intervention levels must be distinct, got `{0}` twice")]
    DuplicateInterventionLevel(String),
}

/// Intervention arm of a record. `Control` is level 1, `Treated` is level 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Arm {
    Control,
    Treated,
}

impl Arm {
    /// Position of the arm in the level order.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Control => 0,
            Self::Treated => 1,
        }
    }

    /// Treated-arm indicator used in design matrices.
    #[must_use]
    pub const fn indicator(self) -> f64 {
        match self {
            Self::Control => 0.0,
            Self::Treated => 1.0,
        }
    }
}

impl fmt::Display for Arm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Control => f.write_str("control"),
            Self::Treated => f.write_str("treated"),
        }
    }
}

/// A named covariate column.
#[derive(Debug, Clone, PartialEq)]
pub enum Covariate {
    Numeric(Vec<f64>),
    /// Category codes index into `levels`, which are sorted so the encoding
    /// does not depend on row order.
    Categorical {
        levels: Vec<String>,
        codes: Vec<usize>,
    },
}

impl Covariate {
    /// Build a categorical column from raw labels.
    #[must_use]
    pub fn categorical<S: AsRef<str>>(labels: &[S]) -> Self {
        let mut levels = labels
            .iter()
            .map(|label| label.as_ref().to_owned())
            .collect::<Vec<_>>();
        levels.sort();
        levels.dedup();
        let codes = labels
            .iter()
            .map(|label| {
                levels
                    .binary_search_by(|level| level.as_str().cmp(label.as_ref()))
                    .unwrap_or(0)
            })
            .collect();
        Self::Categorical { levels, codes }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(values) => values.len(),
            Self::Categorical { codes, .. } => codes.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn select(&self, indices: &[usize]) -> Self {
        match self {
            Self::Numeric(values) => Self::Numeric(indices.iter().map(|&i| values[i]).collect()),
            Self::Categorical { levels, codes } => Self::Categorical {
                levels: levels.clone(),
                codes: indices.iter().map(|&i| codes[i]).collect(),
            },
        }
    }
}

/// Rectangular data set, one record per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    outcome: Vec<u64>,
    intervention: Vec<Arm>,
    intervention_levels: [String; 2],
    covariates: BTreeMap<String, Covariate>,
}

impl Dataset {
    /// Create a data set from outcome counts and intervention arms.
    ///
    /// Intervention levels default to `"control"` and `"treated"`.
    #[must_use]
    pub fn new(outcome: Vec<u64>, intervention: Vec<Arm>) -> Self {
        Self {
            outcome,
            intervention,
            intervention_levels: [Arm::Control.to_string(), Arm::Treated.to_string()],
            covariates: BTreeMap::new(),
        }
    }

    /// Create a data set from intervention labels and an explicit level order
    /// (`[control, treated]`).
    ///
    /// # Errors
    ///
    /// Returns `InputError` if the levels coincide or a label matches neither level.
    pub fn from_labels<S: AsRef<str>>(
        outcome: Vec<u64>,
        labels: &[S],
        levels: [&str; 2],
    ) -> Result<Self, InputError> {
        let [control, treated] = levels;
        if control == treated {
            return Err(InputError::DuplicateInterventionLevel(control.to_owned()));
        }
        let intervention = labels
            .iter()
            .map(|label| match label.as_ref() {
                value if value == control => Ok(Arm::Control),
                value if value == treated => Ok(Arm::Treated),
                other => Err(InputError::UnknownInterventionLabel {
                    label: other.to_owned(),
                    control: control.to_owned(),
                    treated: treated.to_owned(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            intervention_levels: [control.to_owned(), treated.to_owned()],
            ..Self::new(outcome, intervention)
        })
    }

    /// Add a numeric covariate.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if the name is invalid, reserved, or already used.
    pub fn with_numeric(self, name: &str, values: Vec<f64>) -> Result<Self, InputError> {
        self.with_covariate(name, Covariate::Numeric(values))
    }

    /// Add a categorical covariate from raw labels.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if the name is invalid, reserved, or already used.
    pub fn with_categorical<S: AsRef<str>>(
        self,
        name: &str,
        labels: &[S],
    ) -> Result<Self, InputError> {
        self.with_covariate(name, Covariate::categorical(labels))
    }

    /// Add a prepared covariate column.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if the name is invalid, reserved, or already used.
    pub fn with_covariate(mut self, name: &str, column: Covariate) -> Result<Self, InputError> {
        if name.is_empty() || name.contains(':') {
            return Err(InputError::InvalidColumnName(name.to_owned()));
        }
        if name == OUTCOME || name == INTERVENTION {
            return Err(InputError::ReservedColumn(name.to_owned()));
        }
        if self.covariates.contains_key(name) {
            return Err(InputError::DuplicateColumn(name.to_owned()));
        }
        self.covariates.insert(name.to_owned(), column);
        Ok(self)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.outcome.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcome.is_empty()
    }

    #[must_use]
    pub fn outcome(&self) -> &[u64] {
        &self.outcome
    }

    #[must_use]
    pub fn intervention(&self) -> &[Arm] {
        &self.intervention
    }

    /// Labels of the control and treated levels, in that order.
    #[must_use]
    pub const fn intervention_levels(&self) -> &[String; 2] {
        &self.intervention_levels
    }

    #[must_use]
    pub fn covariate(&self, name: &str) -> Option<&Covariate> {
        self.covariates.get(name)
    }

    /// Number of records in each arm, indexed by `Arm::index`.
    #[must_use]
    pub fn arm_counts(&self) -> [usize; 2] {
        let mut counts = [0; 2];
        for arm in &self.intervention {
            counts[arm.index()] += 1;
        }
        counts
    }

    /// Copy of the data set restricted to (and ordered by) `indices`.
    ///
    /// Indices may repeat.
    #[must_use]
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            outcome: indices.iter().map(|&i| self.outcome[i]).collect(),
            intervention: indices.iter().map(|&i| self.intervention[i]).collect(),
            intervention_levels: self.intervention_levels.clone(),
            covariates: self
                .covariates
                .iter()
                .map(|(name, column)| (name.clone(), column.select(indices)))
                .collect(),
        }
    }

    /// Validate lengths and values of every column.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if the data set is empty or columns are malformed.
    pub fn validate(&self) -> Result<(), InputError> {
        let rows = self.outcome.len();
        if rows == 0 {
            return Err(InputError::Empty);
        }
        if self.intervention.len() != rows {
            return Err(InputError::InterventionLength {
                intervention: self.intervention.len(),
                outcome: rows,
            });
        }
        for (name, column) in &self.covariates {
            if column.len() != rows {
                return Err(InputError::ColumnLength {
                    name: name.clone(),
                    len: column.len(),
                    rows,
                });
            }
            if let Covariate::Numeric(values) = column
                && values.iter().any(|value| !value.is_finite())
            {
                return Err(InputError::NonFiniteCovariate(name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arms(pattern: &[u8]) -> Vec<Arm> {
        pattern
            .iter()
            .map(|&flag| if flag == 0 { Arm::Control } else { Arm::Treated })
            .collect()
    }

    #[test]
    fn validate_rejects_empty_data_set() {
        let dataset = Dataset::new(Vec::new(), Vec::new());
        assert_eq!(dataset.validate(), Err(InputError::Empty));
    }

    #[test]
    fn validate_rejects_intervention_length_mismatch() {
        let dataset = Dataset::new(vec![0, 1, 2], arms(&[0, 1]));
        assert_eq!(
            dataset.validate(),
            Err(InputError::InterventionLength {
                intervention: 2,
                outcome: 3
            })
        );
    }

    #[test]
    fn validate_rejects_short_covariate() {
        let dataset = Dataset::new(vec![0, 1], arms(&[0, 1]))
            .with_numeric("Age", vec![30.0])
            .expect("column");
        let err = dataset.validate().expect_err("short column should fail");
        assert_eq!(
            err,
            InputError::ColumnLength {
                name: "Age".to_owned(),
                len: 1,
                rows: 2
            }
        );
    }

    #[test]
    fn validate_rejects_non_finite_numeric() {
        let dataset = Dataset::new(vec![0, 1], arms(&[0, 1]))
            .with_numeric("Age", vec![30.0, f64::NAN])
            .expect("column");
        assert_eq!(
            dataset.validate(),
            Err(InputError::NonFiniteCovariate("Age".to_owned()))
        );
    }

    #[test]
    fn covariate_names_are_checked() {
        let base = Dataset::new(vec![0, 1], arms(&[0, 1]));
        assert_eq!(
            base.clone().with_numeric("Outcome", vec![1.0, 2.0]),
            Err(InputError::ReservedColumn("Outcome".to_owned()))
        );
        assert_eq!(
            base.clone().with_numeric("Age:Sex", vec![1.0, 2.0]),
            Err(InputError::InvalidColumnName("Age:Sex".to_owned()))
        );
        let err = base
            .with_numeric("Age", vec![1.0, 2.0])
            .and_then(|data| data.with_numeric("Age", vec![3.0, 4.0]))
            .expect_err("duplicate should fail");
        assert_eq!(err, InputError::DuplicateColumn("Age".to_owned()));
    }

    #[test]
    fn categorical_levels_are_sorted_and_order_independent() {
        let column = Covariate::categorical(&["M", "F", "M", "X"]);
        let Covariate::Categorical { levels, codes } = column else {
            panic!("expected categorical column");
        };
        assert_eq!(levels, vec!["F", "M", "X"]);
        assert_eq!(codes, vec![1, 0, 1, 2]);
    }

    #[test]
    fn from_labels_maps_levels_in_declared_order() {
        let dataset = Dataset::from_labels(vec![0, 2, 5], &["usual", "new", "usual"], ["usual", "new"])
            .expect("labels");
        assert_eq!(
            dataset.intervention(),
            &[Arm::Control, Arm::Treated, Arm::Control]
        );
        assert_eq!(dataset.intervention_levels()[1], "new");

        let err = Dataset::from_labels(vec![0], &["other"], ["usual", "new"])
            .expect_err("unknown label should fail");
        assert!(matches!(err, InputError::UnknownInterventionLabel { .. }));
    }

    #[test]
    fn select_rows_repeats_records() {
        let dataset = Dataset::new(vec![0, 4, 7], arms(&[0, 1, 1]))
            .with_categorical("Sex", &["F", "M", "F"])
            .expect("column");
        let sample = dataset.select_rows(&[2, 2, 0]);
        assert_eq!(sample.outcome(), &[7, 7, 0]);
        assert_eq!(sample.arm_counts(), [1, 2]);
        assert!(sample.validate().is_ok());
    }
}
