//! Structured model specification for the two hurdle parts.
//!
//! Predictor lists are parsed into terms and checked against the data set
//! schema before any fitting starts.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::input::{Dataset, InputError, Term};

/// Configuration errors. These are fatal and raised before resampling starts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("predictor `{name}` in term `{term}` is not a column of the data set")]
    UnknownPredictor { name: String, term: String },
    #[error("malformed model term `{0}`")]
    MalformedTerm(String),
    #[error(
        "unsupported count family `{0}` (expected one of: poisson, negbin, geometric)"
    )]
    UnsupportedFamily(String),
    #[error("unsupported interval method `{0}` (expected one of: percentile, bca)")]
    UnsupportedIntervalMethod(String),
    #[error("confidence level must lie strictly between 0 and 1, got {0}")]
    InvalidConfidenceLevel(f64),
    #[error("number of bootstrap replicates must be positive")]
    InvalidReplicateCount,
    #[error("iteration cap must be positive")]
    InvalidIterationCap,
    #[error("convergence tolerance must be finite and positive, got {0}")]
    InvalidTolerance(f64),
    #[error(
        "outcome needs both zero and positive values to fit a hurdle model (zeros: {zeros}, positives: {positives})"
    )]
    DegenerateOutcome { zeros: usize, positives: usize },
    #[error("each intervention arm needs at least one record (control: {control}, treated: {treated})")]
    EmptyArm { control: usize, treated: usize },
    #[error(transparent)]
    Input(#[from] InputError),
}

/// Distribution of the positive counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountFamily {
    /// Zero-truncated Poisson.
    #[default]
    Poisson,
    /// Zero-truncated NB2 with an estimated dispersion `theta`.
    NegativeBinomial,
    /// Zero-truncated negative binomial with `theta` fixed at 1.
    Geometric,
}

impl CountFamily {
    /// NB2 size parameter of the family: `None` for Poisson, 1 for
    /// geometric, and `estimated` for the negative binomial.
    #[must_use]
    pub const fn theta(self, estimated: f64) -> Option<f64> {
        match self {
            Self::Poisson => None,
            Self::Geometric => Some(1.0),
            Self::NegativeBinomial => Some(estimated),
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Poisson => "poisson",
            Self::NegativeBinomial => "negbin",
            Self::Geometric => "geometric",
        }
    }
}

impl fmt::Display for CountFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CountFamily {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "poisson" => Ok(Self::Poisson),
            "negbin" | "negative_binomial" | "negative-binomial" | "nb" => {
                Ok(Self::NegativeBinomial)
            }
            "geometric" => Ok(Self::Geometric),
            _ => Err(ConfigurationError::UnsupportedFamily(value.to_owned())),
        }
    }
}

/// Predictor terms for both parts plus the count family. Immutable once built.
///
/// The intervention main effect is always part of both designs; listing
/// `"Intervention"` explicitly is accepted and ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpecification {
    count_terms: Vec<Term>,
    zero_terms: Vec<Term>,
    family: CountFamily,
}

impl ModelSpecification {
    /// # Errors
    ///
    /// Returns `ConfigurationError::MalformedTerm` if a predictor cannot be parsed.
    pub fn new<S: AsRef<str>, T: AsRef<str>>(
        count_predictors: &[S],
        zero_predictors: &[T],
        family: CountFamily,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            count_terms: parse_terms(count_predictors)?,
            zero_terms: parse_terms(zero_predictors)?,
            family,
        })
    }

    /// Like [`ModelSpecification::new`] with the family given by name.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` for malformed terms or unknown family names.
    pub fn from_names<S: AsRef<str>, T: AsRef<str>>(
        count_predictors: &[S],
        zero_predictors: &[T],
        family: &str,
    ) -> Result<Self, ConfigurationError> {
        Self::new(count_predictors, zero_predictors, family.parse()?)
    }

    #[must_use]
    pub const fn family(&self) -> CountFamily {
        self.family
    }

    /// Terms entering the count design, intervention first.
    #[must_use]
    pub fn count_design_terms(&self) -> Vec<Term> {
        with_intervention(&self.count_terms)
    }

    /// Terms entering the zero design, intervention first.
    #[must_use]
    pub fn zero_design_terms(&self) -> Vec<Term> {
        with_intervention(&self.zero_terms)
    }

    /// Check every referenced column exists in `dataset`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::UnknownPredictor` for the first missing column.
    pub fn validate_against(&self, dataset: &Dataset) -> Result<(), ConfigurationError> {
        for term in self.count_terms.iter().chain(&self.zero_terms) {
            term.check_columns(dataset)?;
        }
        Ok(())
    }
}

fn parse_terms<S: AsRef<str>>(predictors: &[S]) -> Result<Vec<Term>, ConfigurationError> {
    let mut terms: Vec<Term> = Vec::with_capacity(predictors.len());
    for predictor in predictors {
        let term = Term::parse(predictor.as_ref())?;
        if !term.is_intervention() && !terms.contains(&term) {
            terms.push(term);
        }
    }
    Ok(terms)
}

fn with_intervention(terms: &[Term]) -> Vec<Term> {
    std::iter::once(Term::intervention())
        .chain(terms.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Arm;

    #[test]
    fn family_names_parse_case_insensitively() {
        assert_eq!("Poisson".parse::<CountFamily>(), Ok(CountFamily::Poisson));
        assert_eq!("negbin".parse::<CountFamily>(), Ok(CountFamily::NegativeBinomial));
        assert_eq!(
            "Negative_Binomial".parse::<CountFamily>(),
            Ok(CountFamily::NegativeBinomial)
        );
        assert_eq!(" geometric ".parse::<CountFamily>(), Ok(CountFamily::Geometric));
        assert_eq!(
            "gamma".parse::<CountFamily>(),
            Err(ConfigurationError::UnsupportedFamily("gamma".to_owned()))
        );
    }

    #[test]
    fn geometric_fixes_theta_at_one() {
        assert_eq!(CountFamily::Geometric.theta(3.0), Some(1.0));
        assert_eq!(CountFamily::NegativeBinomial.theta(3.0), Some(3.0));
        assert_eq!(CountFamily::Poisson.theta(3.0), None);
    }

    #[test]
    fn intervention_is_always_first_and_deduplicated() {
        let spec = ModelSpecification::new(
            &["Intervention", "Age", "Sex", "Age"],
            &["Age"],
            CountFamily::Poisson,
        )
        .expect("spec");
        let names = spec
            .count_design_terms()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Intervention", "Age", "Sex"]);
        assert_eq!(spec.zero_design_terms().len(), 2);
    }

    #[test]
    fn validate_against_reports_missing_columns() {
        let dataset = Dataset::new(vec![0, 1], vec![Arm::Control, Arm::Treated])
            .with_numeric("Age", vec![1.0, 2.0])
            .expect("column");
        let ok = ModelSpecification::new(&["Age"], &["Age:Intervention"], CountFamily::Poisson)
            .expect("spec");
        assert!(ok.validate_against(&dataset).is_ok());

        let missing = ModelSpecification::from_names(&["Age"], &["Sex"], "poisson").expect("spec");
        assert_eq!(
            missing.validate_against(&dataset),
            Err(ConfigurationError::UnknownPredictor {
                name: "Sex".to_owned(),
                term: "Sex".to_owned(),
            })
        );
    }
}
