//! # Models
//!
//! The hurdle model for count outcomes: its specification, the zero-truncated
//! count families of the positive part, and the two-part fitter.

pub mod count;
pub mod hurdle;
pub mod matrix_ops;
pub mod specification;
