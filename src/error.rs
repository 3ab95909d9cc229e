//! # Errors
//!
//! $$
//! f:\text{inputs}\to\text{Result}\langle\text{output},\ \text{PortfolioError}\rangle
//! $$
//!
//! Typed failure taxonomy shared by every analytics module. Core functions
//! fail fast with one of these variants instead of propagating NaN.

use thiserror::Error;

/// Errors produced by the analytics core.
#[derive(Error, Debug)]
pub enum PortfolioError {
  /// A series is too short for the requested statistic.
  #[error("insufficient data for {what}: need at least {needed} observations, got {got}")]
  InsufficientData {
    /// Statistic or operation that was requested.
    what: &'static str,
    /// Minimum number of observations required.
    needed: usize,
    /// Number of observations actually supplied.
    got: usize,
  },

  /// Two series share no overlapping timestamps.
  #[error("no overlapping timestamps between {0}")]
  Alignment(&'static str),

  /// A weight vector violates its invariants.
  #[error("invalid weights: {0}")]
  InvalidWeights(String),

  /// An input series is malformed (length mismatch, unordered dates, non-finite values).
  #[error("invalid series: {0}")]
  InvalidSeries(String),

  /// A caller-supplied parameter is outside its valid range.
  #[error("invalid parameter: {0}")]
  InvalidParameter(String),

  /// The weight solver did not converge.
  ///
  /// [`optimize_weights`](crate::optimize::optimize_weights) recovers from
  /// non-convergence by falling back to equal weights and reporting through
  /// [`OptimizationOutcome::converged`](crate::optimize::OptimizationOutcome);
  /// this variant is the taxonomy entry for callers that treat the fallback
  /// as fatal.
  #[error("optimization failed to converge")]
  OptimizationFailed,
}
